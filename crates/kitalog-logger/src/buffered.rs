// ABOUTME: The buffered logger core: enqueue with overflow eviction, batched transactional
// ABOUTME: flushing, re-queue + snapshot on failure, a periodic flush timer, and per-entry receipts.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use kitalog_core::{BufferedOptions, LogDraft, LogLevel};
use kitalog_store::SnapshotStore;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::ConfigStore;
use crate::history::{HistoryError, HistoryStore};

/// Outcome delivered through a [`LogReceipt`] and returned by `flush`/`stop`.
#[derive(Debug, Clone, Error)]
pub enum LogError {
    /// The persisting transaction failed; the entries were re-queued and, if
    /// enabled, snapshotted to the fallback slot.
    #[error("flush failed: {0}")]
    Flush(#[from] HistoryError),

    /// The entry was evicted on buffer overflow or abandoned at teardown
    /// before it could be persisted.
    #[error("log entry dropped before persistence")]
    Dropped,
}

/// Pending acknowledgment for a single log call. Await [`wait`](Self::wait)
/// to learn whether the entry became durable; dropping the receipt simply
/// declines to observe the outcome.
#[derive(Debug)]
pub struct LogReceipt {
    rx: oneshot::Receiver<Result<(), LogError>>,
}

impl LogReceipt {
    pub async fn wait(self) -> Result<(), LogError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            // Sender dropped without sending: the entry was evicted on
            // overflow or the logger was torn down with it still queued.
            Err(_) => Err(LogError::Dropped),
        }
    }
}

struct QueuedEntry {
    seq: u64,
    draft: LogDraft,
}

type CompletionSender = oneshot::Sender<Result<(), LogError>>;

/// The periodic flush task plus the signal that tells it to wind down.
struct FlushTimer {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct LoggerInner {
    history: Arc<dyn HistoryStore>,
    config: Arc<ConfigStore>,
    snapshots: Option<SnapshotStore>,
    options: BufferedOptions,
    /// Cached prefix, refreshed out-of-band via `refresh()`; log calls never
    /// hit storage for it.
    prefix: RwLock<String>,
    /// Buffered payloads are plain data; completion channels live in the
    /// side table below, keyed by sequence number, so the buffer can be
    /// snapshotted without filtering.
    buffer: Mutex<VecDeque<QueuedEntry>>,
    completions: Mutex<HashMap<u64, CompletionSender>>,
    next_seq: AtomicU64,
    timer: Mutex<Option<FlushTimer>>,
}

/// A logger that accumulates entries in memory and flushes them in bounded
/// batches to the history store. Cloning yields another handle to the same
/// buffer. Must be used inside a tokio runtime; construction schedules the
/// periodic flush timer.
#[derive(Clone)]
pub struct BufferedLogger {
    inner: Arc<LoggerInner>,
}

impl BufferedLogger {
    /// Create a running logger. If the fallback slot holds a snapshot from a
    /// previous failure, its drafts are placed at the buffer front and the
    /// slot is cleared immediately.
    pub fn new(
        history: Arc<dyn HistoryStore>,
        config: Arc<ConfigStore>,
        snapshots: Option<SnapshotStore>,
        options: BufferedOptions,
        initial_prefix: impl Into<String>,
    ) -> Self {
        let logger = Self {
            inner: Arc::new(LoggerInner {
                history,
                config,
                snapshots,
                options,
                prefix: RwLock::new(initial_prefix.into()),
                buffer: Mutex::new(VecDeque::new()),
                completions: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
                timer: Mutex::new(None),
            }),
        };
        logger.restore_snapshot();
        logger.start();
        logger
    }

    /// The options this instance was built with.
    pub fn options(&self) -> &BufferedOptions {
        &self.inner.options
    }

    /// Number of entries currently buffered.
    pub fn pending(&self) -> usize {
        self.lock_buffer().len()
    }

    pub fn info(&self, message: impl Into<String>) -> LogReceipt {
        self.log(LogLevel::Info, message.into(), None)
    }

    pub fn debug(&self, message: impl Into<String>) -> LogReceipt {
        self.log(LogLevel::Debug, message.into(), None)
    }

    pub fn warn(&self, message: impl Into<String>) -> LogReceipt {
        self.log(LogLevel::Warn, message.into(), None)
    }

    pub fn error(&self, message: impl Into<String>) -> LogReceipt {
        self.log(LogLevel::Error, message.into(), None)
    }

    /// Log at error level with the error's text and source chain attached as
    /// the entry's stack context.
    pub fn error_with(
        &self,
        message: impl Into<String>,
        error: &(dyn std::error::Error + 'static),
    ) -> LogReceipt {
        let mut context = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            context.push_str("\ncaused by: ");
            context.push_str(&cause.to_string());
            source = cause.source();
        }
        self.log(LogLevel::Error, message.into(), Some(context))
    }

    /// Stamp, echo, enqueue, and kick off a fire-and-forget flush. Returns
    /// the entry's pending acknowledgment.
    pub fn log(&self, level: LogLevel, message: String, context: Option<String>) -> LogReceipt {
        let prefix = self
            .inner
            .prefix
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        // Console-visible side effect; success path only, never gates
        // persistence.
        match level {
            LogLevel::Info => tracing::info!(target: "kitalog", "{prefix} {message}"),
            LogLevel::Debug => tracing::debug!(target: "kitalog", "{prefix} {message}"),
            LogLevel::Warn => tracing::warn!(target: "kitalog", "{prefix} {message}"),
            LogLevel::Error => tracing::error!(target: "kitalog", "{prefix} {message}"),
        }

        let draft = LogDraft {
            level,
            message,
            prefix: Some(prefix),
            stack: self.stack_for(level, context),
        };

        let (tx, rx) = oneshot::channel();
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        self.lock_completions().insert(seq, tx);

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() >= self.inner.options.max_buffer_size
                && let Some(evicted) = buffer.pop_front()
            {
                // Dropping the evicted sender settles its receipt as Dropped.
                self.lock_completions().remove(&evicted.seq);
                tracing::warn!(target: "kitalog", seq = evicted.seq, "buffer full, dropped oldest entry");
            }
            buffer.push_back(QueuedEntry { seq, draft });
        }

        // Eager flush for low latency under light load; the periodic timer
        // guarantees progress under bursts. Failures reach the receipts.
        let logger = self.clone();
        tokio::spawn(async move {
            if let Err(err) = logger.flush().await {
                tracing::debug!(target: "kitalog", "eager flush failed: {err}");
            }
        });

        LogReceipt { rx }
    }

    /// Drain up to `batch_size` entries and persist them in one transaction.
    /// A no-op without any storage call when the buffer is empty. On failure
    /// the batch is restored to the buffer front in its original order and
    /// the whole buffer is snapshotted to the fallback slot.
    pub async fn flush(&self) -> Result<(), LogError> {
        // The drain is atomic with respect to buffer mutation, so a timer
        // tick overlapping an in-flight flush can neither duplicate nor lose
        // entries.
        let batch: Vec<QueuedEntry> = {
            let mut buffer = self.lock_buffer();
            if buffer.is_empty() {
                return Ok(());
            }
            let n = self.inner.options.batch_size.min(buffer.len());
            buffer.drain(..n).collect()
        };

        let drafts: Vec<LogDraft> = batch.iter().map(|q| q.draft.clone()).collect();

        match self.inner.history.save_logs(&drafts).await {
            Ok(_) => {
                let mut completions = self.lock_completions();
                for queued in &batch {
                    if let Some(tx) = completions.remove(&queued.seq) {
                        let _ = tx.send(Ok(()));
                    }
                }
                Ok(())
            }
            Err(err) => {
                let seqs: Vec<u64> = batch.iter().map(|q| q.seq).collect();
                let snapshot_drafts = {
                    let mut buffer = self.lock_buffer();
                    for queued in batch.into_iter().rev() {
                        buffer.push_front(queued);
                    }
                    buffer.iter().map(|q| q.draft.clone()).collect::<Vec<_>>()
                };

                if self.inner.options.persist_snapshots
                    && let Some(slot) = &self.inner.snapshots
                    && let Err(snap_err) = slot.save(&snapshot_drafts)
                {
                    tracing::warn!(target: "kitalog", "failed to write fallback snapshot: {snap_err}");
                }

                let failure = LogError::Flush(err);
                let mut completions = self.lock_completions();
                for seq in seqs {
                    if let Some(tx) = completions.remove(&seq) {
                        let _ = tx.send(Err(failure.clone()));
                    }
                }
                Err(failure)
            }
        }
    }

    /// Re-arm the periodic flush timer if it is not already running.
    pub fn start(&self) {
        let mut timer = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if timer.is_some() {
            return;
        }

        let logger = self.clone();
        let interval_ms = self.inner.options.flush_interval_ms.max(1);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                // The stop signal is only observed between ticks; a flush
                // that already drained a batch always runs to completion, so
                // its entries end up persisted or re-queued, never dropped.
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = logger.flush().await {
                            tracing::debug!(target: "kitalog", "periodic flush failed: {err}");
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });
        *timer = Some(FlushTimer {
            stop: stop_tx,
            task,
        });
    }

    /// Wind down the timer, waiting for any in-flight tick to settle, then
    /// flush until the buffer is empty. Concurrent enqueues may still
    /// schedule fire-and-forget flushes.
    pub async fn stop(&self) -> Result<(), LogError> {
        let timer = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(FlushTimer { stop, task }) = timer {
            let _ = stop.send(());
            if task.await.is_err() {
                tracing::warn!(target: "kitalog", "flush timer task panicked");
            }
        }
        while self.pending() > 0 {
            self.flush().await?;
        }
        Ok(())
    }

    /// Re-read the prefix from the configuration store into the cache.
    pub async fn refresh(&self) -> Result<(), HistoryError> {
        let prefix = self.inner.config.log_prefix().await?;
        *self
            .inner
            .prefix
            .write()
            .unwrap_or_else(PoisonError::into_inner) = prefix;
        Ok(())
    }

    /// Prepend any snapshotted drafts to the buffer and clear the slot.
    /// Restored entries have no completion channel; nobody is waiting on
    /// them anymore.
    fn restore_snapshot(&self) {
        let Some(slot) = &self.inner.snapshots else {
            return;
        };
        let drafts = match slot.load() {
            Ok(Some(drafts)) => drafts,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(target: "kitalog", "failed to read fallback snapshot: {err}");
                return;
            }
        };

        {
            let mut buffer = self.lock_buffer();
            for draft in drafts.into_iter().rev() {
                let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
                buffer.push_front(QueuedEntry { seq, draft });
            }
            tracing::info!(
                target: "kitalog",
                restored = buffer.len(),
                "restored entries from fallback snapshot"
            );
        }

        if let Err(err) = slot.clear() {
            tracing::warn!(target: "kitalog", "failed to clear fallback snapshot: {err}");
        }
    }

    /// Build the stack/context string for an entry: the supplied context
    /// always, a captured backtrace for error-level entries when configured,
    /// truncated to `max_stack_chars` characters. None when empty.
    fn stack_for(&self, level: LogLevel, context: Option<String>) -> Option<String> {
        let mut stack = context.unwrap_or_default();

        if level == LogLevel::Error && self.inner.options.capture_stack {
            let trace = std::backtrace::Backtrace::force_capture().to_string();
            if !trace.is_empty() {
                if !stack.is_empty() {
                    stack.push('\n');
                }
                stack.push_str(&trace);
            }
        }

        if stack.is_empty() {
            return None;
        }

        let max = self.inner.options.max_stack_chars;
        if stack.chars().count() > max {
            stack = stack.chars().take(max).collect();
        }
        Some(stack)
    }

    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedEntry>> {
        // A panicked log call must not poison the shared buffer.
        self.inner
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_completions(&self) -> std::sync::MutexGuard<'_, HashMap<u64, CompletionSender>> {
        self.inner
            .completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
