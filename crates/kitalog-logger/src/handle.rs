// ABOUTME: Stable logger handle whose active BufferedLogger instance is swapped on reconfiguration.
// ABOUTME: Callers keep one handle; option changes stop the outgoing instance and build a fresh one.

use std::path::PathBuf;
use std::sync::Arc;

use kitalog_core::{BufferedOptions, LogLevel};
use kitalog_store::SnapshotStore;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::buffered::{BufferedLogger, LogError, LogReceipt};
use crate::config::ConfigStore;
use crate::history::{HistoryError, HistoryStore};

struct HandleInner {
    history: Arc<dyn HistoryStore>,
    config: Arc<ConfigStore>,
    snapshot_path: Option<PathBuf>,
    active: RwLock<BufferedLogger>,
}

/// A stable, cloneable handle over the active buffered logger.
///
/// Reconfiguration swaps the inner instance under the write lock, so no
/// caller ever observes a partially swapped logger and no two timers run for
/// one handle. The handle starts with default options immediately and picks
/// up persisted options once the configuration store loads (see
/// [`spawn_config_watcher`](Self::spawn_config_watcher)).
#[derive(Clone)]
pub struct LoggerHandle {
    inner: Arc<HandleInner>,
}

impl LoggerHandle {
    /// Build a handle with a running default-options logger. `snapshot_path`
    /// names the fallback slot shared by every instance this handle creates.
    pub fn new(
        history: Arc<dyn HistoryStore>,
        config: Arc<ConfigStore>,
        snapshot_path: Option<PathBuf>,
    ) -> Self {
        let snapshots = snapshot_path.clone().map(SnapshotStore::new);
        let logger = BufferedLogger::new(
            history.clone(),
            config.clone(),
            snapshots,
            BufferedOptions::default(),
            kitalog_core::defaults::DEFAULT_LOG_PREFIX,
        );
        Self {
            inner: Arc::new(HandleInner {
                history,
                config,
                snapshot_path,
                active: RwLock::new(logger),
            }),
        }
    }

    async fn active(&self) -> BufferedLogger {
        self.inner.active.read().await.clone()
    }

    pub async fn info(&self, message: impl Into<String>) -> LogReceipt {
        self.active().await.info(message)
    }

    pub async fn debug(&self, message: impl Into<String>) -> LogReceipt {
        self.active().await.debug(message)
    }

    pub async fn warn(&self, message: impl Into<String>) -> LogReceipt {
        self.active().await.warn(message)
    }

    pub async fn error(&self, message: impl Into<String>) -> LogReceipt {
        self.active().await.error(message)
    }

    pub async fn error_with(
        &self,
        message: impl Into<String>,
        error: &(dyn std::error::Error + 'static),
    ) -> LogReceipt {
        self.active().await.error_with(message, error)
    }

    pub async fn log(
        &self,
        level: LogLevel,
        message: String,
        context: Option<String>,
    ) -> LogReceipt {
        self.active().await.log(level, message, context)
    }

    pub async fn flush(&self) -> Result<(), LogError> {
        self.active().await.flush().await
    }

    pub async fn start(&self) {
        self.active().await.start();
    }

    pub async fn stop(&self) -> Result<(), LogError> {
        self.active().await.stop().await
    }

    pub async fn refresh(&self) -> Result<(), HistoryError> {
        self.active().await.refresh().await
    }

    /// Options of the currently active instance.
    pub async fn options(&self) -> BufferedOptions {
        self.active().await.options().clone()
    }

    /// Stop (flush) the outgoing instance and swap in a replacement built
    /// with the given options. Anything a failed final flush left in the
    /// fallback slot is restored by the incoming instance.
    pub async fn reconfigure(&self, options: BufferedOptions) -> Result<(), HistoryError> {
        let mut active = self.inner.active.write().await;

        if let Err(err) = active.stop().await {
            // The entries live on in the fallback slot; the swap proceeds.
            tracing::warn!(target: "kitalog", "final flush during reconfigure failed: {err}");
        }

        let prefix = self.inner.config.log_prefix().await?;
        let snapshots = self.inner.snapshot_path.clone().map(SnapshotStore::new);
        *active = BufferedLogger::new(
            self.inner.history.clone(),
            self.inner.config.clone(),
            snapshots,
            options,
            prefix,
        );
        Ok(())
    }

    /// Spawn a task that reconfigures this handle every time the
    /// configuration store announces buffered options: once when the first
    /// load completes and on every explicit set. The subscription is
    /// registered before the task starts, so a load triggered right after
    /// this call is never missed.
    pub fn spawn_config_watcher(&self) -> JoinHandle<()> {
        let mut rx = self.inner.config.subscribe_buffered_options();
        let handle = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(options) => {
                        if let Err(err) = handle.reconfigure(options).await {
                            tracing::warn!(target: "kitalog", "reconfigure failed: {err}");
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::debug!(target: "kitalog", missed, "config watcher lagged, resyncing");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
