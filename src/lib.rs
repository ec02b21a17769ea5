// ABOUTME: Library facade for kitalog: re-exports plus the LoggingContext lifecycle object.
// ABOUTME: Embedding applications construct one context, log through its handle, and shut it down.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

pub use kitalog_core::defaults;
pub use kitalog_core::{
    BufferedOptions, BufferedOptionsPatch, ConfigOptions, LogDraft, LogEntry, LogLevel,
};
pub use kitalog_logger::{
    BufferedLogger, ConfigStore, HistoryError, HistoryStore, LogError, LogReceipt, LoggerHandle,
    SqliteHistory,
};
pub use kitalog_store::{LogStore, SnapshotStore, StoreError};

/// Errors that can occur while setting up a logging context.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("history error: {0}")]
    History(#[from] HistoryError),
}

/// Owns the storage, configuration, and logger for one embedding
/// application. Construct it once at startup, hand out clones of the logger
/// handle, and call [`shutdown`](Self::shutdown) on the way out.
pub struct LoggingContext {
    data_dir: PathBuf,
    history: Arc<dyn HistoryStore>,
    config: Arc<ConfigStore>,
    logger: LoggerHandle,
    watcher: JoinHandle<()>,
}

impl LoggingContext {
    /// Initialize a context rooted at `dir`: open the embedded database,
    /// start a default-options logger, subscribe it to configuration
    /// changes, load the persisted configuration, and run one retention
    /// sweep.
    pub async fn init(dir: &Path) -> Result<Self, ContextError> {
        std::fs::create_dir_all(dir)?;

        let store = LogStore::open(&dir.join(defaults::DB_FILE))?;
        let history: Arc<dyn HistoryStore> = Arc::new(SqliteHistory::new(store));
        let config = Arc::new(ConfigStore::new(history.clone()));
        let logger = LoggerHandle::new(
            history.clone(),
            config.clone(),
            Some(dir.join(defaults::SNAPSHOT_FILE)),
        );

        // Subscribe before the first load so the persisted buffered options
        // are never missed.
        let watcher = logger.spawn_config_watcher();

        let loaded = config.current().await?;
        logger.refresh().await?;

        let swept = history.delete_expired(loaded.log_retention_days).await?;
        if swept > 0 {
            tracing::info!(
                target: "kitalog",
                swept,
                retention_days = loaded.log_retention_days,
                "retention sweep removed expired entries"
            );
        }

        Ok(Self {
            data_dir: dir.to_path_buf(),
            history,
            config,
            logger,
            watcher,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The stable logger handle; clone it freely.
    pub fn logger(&self) -> &LoggerHandle {
        &self.logger
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// All persisted entries, newest first.
    pub async fn logs(&self) -> Result<Vec<LogEntry>, HistoryError> {
        self.history.logs().await
    }

    /// Delete entries older than the configured retention window; returns
    /// the number removed.
    pub async fn delete_expired_logs(&self) -> Result<usize, HistoryError> {
        let days = self.config.retention_days().await?;
        self.history.delete_expired(days).await
    }

    /// Delete every persisted entry; returns the number removed.
    pub async fn delete_all_logs(&self) -> Result<usize, HistoryError> {
        self.history.delete_all().await
    }

    /// Stop the config watcher and the logger, flushing anything buffered.
    pub async fn shutdown(self) -> Result<(), LogError> {
        self.watcher.abort();
        self.logger.stop().await
    }
}
