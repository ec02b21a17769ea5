// ABOUTME: History repository trait over the embedded store, plus the sqlite-backed implementation.
// ABOUTME: Storage calls are the suspension points of the logger; errors here are cloneable for fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use kitalog_core::{ConfigOptions, LogDraft, LogEntry};
use kitalog_store::LogStore;
use thiserror::Error;
use tokio::sync::Mutex;

/// A storage failure surfaced by the repository. Wraps the underlying error
/// behind an Arc so one failure can be delivered to every completion signal
/// of a failed batch.
#[derive(Debug, Clone, Error)]
#[error("storage error: {0}")]
pub struct HistoryError(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>);

impl HistoryError {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(err))
    }
}

impl From<kitalog_store::StoreError> for HistoryError {
    fn from(err: kitalog_store::StoreError) -> Self {
        Self::new(err)
    }
}

/// CRUD operations over the log table and the single-row config table.
/// The buffered logger and config store talk to storage only through this
/// seam, which keeps failure injection and alternative engines possible.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist one draft, assigning its id and timestamps.
    async fn save_log(&self, draft: LogDraft) -> Result<LogEntry, HistoryError>;

    /// Persist a batch in one transaction; all entries land or none do.
    async fn save_logs(&self, drafts: &[LogDraft]) -> Result<Vec<LogEntry>, HistoryError>;

    /// All entries, newest first.
    async fn logs(&self) -> Result<Vec<LogEntry>, HistoryError>;

    /// Delete entries older than the retention window; returns the count.
    async fn delete_expired(&self, retention_days: u32) -> Result<usize, HistoryError>;

    /// Delete every entry; returns the count.
    async fn delete_all(&self) -> Result<usize, HistoryError>;

    /// Write the singleton configuration record.
    async fn save_config(&self, config: &ConfigOptions) -> Result<(), HistoryError>;

    /// Read the singleton configuration record; absence is None, not an error.
    async fn load_config(&self) -> Result<Option<ConfigOptions>, HistoryError>;
}

/// History repository backed by the embedded sqlite store. The connection is
/// shared behind a tokio mutex; every caller in the process reuses it.
pub struct SqliteHistory {
    store: Mutex<LogStore>,
}

impl SqliteHistory {
    pub fn new(store: LogStore) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    async fn save_log(&self, draft: LogDraft) -> Result<LogEntry, HistoryError> {
        let store = self.store.lock().await;
        Ok(store.insert_log(&draft)?)
    }

    async fn save_logs(&self, drafts: &[LogDraft]) -> Result<Vec<LogEntry>, HistoryError> {
        let mut store = self.store.lock().await;
        Ok(store.insert_logs(drafts)?)
    }

    async fn logs(&self) -> Result<Vec<LogEntry>, HistoryError> {
        let store = self.store.lock().await;
        Ok(store.list_logs()?)
    }

    async fn delete_expired(&self, retention_days: u32) -> Result<usize, HistoryError> {
        let store = self.store.lock().await;
        Ok(store.delete_expired(retention_days)?)
    }

    async fn delete_all(&self) -> Result<usize, HistoryError> {
        let store = self.store.lock().await;
        Ok(store.delete_all()?)
    }

    async fn save_config(&self, config: &ConfigOptions) -> Result<(), HistoryError> {
        let store = self.store.lock().await;
        Ok(store.put_config(config)?)
    }

    async fn load_config(&self) -> Result<Option<ConfigOptions>, HistoryError> {
        let store = self.store.lock().await;
        Ok(store.get_config()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitalog_core::LogLevel;

    fn history() -> SqliteHistory {
        SqliteHistory::new(LogStore::open_in_memory().unwrap())
    }

    fn draft(message: &str) -> LogDraft {
        LogDraft {
            level: LogLevel::Info,
            message: message.to_string(),
            prefix: Some("[HIST]".to_string()),
            stack: None,
        }
    }

    #[tokio::test]
    async fn save_log_persists_single_entry() {
        let history = history();
        let entry = history.save_log(draft("solo")).await.unwrap();
        assert_eq!(entry.message, "solo");

        let logs = history.logs().await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, entry.id);
    }

    #[tokio::test]
    async fn save_logs_persists_batch() {
        let history = history();
        let drafts: Vec<LogDraft> = (0..3).map(|i| draft(&format!("m{i}"))).collect();
        let entries = history.save_logs(&drafts).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(history.logs().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn config_absent_is_none() {
        let history = history();
        assert!(history.load_config().await.unwrap().is_none());

        history
            .save_config(&ConfigOptions::default())
            .await
            .unwrap();
        assert!(history.load_config().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_all_reports_count() {
        let history = history();
        history.save_logs(&[draft("a"), draft("b")]).await.unwrap();
        assert_eq!(history.delete_all().await.unwrap(), 2);
        assert!(history.logs().await.unwrap().is_empty());
    }
}
