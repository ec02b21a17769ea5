// ABOUTME: Cached configuration store: lazily loaded once from storage, written through on every set.
// ABOUTME: Broadcasts buffered-option changes so the logger handle can reconfigure itself.

use std::sync::Arc;

use kitalog_core::{BufferedOptions, BufferedOptionsPatch, ConfigOptions};
use tokio::sync::{RwLock, broadcast};

use crate::history::{HistoryError, HistoryStore};

/// In-process configuration cache backed by the history store's config row.
///
/// The first getter triggers a one-time load. A missing stored record yields
/// the built-in defaults and writes nothing; the cache becomes the source of
/// truth until the next explicit set, and every set persists the full merged
/// record.
pub struct ConfigStore {
    history: Arc<dyn HistoryStore>,
    state: RwLock<Option<ConfigOptions>>,
    options_tx: broadcast::Sender<BufferedOptions>,
}

impl ConfigStore {
    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        let (options_tx, _) = broadcast::channel(16);
        Self {
            history,
            state: RwLock::new(None),
            options_tx,
        }
    }

    /// Subscribe to buffered-option changes. One message is sent when the
    /// first load completes and one on every subsequent
    /// [`set_buffered_options`](Self::set_buffered_options). Dropping the
    /// receiver unsubscribes.
    pub fn subscribe_buffered_options(&self) -> broadcast::Receiver<BufferedOptions> {
        self.options_tx.subscribe()
    }

    /// Return the cached configuration, loading it from storage on first use.
    async fn load(&self) -> Result<ConfigOptions, HistoryError> {
        if let Some(config) = self.state.read().await.clone() {
            return Ok(config);
        }

        let mut guard = self.state.write().await;
        // Another caller may have finished the load while we waited.
        if let Some(config) = guard.clone() {
            return Ok(config);
        }

        let config = self.history.load_config().await?.unwrap_or_default();
        *guard = Some(config.clone());
        tracing::debug!(prefix = %config.log_prefix, "configuration loaded");

        // First-load notification: lets an already-running logger pick up
        // the persisted buffered options.
        let _ = self.options_tx.send(config.buffered_options.clone());

        Ok(config)
    }

    pub async fn log_prefix(&self) -> Result<String, HistoryError> {
        Ok(self.load().await?.log_prefix)
    }

    pub async fn retention_days(&self) -> Result<u32, HistoryError> {
        Ok(self.load().await?.log_retention_days)
    }

    pub async fn buffered_options(&self) -> Result<BufferedOptions, HistoryError> {
        Ok(self.load().await?.buffered_options)
    }

    /// The full current configuration record.
    pub async fn current(&self) -> Result<ConfigOptions, HistoryError> {
        self.load().await
    }

    pub async fn set_log_prefix(&self, prefix: impl Into<String>) -> Result<(), HistoryError> {
        let mut config = self.load().await?;
        config.log_prefix = prefix.into();
        self.persist(config).await
    }

    pub async fn set_retention_days(&self, days: u32) -> Result<(), HistoryError> {
        let mut config = self.load().await?;
        config.log_retention_days = days;
        self.persist(config).await
    }

    /// Merge the patch over the built-in defaults (not over the previous
    /// value), persist, notify subscribers, and return the effective options.
    pub async fn set_buffered_options(
        &self,
        patch: BufferedOptionsPatch,
    ) -> Result<BufferedOptions, HistoryError> {
        let options = patch.over_defaults();
        let mut config = self.load().await?;
        config.buffered_options = options.clone();
        self.persist(config).await?;

        let _ = self.options_tx.send(options.clone());
        Ok(options)
    }

    async fn persist(&self, config: ConfigOptions) -> Result<(), HistoryError> {
        self.history.save_config(&config).await?;
        *self.state.write().await = Some(config);
        Ok(())
    }
}
