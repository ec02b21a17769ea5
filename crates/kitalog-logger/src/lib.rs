// ABOUTME: Async layer of kitalog: the history repository seam, cached configuration store,
// ABOUTME: the buffered logger core, and the swap-in-place logger handle.

pub mod buffered;
pub mod config;
pub mod handle;
pub mod history;

pub use buffered::{BufferedLogger, LogError, LogReceipt};
pub use config::ConfigStore;
pub use handle::LoggerHandle;
pub use history::{HistoryError, HistoryStore, SqliteHistory};
