// ABOUTME: Persistence layer for kitalog, wrapping the embedded database and the fallback slot.
// ABOUTME: Provides the sqlite-backed log and config tables plus the crash-safe snapshot store.

pub mod snapshot;
pub mod sqlite;

pub use snapshot::{SnapshotError, SnapshotStore};
pub use sqlite::{LogStore, StoreError};
