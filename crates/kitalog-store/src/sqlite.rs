// ABOUTME: SQLite-backed store holding the append-only log table and the single-row config table.
// ABOUTME: Assigns ids and timestamps at persistence time and deletes rows key-by-key.

use std::path::Path;

use chrono::Utc;
use kitalog_core::defaults::{CONFIG_KEY, MS_PER_DAY};
use kitalog_core::{ConfigOptions, LogDraft, LogEntry, LogLevel};
use rusqlite::{Connection, params};
use thiserror::Error;
use ulid::Ulid;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The embedded storage engine: a log table indexed by numeric timestamp and
/// a config table holding one row under a fixed key. The engine deliberately
/// exposes no bulk-clear primitive; deletions are issued per key.
pub struct LogStore {
    conn: Connection,
}

impl LogStore {
    /// Open or create the store at the given path and run the schema setup.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init_schema(conn)
    }

    /// Open an in-memory store, mainly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init_schema(Connection::open_in_memory()?)
    }

    fn init_schema(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS logs (
                id TEXT PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                timestamp_iso TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                prefix TEXT,
                stack TEXT
            );

            CREATE INDEX IF NOT EXISTS by_timestamp ON logs(timestamp);

            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn })
    }

    /// Raw row put. The caller supplies a fully formed entry; normal writes
    /// go through [`insert_log`](Self::insert_log) or
    /// [`insert_logs`](Self::insert_logs) instead.
    pub fn put_log(&self, entry: &LogEntry) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO logs (id, timestamp, timestamp_iso, level, message, prefix, stack)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id,
                entry.timestamp,
                entry.timestamp_iso,
                entry.level.as_str(),
                entry.message,
                entry.prefix,
                entry.stack,
            ],
        )?;
        Ok(())
    }

    /// Persist one draft, assigning a fresh ULID and the current timestamps.
    pub fn insert_log(&self, draft: &LogDraft) -> Result<LogEntry, StoreError> {
        let entry = stamp(draft);
        self.put_log(&entry)?;
        Ok(entry)
    }

    /// Persist a batch of drafts in one transaction. Each draft gets its own
    /// ULID and timestamps; either every row lands or none do.
    pub fn insert_logs(&mut self, drafts: &[LogDraft]) -> Result<Vec<LogEntry>, StoreError> {
        let tx = self.conn.transaction()?;
        let mut entries = Vec::with_capacity(drafts.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO logs (id, timestamp, timestamp_iso, level, message, prefix, stack)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for draft in drafts {
                let entry = stamp(draft);
                stmt.execute(params![
                    entry.id,
                    entry.timestamp,
                    entry.timestamp_iso,
                    entry.level.as_str(),
                    entry.message,
                    entry.prefix,
                    entry.stack,
                ])?;
                entries.push(entry);
            }
        }
        tx.commit()?;
        Ok(entries)
    }

    /// List every entry, newest first. Order among equal timestamps is
    /// unspecified.
    pub fn list_logs(&self) -> Result<Vec<LogEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, timestamp_iso, level, message, prefix, stack
             FROM logs ORDER BY timestamp DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            let level_str: String = row.get(3)?;
            let level = level_str.parse::<LogLevel>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            Ok(LogEntry {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                timestamp_iso: row.get(2)?,
                level,
                message: row.get(4)?,
                prefix: row.get(5)?,
                stack: row.get(6)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Delete every entry strictly older than `now - retention_days` days.
    /// Reads the matching keys first and deletes them one by one; returns the
    /// number of rows removed.
    pub fn delete_expired(&self, retention_days: u32) -> Result<usize, StoreError> {
        let cutoff = Utc::now().timestamp_millis() - i64::from(retention_days) * MS_PER_DAY;
        self.delete_logs_before(cutoff)
    }

    /// Delete every entry with a timestamp strictly less than `cutoff_ms`.
    pub fn delete_logs_before(&self, cutoff_ms: i64) -> Result<usize, StoreError> {
        let ids = self.ids_where("SELECT id FROM logs WHERE timestamp < ?1", Some(cutoff_ms))?;
        self.delete_ids(&ids)
    }

    /// Delete every entry by reading all keys and issuing a delete per key.
    pub fn delete_all(&self) -> Result<usize, StoreError> {
        let ids = self.ids_where("SELECT id FROM logs", None)?;
        self.delete_ids(&ids)
    }

    fn ids_where(&self, sql: &str, cutoff: Option<i64>) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut ids = Vec::new();
        match cutoff {
            Some(ms) => {
                let rows = stmt.query_map(params![ms], |row| row.get::<_, String>(0))?;
                for row in rows {
                    ids.push(row?);
                }
            }
            None => {
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                for row in rows {
                    ids.push(row?);
                }
            }
        }
        Ok(ids)
    }

    fn delete_ids(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for id in ids {
            deleted += self
                .conn
                .execute("DELETE FROM logs WHERE id = ?1", params![id])?;
        }
        Ok(deleted)
    }

    /// Write the configuration record under the fixed key, replacing any
    /// previous row.
    pub fn put_config(&self, config: &ConfigOptions) -> Result<(), StoreError> {
        let value = serde_json::to_string(config)?;
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![CONFIG_KEY, value],
        )?;
        Ok(())
    }

    /// Read the configuration record. Absence is a defined state, not an
    /// error.
    pub fn get_config(&self) -> Result<Option<ConfigOptions>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM config WHERE key = ?1")?;

        let result = stmt.query_row(params![CONFIG_KEY], |row| row.get::<_, String>(0));

        match result {
            Ok(value) => Ok(Some(serde_json::from_str(&value)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }
}

/// Assign a fresh ULID and the current timestamps to a draft.
fn stamp(draft: &LogDraft) -> LogEntry {
    let now = Utc::now();
    LogEntry {
        id: Ulid::new().to_string(),
        timestamp: now.timestamp_millis(),
        timestamp_iso: now.to_rfc3339(),
        level: draft.level,
        message: draft.message.clone(),
        prefix: draft.prefix.clone(),
        stack: draft.stack.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitalog_core::BufferedOptions;
    use tempfile::TempDir;

    fn make_draft(level: LogLevel, message: &str) -> LogDraft {
        LogDraft {
            level,
            message: message.to_string(),
            prefix: Some("[TEST]".to_string()),
            stack: None,
        }
    }

    fn old_entry(message: &str, age_days: i64) -> LogEntry {
        let ts = Utc::now().timestamp_millis() - age_days * MS_PER_DAY;
        LogEntry {
            id: Ulid::new().to_string(),
            timestamp: ts,
            timestamp_iso: String::new(),
            level: LogLevel::Info,
            message: message.to_string(),
            prefix: Some("[TEST]".to_string()),
            stack: None,
        }
    }

    #[test]
    fn open_creates_schema_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(&dir.path().join("logs.db")).unwrap();
        assert!(store.list_logs().unwrap().is_empty());
    }

    #[test]
    fn insert_assigns_id_and_timestamps() {
        let store = LogStore::open_in_memory().unwrap();
        let entry = store.insert_log(&make_draft(LogLevel::Info, "hello")).unwrap();

        assert!(!entry.id.is_empty());
        assert!(entry.timestamp > 0);
        assert!(!entry.timestamp_iso.is_empty());

        let listed = store.list_logs().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message, "hello");
        assert_eq!(listed[0].prefix.as_deref(), Some("[TEST]"));
    }

    #[test]
    fn batch_insert_gives_distinct_ids() {
        let mut store = LogStore::open_in_memory().unwrap();
        let drafts: Vec<LogDraft> = (0..10)
            .map(|i| make_draft(LogLevel::Debug, &format!("msg {i}")))
            .collect();

        let entries = store.insert_logs(&drafts).unwrap();
        assert_eq!(entries.len(), 10);

        let mut ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10, "ids must be unique within one batch");

        assert_eq!(store.list_logs().unwrap().len(), 10);
    }

    #[test]
    fn list_returns_newest_first() {
        let store = LogStore::open_in_memory().unwrap();
        store.put_log(&old_entry("oldest", 3)).unwrap();
        store.put_log(&old_entry("middle", 2)).unwrap();
        store.put_log(&old_entry("newest", 1)).unwrap();

        let logs = store.list_logs().unwrap();
        let messages: Vec<&str> = logs.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["newest", "middle", "oldest"]);
    }

    #[test]
    fn delete_expired_respects_cutoff() {
        let store = LogStore::open_in_memory().unwrap();
        store.put_log(&old_entry("ancient", 10)).unwrap();
        store.insert_log(&make_draft(LogLevel::Info, "fresh")).unwrap();

        let deleted = store.delete_expired(7).unwrap();
        assert_eq!(deleted, 1);

        let logs = store.list_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "fresh");
    }

    #[test]
    fn delete_all_empties_log_table_only() {
        let mut store = LogStore::open_in_memory().unwrap();
        let drafts: Vec<LogDraft> = (0..5)
            .map(|i| make_draft(LogLevel::Warn, &format!("w{i}")))
            .collect();
        store.insert_logs(&drafts).unwrap();
        store.put_config(&ConfigOptions::default()).unwrap();

        let deleted = store.delete_all().unwrap();
        assert_eq!(deleted, 5);
        assert!(store.list_logs().unwrap().is_empty());
        assert!(store.get_config().unwrap().is_some());
    }

    #[test]
    fn config_round_trips() {
        let store = LogStore::open_in_memory().unwrap();
        assert!(store.get_config().unwrap().is_none());

        let cfg = ConfigOptions {
            log_prefix: "[ROUND]".to_string(),
            log_retention_days: 3,
            buffered_options: BufferedOptions {
                batch_size: 7,
                ..Default::default()
            },
        };
        store.put_config(&cfg).unwrap();

        let loaded = store.get_config().unwrap().expect("config row");
        assert_eq!(loaded, cfg);

        // Second put replaces the row rather than adding one.
        let cfg2 = ConfigOptions {
            log_prefix: "[AGAIN]".to_string(),
            ..cfg
        };
        store.put_config(&cfg2).unwrap();
        assert_eq!(store.get_config().unwrap().unwrap().log_prefix, "[AGAIN]");
    }

    #[test]
    fn level_survives_storage() {
        let store = LogStore::open_in_memory().unwrap();
        for level in [
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            store.insert_log(&make_draft(level, level.as_str())).unwrap();
        }

        let logs = store.list_logs().unwrap();
        assert_eq!(logs.len(), 4);
        for entry in logs {
            assert_eq!(entry.level.as_str(), entry.message);
        }
    }
}
