// ABOUTME: Shared data model for kitalog: log levels, entries, drafts, and configuration records.
// ABOUTME: Serialized into the sqlite store (config as a JSON row) and the fallback snapshot slot.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::defaults::{DEFAULT_LOG_PREFIX, DEFAULT_RETENTION_DAYS};

/// Severity of a log entry. Serialized lowercase everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Debug,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored level string is not one of the four levels.
#[derive(Debug, Error)]
#[error("unknown log level: {0}")]
pub struct ParseLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

/// A log entry as persisted in the history store. The id and both timestamp
/// fields are assigned at persistence time, not when the entry was logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// RFC 3339 rendering of `timestamp`, derived at persistence time.
    pub timestamp_iso: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// The serializable payload of a log call before persistence assigns an id
/// and timestamps. This is also the record written to the snapshot slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogDraft {
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Options controlling the buffered logger. Fixed per logger instance;
/// changing them swaps in a new instance via the handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferedOptions {
    pub flush_interval_ms: u64,
    pub batch_size: usize,
    pub max_buffer_size: usize,
    /// Write a fallback snapshot of the buffer when a flush fails.
    pub persist_snapshots: bool,
    /// Capture a backtrace for error-level entries.
    pub capture_stack: bool,
    /// Stack/context strings are truncated to this many characters.
    pub max_stack_chars: usize,
}

impl Default for BufferedOptions {
    fn default() -> Self {
        Self {
            flush_interval_ms: 2000,
            batch_size: 50,
            max_buffer_size: 5000,
            persist_snapshots: true,
            capture_stack: true,
            max_stack_chars: 4000,
        }
    }
}

/// A partial update to [`BufferedOptions`]. Unset fields fall back to the
/// built-in defaults, not to the previously stored values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedOptionsPatch {
    pub flush_interval_ms: Option<u64>,
    pub batch_size: Option<usize>,
    pub max_buffer_size: Option<usize>,
    pub persist_snapshots: Option<bool>,
    pub capture_stack: Option<bool>,
    pub max_stack_chars: Option<usize>,
}

impl BufferedOptionsPatch {
    /// Merge this patch over the built-in defaults.
    pub fn over_defaults(&self) -> BufferedOptions {
        let d = BufferedOptions::default();
        BufferedOptions {
            flush_interval_ms: self.flush_interval_ms.unwrap_or(d.flush_interval_ms),
            batch_size: self.batch_size.unwrap_or(d.batch_size),
            max_buffer_size: self.max_buffer_size.unwrap_or(d.max_buffer_size),
            persist_snapshots: self.persist_snapshots.unwrap_or(d.persist_snapshots),
            capture_stack: self.capture_stack.unwrap_or(d.capture_stack),
            max_stack_chars: self.max_stack_chars.unwrap_or(d.max_stack_chars),
        }
    }
}

/// The singleton configuration record stored under the fixed `"current"` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOptions {
    pub log_prefix: String,
    pub log_retention_days: u32,
    pub buffered_options: BufferedOptions,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            log_prefix: DEFAULT_LOG_PREFIX.to_string(),
            log_retention_days: DEFAULT_RETENTION_DAYS,
            buffered_options: BufferedOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
        let parsed: LogLevel = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(parsed, LogLevel::Error);
    }

    #[test]
    fn level_round_trips_through_str() {
        for level in [
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            assert_eq!(level.as_str().parse::<LogLevel>().unwrap(), level);
        }
        assert!("fatal".parse::<LogLevel>().is_err());
    }

    #[test]
    fn patch_merges_over_defaults_not_previous() {
        let patch = BufferedOptionsPatch {
            batch_size: Some(5),
            ..Default::default()
        };
        let merged = patch.over_defaults();
        assert_eq!(merged.batch_size, 5);
        assert_eq!(merged.flush_interval_ms, 2000);
        assert_eq!(merged.max_buffer_size, 5000);
        assert!(merged.persist_snapshots);
    }

    #[test]
    fn config_defaults_match_constants() {
        let cfg = ConfigOptions::default();
        assert_eq!(cfg.log_prefix, DEFAULT_LOG_PREFIX);
        assert_eq!(cfg.log_retention_days, DEFAULT_RETENTION_DAYS);
    }

    #[test]
    fn config_deserializes_with_missing_fields() {
        // Older stored rows may predate bufferedOptions; serde(default) fills them in.
        let cfg: ConfigOptions = serde_json::from_str(r#"{"log_prefix":"[X]"}"#).unwrap();
        assert_eq!(cfg.log_prefix, "[X]");
        assert_eq!(cfg.log_retention_days, DEFAULT_RETENTION_DAYS);
        assert_eq!(cfg.buffered_options, BufferedOptions::default());
    }
}
