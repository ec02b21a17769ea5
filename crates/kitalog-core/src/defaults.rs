// ABOUTME: Built-in defaults and fixed storage names shared across all kitalog crates.
// ABOUTME: Changing these changes the on-disk layout; new values must stay backward compatible.

/// Prefix stamped on every entry when no configuration has been stored.
pub const DEFAULT_LOG_PREFIX: &str = "[KITALOG]";

/// Days an entry survives before a retention sweep removes it.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Milliseconds in one day, used for retention cutoff arithmetic.
pub const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Fixed key of the single configuration row.
pub const CONFIG_KEY: &str = "current";

/// File name of the embedded database inside a kitalog data directory.
pub const DB_FILE: &str = "kitalog.db";

/// File name of the fallback snapshot slot inside a kitalog data directory.
pub const SNAPSHOT_FILE: &str = "pending_logs.json";
