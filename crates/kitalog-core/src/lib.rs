// ABOUTME: Core library for kitalog, containing the shared data model and defaults.
// ABOUTME: These types flow between the sqlite store, the snapshot slot, and the buffered logger.

pub mod defaults;
pub mod types;

pub use types::{
    BufferedOptions, BufferedOptionsPatch, ConfigOptions, LogDraft, LogEntry, LogLevel,
    ParseLevelError,
};
