//! Well-known run-log level and category constants.
//!
//! These must match the values stored in `run_log_entries.level` and
//! `run_log_entries.category`.

pub const LEVEL_INFO: &str = "info";
pub const LEVEL_WARN: &str = "warn";
pub const LEVEL_ERROR: &str = "error";

/// A lifecycle state change was applied.
pub const CATEGORY_STATE_TRANSITION: &str = "STATE_TRANSITION";
/// A retry attempt ran (success or failure).
pub const CATEGORY_RETRY: &str = "RETRY";
/// An entity was handed to the dead-letter queue.
pub const CATEGORY_DEAD_LETTER: &str = "DEAD_LETTER";
/// Row-level processing outcome (resolve + upsert).
pub const CATEGORY_ROW: &str = "ROW";
/// File-level step progress (download, parse, validate, load).
pub const CATEGORY_STEP: &str = "STEP";
