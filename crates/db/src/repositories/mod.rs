pub mod dead_letter_repo;
pub mod dimension_repo;
pub mod fact_event_repo;
pub mod file_record_repo;
pub mod pending_dimension_repo;
pub mod run_log_repo;

/// Default page size for list queries.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Maximum page size for list queries.
pub const MAX_LIST_LIMIT: i64 = 200;

/// Clamp a requested limit into `[1, MAX_LIST_LIMIT]`, defaulting when
/// absent.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// Clamp a requested offset to be non-negative, defaulting to 0.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}
