//! Append-only run log entity models.

use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use cocho_core::types::{DbId, Timestamp};

/// A row from the append-only `run_log_entries` table.
///
/// Entries are never mutated or deleted by this system; pruning is an
/// external maintenance concern.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RunLogEntry {
    pub id: DbId,
    /// Groups all entries of one processing run of one file.
    pub run_id: Uuid,
    pub file_id: DbId,
    pub organization_id: DbId,
    /// `info` | `warn` | `error` (see `cocho_core::run_log`).
    pub level: String,
    /// e.g. `STATE_TRANSITION`, `RETRY`, `DEAD_LETTER`.
    pub category: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}

/// DTO for appending a run log entry.
#[derive(Debug, Clone)]
pub struct NewRunLogEntry {
    pub run_id: Uuid,
    pub file_id: DbId,
    pub organization_id: DbId,
    pub level: String,
    pub category: String,
    pub message: String,
    pub metadata: serde_json::Value,
}
