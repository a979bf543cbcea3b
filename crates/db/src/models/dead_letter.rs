//! Dead-letter queue entity models.

use serde::Serialize;
use sqlx::FromRow;

use cocho_core::types::{DbId, Timestamp};

/// A row from the `dead_letter_entries` table — an entity that
/// exhausted its retry budget and awaits operator resolution.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DeadLetterEntry {
    pub id: DbId,
    /// What kind of entity failed (e.g. `"source_file"`).
    pub entity_type: String,
    pub entity_id: DbId,
    pub organization_id: DbId,
    /// Classified error kind at enqueue time; operators may override it.
    pub error_type: String,
    pub error_message: String,
    pub total_retries: i32,
    pub resolved: bool,
    pub resolved_by: Option<DbId>,
    pub resolution_notes: Option<String>,
    pub created_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

/// DTO for enqueuing a dead-letter entry.
#[derive(Debug, Clone)]
pub struct CreateDeadLetterEntry {
    pub entity_type: String,
    pub entity_id: DbId,
    pub organization_id: DbId,
    pub error_type: String,
    pub error_message: String,
    pub total_retries: i32,
}

/// Unresolved-entry count per classified error kind.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ErrorTypeCount {
    pub error_type: String,
    pub count: i64,
}
