//! Source file entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use cocho_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `source_files` table — one uploaded CSV export.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SourceFile {
    pub id: DbId,
    pub organization_id: DbId,
    pub file_name: String,
    /// Path in the injected file storage (not necessarily a local path).
    pub storage_path: String,
    /// `"desvio"` or `"trato"`.
    pub pipeline: String,
    pub status_id: StatusId,
    /// Persisted retry bookkeeping; written only by the retry executor.
    pub retry_count: i32,
    pub next_retry_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering a newly uploaded file.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSourceFile {
    pub organization_id: DbId,
    pub file_name: String,
    pub storage_path: String,
    pub pipeline: String,
}
