//! Pending dimension-code entity models.

use serde::Serialize;
use sqlx::FromRow;

use cocho_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// Dimension discriminator values stored in `pending_dimensions.dimension`.
pub const DIMENSION_CURRAL: &str = "curral";
pub const DIMENSION_DIETA: &str = "dieta";

/// A row from the `pending_dimensions` table — a code the resolver
/// could not match against a dimension table. Dependent fact rows wait
/// on resolution instead of failing.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PendingDimension {
    pub id: DbId,
    pub organization_id: DbId,
    /// `"curral"` or `"dieta"`. Trateiros never go pending.
    pub dimension: String,
    /// The unresolved free-text code as it appeared in the source file.
    pub code: String,
    pub status_id: StatusId,
    /// The dimension row an operator mapped this code to, once resolved.
    pub resolved_dimension_id: Option<DbId>,
    /// File that first produced this code, for operator context.
    pub source_file_id: Option<DbId>,
    pub created_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}
