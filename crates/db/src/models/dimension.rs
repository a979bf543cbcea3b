//! Dimension table entity models (curral, dieta, trateiro).

use serde::Serialize;
use sqlx::FromRow;

use cocho_core::types::{DbId, Timestamp};

/// A row from the `currais` table (pens).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Curral {
    pub id: DbId,
    pub organization_id: DbId,
    /// Natural key within the organization.
    pub code: String,
    pub name: Option<String>,
    pub created_at: Timestamp,
}

/// A row from the `dietas` table (diets).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Dieta {
    pub id: DbId,
    pub organization_id: DbId,
    /// Natural key within the organization.
    pub name: String,
    pub created_at: Timestamp,
}

/// A row from the `trateiros` table (feed handlers).
///
/// Handlers are auto-created on first sight; `auto_created` marks rows
/// the resolver created versus operator-managed ones.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Trateiro {
    pub id: DbId,
    pub organization_id: DbId,
    /// Natural key within the organization.
    pub name: String,
    pub auto_created: bool,
    pub created_at: Timestamp,
}
