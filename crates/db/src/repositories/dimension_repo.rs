//! Repository for the dimension tables (`currais`, `dietas`, `trateiros`).
//!
//! Lookups are case-insensitive on the natural key; trateiros support
//! find-or-create because handler identity never blocks loading.

use sqlx::PgPool;

use cocho_core::types::DbId;

use crate::models::dimension::{Curral, Dieta, Trateiro};

const CURRAL_COLUMNS: &str = "id, organization_id, code, name, created_at";
const DIETA_COLUMNS: &str = "id, organization_id, name, created_at";
const TRATEIRO_COLUMNS: &str = "id, organization_id, name, auto_created, created_at";

/// Lookup and find-or-create operations for dimension rows.
pub struct DimensionRepo;

impl DimensionRepo {
    /// Find a pen by its code within an organization.
    pub async fn find_curral_by_code(
        pool: &PgPool,
        organization_id: DbId,
        code: &str,
    ) -> Result<Option<Curral>, sqlx::Error> {
        let query = format!(
            "SELECT {CURRAL_COLUMNS} FROM currais \
             WHERE organization_id = $1 AND LOWER(code) = LOWER($2)"
        );
        sqlx::query_as::<_, Curral>(&query)
            .bind(organization_id)
            .bind(code.trim())
            .fetch_optional(pool)
            .await
    }

    /// Find a diet by its name within an organization.
    pub async fn find_dieta_by_name(
        pool: &PgPool,
        organization_id: DbId,
        name: &str,
    ) -> Result<Option<Dieta>, sqlx::Error> {
        let query = format!(
            "SELECT {DIETA_COLUMNS} FROM dietas \
             WHERE organization_id = $1 AND LOWER(name) = LOWER($2)"
        );
        sqlx::query_as::<_, Dieta>(&query)
            .bind(organization_id)
            .bind(name.trim())
            .fetch_optional(pool)
            .await
    }

    /// Find a handler by name, creating it when absent.
    ///
    /// The upsert races safely: `ON CONFLICT DO UPDATE` on the
    /// case-folded unique index always returns the surviving row.
    pub async fn find_or_create_trateiro(
        pool: &PgPool,
        organization_id: DbId,
        name: &str,
    ) -> Result<Trateiro, sqlx::Error> {
        let query = format!(
            "INSERT INTO trateiros (organization_id, name, auto_created) \
             VALUES ($1, $2, TRUE) \
             ON CONFLICT (organization_id, LOWER(name)) \
             DO UPDATE SET name = trateiros.name \
             RETURNING {TRATEIRO_COLUMNS}"
        );
        sqlx::query_as::<_, Trateiro>(&query)
            .bind(organization_id)
            .bind(name.trim())
            .fetch_one(pool)
            .await
    }

    /// All handler names in an organization, for duplicate-name
    /// heuristics.
    pub async fn list_trateiro_names(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM trateiros WHERE organization_id = $1 ORDER BY name ASC",
        )
        .bind(organization_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}
