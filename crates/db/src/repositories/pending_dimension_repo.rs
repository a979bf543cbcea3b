//! Repository for the `pending_dimensions` table.
//!
//! Creation deduplicates per `(organization_id, dimension, code)` while
//! an entry is unresolved, via a partial unique index and
//! `ON CONFLICT DO NOTHING`. Resolution and rejection are conditional
//! updates on the pending status, enforcing the
//! pending -> resolved | rejected exactly-once transition.

use sqlx::PgPool;

use cocho_core::types::DbId;

use crate::models::pending_dimension::PendingDimension;
use crate::models::status::PendingStatus;
use crate::repositories::{clamp_limit, clamp_offset};

/// Column list for `pending_dimensions` queries.
const COLUMNS: &str = "\
    id, organization_id, dimension, code, status_id, resolved_dimension_id, \
    source_file_id, created_at, resolved_at";

/// CRUD and operator-resolution operations for pending dimension codes.
pub struct PendingDimensionRepo;

impl PendingDimensionRepo {
    /// Create a pending entry for an unknown code, or return the
    /// existing unresolved entry for the same `(org, dimension, code)`.
    pub async fn create_or_get(
        pool: &PgPool,
        organization_id: DbId,
        dimension: &str,
        code: &str,
        source_file_id: Option<DbId>,
    ) -> Result<PendingDimension, sqlx::Error> {
        let insert = format!(
            "INSERT INTO pending_dimensions \
                (organization_id, dimension, code, status_id, source_file_id) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (organization_id, dimension, code) WHERE resolved_at IS NULL \
             DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, PendingDimension>(&insert)
            .bind(organization_id)
            .bind(dimension)
            .bind(code)
            .bind(PendingStatus::Pending.id())
            .bind(source_file_id)
            .fetch_optional(pool)
            .await?;
        if let Some(entry) = inserted {
            return Ok(entry);
        }

        // Lost the conflict: fetch the existing unresolved entry.
        let select = format!(
            "SELECT {COLUMNS} FROM pending_dimensions \
             WHERE organization_id = $1 AND dimension = $2 AND code = $3 AND status_id = $4"
        );
        sqlx::query_as::<_, PendingDimension>(&select)
            .bind(organization_id)
            .bind(dimension)
            .bind(code)
            .bind(PendingStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// List unresolved entries for an organization, oldest first.
    pub async fn list_pending(
        pool: &PgPool,
        organization_id: DbId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<PendingDimension>, sqlx::Error> {
        let limit = clamp_limit(limit);
        let offset = clamp_offset(offset);
        let query = format!(
            "SELECT {COLUMNS} FROM pending_dimensions \
             WHERE organization_id = $1 AND status_id = $2 \
             ORDER BY created_at ASC, id ASC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, PendingDimension>(&query)
            .bind(organization_id)
            .bind(PendingStatus::Pending.id())
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Resolve a pending entry to an existing dimension row. Conditional
    /// on the entry still being pending; returns `None` otherwise.
    ///
    /// Backfilling dependent fact rows is the caller's concern — the
    /// documented path is re-running the source file, which re-resolves
    /// and upserts the previously pending rows.
    pub async fn resolve(
        pool: &PgPool,
        id: DbId,
        resolved_dimension_id: DbId,
    ) -> Result<Option<PendingDimension>, sqlx::Error> {
        let query = format!(
            "UPDATE pending_dimensions \
             SET status_id = $2, resolved_dimension_id = $3, resolved_at = NOW() \
             WHERE id = $1 AND status_id = $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PendingDimension>(&query)
            .bind(id)
            .bind(PendingStatus::Resolved.id())
            .bind(resolved_dimension_id)
            .bind(PendingStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Reject a pending entry (the code is noise, not a real dimension).
    /// Conditional on the entry still being pending.
    pub async fn reject(pool: &PgPool, id: DbId) -> Result<Option<PendingDimension>, sqlx::Error> {
        let query = format!(
            "UPDATE pending_dimensions \
             SET status_id = $2, resolved_at = NOW() \
             WHERE id = $1 AND status_id = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PendingDimension>(&query)
            .bind(id)
            .bind(PendingStatus::Rejected.id())
            .bind(PendingStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }
}
