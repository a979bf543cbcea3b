//! Repository for the `dead_letter_entries` table.
//!
//! Resolution is a conditional update on `resolved = FALSE`, so the
//! flag flips exactly once even when two operators race.

use sqlx::PgPool;

use cocho_core::types::DbId;

use crate::models::dead_letter::{CreateDeadLetterEntry, DeadLetterEntry, ErrorTypeCount};
use crate::repositories::{clamp_limit, clamp_offset};

/// Column list for `dead_letter_entries` queries.
const COLUMNS: &str = "\
    id, entity_type, entity_id, organization_id, error_type, error_message, \
    total_retries, resolved, resolved_by, resolution_notes, created_at, resolved_at";

/// CRUD and operator-resolution operations for dead-lettered entities.
pub struct DeadLetterRepo;

impl DeadLetterRepo {
    /// Enqueue a dead-letter entry.
    pub async fn create(
        pool: &PgPool,
        input: &CreateDeadLetterEntry,
    ) -> Result<DeadLetterEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO dead_letter_entries \
                (entity_type, entity_id, organization_id, error_type, error_message, total_retries) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeadLetterEntry>(&query)
            .bind(&input.entity_type)
            .bind(input.entity_id)
            .bind(input.organization_id)
            .bind(&input.error_type)
            .bind(&input.error_message)
            .bind(input.total_retries)
            .fetch_one(pool)
            .await
    }

    /// Find an entry by ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<DeadLetterEntry>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM dead_letter_entries WHERE id = $1");
        sqlx::query_as::<_, DeadLetterEntry>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List unresolved entries for an organization, oldest first.
    pub async fn list_unresolved(
        pool: &PgPool,
        organization_id: DbId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<DeadLetterEntry>, sqlx::Error> {
        let limit = clamp_limit(limit);
        let offset = clamp_offset(offset);
        let query = format!(
            "SELECT {COLUMNS} FROM dead_letter_entries \
             WHERE organization_id = $1 AND resolved = FALSE \
             ORDER BY created_at ASC, id ASC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, DeadLetterEntry>(&query)
            .bind(organization_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Resolve an entry. Conditional on `resolved = FALSE`; returns
    /// `None` when the entry was already resolved (or does not exist).
    pub async fn resolve(
        pool: &PgPool,
        id: DbId,
        resolved_by: DbId,
        notes: Option<&str>,
    ) -> Result<Option<DeadLetterEntry>, sqlx::Error> {
        let query = format!(
            "UPDATE dead_letter_entries \
             SET resolved = TRUE, resolved_by = $2, resolution_notes = $3, resolved_at = NOW() \
             WHERE id = $1 AND resolved = FALSE \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeadLetterEntry>(&query)
            .bind(id)
            .bind(resolved_by)
            .bind(notes)
            .fetch_optional(pool)
            .await
    }

    /// Override the stored error classification of an entry.
    ///
    /// Classification is substring-heuristic at enqueue time; this is
    /// the operator escape hatch for misclassified failures.
    pub async fn reclassify(
        pool: &PgPool,
        id: DbId,
        error_type: &str,
    ) -> Result<Option<DeadLetterEntry>, sqlx::Error> {
        let query = format!(
            "UPDATE dead_letter_entries SET error_type = $2 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeadLetterEntry>(&query)
            .bind(id)
            .bind(error_type)
            .fetch_optional(pool)
            .await
    }

    /// Count unresolved entries for an organization.
    pub async fn count_unresolved(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM dead_letter_entries \
             WHERE organization_id = $1 AND resolved = FALSE",
        )
        .bind(organization_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// Unresolved-entry counts per classified error kind.
    pub async fn counts_by_error_type(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<Vec<ErrorTypeCount>, sqlx::Error> {
        sqlx::query_as::<_, ErrorTypeCount>(
            "SELECT error_type, COUNT(*) AS count FROM dead_letter_entries \
             WHERE organization_id = $1 AND resolved = FALSE \
             GROUP BY error_type \
             ORDER BY count DESC, error_type ASC",
        )
        .bind(organization_id)
        .fetch_all(pool)
        .await
    }
}
