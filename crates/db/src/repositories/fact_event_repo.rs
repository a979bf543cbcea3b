//! Repository for the `fact_feed_events` table.
//!
//! The upsert engine decides insert vs update vs skip; this repository
//! only executes the chosen write. Uniqueness on
//! `(organization_id, natural_key)` is the database-level backstop for
//! idempotent reprocessing.

use sqlx::PgPool;

use cocho_core::types::DbId;

use crate::models::fact_event::{FactEvent, NewFactEvent};

/// Column list for `fact_feed_events` queries.
const COLUMNS: &str = "\
    id, organization_id, natural_key, pipeline, source_file_id, event_date, \
    shift, curral_id, dieta_id, trateiro_id, planned_kg, delivered_kg, \
    deviation_pct, notes, created_at, updated_at";

/// Read and write operations for fact rows.
pub struct FactEventRepo;

impl FactEventRepo {
    /// Look up an existing fact row by its natural key.
    pub async fn find_by_natural_key(
        pool: &PgPool,
        organization_id: DbId,
        natural_key: &str,
    ) -> Result<Option<FactEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM fact_feed_events \
             WHERE organization_id = $1 AND natural_key = $2"
        );
        sqlx::query_as::<_, FactEvent>(&query)
            .bind(organization_id)
            .bind(natural_key)
            .fetch_optional(pool)
            .await
    }

    /// Insert a new fact row.
    pub async fn insert(pool: &PgPool, input: &NewFactEvent) -> Result<FactEvent, sqlx::Error> {
        let query = format!(
            "INSERT INTO fact_feed_events \
                (organization_id, natural_key, pipeline, source_file_id, event_date, \
                 shift, curral_id, dieta_id, trateiro_id, planned_kg, delivered_kg, \
                 deviation_pct, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FactEvent>(&query)
            .bind(input.organization_id)
            .bind(&input.natural_key)
            .bind(&input.pipeline)
            .bind(input.source_file_id)
            .bind(input.event_date)
            .bind(&input.shift)
            .bind(input.curral_id)
            .bind(input.dieta_id)
            .bind(input.trateiro_id)
            .bind(input.planned_kg)
            .bind(input.delivered_kg)
            .bind(input.deviation_pct)
            .bind(input.notes.as_deref())
            .fetch_one(pool)
            .await
    }

    /// Update an existing fact row in place with the candidate's salient
    /// fields, recording which file produced the newest values.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &NewFactEvent,
    ) -> Result<FactEvent, sqlx::Error> {
        let query = format!(
            "UPDATE fact_feed_events \
             SET source_file_id = $2, curral_id = $3, dieta_id = $4, trateiro_id = $5, \
                 planned_kg = $6, delivered_kg = $7, deviation_pct = $8, notes = $9, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FactEvent>(&query)
            .bind(id)
            .bind(input.source_file_id)
            .bind(input.curral_id)
            .bind(input.dieta_id)
            .bind(input.trateiro_id)
            .bind(input.planned_kg)
            .bind(input.delivered_kg)
            .bind(input.deviation_pct)
            .bind(input.notes.as_deref())
            .fetch_one(pool)
            .await
    }

    /// Count fact rows loaded from a given file.
    pub async fn count_by_source_file(
        pool: &PgPool,
        source_file_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM fact_feed_events WHERE source_file_id = $1",
        )
        .bind(source_file_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
