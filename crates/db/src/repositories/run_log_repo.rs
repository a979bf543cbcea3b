//! Repository for the append-only `run_log_entries` table.

use sqlx::PgPool;

use cocho_core::types::{DbId, Timestamp};

use crate::models::run_log::{NewRunLogEntry, RunLogEntry};
use crate::repositories::{clamp_limit, clamp_offset};

/// Column list for `run_log_entries` queries.
const COLUMNS: &str = "\
    id, run_id, file_id, organization_id, level, category, message, \
    metadata, created_at";

/// Append and query operations for the run log. There is deliberately
/// no update or delete — the table is an audit trail.
pub struct RunLogRepo;

impl RunLogRepo {
    /// Append one entry.
    pub async fn append(pool: &PgPool, entry: &NewRunLogEntry) -> Result<RunLogEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO run_log_entries \
                (run_id, file_id, organization_id, level, category, message, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RunLogEntry>(&query)
            .bind(entry.run_id)
            .bind(entry.file_id)
            .bind(entry.organization_id)
            .bind(&entry.level)
            .bind(&entry.category)
            .bind(&entry.message)
            .bind(&entry.metadata)
            .fetch_one(pool)
            .await
    }

    /// List entries for a file, newest first.
    pub async fn list_by_file(
        pool: &PgPool,
        file_id: DbId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<RunLogEntry>, sqlx::Error> {
        let limit = clamp_limit(limit);
        let offset = clamp_offset(offset);
        let query = format!(
            "SELECT {COLUMNS} FROM run_log_entries \
             WHERE file_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, RunLogEntry>(&query)
            .bind(file_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Count error-level entries for an organization since `since`,
    /// feeding the hourly-spike alert.
    pub async fn count_errors_since(
        pool: &PgPool,
        organization_id: DbId,
        since: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM run_log_entries \
             WHERE organization_id = $1 AND level = 'error' AND created_at >= $2",
        )
        .bind(organization_id)
        .bind(since)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
