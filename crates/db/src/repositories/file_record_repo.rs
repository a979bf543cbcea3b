//! Repository for the `source_files` table.
//!
//! Status transitions are conditional updates guarded by the expected
//! current status, so a worker racing on a stale read loses the update
//! instead of silently overwriting another worker's transition.

use sqlx::PgPool;

use cocho_core::types::{DbId, Timestamp};

use crate::models::source_file::{CreateSourceFile, SourceFile};
use crate::models::status::{FileStatus, StatusId};

/// Column list for `source_files` queries.
const COLUMNS: &str = "\
    id, organization_id, file_name, storage_path, pipeline, status_id, \
    retry_count, next_retry_at, last_error, created_at, updated_at";

/// Provides CRUD operations and guarded transitions for uploaded files.
pub struct FileRecordRepo;

impl FileRecordRepo {
    /// Register a newly uploaded file in `Uploaded` status.
    pub async fn create(
        pool: &PgPool,
        input: &CreateSourceFile,
    ) -> Result<SourceFile, sqlx::Error> {
        let query = format!(
            "INSERT INTO source_files (organization_id, file_name, storage_path, pipeline, status_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SourceFile>(&query)
            .bind(input.organization_id)
            .bind(&input.file_name)
            .bind(&input.storage_path)
            .bind(&input.pipeline)
            .bind(FileStatus::Uploaded.id())
            .fetch_one(pool)
            .await
    }

    /// Find a file by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<SourceFile>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM source_files WHERE id = $1");
        sqlx::query_as::<_, SourceFile>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim the next uploaded file for processing, moving it
    /// straight to `Parsing`.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers never
    /// double-claim the same file.
    pub async fn claim_next_uploaded(pool: &PgPool) -> Result<Option<SourceFile>, sqlx::Error> {
        let query = format!(
            "UPDATE source_files \
             SET status_id = $1, updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM source_files \
                 WHERE status_id = $2 \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SourceFile>(&query)
            .bind(FileStatus::Parsing.id())
            .bind(FileStatus::Uploaded.id())
            .fetch_optional(pool)
            .await
    }

    /// Apply a status transition guarded by the expected current status.
    ///
    /// Returns `None` when the stored status no longer matches
    /// `from_status` — the caller maps that to `InvalidTransition`.
    /// The stored row is untouched in that case.
    pub async fn transition_status(
        pool: &PgPool,
        id: DbId,
        from_status: StatusId,
        to_status: StatusId,
    ) -> Result<Option<SourceFile>, sqlx::Error> {
        let query = format!(
            "UPDATE source_files \
             SET status_id = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SourceFile>(&query)
            .bind(id)
            .bind(from_status)
            .bind(to_status)
            .fetch_optional(pool)
            .await
    }

    /// Persist retry bookkeeping for a file. Written only by the retry
    /// executor.
    pub async fn update_retry_state(
        pool: &PgPool,
        id: DbId,
        retry_count: i32,
        next_retry_at: Option<Timestamp>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE source_files \
             SET retry_count = $2, next_retry_at = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(retry_count)
        .bind(next_retry_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record the most recent error message for a file.
    pub async fn set_last_error(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE source_files SET last_error = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Files stuck in a non-terminal status since before `cutoff` —
    /// processing started and never finished.
    pub async fn list_stale(
        pool: &PgPool,
        organization_id: DbId,
        cutoff: Timestamp,
    ) -> Result<Vec<SourceFile>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM source_files \
             WHERE organization_id = $1 \
               AND status_id NOT IN ($2, $3) \
               AND updated_at < $4 \
             ORDER BY updated_at ASC"
        );
        sqlx::query_as::<_, SourceFile>(&query)
            .bind(organization_id)
            .bind(FileStatus::Loaded.id())
            .bind(FileStatus::Failed.id())
            .bind(cutoff)
            .fetch_all(pool)
            .await
    }

    /// Count files currently holding a non-zero retry count.
    pub async fn count_active_retries(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM source_files \
             WHERE organization_id = $1 AND retry_count > 0",
        )
        .bind(organization_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// Totals for success-rate statistics: `(terminal, loaded, retried_sum)`.
    pub async fn terminal_counts(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<(i64, i64, i64), sqlx::Error> {
        let (terminal, loaded, retried_sum): (i64, i64, i64) = sqlx::query_as(
            "SELECT \
                 COUNT(*) FILTER (WHERE status_id IN ($2, $3)), \
                 COUNT(*) FILTER (WHERE status_id = $2), \
                 COALESCE(SUM(retry_count), 0) \
             FROM source_files WHERE organization_id = $1",
        )
        .bind(organization_id)
        .bind(FileStatus::Loaded.id())
        .bind(FileStatus::Failed.id())
        .fetch_one(pool)
        .await?;
        Ok((terminal, loaded, retried_sum))
    }

    /// Wall-clock processing durations in seconds for loaded files, oldest
    /// first. Feeds the percentile statistics.
    pub async fn loaded_durations_secs(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<Vec<f64>, sqlx::Error> {
        let rows: Vec<(f64,)> = sqlx::query_as(
            "SELECT EXTRACT(EPOCH FROM updated_at - created_at)::DOUBLE PRECISION \
             FROM source_files \
             WHERE organization_id = $1 AND status_id = $2 \
             ORDER BY created_at ASC",
        )
        .bind(organization_id)
        .bind(FileStatus::Loaded.id())
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(secs,)| secs).collect())
    }
}
