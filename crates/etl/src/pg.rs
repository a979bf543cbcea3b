//! Postgres implementation of the store ports, delegating to the
//! `cocho-db` repositories.

use async_trait::async_trait;
use sqlx::PgPool;

use cocho_core::types::{DbId, Timestamp};
use cocho_db::models::dead_letter::{CreateDeadLetterEntry, DeadLetterEntry, ErrorTypeCount};
use cocho_db::models::fact_event::{FactEvent, NewFactEvent};
use cocho_db::models::pending_dimension::PendingDimension;
use cocho_db::models::run_log::{NewRunLogEntry, RunLogEntry};
use cocho_db::models::source_file::SourceFile;
use cocho_db::models::status::StatusId;
use cocho_db::repositories::dead_letter_repo::DeadLetterRepo;
use cocho_db::repositories::dimension_repo::DimensionRepo;
use cocho_db::repositories::fact_event_repo::FactEventRepo;
use cocho_db::repositories::file_record_repo::FileRecordRepo;
use cocho_db::repositories::pending_dimension_repo::PendingDimensionRepo;
use cocho_db::repositories::run_log_repo::RunLogRepo;

use crate::error::StoreError;
use crate::store::{
    DeadLetterStore, DimensionStore, FactStore, FileRecordStore, PendingDimensionStore,
    RetryStateStore, RunLogStore,
};

/// Entity type whose retry bookkeeping lives on `source_files`.
pub const ENTITY_SOURCE_FILE: &str = "source_file";

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn require_file_entity(entity_type: &str) -> Result<(), StoreError> {
        if entity_type == ENTITY_SOURCE_FILE {
            Ok(())
        } else {
            Err(StoreError::Database(format!(
                "no retry bookkeeping table for entity type '{entity_type}'"
            )))
        }
    }
}

#[async_trait]
impl FileRecordStore for PgStore {
    async fn find_file(&self, id: DbId) -> Result<Option<SourceFile>, StoreError> {
        Ok(FileRecordRepo::find_by_id(&self.pool, id).await?)
    }

    async fn transition_status(
        &self,
        id: DbId,
        from: StatusId,
        to: StatusId,
    ) -> Result<Option<SourceFile>, StoreError> {
        Ok(FileRecordRepo::transition_status(&self.pool, id, from, to).await?)
    }

    async fn set_last_error(&self, id: DbId, error: &str) -> Result<(), StoreError> {
        Ok(FileRecordRepo::set_last_error(&self.pool, id, error).await?)
    }

    async fn list_stale(
        &self,
        organization_id: DbId,
        cutoff: Timestamp,
    ) -> Result<Vec<SourceFile>, StoreError> {
        Ok(FileRecordRepo::list_stale(&self.pool, organization_id, cutoff).await?)
    }

    async fn count_active_retries(&self, organization_id: DbId) -> Result<i64, StoreError> {
        Ok(FileRecordRepo::count_active_retries(&self.pool, organization_id).await?)
    }

    async fn terminal_counts(&self, organization_id: DbId) -> Result<(i64, i64, i64), StoreError> {
        Ok(FileRecordRepo::terminal_counts(&self.pool, organization_id).await?)
    }

    async fn loaded_durations_secs(&self, organization_id: DbId) -> Result<Vec<f64>, StoreError> {
        Ok(FileRecordRepo::loaded_durations_secs(&self.pool, organization_id).await?)
    }
}

#[async_trait]
impl RunLogStore for PgStore {
    async fn append_log(&self, entry: NewRunLogEntry) -> Result<(), StoreError> {
        RunLogRepo::append(&self.pool, &entry).await?;
        Ok(())
    }

    async fn list_log_by_file(
        &self,
        file_id: DbId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<RunLogEntry>, StoreError> {
        Ok(RunLogRepo::list_by_file(&self.pool, file_id, limit, offset).await?)
    }

    async fn count_errors_since(
        &self,
        organization_id: DbId,
        since: Timestamp,
    ) -> Result<i64, StoreError> {
        Ok(RunLogRepo::count_errors_since(&self.pool, organization_id, since).await?)
    }
}

#[async_trait]
impl RetryStateStore for PgStore {
    async fn get_retry_count(
        &self,
        entity_type: &str,
        entity_id: DbId,
    ) -> Result<i32, StoreError> {
        Self::require_file_entity(entity_type)?;
        let file = FileRecordRepo::find_by_id(&self.pool, entity_id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "source_file",
                id: entity_id,
            })?;
        Ok(file.retry_count)
    }

    async fn set_retry_state(
        &self,
        entity_type: &str,
        entity_id: DbId,
        retry_count: i32,
        next_retry_at: Option<Timestamp>,
    ) -> Result<(), StoreError> {
        Self::require_file_entity(entity_type)?;
        Ok(FileRecordRepo::update_retry_state(&self.pool, entity_id, retry_count, next_retry_at)
            .await?)
    }

    async fn reset_retry_state(
        &self,
        entity_type: &str,
        entity_id: DbId,
    ) -> Result<(), StoreError> {
        Self::require_file_entity(entity_type)?;
        Ok(FileRecordRepo::update_retry_state(&self.pool, entity_id, 0, None).await?)
    }
}

#[async_trait]
impl DeadLetterStore for PgStore {
    async fn create_dead_letter(
        &self,
        input: CreateDeadLetterEntry,
    ) -> Result<DeadLetterEntry, StoreError> {
        Ok(DeadLetterRepo::create(&self.pool, &input).await?)
    }

    async fn count_unresolved(&self, organization_id: DbId) -> Result<i64, StoreError> {
        Ok(DeadLetterRepo::count_unresolved(&self.pool, organization_id).await?)
    }

    async fn counts_by_error_type(
        &self,
        organization_id: DbId,
    ) -> Result<Vec<ErrorTypeCount>, StoreError> {
        Ok(DeadLetterRepo::counts_by_error_type(&self.pool, organization_id).await?)
    }

    async fn list_unresolved(
        &self,
        organization_id: DbId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<DeadLetterEntry>, StoreError> {
        Ok(DeadLetterRepo::list_unresolved(&self.pool, organization_id, limit, offset).await?)
    }
}

#[async_trait]
impl DimensionStore for PgStore {
    async fn find_curral_id(
        &self,
        organization_id: DbId,
        code: &str,
    ) -> Result<Option<DbId>, StoreError> {
        Ok(DimensionRepo::find_curral_by_code(&self.pool, organization_id, code)
            .await?
            .map(|c| c.id))
    }

    async fn find_dieta_id(
        &self,
        organization_id: DbId,
        name: &str,
    ) -> Result<Option<DbId>, StoreError> {
        Ok(DimensionRepo::find_dieta_by_name(&self.pool, organization_id, name)
            .await?
            .map(|d| d.id))
    }

    async fn find_or_create_trateiro(
        &self,
        organization_id: DbId,
        name: &str,
    ) -> Result<DbId, StoreError> {
        Ok(DimensionRepo::find_or_create_trateiro(&self.pool, organization_id, name)
            .await?
            .id)
    }

    async fn list_trateiro_names(&self, organization_id: DbId) -> Result<Vec<String>, StoreError> {
        Ok(DimensionRepo::list_trateiro_names(&self.pool, organization_id).await?)
    }
}

#[async_trait]
impl PendingDimensionStore for PgStore {
    async fn pending_create_or_get(
        &self,
        organization_id: DbId,
        dimension: &str,
        code: &str,
        source_file_id: Option<DbId>,
    ) -> Result<PendingDimension, StoreError> {
        Ok(PendingDimensionRepo::create_or_get(
            &self.pool,
            organization_id,
            dimension,
            code,
            source_file_id,
        )
        .await?)
    }
}

#[async_trait]
impl FactStore for PgStore {
    async fn find_fact_by_natural_key(
        &self,
        organization_id: DbId,
        natural_key: &str,
    ) -> Result<Option<FactEvent>, StoreError> {
        Ok(FactEventRepo::find_by_natural_key(&self.pool, organization_id, natural_key).await?)
    }

    async fn insert_fact(&self, input: NewFactEvent) -> Result<FactEvent, StoreError> {
        Ok(FactEventRepo::insert(&self.pool, &input).await?)
    }

    async fn update_fact(&self, id: DbId, input: NewFactEvent) -> Result<FactEvent, StoreError> {
        Ok(FactEventRepo::update(&self.pool, id, &input).await?)
    }
}
