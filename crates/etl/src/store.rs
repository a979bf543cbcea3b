//! Store ports: the persistence seams of the engine.
//!
//! Production code runs these against Postgres via [`crate::pg::PgStore`];
//! tests run them against [`crate::testing::MemStore`]. The engine's
//! services are generic over the subset of ports they need, so each
//! component's write surface is visible in its bounds.

use async_trait::async_trait;

use cocho_core::types::{DbId, Timestamp};
use cocho_db::models::dead_letter::{CreateDeadLetterEntry, DeadLetterEntry, ErrorTypeCount};
use cocho_db::models::fact_event::{FactEvent, NewFactEvent};
use cocho_db::models::pending_dimension::PendingDimension;
use cocho_db::models::run_log::{NewRunLogEntry, RunLogEntry};
use cocho_db::models::source_file::SourceFile;
use cocho_db::models::status::StatusId;

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// File records
// ---------------------------------------------------------------------------

/// Reads and guarded writes on uploaded-file records.
#[async_trait]
pub trait FileRecordStore: Send + Sync {
    async fn find_file(&self, id: DbId) -> Result<Option<SourceFile>, StoreError>;

    /// Guarded status transition; `None` means the stored status did not
    /// match `from` and nothing was written.
    async fn transition_status(
        &self,
        id: DbId,
        from: StatusId,
        to: StatusId,
    ) -> Result<Option<SourceFile>, StoreError>;

    async fn set_last_error(&self, id: DbId, error: &str) -> Result<(), StoreError>;

    async fn list_stale(
        &self,
        organization_id: DbId,
        cutoff: Timestamp,
    ) -> Result<Vec<SourceFile>, StoreError>;

    async fn count_active_retries(&self, organization_id: DbId) -> Result<i64, StoreError>;

    /// `(terminal, loaded, retry_count_sum)` for statistics.
    async fn terminal_counts(&self, organization_id: DbId) -> Result<(i64, i64, i64), StoreError>;

    /// Wall-clock processing durations (seconds) of loaded files.
    async fn loaded_durations_secs(&self, organization_id: DbId) -> Result<Vec<f64>, StoreError>;
}

// ---------------------------------------------------------------------------
// Run log
// ---------------------------------------------------------------------------

/// Append-only audit trail.
#[async_trait]
pub trait RunLogStore: Send + Sync {
    async fn append_log(&self, entry: NewRunLogEntry) -> Result<(), StoreError>;

    async fn list_log_by_file(
        &self,
        file_id: DbId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<RunLogEntry>, StoreError>;

    async fn count_errors_since(
        &self,
        organization_id: DbId,
        since: Timestamp,
    ) -> Result<i64, StoreError>;
}

// ---------------------------------------------------------------------------
// Retry bookkeeping
// ---------------------------------------------------------------------------

/// Persisted per-entity retry counters. The retry executor is the only
/// writer, which prevents double counting across concurrent callers.
#[async_trait]
pub trait RetryStateStore: Send + Sync {
    async fn get_retry_count(&self, entity_type: &str, entity_id: DbId)
        -> Result<i32, StoreError>;

    async fn set_retry_state(
        &self,
        entity_type: &str,
        entity_id: DbId,
        retry_count: i32,
        next_retry_at: Option<Timestamp>,
    ) -> Result<(), StoreError>;

    async fn reset_retry_state(&self, entity_type: &str, entity_id: DbId)
        -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Dead letters
// ---------------------------------------------------------------------------

/// Durable record of entities that exhausted their retry budget.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn create_dead_letter(
        &self,
        input: CreateDeadLetterEntry,
    ) -> Result<DeadLetterEntry, StoreError>;

    async fn count_unresolved(&self, organization_id: DbId) -> Result<i64, StoreError>;

    async fn counts_by_error_type(
        &self,
        organization_id: DbId,
    ) -> Result<Vec<ErrorTypeCount>, StoreError>;

    async fn list_unresolved(
        &self,
        organization_id: DbId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<DeadLetterEntry>, StoreError>;
}

// ---------------------------------------------------------------------------
// Dimensions
// ---------------------------------------------------------------------------

/// Dimension lookups and handler auto-creation.
#[async_trait]
pub trait DimensionStore: Send + Sync {
    async fn find_curral_id(
        &self,
        organization_id: DbId,
        code: &str,
    ) -> Result<Option<DbId>, StoreError>;

    async fn find_dieta_id(
        &self,
        organization_id: DbId,
        name: &str,
    ) -> Result<Option<DbId>, StoreError>;

    async fn find_or_create_trateiro(
        &self,
        organization_id: DbId,
        name: &str,
    ) -> Result<DbId, StoreError>;

    async fn list_trateiro_names(&self, organization_id: DbId) -> Result<Vec<String>, StoreError>;
}

/// Pending dimension-code placeholders. The dimension resolver is the
/// only creator.
#[async_trait]
pub trait PendingDimensionStore: Send + Sync {
    /// Create the unresolved entry for `(org, dimension, code)`, or
    /// return the existing one.
    async fn pending_create_or_get(
        &self,
        organization_id: DbId,
        dimension: &str,
        code: &str,
        source_file_id: Option<DbId>,
    ) -> Result<PendingDimension, StoreError>;
}

// ---------------------------------------------------------------------------
// Facts
// ---------------------------------------------------------------------------

/// Fact-row reads and writes for the upsert engine.
#[async_trait]
pub trait FactStore: Send + Sync {
    async fn find_fact_by_natural_key(
        &self,
        organization_id: DbId,
        natural_key: &str,
    ) -> Result<Option<FactEvent>, StoreError>;

    async fn insert_fact(&self, input: NewFactEvent) -> Result<FactEvent, StoreError>;

    async fn update_fact(&self, id: DbId, input: NewFactEvent) -> Result<FactEvent, StoreError>;
}

/// Everything the orchestrator needs, as one bound.
pub trait EtlStore:
    FileRecordStore
    + RunLogStore
    + RetryStateStore
    + DeadLetterStore
    + DimensionStore
    + PendingDimensionStore
    + FactStore
{
}

impl<T> EtlStore for T where
    T: FileRecordStore
        + RunLogStore
        + RetryStateStore
        + DeadLetterStore
        + DimensionStore
        + PendingDimensionStore
        + FactStore
{
}
