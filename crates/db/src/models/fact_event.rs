//! Fact table entity models.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::FromRow;

use cocho_core::types::{DbId, Timestamp};

/// A row from the `fact_feed_events` table.
///
/// Both pipelines land here, discriminated by `pipeline`; measure
/// columns not used by a pipeline stay NULL. The row is re-derivable
/// from the source CSV, which is what makes reprocessing idempotent.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FactEvent {
    pub id: DbId,
    pub organization_id: DbId,
    /// Deterministic key; unique per `(organization_id, natural_key)`.
    pub natural_key: String,
    /// `"desvio"` or `"trato"`.
    pub pipeline: String,
    /// File whose most recent processing wrote this row.
    pub source_file_id: DbId,
    pub event_date: NaiveDate,
    pub shift: String,
    pub curral_id: Option<DbId>,
    pub dieta_id: Option<DbId>,
    pub trateiro_id: DbId,
    pub planned_kg: Option<f64>,
    pub delivered_kg: Option<f64>,
    pub deviation_pct: Option<f64>,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting or updating a fact row. The salient fields — the
/// ones the upsert engine diffs — are everything except the key and the
/// source file id.
#[derive(Debug, Clone)]
pub struct NewFactEvent {
    pub organization_id: DbId,
    pub natural_key: String,
    pub pipeline: String,
    pub source_file_id: DbId,
    pub event_date: NaiveDate,
    pub shift: String,
    pub curral_id: Option<DbId>,
    pub dieta_id: Option<DbId>,
    pub trateiro_id: DbId,
    pub planned_kg: Option<f64>,
    pub delivered_kg: Option<f64>,
    pub deviation_pct: Option<f64>,
    pub notes: Option<String>,
}

impl FactEvent {
    /// Whether the stored row differs from `candidate` in any salient
    /// field (measures, dimension ids, free-text notes).
    pub fn differs_from(&self, candidate: &NewFactEvent) -> bool {
        self.curral_id != candidate.curral_id
            || self.dieta_id != candidate.dieta_id
            || self.trateiro_id != candidate.trateiro_id
            || self.planned_kg != candidate.planned_kg
            || self.delivered_kg != candidate.delivered_kg
            || self.deviation_pct != candidate.deviation_pct
            || self.notes != candidate.notes
    }
}
