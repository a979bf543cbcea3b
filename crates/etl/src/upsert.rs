//! Idempotent fact-row upserts keyed by natural key.
//!
//! Reprocessing the same file is a no-op: the recomputed natural key
//! finds the stored row, and a salient-field diff decides between
//! update and skip. Rows blocked by pending dimensions are never
//! written, partially or otherwise.

use std::sync::Arc;

use cocho_core::natural_key::{compute_natural_key, FactIdentity};
use cocho_core::types::DbId;
use cocho_db::models::fact_event::NewFactEvent;

use crate::error::EtlError;
use crate::ports::CleanRow;
use crate::resolver::ResolvedDimensions;
use crate::store::FactStore;

/// What the upsert engine did with one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Inserted,
    Updated,
    /// Stored row already matches on every salient field.
    Skipped,
    /// Blocked by unresolved dimension codes; nothing was written.
    Pending,
}

/// Per-row upsert result.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub action: UpsertAction,
    pub natural_key: String,
    /// Fact row id, when one exists after the operation.
    pub record_id: Option<DbId>,
    /// Pending-dimension entry ids blocking the row.
    pub blocking_pending: Vec<DbId>,
}

/// Writes fact rows through [`FactStore`].
pub struct UpsertEngine<S> {
    store: Arc<S>,
}

impl<S> UpsertEngine<S>
where
    S: FactStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Upsert one resolved row into the fact table.
    pub async fn upsert_row(
        &self,
        organization_id: DbId,
        pipeline: &str,
        source_file_id: DbId,
        row: &CleanRow,
        dims: &ResolvedDimensions,
    ) -> Result<UpsertOutcome, EtlError> {
        let natural_key = compute_natural_key(&FactIdentity {
            pipeline,
            event_date: row.event_date,
            shift: &row.shift,
            trateiro_name: &row.trateiro_name,
            curral_code: row.curral_code.as_deref(),
        });

        if dims.is_blocked() {
            return Ok(UpsertOutcome {
                action: UpsertAction::Pending,
                natural_key,
                record_id: None,
                blocking_pending: dims.pending.iter().map(|p| p.id).collect(),
            });
        }

        let candidate = NewFactEvent {
            organization_id,
            natural_key: natural_key.clone(),
            pipeline: pipeline.to_string(),
            source_file_id,
            event_date: row.event_date,
            shift: row.shift.clone(),
            curral_id: dims.curral_id,
            dieta_id: dims.dieta_id,
            trateiro_id: dims.trateiro_id,
            planned_kg: row.planned_kg,
            delivered_kg: row.delivered_kg,
            deviation_pct: row.deviation_pct,
            notes: row.notes.clone(),
        };

        let outcome = match self
            .store
            .find_fact_by_natural_key(organization_id, &natural_key)
            .await?
        {
            Some(existing) if existing.differs_from(&candidate) => {
                let updated = self.store.update_fact(existing.id, candidate).await?;
                UpsertOutcome {
                    action: UpsertAction::Updated,
                    natural_key,
                    record_id: Some(updated.id),
                    blocking_pending: Vec::new(),
                }
            }
            Some(existing) => UpsertOutcome {
                action: UpsertAction::Skipped,
                natural_key,
                record_id: Some(existing.id),
                blocking_pending: Vec::new(),
            },
            None => {
                let inserted = self.store.insert_fact(candidate).await?;
                UpsertOutcome {
                    action: UpsertAction::Inserted,
                    natural_key,
                    record_id: Some(inserted.id),
                    blocking_pending: Vec::new(),
                }
            }
        };
        Ok(outcome)
    }
}
