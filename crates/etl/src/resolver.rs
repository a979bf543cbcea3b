//! Dimension resolution for validated rows.
//!
//! Currais and dietas are reference data and never auto-created: an
//! unknown code becomes a pending placeholder for an operator to
//! resolve. Trateiros are operational data and are created on first
//! sight, with a warning when the new name looks like a typo of an
//! existing one.

use std::sync::Arc;

use cocho_core::heuristics::{curral_code_warnings, duplicate_trateiro_warning};
use cocho_core::types::DbId;
use cocho_db::models::pending_dimension::{DIMENSION_CURRAL, DIMENSION_DIETA};

use crate::error::EtlError;
use crate::ports::CleanRow;
use crate::store::{DimensionStore, PendingDimensionStore};

/// A pending placeholder blocking a row's dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRef {
    pub id: DbId,
    pub dimension: &'static str,
    pub code: String,
}

/// Resolved dimension IDs for one row, plus whatever blocked or looked
/// suspicious along the way.
#[derive(Debug, Clone)]
pub struct ResolvedDimensions {
    pub curral_id: Option<DbId>,
    pub dieta_id: Option<DbId>,
    pub trateiro_id: DbId,
    /// Non-empty means the row cannot be loaded yet.
    pub pending: Vec<PendingRef>,
    pub warnings: Vec<String>,
}

impl ResolvedDimensions {
    pub fn is_blocked(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Resolves row text to dimension IDs.
pub struct DimensionResolver<S> {
    store: Arc<S>,
}

impl<S> DimensionResolver<S>
where
    S: DimensionStore + PendingDimensionStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve every dimension a row references.
    ///
    /// `Ok` with a non-empty `pending` list means the infrastructure
    /// worked but the row is blocked on operator input; `Err` is an
    /// infrastructure failure.
    pub async fn resolve_row(
        &self,
        organization_id: DbId,
        source_file_id: Option<DbId>,
        row: &CleanRow,
    ) -> Result<ResolvedDimensions, EtlError> {
        let mut pending = Vec::new();
        let mut warnings = Vec::new();

        let trateiro_id = self
            .resolve_trateiro(organization_id, &row.trateiro_name, &mut warnings)
            .await?;

        let curral_id = match row.curral_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                // Suspicious codes are flagged even when they resolve;
                // test data that made it into `currais` still deserves
                // an operator's eye.
                warnings.extend(curral_code_warnings(code));
                match self.store.find_curral_id(organization_id, code).await? {
                    Some(id) => Some(id),
                    None => {
                        let entry = self
                            .store
                            .pending_create_or_get(
                                organization_id,
                                DIMENSION_CURRAL,
                                code,
                                source_file_id,
                            )
                            .await?;
                        pending.push(PendingRef {
                            id: entry.id,
                            dimension: DIMENSION_CURRAL,
                            code: code.to_string(),
                        });
                        None
                    }
                }
            }
            _ => None,
        };

        let dieta_id = match row.dieta_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => {
                match self.store.find_dieta_id(organization_id, name).await? {
                    Some(id) => Some(id),
                    None => {
                        let entry = self
                            .store
                            .pending_create_or_get(
                                organization_id,
                                DIMENSION_DIETA,
                                name,
                                source_file_id,
                            )
                            .await?;
                        pending.push(PendingRef {
                            id: entry.id,
                            dimension: DIMENSION_DIETA,
                            code: name.to_string(),
                        });
                        None
                    }
                }
            }
            // A row without a diet is valid; some exports omit it.
            _ => None,
        };

        Ok(ResolvedDimensions {
            curral_id,
            dieta_id,
            trateiro_id,
            pending,
            warnings,
        })
    }

    async fn resolve_trateiro(
        &self,
        organization_id: DbId,
        name: &str,
        warnings: &mut Vec<String>,
    ) -> Result<DbId, EtlError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EtlError::Validation(
                "trateiro name is required for dimension resolution".to_string(),
            ));
        }

        let existing = self.store.list_trateiro_names(organization_id).await?;
        if let Some(warning) = duplicate_trateiro_warning(name, &existing) {
            warnings.push(warning);
        }

        Ok(self.store.find_or_create_trateiro(organization_id, name).await?)
    }
}
