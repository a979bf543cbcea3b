//! File processing orchestrator.
//!
//! Sequences one uploaded file through parse -> validate -> resolve ->
//! upsert -> finalize, driving the lifecycle state machine with guarded
//! transitions and writing the run log as it goes. Row-level failures
//! are contained to their row; file-level failures move the file to
//! `Failed` with the cause recorded on the record.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use cocho_core::error::CoreError;
use cocho_core::lifecycle::{status_name, validate_transition};
use cocho_core::natural_key::{compute_natural_key, FactIdentity};
use cocho_core::run_log::{
    CATEGORY_DEAD_LETTER, CATEGORY_ROW, CATEGORY_STATE_TRANSITION, CATEGORY_STEP, LEVEL_ERROR,
    LEVEL_INFO, LEVEL_WARN,
};
use cocho_core::types::DbId;
use cocho_db::models::run_log::NewRunLogEntry;
use cocho_db::models::source_file::SourceFile;
use cocho_db::models::status::FileStatus;

use crate::error::EtlError;
use crate::pg::ENTITY_SOURCE_FILE;
use crate::ports::{CleanRow, CsvParser, FileStorage, RowValidator};
use crate::resolver::DimensionResolver;
use crate::retry::{EntityRef, RetryExecutor, RetryResult};
use crate::store::EtlStore;
use crate::upsert::{UpsertAction, UpsertEngine};

/// Rows per load sub-batch. Keeps transactions short on large files.
pub const LOAD_BATCH_SIZE: usize = 100;

/// Row counters for one processing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Rows the parser produced, valid or not.
    pub total: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub pending: usize,
    pub failed: usize,
}

impl ProcessSummary {
    /// Rows that reached the fact table (or matched it unchanged).
    pub fn processed(&self) -> usize {
        self.inserted + self.updated + self.skipped
    }
}

/// Outcome of processing one file.
#[derive(Debug)]
pub struct ProcessFileReport {
    pub run_id: Uuid,
    pub file_id: DbId,
    pub success: bool,
    pub final_status: i16,
    pub summary: ProcessSummary,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Drives one file at a time through the pipeline.
pub struct Orchestrator<S> {
    store: Arc<S>,
    storage: Arc<dyn FileStorage>,
    parser: Arc<dyn CsvParser>,
    validator: Arc<dyn RowValidator>,
    retry: RetryExecutor<S>,
    resolver: DimensionResolver<S>,
    upsert: UpsertEngine<S>,
}

impl<S> Orchestrator<S>
where
    S: EtlStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        storage: Arc<dyn FileStorage>,
        parser: Arc<dyn CsvParser>,
        validator: Arc<dyn RowValidator>,
        retry: RetryExecutor<S>,
    ) -> Self {
        let resolver = DimensionResolver::new(Arc::clone(&store));
        let upsert = UpsertEngine::new(Arc::clone(&store));
        Self {
            store,
            storage,
            parser,
            validator,
            retry,
            resolver,
            upsert,
        }
    }

    /// Process one uploaded file end to end.
    ///
    /// The file must be in `Uploaded` (this call claims it) or already
    /// in `Parsing` (claimed by the caller's polling loop). Any other
    /// status is an invalid transition.
    pub async fn process_file(
        &self,
        file_id: DbId,
        cancel: &CancellationToken,
    ) -> Result<ProcessFileReport, EtlError> {
        let file = self
            .store
            .find_file(file_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "source_file",
                id: file_id,
            })?;

        let file = match file.status_id {
            s if s == FileStatus::Uploaded.id() => {
                // Claim the file; a concurrent worker may win the race.
                self.store
                    .transition_status(file.id, FileStatus::Uploaded.id(), FileStatus::Parsing.id())
                    .await?
                    .ok_or_else(|| {
                        CoreError::InvalidTransition(format!(
                            "file {} was claimed by another worker",
                            file.id
                        ))
                    })?
            }
            s if s == FileStatus::Parsing.id() => file,
            other => {
                validate_transition(other, FileStatus::Parsing.id())?;
                file
            }
        };

        let run_id = Uuid::now_v7();
        info!(file_id = file.id, %run_id, pipeline = %file.pipeline, "processing file");
        self.log(
            run_id,
            &file,
            LEVEL_INFO,
            CATEGORY_STEP,
            format!("processing started for '{}'", file.file_name),
            json!({ "pipeline": file.pipeline }),
        )
        .await;
        self.log_transition(run_id, &file, FileStatus::Uploaded.id(), FileStatus::Parsing.id())
            .await;

        let mut report = ProcessFileReport {
            run_id,
            file_id: file.id,
            success: false,
            final_status: FileStatus::Parsing.id(),
            summary: ProcessSummary::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        // Download is the one step that talks to external storage, so
        // it runs under the retry executor.
        let bytes = {
            let storage = Arc::clone(&self.storage);
            let path = file.storage_path.clone();
            let entity = EntityRef {
                entity_type: ENTITY_SOURCE_FILE,
                entity_id: file.id,
                organization_id: file.organization_id,
            };
            let result = self
                .retry
                .execute(entity, cancel, || {
                    let storage = Arc::clone(&storage);
                    let path = path.clone();
                    async move { storage.download(&path).await }
                })
                .await;
            match result {
                RetryResult::Success { value, attempts } => {
                    if attempts > 1 {
                        self.log(
                            run_id,
                            &file,
                            LEVEL_WARN,
                            cocho_core::run_log::CATEGORY_RETRY,
                            format!("download succeeded after {attempts} attempts"),
                            json!({ "attempts": attempts }),
                        )
                        .await;
                    }
                    value
                }
                RetryResult::Failure {
                    error,
                    kind,
                    attempts,
                    sent_to_dead_letter,
                } => {
                    if sent_to_dead_letter {
                        self.log(
                            run_id,
                            &file,
                            LEVEL_ERROR,
                            CATEGORY_DEAD_LETTER,
                            format!("download exhausted retries: {error}"),
                            json!({ "error_kind": kind.as_str(), "attempts": attempts }),
                        )
                        .await;
                    }
                    report.errors.push(error.to_string());
                    report.final_status = self
                        .fail_file(run_id, &file, FileStatus::Parsing, &error.to_string())
                        .await;
                    return Ok(report);
                }
                RetryResult::Cancelled { .. } => {
                    // Leave the file in Parsing; stale-file detection
                    // will surface it if nobody resumes.
                    return Err(EtlError::Storage("processing cancelled".to_string()));
                }
            }
        };

        let separator = self.parser.detect_separator(&bytes);
        let rows = match self.parser.parse(&bytes, &file.pipeline, separator).await {
            Ok(rows) => rows,
            Err(error) => {
                report.errors.push(error.to_string());
                report.final_status = self
                    .fail_file(run_id, &file, FileStatus::Parsing, &error.to_string())
                    .await;
                return Ok(report);
            }
        };
        report.summary.total = rows.len();
        self.log(
            run_id,
            &file,
            LEVEL_INFO,
            CATEGORY_STEP,
            format!("parsed {} rows (separator '{separator}')", rows.len()),
            json!({ "rows": rows.len() }),
        )
        .await;

        if self
            .transition(run_id, &file, FileStatus::Parsing, FileStatus::Validating)
            .await
            .is_none()
        {
            return Err(CoreError::InvalidTransition(format!(
                "file {} left Parsing during processing",
                file.id
            ))
            .into());
        }

        let outcome = match self.validator.validate(&file.pipeline, rows).await {
            Ok(outcome) => outcome,
            Err(error) => {
                report.errors.push(error.to_string());
                report.final_status = self
                    .fail_file(run_id, &file, FileStatus::Validating, &error.to_string())
                    .await;
                return Ok(report);
            }
        };
        for issue in &outcome.warnings {
            report.warnings.push(format!("line {}: {}", issue.line_number, issue.message));
            self.log(
                run_id,
                &file,
                LEVEL_WARN,
                CATEGORY_ROW,
                issue.message.clone(),
                json!({ "line": issue.line_number }),
            )
            .await;
        }
        for issue in &outcome.errors {
            report.errors.push(format!("line {}: {}", issue.line_number, issue.message));
            self.log(
                run_id,
                &file,
                LEVEL_ERROR,
                CATEGORY_ROW,
                issue.message.clone(),
                json!({ "line": issue.line_number }),
            )
            .await;
        }
        report.summary.failed += outcome.errors.len();

        if outcome.valid_rows.is_empty() && !outcome.errors.is_empty() {
            let message = format!("no valid rows ({} rejected)", outcome.errors.len());
            report.final_status = self
                .fail_file(run_id, &file, FileStatus::Validating, &message)
                .await;
            return Ok(report);
        }

        if self
            .transition(run_id, &file, FileStatus::Validating, FileStatus::Loading)
            .await
            .is_none()
        {
            return Err(CoreError::InvalidTransition(format!(
                "file {} left Validating during processing",
                file.id
            ))
            .into());
        }

        self.load_rows(run_id, &file, outcome.valid_rows, &mut report)
            .await;

        if self
            .transition(run_id, &file, FileStatus::Loading, FileStatus::Loaded)
            .await
            .is_none()
        {
            return Err(CoreError::InvalidTransition(format!(
                "file {} left Loading during processing",
                file.id
            ))
            .into());
        }
        report.final_status = FileStatus::Loaded.id();
        report.success = true;
        info!(
            file_id = file.id,
            %run_id,
            inserted = report.summary.inserted,
            updated = report.summary.updated,
            skipped = report.summary.skipped,
            pending = report.summary.pending,
            failed = report.summary.failed,
            "file loaded"
        );
        Ok(report)
    }

    /// Requeue a failed file for reprocessing from scratch.
    pub async fn retry_file(&self, file_id: DbId) -> Result<SourceFile, EtlError> {
        let file = self
            .store
            .find_file(file_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "source_file",
                id: file_id,
            })?;
        validate_transition(file.status_id, FileStatus::Uploaded.id())?;

        let requeued = self
            .store
            .transition_status(file.id, FileStatus::Failed.id(), FileStatus::Uploaded.id())
            .await?
            .ok_or_else(|| {
                CoreError::InvalidTransition(format!("file {} is no longer Failed", file.id))
            })?;
        self.store
            .reset_retry_state(ENTITY_SOURCE_FILE, file.id)
            .await?;
        self.log_transition(
            Uuid::now_v7(),
            &requeued,
            FileStatus::Failed.id(),
            FileStatus::Uploaded.id(),
        )
        .await;
        Ok(requeued)
    }

    // -- internals --

    /// Load validated rows in sub-batches. Rows sharing a natural key
    /// stay in file order inside one group; distinct groups within a
    /// batch run concurrently.
    async fn load_rows(
        &self,
        run_id: Uuid,
        file: &SourceFile,
        rows: Vec<CleanRow>,
        report: &mut ProcessFileReport,
    ) {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<CleanRow>> = HashMap::new();
        for row in rows {
            let key = compute_natural_key(&FactIdentity {
                pipeline: &file.pipeline,
                event_date: row.event_date,
                shift: &row.shift,
                trateiro_name: &row.trateiro_name,
                curral_code: row.curral_code.as_deref(),
            });
            match groups.entry(key) {
                std::collections::hash_map::Entry::Occupied(mut e) => e.get_mut().push(row),
                std::collections::hash_map::Entry::Vacant(e) => {
                    order.push(e.key().clone());
                    e.insert(vec![row]);
                }
            }
        }

        let mut batch: Vec<Vec<CleanRow>> = Vec::new();
        let mut batch_rows = 0usize;
        for key in order {
            let group = groups.remove(&key).unwrap_or_default();
            batch_rows += group.len();
            batch.push(group);
            if batch_rows >= LOAD_BATCH_SIZE {
                self.load_batch(run_id, file, std::mem::take(&mut batch), report)
                    .await;
                batch_rows = 0;
            }
        }
        if !batch.is_empty() {
            self.load_batch(run_id, file, batch, report).await;
        }
    }

    async fn load_batch(
        &self,
        run_id: Uuid,
        file: &SourceFile,
        groups: Vec<Vec<CleanRow>>,
        report: &mut ProcessFileReport,
    ) {
        let futures = groups
            .into_iter()
            .map(|group| self.load_group(run_id, file, group));
        for group_results in futures::future::join_all(futures).await {
            for (action, warnings) in group_results {
                report.warnings.extend(warnings);
                match action {
                    Ok(UpsertAction::Inserted) => report.summary.inserted += 1,
                    Ok(UpsertAction::Updated) => report.summary.updated += 1,
                    Ok(UpsertAction::Skipped) => report.summary.skipped += 1,
                    Ok(UpsertAction::Pending) => report.summary.pending += 1,
                    Err(message) => {
                        report.summary.failed += 1;
                        report.errors.push(message);
                    }
                }
            }
        }
    }

    async fn load_group(
        &self,
        run_id: Uuid,
        file: &SourceFile,
        group: Vec<CleanRow>,
    ) -> Vec<(Result<UpsertAction, String>, Vec<String>)> {
        let mut results = Vec::with_capacity(group.len());
        for row in group {
            results.push(self.load_row(run_id, file, row).await);
        }
        results
    }

    /// A row failure never fails the file; it is logged and counted.
    async fn load_row(
        &self,
        run_id: Uuid,
        file: &SourceFile,
        row: CleanRow,
    ) -> (Result<UpsertAction, String>, Vec<String>) {
        let line = row.line_number;
        let dims = match self
            .resolver
            .resolve_row(file.organization_id, Some(file.id), &row)
            .await
        {
            Ok(dims) => dims,
            Err(error) => {
                let message = format!("line {line}: {error}");
                self.log(
                    run_id,
                    file,
                    LEVEL_ERROR,
                    CATEGORY_ROW,
                    error.to_string(),
                    json!({ "line": line }),
                )
                .await;
                return (Err(message), Vec::new());
            }
        };

        let mut warnings = Vec::new();
        for warning in &dims.warnings {
            warnings.push(format!("line {line}: {warning}"));
            self.log(
                run_id,
                file,
                LEVEL_WARN,
                CATEGORY_ROW,
                warning.clone(),
                json!({ "line": line }),
            )
            .await;
        }

        match self
            .upsert
            .upsert_row(file.organization_id, &file.pipeline, file.id, &row, &dims)
            .await
        {
            Ok(outcome) => {
                if outcome.action == UpsertAction::Pending {
                    self.log(
                        run_id,
                        file,
                        LEVEL_WARN,
                        CATEGORY_ROW,
                        format!(
                            "row blocked by {} pending dimension(s)",
                            outcome.blocking_pending.len()
                        ),
                        json!({ "line": line, "pending_ids": outcome.blocking_pending }),
                    )
                    .await;
                }
                (Ok(outcome.action), warnings)
            }
            Err(error) => {
                let message = format!("line {line}: {error}");
                self.log(
                    run_id,
                    file,
                    LEVEL_ERROR,
                    CATEGORY_ROW,
                    error.to_string(),
                    json!({ "line": line }),
                )
                .await;
                (Err(message), warnings)
            }
        }
    }

    /// Guarded transition plus its run-log entry. `None` means the
    /// stored status no longer matched.
    async fn transition(
        &self,
        run_id: Uuid,
        file: &SourceFile,
        from: FileStatus,
        to: FileStatus,
    ) -> Option<SourceFile> {
        match self.store.transition_status(file.id, from.id(), to.id()).await {
            Ok(Some(updated)) => {
                self.log_transition(run_id, file, from.id(), to.id()).await;
                Some(updated)
            }
            Ok(None) => {
                warn!(
                    file_id = file.id,
                    from = status_name(from.id()),
                    to = status_name(to.id()),
                    "guarded transition lost, file changed status concurrently"
                );
                None
            }
            Err(error) => {
                warn!(file_id = file.id, %error, "transition write failed");
                None
            }
        }
    }

    /// Move the file to `Failed`, recording the cause. Returns the
    /// status the file ends in.
    async fn fail_file(
        &self,
        run_id: Uuid,
        file: &SourceFile,
        from: FileStatus,
        message: &str,
    ) -> i16 {
        if let Err(error) = self.store.set_last_error(file.id, message).await {
            warn!(file_id = file.id, %error, "failed to record last error");
        }
        self.log(
            run_id,
            file,
            LEVEL_ERROR,
            CATEGORY_STEP,
            message.to_string(),
            json!({ "failed_from": status_name(from.id()) }),
        )
        .await;
        match self.transition(run_id, file, from, FileStatus::Failed).await {
            Some(updated) => updated.status_id,
            None => from.id(),
        }
    }

    async fn log_transition(&self, run_id: Uuid, file: &SourceFile, from: i16, to: i16) {
        self.log(
            run_id,
            file,
            LEVEL_INFO,
            CATEGORY_STATE_TRANSITION,
            format!("{} -> {}", status_name(from), status_name(to)),
            json!({ "from": status_name(from), "to": status_name(to) }),
        )
        .await;
    }

    /// Run-log writes never fail the run.
    async fn log(
        &self,
        run_id: Uuid,
        file: &SourceFile,
        level: &str,
        category: &str,
        message: String,
        metadata: serde_json::Value,
    ) {
        let entry = NewRunLogEntry {
            run_id,
            file_id: file.id,
            organization_id: file.organization_id,
            level: level.to_string(),
            category: category.to_string(),
            message,
            metadata,
        };
        if let Err(error) = self.store.append_log(entry).await {
            warn!(file_id = file.id, %error, "run log append failed");
        }
    }
}
