//! In-memory doubles for the store and collaborator ports.
//!
//! `MemStore` mirrors the Postgres semantics the engine relies on:
//! guarded transitions, the unresolved-pending uniqueness rule, and the
//! natural-key uniqueness of the fact table. Unit and integration tests
//! run the full engine against it without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use cocho_core::types::{DbId, Timestamp};
use cocho_db::models::dead_letter::{CreateDeadLetterEntry, DeadLetterEntry, ErrorTypeCount};
use cocho_db::models::fact_event::{FactEvent, NewFactEvent};
use cocho_db::models::pending_dimension::PendingDimension;
use cocho_db::models::run_log::{NewRunLogEntry, RunLogEntry};
use cocho_db::models::source_file::SourceFile;
use cocho_db::models::status::{FileStatus, PendingStatus, StatusId};
use cocho_db::repositories::{clamp_limit, clamp_offset};

use crate::error::{EtlError, StoreError};
use crate::ports::{
    CleanRow, CsvParser, FileStorage, RowIssue, RowValidator, SourceRow, ValidationOutcome,
};
use crate::store::{
    DeadLetterStore, DimensionStore, FactStore, FileRecordStore, PendingDimensionStore,
    RetryStateStore, RunLogStore,
};

// ---------------------------------------------------------------------------
// MemStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct TrateiroRow {
    id: DbId,
    organization_id: DbId,
    name: String,
}

/// In-memory store implementing every port.
#[derive(Default)]
pub struct MemStore {
    next_id: AtomicI64,
    pub files: Mutex<HashMap<DbId, SourceFile>>,
    pub logs: Mutex<Vec<RunLogEntry>>,
    pub dead_letters: Mutex<Vec<DeadLetterEntry>>,
    currais: Mutex<Vec<(DbId, DbId, String)>>,
    dietas: Mutex<Vec<(DbId, DbId, String)>>,
    trateiros: Mutex<Vec<TrateiroRow>>,
    pub pending: Mutex<Vec<PendingDimension>>,
    pub facts: Mutex<Vec<FactEvent>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    fn alloc_id(&self) -> DbId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Seed a file record in `Uploaded` status.
    pub fn add_file(
        &self,
        organization_id: DbId,
        file_name: &str,
        storage_path: &str,
        pipeline: &str,
    ) -> SourceFile {
        let now = Utc::now();
        let file = SourceFile {
            id: self.alloc_id(),
            organization_id,
            file_name: file_name.to_string(),
            storage_path: storage_path.to_string(),
            pipeline: pipeline.to_string(),
            status_id: FileStatus::Uploaded.id(),
            retry_count: 0,
            next_retry_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.files.lock().unwrap().insert(file.id, file.clone());
        file
    }

    pub fn add_curral(&self, organization_id: DbId, code: &str) -> DbId {
        let id = self.alloc_id();
        self.currais
            .lock()
            .unwrap()
            .push((id, organization_id, code.to_string()));
        id
    }

    pub fn add_dieta(&self, organization_id: DbId, name: &str) -> DbId {
        let id = self.alloc_id();
        self.dietas
            .lock()
            .unwrap()
            .push((id, organization_id, name.to_string()));
        id
    }

    pub fn add_trateiro(&self, organization_id: DbId, name: &str) -> DbId {
        let id = self.alloc_id();
        self.trateiros.lock().unwrap().push(TrateiroRow {
            id,
            organization_id,
            name: name.to_string(),
        });
        id
    }

    pub fn file_status(&self, id: DbId) -> Option<StatusId> {
        self.files.lock().unwrap().get(&id).map(|f| f.status_id)
    }

    pub fn fact_count(&self) -> usize {
        self.facts.lock().unwrap().len()
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.lock().unwrap().len()
    }
}

fn norm(value: &str) -> String {
    value.trim().to_lowercase()
}

#[async_trait]
impl FileRecordStore for MemStore {
    async fn find_file(&self, id: DbId) -> Result<Option<SourceFile>, StoreError> {
        Ok(self.files.lock().unwrap().get(&id).cloned())
    }

    async fn transition_status(
        &self,
        id: DbId,
        from: StatusId,
        to: StatusId,
    ) -> Result<Option<SourceFile>, StoreError> {
        let mut files = self.files.lock().unwrap();
        match files.get_mut(&id) {
            Some(file) if file.status_id == from => {
                file.status_id = to;
                file.updated_at = Utc::now();
                Ok(Some(file.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_last_error(&self, id: DbId, error: &str) -> Result<(), StoreError> {
        let mut files = self.files.lock().unwrap();
        if let Some(file) = files.get_mut(&id) {
            file.last_error = Some(error.to_string());
            file.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_stale(
        &self,
        organization_id: DbId,
        cutoff: Timestamp,
    ) -> Result<Vec<SourceFile>, StoreError> {
        let files = self.files.lock().unwrap();
        Ok(files
            .values()
            .filter(|f| {
                f.organization_id == organization_id
                    && !cocho_core::lifecycle::is_terminal(f.status_id)
                    && f.updated_at < cutoff
            })
            .cloned()
            .collect())
    }

    async fn count_active_retries(&self, organization_id: DbId) -> Result<i64, StoreError> {
        let files = self.files.lock().unwrap();
        Ok(files
            .values()
            .filter(|f| f.organization_id == organization_id && f.retry_count > 0)
            .count() as i64)
    }

    async fn terminal_counts(&self, organization_id: DbId) -> Result<(i64, i64, i64), StoreError> {
        let files = self.files.lock().unwrap();
        let mut terminal = 0;
        let mut loaded = 0;
        let mut retried_sum = 0;
        for f in files.values().filter(|f| f.organization_id == organization_id) {
            retried_sum += f.retry_count as i64;
            if f.status_id == FileStatus::Loaded.id() {
                terminal += 1;
                loaded += 1;
            } else if f.status_id == FileStatus::Failed.id() {
                terminal += 1;
            }
        }
        Ok((terminal, loaded, retried_sum))
    }

    async fn loaded_durations_secs(&self, organization_id: DbId) -> Result<Vec<f64>, StoreError> {
        let files = self.files.lock().unwrap();
        Ok(files
            .values()
            .filter(|f| {
                f.organization_id == organization_id && f.status_id == FileStatus::Loaded.id()
            })
            .map(|f| (f.updated_at - f.created_at).num_milliseconds() as f64 / 1000.0)
            .collect())
    }
}

#[async_trait]
impl RunLogStore for MemStore {
    async fn append_log(&self, entry: NewRunLogEntry) -> Result<(), StoreError> {
        let mut logs = self.logs.lock().unwrap();
        logs.push(RunLogEntry {
            id: self.alloc_id(),
            run_id: entry.run_id,
            file_id: entry.file_id,
            organization_id: entry.organization_id,
            level: entry.level,
            category: entry.category,
            message: entry.message,
            metadata: entry.metadata,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_log_by_file(
        &self,
        file_id: DbId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<RunLogEntry>, StoreError> {
        let logs = self.logs.lock().unwrap();
        let mut entries: Vec<RunLogEntry> =
            logs.iter().filter(|e| e.file_id == file_id).cloned().collect();
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(entries
            .into_iter()
            .skip(clamp_offset(offset) as usize)
            .take(clamp_limit(limit) as usize)
            .collect())
    }

    async fn count_errors_since(
        &self,
        organization_id: DbId,
        since: Timestamp,
    ) -> Result<i64, StoreError> {
        let logs = self.logs.lock().unwrap();
        Ok(logs
            .iter()
            .filter(|e| {
                e.organization_id == organization_id
                    && e.level == cocho_core::run_log::LEVEL_ERROR
                    && e.created_at >= since
            })
            .count() as i64)
    }
}

#[async_trait]
impl RetryStateStore for MemStore {
    async fn get_retry_count(
        &self,
        entity_type: &str,
        entity_id: DbId,
    ) -> Result<i32, StoreError> {
        require_source_file(entity_type)?;
        let files = self.files.lock().unwrap();
        files
            .get(&entity_id)
            .map(|f| f.retry_count)
            .ok_or(StoreError::NotFound {
                entity: "source_file",
                id: entity_id,
            })
    }

    async fn set_retry_state(
        &self,
        entity_type: &str,
        entity_id: DbId,
        retry_count: i32,
        next_retry_at: Option<Timestamp>,
    ) -> Result<(), StoreError> {
        require_source_file(entity_type)?;
        let mut files = self.files.lock().unwrap();
        if let Some(file) = files.get_mut(&entity_id) {
            file.retry_count = retry_count;
            file.next_retry_at = next_retry_at;
            file.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reset_retry_state(
        &self,
        entity_type: &str,
        entity_id: DbId,
    ) -> Result<(), StoreError> {
        self.set_retry_state(entity_type, entity_id, 0, None).await
    }
}

fn require_source_file(entity_type: &str) -> Result<(), StoreError> {
    if entity_type == crate::pg::ENTITY_SOURCE_FILE {
        Ok(())
    } else {
        Err(StoreError::Database(format!(
            "no retry bookkeeping table for entity type '{entity_type}'"
        )))
    }
}

#[async_trait]
impl DeadLetterStore for MemStore {
    async fn create_dead_letter(
        &self,
        input: CreateDeadLetterEntry,
    ) -> Result<DeadLetterEntry, StoreError> {
        let entry = DeadLetterEntry {
            id: self.alloc_id(),
            entity_type: input.entity_type,
            entity_id: input.entity_id,
            organization_id: input.organization_id,
            error_type: input.error_type,
            error_message: input.error_message,
            total_retries: input.total_retries,
            resolved: false,
            resolved_by: None,
            resolution_notes: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.dead_letters.lock().unwrap().push(entry.clone());
        Ok(entry)
    }

    async fn count_unresolved(&self, organization_id: DbId) -> Result<i64, StoreError> {
        let entries = self.dead_letters.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.organization_id == organization_id && !e.resolved)
            .count() as i64)
    }

    async fn counts_by_error_type(
        &self,
        organization_id: DbId,
    ) -> Result<Vec<ErrorTypeCount>, StoreError> {
        let entries = self.dead_letters.lock().unwrap();
        let mut counts: HashMap<String, i64> = HashMap::new();
        for e in entries
            .iter()
            .filter(|e| e.organization_id == organization_id && !e.resolved)
        {
            *counts.entry(e.error_type.clone()).or_default() += 1;
        }
        let mut result: Vec<ErrorTypeCount> = counts
            .into_iter()
            .map(|(error_type, count)| ErrorTypeCount { error_type, count })
            .collect();
        result.sort_by(|a, b| b.count.cmp(&a.count).then(a.error_type.cmp(&b.error_type)));
        Ok(result)
    }

    async fn list_unresolved(
        &self,
        organization_id: DbId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<DeadLetterEntry>, StoreError> {
        let entries = self.dead_letters.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.organization_id == organization_id && !e.resolved)
            .skip(clamp_offset(offset) as usize)
            .take(clamp_limit(limit) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DimensionStore for MemStore {
    async fn find_curral_id(
        &self,
        organization_id: DbId,
        code: &str,
    ) -> Result<Option<DbId>, StoreError> {
        let currais = self.currais.lock().unwrap();
        Ok(currais
            .iter()
            .find(|(_, org, c)| *org == organization_id && norm(c) == norm(code))
            .map(|(id, _, _)| *id))
    }

    async fn find_dieta_id(
        &self,
        organization_id: DbId,
        name: &str,
    ) -> Result<Option<DbId>, StoreError> {
        let dietas = self.dietas.lock().unwrap();
        Ok(dietas
            .iter()
            .find(|(_, org, n)| *org == organization_id && norm(n) == norm(name))
            .map(|(id, _, _)| *id))
    }

    async fn find_or_create_trateiro(
        &self,
        organization_id: DbId,
        name: &str,
    ) -> Result<DbId, StoreError> {
        let mut trateiros = self.trateiros.lock().unwrap();
        if let Some(row) = trateiros
            .iter()
            .find(|t| t.organization_id == organization_id && norm(&t.name) == norm(name))
        {
            return Ok(row.id);
        }
        let id = self.alloc_id();
        trateiros.push(TrateiroRow {
            id,
            organization_id,
            name: name.trim().to_string(),
        });
        Ok(id)
    }

    async fn list_trateiro_names(&self, organization_id: DbId) -> Result<Vec<String>, StoreError> {
        let trateiros = self.trateiros.lock().unwrap();
        Ok(trateiros
            .iter()
            .filter(|t| t.organization_id == organization_id)
            .map(|t| t.name.clone())
            .collect())
    }
}

#[async_trait]
impl PendingDimensionStore for MemStore {
    async fn pending_create_or_get(
        &self,
        organization_id: DbId,
        dimension: &str,
        code: &str,
        source_file_id: Option<DbId>,
    ) -> Result<PendingDimension, StoreError> {
        let mut pending = self.pending.lock().unwrap();
        if let Some(existing) = pending.iter().find(|p| {
            p.organization_id == organization_id
                && p.dimension == dimension
                && p.code == code
                && p.resolved_at.is_none()
        }) {
            return Ok(existing.clone());
        }
        let entry = PendingDimension {
            id: self.alloc_id(),
            organization_id,
            dimension: dimension.to_string(),
            code: code.to_string(),
            status_id: PendingStatus::Pending.id(),
            resolved_dimension_id: None,
            source_file_id,
            created_at: Utc::now(),
            resolved_at: None,
        };
        pending.push(entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl FactStore for MemStore {
    async fn find_fact_by_natural_key(
        &self,
        organization_id: DbId,
        natural_key: &str,
    ) -> Result<Option<FactEvent>, StoreError> {
        let facts = self.facts.lock().unwrap();
        Ok(facts
            .iter()
            .find(|f| f.organization_id == organization_id && f.natural_key == natural_key)
            .cloned())
    }

    async fn insert_fact(&self, input: NewFactEvent) -> Result<FactEvent, StoreError> {
        let mut facts = self.facts.lock().unwrap();
        if facts
            .iter()
            .any(|f| f.organization_id == input.organization_id && f.natural_key == input.natural_key)
        {
            return Err(StoreError::Database(format!(
                "duplicate key value violates unique constraint: {}",
                input.natural_key
            )));
        }
        let now = Utc::now();
        let fact = FactEvent {
            id: self.alloc_id(),
            organization_id: input.organization_id,
            natural_key: input.natural_key,
            pipeline: input.pipeline,
            source_file_id: input.source_file_id,
            event_date: input.event_date,
            shift: input.shift,
            curral_id: input.curral_id,
            dieta_id: input.dieta_id,
            trateiro_id: input.trateiro_id,
            planned_kg: input.planned_kg,
            delivered_kg: input.delivered_kg,
            deviation_pct: input.deviation_pct,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };
        facts.push(fact.clone());
        Ok(fact)
    }

    async fn update_fact(&self, id: DbId, input: NewFactEvent) -> Result<FactEvent, StoreError> {
        let mut facts = self.facts.lock().unwrap();
        let fact = facts
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(StoreError::NotFound {
                entity: "fact_event",
                id,
            })?;
        fact.source_file_id = input.source_file_id;
        fact.curral_id = input.curral_id;
        fact.dieta_id = input.dieta_id;
        fact.trateiro_id = input.trateiro_id;
        fact.planned_kg = input.planned_kg;
        fact.delivered_kg = input.delivered_kg;
        fact.deviation_pct = input.deviation_pct;
        fact.notes = input.notes;
        fact.updated_at = Utc::now();
        Ok(fact.clone())
    }
}

// ---------------------------------------------------------------------------
// Collaborator doubles
// ---------------------------------------------------------------------------

/// Storage serving a fixed set of in-memory blobs.
#[derive(Default)]
pub struct StaticStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl StaticStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, bytes: &[u8]) {
        self.blobs.lock().unwrap().insert(path.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl FileStorage for StaticStorage {
    async fn download(&self, path: &str) -> Result<Vec<u8>, EtlError> {
        self.blobs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| EtlError::Storage(format!("blob '{path}' not found")))
    }

    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), EtlError> {
        self.put(path, bytes);
        Ok(())
    }
}

/// Storage that fails the first `failures` downloads, then serves the
/// configured bytes. For exercising the retry executor.
pub struct FlakyStorage {
    bytes: Vec<u8>,
    failures: AtomicUsize,
    error_message: String,
}

impl FlakyStorage {
    pub fn new(bytes: &[u8], failures: usize, error_message: &str) -> Self {
        Self {
            bytes: bytes.to_vec(),
            failures: AtomicUsize::new(failures),
            error_message: error_message.to_string(),
        }
    }
}

#[async_trait]
impl FileStorage for FlakyStorage {
    async fn download(&self, _path: &str) -> Result<Vec<u8>, EtlError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(EtlError::Storage(self.error_message.clone()));
        }
        Ok(self.bytes.clone())
    }

    async fn upload(&self, _path: &str, _bytes: &[u8]) -> Result<(), EtlError> {
        Ok(())
    }
}

/// Parser returning preconfigured rows regardless of input bytes.
#[derive(Default)]
pub struct StubParser {
    rows: Vec<SourceRow>,
    fail_with: Option<String>,
}

impl StubParser {
    pub fn new(rows: Vec<SourceRow>) -> Self {
        Self {
            rows,
            fail_with: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            rows: Vec::new(),
            fail_with: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl CsvParser for StubParser {
    fn detect_separator(&self, _bytes: &[u8]) -> char {
        ';'
    }

    async fn parse(
        &self,
        _bytes: &[u8],
        _pipeline: &str,
        _separator: char,
    ) -> Result<Vec<SourceRow>, EtlError> {
        if let Some(message) = &self.fail_with {
            return Err(EtlError::Parse(message.clone()));
        }
        Ok(self.rows.clone())
    }
}

/// Validator converting raw rows with `%Y-%m-%d` dates and dot-decimal
/// numbers; anything that does not convert becomes a row error.
#[derive(Default)]
pub struct StubValidator;

#[async_trait]
impl RowValidator for StubValidator {
    async fn validate(
        &self,
        _pipeline: &str,
        rows: Vec<SourceRow>,
    ) -> Result<ValidationOutcome, EtlError> {
        let mut outcome = ValidationOutcome::default();
        for row in rows {
            let event_date = match chrono::NaiveDate::parse_from_str(&row.event_date, "%Y-%m-%d") {
                Ok(date) => date,
                Err(_) => {
                    outcome.errors.push(RowIssue {
                        line_number: row.line_number,
                        message: format!("invalid date '{}'", row.event_date),
                    });
                    continue;
                }
            };
            if row.trateiro_name.trim().is_empty() {
                outcome.errors.push(RowIssue {
                    line_number: row.line_number,
                    message: "trateiro name is required".to_string(),
                });
                continue;
            }
            let planned_kg = match parse_measure(row.planned_kg.as_deref()) {
                Ok(v) => v,
                Err(message) => {
                    outcome
                        .errors
                        .push(RowIssue { line_number: row.line_number, message });
                    continue;
                }
            };
            let delivered_kg = match parse_measure(row.delivered_kg.as_deref()) {
                Ok(v) => v,
                Err(message) => {
                    outcome
                        .errors
                        .push(RowIssue { line_number: row.line_number, message });
                    continue;
                }
            };
            let deviation_pct = match (planned_kg, delivered_kg) {
                (Some(planned), Some(delivered)) if planned != 0.0 => {
                    Some((delivered - planned) / planned * 100.0)
                }
                _ => None,
            };
            outcome.valid_rows.push(CleanRow {
                line_number: row.line_number,
                event_date,
                shift: row.shift,
                curral_code: row.curral_code,
                dieta_name: row.dieta_name,
                trateiro_name: row.trateiro_name,
                planned_kg,
                delivered_kg,
                deviation_pct,
                notes: row.notes,
            });
        }
        Ok(outcome)
    }
}

fn parse_measure(raw: Option<&str>) -> Result<Option<f64>, String> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("invalid number '{s}'")),
    }
}
