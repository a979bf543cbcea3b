//! End-to-end processing runs against the in-memory store.

use std::sync::Arc;

use assert_matches::assert_matches;
use tokio_util::sync::CancellationToken;

use cocho_core::backoff::RetryConfig;
use cocho_core::error::CoreError;
use cocho_core::run_log::{CATEGORY_DEAD_LETTER, CATEGORY_STATE_TRANSITION};
use cocho_db::models::status::FileStatus;
use cocho_etl::error::EtlError;
use cocho_etl::orchestrator::Orchestrator;
use cocho_etl::ports::{CsvParser, FileStorage, SourceRow};
use cocho_etl::retry::RetryExecutor;
use cocho_etl::testing::{FlakyStorage, MemStore, StaticStorage, StubParser, StubValidator};

const ORG: i64 = 1;

fn retry_config(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        base_delay_ms: 10,
        max_delay_ms: 100,
        jitter_enabled: false,
        ..RetryConfig::default()
    }
}

fn orchestrator(
    store: &Arc<MemStore>,
    storage: Arc<dyn FileStorage>,
    parser: Arc<dyn CsvParser>,
) -> Orchestrator<MemStore> {
    Orchestrator::new(
        Arc::clone(store),
        storage,
        parser,
        Arc::new(StubValidator),
        RetryExecutor::new(Arc::clone(store), retry_config(2)),
    )
}

fn row(line: usize, curral: &str, trateiro: &str, delivered: &str) -> SourceRow {
    SourceRow {
        line_number: line,
        event_date: "2026-03-14".into(),
        shift: "manha".into(),
        curral_code: Some(curral.into()),
        dieta_name: Some("Dieta A".into()),
        trateiro_name: trateiro.into(),
        planned_kg: Some("100".into()),
        delivered_kg: Some(delivered.into()),
        notes: None,
        extra: Default::default(),
    }
}

fn seeded_store() -> Arc<MemStore> {
    let store = Arc::new(MemStore::new());
    store.add_curral(ORG, "C1");
    store.add_curral(ORG, "C2");
    store.add_dieta(ORG, "Dieta A");
    store
}

fn static_storage(path: &str) -> Arc<StaticStorage> {
    let storage = Arc::new(StaticStorage::new());
    storage.put(path, b"data;linha1\n");
    storage
}

// -- happy path --

#[tokio::test]
async fn file_loads_end_to_end() {
    let store = seeded_store();
    let file = store.add_file(ORG, "trato.csv", "trato.csv", "trato");
    let parser = StubParser::new(vec![row(2, "C1", "Joao", "98"), row(3, "C2", "Joao", "95")]);
    let orch = orchestrator(&store, static_storage("trato.csv"), Arc::new(parser));

    let report = orch
        .process_file(file.id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.final_status, FileStatus::Loaded.id());
    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.inserted, 2);
    assert_eq!(report.summary.failed, 0);
    assert_eq!(store.fact_count(), 2);
    assert_eq!(store.file_status(file.id), Some(FileStatus::Loaded.id()));

    // The full transition chain landed in the run log.
    let logs = store.logs.lock().unwrap();
    let transitions: Vec<&str> = logs
        .iter()
        .filter(|e| e.category == CATEGORY_STATE_TRANSITION)
        .map(|e| e.message.as_str())
        .collect();
    assert_eq!(
        transitions,
        vec![
            "Uploaded -> Parsing",
            "Parsing -> Validating",
            "Validating -> Loading",
            "Loading -> Loaded",
        ]
    );
}

#[tokio::test]
async fn reprocessing_identical_content_is_a_no_op() {
    let store = seeded_store();
    let rows = vec![row(2, "C1", "Joao", "98"), row(3, "C2", "Joao", "95")];

    let first = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let orch = orchestrator(
        &store,
        static_storage("a.csv"),
        Arc::new(StubParser::new(rows.clone())),
    );
    orch.process_file(first.id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(store.fact_count(), 2);

    // Same rows arrive again in a second upload.
    let second = store.add_file(ORG, "a2.csv", "a2.csv", "trato");
    let orch = orchestrator(
        &store,
        static_storage("a2.csv"),
        Arc::new(StubParser::new(rows)),
    );
    let report = orch
        .process_file(second.id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.summary.inserted, 0);
    assert_eq!(report.summary.updated, 0);
    assert_eq!(report.summary.skipped, 2);
    assert_eq!(store.fact_count(), 2);
}

#[tokio::test]
async fn changed_measures_update_in_place() {
    let store = seeded_store();
    let first = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let orch = orchestrator(
        &store,
        static_storage("a.csv"),
        Arc::new(StubParser::new(vec![row(2, "C1", "Joao", "98")])),
    );
    orch.process_file(first.id, &CancellationToken::new())
        .await
        .unwrap();

    let second = store.add_file(ORG, "a2.csv", "a2.csv", "trato");
    let orch = orchestrator(
        &store,
        static_storage("a2.csv"),
        Arc::new(StubParser::new(vec![row(2, "C1", "Joao", "97")])),
    );
    let report = orch
        .process_file(second.id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.summary.updated, 1);
    assert_eq!(store.fact_count(), 1);
    let fact = store.facts.lock().unwrap()[0].clone();
    assert_eq!(fact.delivered_kg, Some(97.0));
    // The winning file is recorded on the row.
    assert_eq!(fact.source_file_id, second.id);
}

// -- dimension handling --

#[tokio::test]
async fn unknown_curral_blocks_rows_as_pending() {
    let store = seeded_store();
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    // Two rows referencing the same unknown pen, in different shifts so
    // they are distinct facts.
    let mut second = row(3, "C99", "Joao", "95");
    second.shift = "tarde".into();
    let orch = orchestrator(
        &store,
        static_storage("a.csv"),
        Arc::new(StubParser::new(vec![row(2, "C99", "Joao", "98"), second])),
    );

    let report = orch
        .process_file(file.id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.summary.pending, 2);
    assert_eq!(store.fact_count(), 0);
    // Both rows share one pending entry for the code.
    let pending = store.pending.lock().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].dimension, "curral");
    assert_eq!(pending[0].code, "C99");
    assert_eq!(pending[0].source_file_id, Some(file.id));
}

#[tokio::test]
async fn missing_dieta_is_not_blocking() {
    let store = seeded_store();
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let mut no_dieta = row(2, "C1", "Joao", "98");
    no_dieta.dieta_name = None;
    let orch = orchestrator(
        &store,
        static_storage("a.csv"),
        Arc::new(StubParser::new(vec![no_dieta])),
    );

    let report = orch
        .process_file(file.id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.summary.inserted, 1);
    assert_eq!(report.summary.pending, 0);
    let fact = store.facts.lock().unwrap()[0].clone();
    assert_eq!(fact.dieta_id, None);
}

#[tokio::test]
async fn new_trateiro_is_created_with_a_similarity_warning() {
    let store = seeded_store();
    store.add_trateiro(ORG, "Joao Silva");
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let orch = orchestrator(
        &store,
        static_storage("a.csv"),
        Arc::new(StubParser::new(vec![row(2, "C1", "Joao Silva Jr", "98")])),
    );

    let report = orch
        .process_file(file.id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.summary.inserted, 1);
    assert!(
        report.warnings.iter().any(|w| w.contains("Joao Silva")),
        "expected a duplicate-name warning, got {:?}",
        report.warnings
    );
}

// -- row and file failures --

#[tokio::test]
async fn invalid_rows_fail_locally_and_the_file_still_loads() {
    let store = seeded_store();
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let mut bad = row(3, "C2", "Joao", "95");
    bad.event_date = "14/03/2026".into();
    let orch = orchestrator(
        &store,
        static_storage("a.csv"),
        Arc::new(StubParser::new(vec![row(2, "C1", "Joao", "98"), bad])),
    );

    let report = orch
        .process_file(file.id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.summary.inserted, 1);
    assert_eq!(report.summary.failed, 1);
    assert!(report.errors[0].contains("line 3"));
    assert_eq!(store.file_status(file.id), Some(FileStatus::Loaded.id()));
}

#[tokio::test]
async fn parse_failure_moves_the_file_to_failed() {
    let store = seeded_store();
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let orch = orchestrator(
        &store,
        static_storage("a.csv"),
        Arc::new(StubParser::failing("invalid format: missing header row")),
    );

    let report = orch
        .process_file(file.id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.final_status, FileStatus::Failed.id());
    assert_eq!(store.file_status(file.id), Some(FileStatus::Failed.id()));
    let stored = store.files.lock().unwrap().get(&file.id).unwrap().clone();
    assert!(stored.last_error.unwrap().contains("missing header row"));
}

#[tokio::test]
async fn all_rows_invalid_fails_the_file() {
    let store = seeded_store();
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let mut bad = row(2, "C1", "Joao", "98");
    bad.event_date = "not-a-date".into();
    let orch = orchestrator(
        &store,
        static_storage("a.csv"),
        Arc::new(StubParser::new(vec![bad])),
    );

    let report = orch
        .process_file(file.id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(store.file_status(file.id), Some(FileStatus::Failed.id()));
}

#[tokio::test(start_paused = true)]
async fn download_retries_then_exhausts_into_dead_letter() {
    let store = seeded_store();
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    // More failures than the budget of 2 retries allows.
    let storage = Arc::new(FlakyStorage::new(b"", 10, "connection timed out"));
    let orch = orchestrator(&store, storage, Arc::new(StubParser::new(vec![])));

    let report = orch
        .process_file(file.id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(store.file_status(file.id), Some(FileStatus::Failed.id()));
    assert_eq!(store.dead_letter_count(), 1);
    assert_eq!(store.dead_letters.lock().unwrap()[0].total_retries, 2);
    let logs = store.logs.lock().unwrap();
    assert!(logs.iter().any(|e| e.category == CATEGORY_DEAD_LETTER));
}

#[tokio::test(start_paused = true)]
async fn download_recovers_within_budget() {
    let store = seeded_store();
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let storage = Arc::new(FlakyStorage::new(b"data", 2, "connection timed out"));
    let orch = orchestrator(
        &store,
        storage,
        Arc::new(StubParser::new(vec![row(2, "C1", "Joao", "98")])),
    );

    let report = orch
        .process_file(file.id, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(store.fact_count(), 1);
    // Recovery reset the persisted counter.
    let stored = store.files.lock().unwrap().get(&file.id).unwrap().clone();
    assert_eq!(stored.retry_count, 0);
}

// -- lifecycle guards --

#[tokio::test]
async fn a_loaded_file_cannot_be_reprocessed() {
    let store = seeded_store();
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let orch = orchestrator(
        &store,
        static_storage("a.csv"),
        Arc::new(StubParser::new(vec![row(2, "C1", "Joao", "98")])),
    );
    orch.process_file(file.id, &CancellationToken::new())
        .await
        .unwrap();

    let err = orch
        .process_file(file.id, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_matches!(err, EtlError::Core(CoreError::InvalidTransition(_)));
}

#[tokio::test]
async fn processing_an_unknown_file_is_not_found() {
    let store = seeded_store();
    let orch = orchestrator(
        &store,
        static_storage("a.csv"),
        Arc::new(StubParser::new(vec![])),
    );
    let err = orch
        .process_file(999, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_matches!(err, EtlError::Core(CoreError::NotFound { .. }));
}

#[tokio::test]
async fn retry_file_requeues_a_failed_file() {
    let store = seeded_store();
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let orch = orchestrator(
        &store,
        static_storage("a.csv"),
        Arc::new(StubParser::failing("parse error")),
    );
    orch.process_file(file.id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(store.file_status(file.id), Some(FileStatus::Failed.id()));

    let requeued = orch.retry_file(file.id).await.unwrap();
    assert_eq!(requeued.status_id, FileStatus::Uploaded.id());
    assert_eq!(requeued.retry_count, 0);
}

#[tokio::test]
async fn retry_file_rejects_non_failed_files() {
    let store = seeded_store();
    let file = store.add_file(ORG, "a.csv", "a.csv", "trato");
    let orch = orchestrator(
        &store,
        static_storage("a.csv"),
        Arc::new(StubParser::new(vec![])),
    );
    let err = orch.retry_file(file.id).await.unwrap_err();
    assert_matches!(err, EtlError::Core(CoreError::InvalidTransition(_)));
}
