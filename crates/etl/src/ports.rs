//! External collaborator ports: file storage, CSV parser, row validator.
//!
//! CSV tokenizing, header aliasing, and per-pipeline business rules are
//! deliberately outside this engine; they arrive through these traits.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::EtlError;

// ---------------------------------------------------------------------------
// FileStorage
// ---------------------------------------------------------------------------

/// Blob storage for uploaded CSV files.
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn download(&self, path: &str) -> Result<Vec<u8>, EtlError>;
    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), EtlError>;
}

/// Default [`FileStorage`] over the local filesystem, rooted at a base
/// directory so storage paths stay relative.
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn download(&self, path: &str) -> Result<Vec<u8>, EtlError> {
        tokio::fs::read(self.root.join(path))
            .await
            .map_err(|e| EtlError::Storage(format!("read '{path}': {e}")))
    }

    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), EtlError> {
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EtlError::Storage(format!("mkdir for '{path}': {e}")))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| EtlError::Storage(format!("write '{path}': {e}")))
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// A raw row as produced by the external parser, after separator
/// detection and header aliasing but before any business validation.
/// All fields are still source text.
#[derive(Debug, Clone, Default)]
pub struct SourceRow {
    /// 1-based line number in the source file, for error reporting.
    pub line_number: usize,
    pub event_date: String,
    pub shift: String,
    pub curral_code: Option<String>,
    pub dieta_name: Option<String>,
    pub trateiro_name: String,
    pub planned_kg: Option<String>,
    pub delivered_kg: Option<String>,
    pub notes: Option<String>,
    /// Columns the header mapping did not recognise, kept for audit.
    pub extra: HashMap<String, String>,
}

/// External CSV parser port.
#[async_trait]
pub trait CsvParser: Send + Sync {
    /// Sniff the separator from a sample of the file.
    fn detect_separator(&self, bytes: &[u8]) -> char;

    /// Tokenize and header-map the file into raw rows.
    async fn parse(
        &self,
        bytes: &[u8],
        pipeline: &str,
        separator: char,
    ) -> Result<Vec<SourceRow>, EtlError>;
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// A typed, validated row ready for dimension resolution.
#[derive(Debug, Clone)]
pub struct CleanRow {
    pub line_number: usize,
    pub event_date: NaiveDate,
    pub shift: String,
    pub curral_code: Option<String>,
    pub dieta_name: Option<String>,
    pub trateiro_name: String,
    pub planned_kg: Option<f64>,
    pub delivered_kg: Option<f64>,
    pub deviation_pct: Option<f64>,
    pub notes: Option<String>,
}

/// A per-row validation finding.
#[derive(Debug, Clone, Serialize)]
pub struct RowIssue {
    pub line_number: usize,
    pub message: String,
}

/// Result of running the external validator over parsed rows.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub valid_rows: Vec<CleanRow>,
    pub errors: Vec<RowIssue>,
    pub warnings: Vec<RowIssue>,
}

impl Default for CleanRow {
    fn default() -> Self {
        Self {
            line_number: 0,
            event_date: NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid epoch date"),
            shift: String::new(),
            curral_code: None,
            dieta_name: None,
            trateiro_name: String::new(),
            planned_kg: None,
            delivered_kg: None,
            deviation_pct: None,
            notes: None,
        }
    }
}

/// External per-pipeline business validator port.
#[async_trait]
pub trait RowValidator: Send + Sync {
    async fn validate(
        &self,
        pipeline: &str,
        rows: Vec<SourceRow>,
    ) -> Result<ValidationOutcome, EtlError>;
}
