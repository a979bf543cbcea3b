//! Default CSV collaborators for the worker.
//!
//! Feedlot management exports use semicolon-separated files with
//! Portuguese headers and comma decimals. This module covers the known
//! export layouts; anything more exotic gets its own `CsvParser`
//! implementation wired in `main`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use cocho_etl::error::EtlError;
use cocho_etl::ports::{
    CleanRow, CsvParser, RowIssue, RowValidator, SourceRow, ValidationOutcome,
};

/// Header aliases per canonical field, lowercased.
const HEADER_ALIASES: &[(&str, &[&str])] = &[
    ("event_date", &["data", "date", "dt"]),
    ("shift", &["turno", "trato", "refeicao"]),
    ("curral_code", &["curral", "piquete", "lote"]),
    ("dieta_name", &["dieta", "racao"]),
    ("trateiro_name", &["trateiro", "operador", "responsavel"]),
    ("planned_kg", &["previsto", "previsto_kg", "kg_previsto", "planejado"]),
    ("delivered_kg", &["realizado", "realizado_kg", "kg_realizado", "entregue"]),
    ("notes", &["obs", "observacao", "observacoes"]),
];

fn canonical_field(header: &str) -> Option<&'static str> {
    let lowered = header.trim().to_lowercase();
    HEADER_ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&lowered.as_str()))
        .map(|(field, _)| *field)
}

/// Parser for semicolon or comma separated exports.
#[derive(Default)]
pub struct DelimitedParser;

#[async_trait]
impl CsvParser for DelimitedParser {
    /// Whichever candidate separator splits the first line more wins;
    /// ties go to the semicolon, the common choice in these exports.
    fn detect_separator(&self, bytes: &[u8]) -> char {
        let first_line = bytes
            .split(|b| *b == b'\n')
            .next()
            .unwrap_or_default();
        let semicolons = first_line.iter().filter(|b| **b == b';').count();
        let commas = first_line.iter().filter(|b| **b == b',').count();
        if commas > semicolons {
            ','
        } else {
            ';'
        }
    }

    async fn parse(
        &self,
        bytes: &[u8],
        _pipeline: &str,
        separator: char,
    ) -> Result<Vec<SourceRow>, EtlError> {
        let text = String::from_utf8_lossy(bytes);
        let mut lines = text.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| EtlError::Parse("invalid format: empty file".to_string()))?;
        let headers: Vec<&str> = header_line.split(separator).collect();
        let fields: Vec<Option<&'static str>> =
            headers.iter().map(|h| canonical_field(h)).collect();
        if !fields.contains(&Some("event_date")) || !fields.contains(&Some("trateiro_name")) {
            return Err(EtlError::Parse(format!(
                "invalid format: header '{header_line}' is missing required columns"
            )));
        }

        let mut rows = Vec::new();
        for (index, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut row = SourceRow {
                line_number: index + 2,
                ..Default::default()
            };
            let mut extra = HashMap::new();
            for (cell_index, cell) in line.split(separator).enumerate() {
                let value = cell.trim();
                if value.is_empty() {
                    continue;
                }
                match fields.get(cell_index).copied().flatten() {
                    Some("event_date") => row.event_date = value.to_string(),
                    Some("shift") => row.shift = value.to_string(),
                    Some("curral_code") => row.curral_code = Some(value.to_string()),
                    Some("dieta_name") => row.dieta_name = Some(value.to_string()),
                    Some("trateiro_name") => row.trateiro_name = value.to_string(),
                    Some("planned_kg") => row.planned_kg = Some(value.to_string()),
                    Some("delivered_kg") => row.delivered_kg = Some(value.to_string()),
                    Some("notes") => row.notes = Some(value.to_string()),
                    _ => {
                        let header = headers
                            .get(cell_index)
                            .map(|h| h.trim().to_string())
                            .unwrap_or_else(|| format!("column_{cell_index}"));
                        extra.insert(header, value.to_string());
                    }
                }
            }
            row.extra = extra;
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Validator for the known export formats: `dd/mm/yyyy` or ISO dates,
/// comma or dot decimals.
#[derive(Default)]
pub struct ExportValidator;

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

fn parse_decimal(raw: &str) -> Result<f64, String> {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| format!("invalid number '{raw}'"))
}

#[async_trait]
impl RowValidator for ExportValidator {
    async fn validate(
        &self,
        _pipeline: &str,
        rows: Vec<SourceRow>,
    ) -> Result<ValidationOutcome, EtlError> {
        let mut outcome = ValidationOutcome::default();
        for row in rows {
            let mut issues = Vec::new();
            let event_date = parse_date(&row.event_date);
            if event_date.is_none() {
                issues.push(format!("invalid date '{}'", row.event_date));
            }
            if row.trateiro_name.trim().is_empty() {
                issues.push("trateiro name is required".to_string());
            }
            if row.shift.trim().is_empty() {
                issues.push("shift is required".to_string());
            }

            let planned_kg = match row.planned_kg.as_deref().map(parse_decimal).transpose() {
                Ok(v) => v,
                Err(message) => {
                    issues.push(message);
                    None
                }
            };
            let delivered_kg = match row.delivered_kg.as_deref().map(parse_decimal).transpose() {
                Ok(v) => v,
                Err(message) => {
                    issues.push(message);
                    None
                }
            };
            if let Some(kg) = planned_kg {
                if kg < 0.0 {
                    issues.push(format!("planned kg cannot be negative ({kg})"));
                }
            }
            if let Some(kg) = delivered_kg {
                if kg < 0.0 {
                    issues.push(format!("delivered kg cannot be negative ({kg})"));
                }
            }

            if let Some(message) = issues.into_iter().next() {
                outcome.errors.push(RowIssue {
                    line_number: row.line_number,
                    message,
                });
                continue;
            }

            let deviation_pct = match (planned_kg, delivered_kg) {
                (Some(planned), Some(delivered)) if planned != 0.0 => {
                    Some((delivered - planned) / planned * 100.0)
                }
                _ => None,
            };
            if let Some(pct) = deviation_pct {
                if pct.abs() > 50.0 {
                    outcome.warnings.push(RowIssue {
                        line_number: row.line_number,
                        message: format!("deviation of {pct:.1}% looks implausible"),
                    });
                }
            }

            outcome.valid_rows.push(CleanRow {
                line_number: row.line_number,
                event_date: event_date.unwrap_or_default(),
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
