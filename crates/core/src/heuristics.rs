//! Non-blocking data-quality heuristics for dimension codes.
//!
//! These produce warnings only; they never change a resolution outcome.
//! Pen codes get flagged when they look like test data or free-text
//! noise, and handler names get flagged when they are likely duplicates
//! of an existing dimension row under a cosmetic variation.

use regex::Regex;
use std::sync::LazyLock;

/// Prefixes that suggest a pen code came from a test or scratch export.
const SUSPICIOUS_PREFIXES: &[&str] = &["test", "teste", "tmp", "temp", "xx"];

/// Pen codes with digit runs this long are almost certainly ids pasted
/// from another system, not pen codes.
const MAX_DIGIT_RUN: usize = 6;

static DIGIT_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{7,}").expect("valid regex"));

static ALLOWED_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9 _\-/\.]+$").expect("valid regex"));

static TRAILING_DIGIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\d+$").expect("valid regex"));

static SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(jr|sr|junior|senior|filho|neto)\.?$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Pen codes
// ---------------------------------------------------------------------------

/// Collect warnings for a suspicious pen (curral) code.
///
/// Returns an empty vec for codes that look fine. Warnings are
/// human-readable and attached to the row's processing report.
pub fn curral_code_warnings(code: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    let trimmed = code.trim();
    let lowered = trimmed.to_lowercase();

    for prefix in SUSPICIOUS_PREFIXES {
        if lowered.starts_with(prefix) {
            warnings.push(format!(
                "Pen code '{trimmed}' starts with '{prefix}', which looks like test data"
            ));
            break;
        }
    }

    if DIGIT_RUN_RE.is_match(trimmed) {
        warnings.push(format!(
            "Pen code '{trimmed}' contains a digit run longer than {MAX_DIGIT_RUN}, \
             which looks like a foreign id"
        ));
    }

    if !trimmed.is_empty() && !ALLOWED_CODE_RE.is_match(trimmed) {
        warnings.push(format!(
            "Pen code '{trimmed}' contains characters outside the expected set"
        ));
    }

    warnings
}

// ---------------------------------------------------------------------------
// Handler names
// ---------------------------------------------------------------------------

/// Strip the cosmetic variations that commonly produce duplicate handler
/// rows: trailing digits and Jr/Sr-style suffixes.
fn base_handler_name(name: &str) -> String {
    let without_suffix = SUFFIX_RE.replace(name.trim(), "");
    let without_digits = TRAILING_DIGIT_RE.replace(&without_suffix, "");
    without_digits.trim().to_lowercase()
}

/// Warn when a handler name is a likely duplicate of an existing one.
///
/// A name with a trailing digit or a Jr/Sr suffix whose base form
/// matches an existing handler is probably the same person re-entered by
/// hand. Resolution still auto-creates the row; this only warns.
pub fn duplicate_trateiro_warning(name: &str, existing: &[String]) -> Option<String> {
    let trimmed = name.trim();
    let base = base_handler_name(trimmed);
    if base == trimmed.to_lowercase() {
        return None;
    }
    existing
        .iter()
        .find(|candidate| base_handler_name(candidate) == base)
        .map(|candidate| {
            format!(
                "Handler '{trimmed}' looks like a duplicate of existing handler '{candidate}'"
            )
        })
}
