//! Deterministic natural keys for fact rows.
//!
//! The natural key is composed from a row's immutable business identity
//! so that recomputing it from the same source CSV always yields the
//! same key. Uniqueness is enforced per `(organization_id, natural_key)`
//! by the fact table, which is what makes reprocessing idempotent.

use chrono::NaiveDate;

/// Pipeline discriminators stored in `fact_feed_events.pipeline`.
pub const PIPELINE_DESVIO: &str = "desvio";
pub const PIPELINE_TRATO: &str = "trato";

/// Identity fields of a fact row. Free-text fields are normalized
/// (trimmed, lowercased, inner whitespace collapsed) before composing
/// so cosmetic CSV differences do not produce distinct keys.
#[derive(Debug, Clone)]
pub struct FactIdentity<'a> {
    /// `"desvio"` or `"trato"`.
    pub pipeline: &'a str,
    pub event_date: NaiveDate,
    /// Shift or feeding-round label (e.g. `"manha"`, `"trato 2"`).
    pub shift: &'a str,
    /// Handler name; part of identity because one handler makes at most
    /// one delivery per pen per shift.
    pub trateiro_name: &'a str,
    /// Pen code as it appears in the source file; may be absent for
    /// deviation rows aggregated at diet level.
    pub curral_code: Option<&'a str>,
}

/// Compute the natural key for a fact row.
///
/// The key format is `"p:{pipeline}:d:{date}:s:{shift}:t:{trateiro}:c:{curral}"`
/// with the `c:` part omitted when no pen code is present. This produces
/// stable, unique keys for upsert operations.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use cocho_core::natural_key::{compute_natural_key, FactIdentity, PIPELINE_TRATO};
///
/// let key = compute_natural_key(&FactIdentity {
///     pipeline: PIPELINE_TRATO,
///     event_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
///     shift: "Manhã",
///     trateiro_name: "  João Silva ",
///     curral_code: Some("C-12"),
/// });
/// assert_eq!(key, "p:trato:d:2026-03-14:s:manhã:t:joão silva:c:c-12");
/// ```
pub fn compute_natural_key(identity: &FactIdentity<'_>) -> String {
    let mut parts = vec![
        format!("p:{}", normalize(identity.pipeline)),
        format!("d:{}", identity.event_date.format("%Y-%m-%d")),
        format!("s:{}", normalize(identity.shift)),
        format!("t:{}", normalize(identity.trateiro_name)),
    ];
    if let Some(code) = identity.curral_code {
        if !code.trim().is_empty() {
            parts.push(format!("c:{}", normalize(code)));
        }
    }
    parts.join(":")
}

/// Trim, lowercase, and collapse internal whitespace runs to one space.
fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn identity<'a>(shift: &'a str, trateiro: &'a str, curral: Option<&'a str>) -> FactIdentity<'a> {
        FactIdentity {
            pipeline: PIPELINE_TRATO,
            event_date: date(2026, 3, 14),
            shift,
            trateiro_name: trateiro,
            curral_code: curral,
        }
    }

    #[test]
    fn key_includes_all_identity_parts() {
        let key = compute_natural_key(&identity("manha", "joao", Some("C12")));
        assert_eq!(key, "p:trato:d:2026-03-14:s:manha:t:joao:c:c12");
    }

    #[test]
    fn key_omits_missing_pen_code() {
        let key = compute_natural_key(&identity("manha", "joao", None));
        assert_eq!(key, "p:trato:d:2026-03-14:s:manha:t:joao");
    }

    #[test]
    fn blank_pen_code_is_treated_as_missing() {
        let with_blank = compute_natural_key(&identity("manha", "joao", Some("   ")));
        let without = compute_natural_key(&identity("manha", "joao", None));
        assert_eq!(with_blank, without);
    }

    #[test]
    fn key_is_deterministic() {
        let a = compute_natural_key(&identity("tarde", "maria", Some("C7")));
        let b = compute_natural_key(&identity("tarde", "maria", Some("C7")));
        assert_eq!(a, b);
    }

    #[test]
    fn cosmetic_differences_collapse_to_one_key() {
        let canonical = compute_natural_key(&identity("manha", "joao silva", Some("c12")));
        let noisy = compute_natural_key(&identity(" Manha ", "JOAO   Silva", Some(" C12 ")));
        assert_eq!(canonical, noisy);
    }

    #[test]
    fn pipelines_produce_distinct_keys() {
        let trato = compute_natural_key(&identity("manha", "joao", Some("C12")));
        let desvio = compute_natural_key(&FactIdentity {
            pipeline: PIPELINE_DESVIO,
            ..identity("manha", "joao", Some("C12"))
        });
        assert_ne!(trato, desvio);
    }

    #[test]
    fn different_dates_produce_distinct_keys() {
        let a = compute_natural_key(&identity("manha", "joao", Some("C12")));
        let b = compute_natural_key(&FactIdentity {
            event_date: date(2026, 3, 15),
            ..identity("manha", "joao", Some("C12"))
        });
        assert_ne!(a, b);
    }
}
