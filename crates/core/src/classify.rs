//! Error classification for the retry subsystem.
//!
//! Maps free-text error messages onto an [`ErrorKind`] via an ordered
//! substring rule table. Classification is heuristic by nature; callers
//! wanting stricter behaviour should extend [`CLASSIFICATION_RULES`]
//! rather than change the unknown-text default.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Failure taxonomy driving retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network blips, timeouts — worth retrying.
    Transient,
    /// Throttling — retried with the same backoff mechanism as transient.
    RateLimited,
    /// Memory / disk / pool exhaustion — retried, usually needs longer backoff.
    Resource,
    /// Validation, schema, constraint violations — never retried.
    Permanent,
}

impl ErrorKind {
    /// String representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Resource => "resource",
            ErrorKind::Permanent => "permanent",
        }
    }

    /// Parse from a string, defaulting to `Transient` for unknown values.
    pub fn from_str(s: &str) -> Self {
        match s {
            "rate_limited" => ErrorKind::RateLimited,
            "resource" => ErrorKind::Resource,
            "permanent" => ErrorKind::Permanent,
            _ => ErrorKind::Transient,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// Ordered substring rules, checked first-match-wins against the
/// lowercased message. Earlier rows take precedence, so the more
/// specific vocabularies (rate limiting, resources) sit above the
/// generic network patterns.
pub const CLASSIFICATION_RULES: &[(&str, ErrorKind)] = &[
    // Throttling
    ("rate limit", ErrorKind::RateLimited),
    ("too many requests", ErrorKind::RateLimited),
    ("429", ErrorKind::RateLimited),
    // Resource exhaustion
    ("out of memory", ErrorKind::Resource),
    ("memory", ErrorKind::Resource),
    ("disk", ErrorKind::Resource),
    ("no space", ErrorKind::Resource),
    ("pool", ErrorKind::Resource),
    ("lock", ErrorKind::Resource),
    // Permanent failures
    ("validation", ErrorKind::Permanent),
    ("schema", ErrorKind::Permanent),
    ("constraint", ErrorKind::Permanent),
    ("parse", ErrorKind::Permanent),
    ("invalid format", ErrorKind::Permanent),
    ("duplicate key", ErrorKind::Permanent),
    ("not null", ErrorKind::Permanent),
    // Network / transient
    ("network", ErrorKind::Transient),
    ("timeout", ErrorKind::Transient),
    ("timed out", ErrorKind::Transient),
    ("connection", ErrorKind::Transient),
    ("unavailable", ErrorKind::Transient),
    ("reset by peer", ErrorKind::Transient),
];

/// Classify an error message into an [`ErrorKind`].
///
/// Matching is case-insensitive. Unknown text defaults to `Transient`:
/// retrying a permanent error is cheaper than giving up on a transient
/// blip, and the retry budget bounds the cost.
pub fn classify_error(message: &str) -> ErrorKind {
    let lowered = message.to_lowercase();
    for (pattern, kind) in CLASSIFICATION_RULES {
        if lowered.contains(pattern) {
            return *kind;
        }
    }
    ErrorKind::Transient
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- ErrorKind string round-trips --

    #[test]
    fn kind_as_str_returns_storage_names() {
        assert_eq!(ErrorKind::Transient.as_str(), "transient");
        assert_eq!(ErrorKind::RateLimited.as_str(), "rate_limited");
        assert_eq!(ErrorKind::Resource.as_str(), "resource");
        assert_eq!(ErrorKind::Permanent.as_str(), "permanent");
    }

    #[test]
    fn kind_from_str_parses_known_values() {
        assert_eq!(ErrorKind::from_str("transient"), ErrorKind::Transient);
        assert_eq!(ErrorKind::from_str("rate_limited"), ErrorKind::RateLimited);
        assert_eq!(ErrorKind::from_str("resource"), ErrorKind::Resource);
        assert_eq!(ErrorKind::from_str("permanent"), ErrorKind::Permanent);
    }

    #[test]
    fn kind_from_str_defaults_unknown_to_transient() {
        assert_eq!(ErrorKind::from_str(""), ErrorKind::Transient);
        assert_eq!(ErrorKind::from_str("garbage"), ErrorKind::Transient);
    }

    // -- classify_error vocabulary --

    #[test]
    fn classify_network_errors_as_transient() {
        assert_eq!(
            classify_error("Network timeout occurred"),
            ErrorKind::Transient
        );
        assert_eq!(
            classify_error("connection refused by host"),
            ErrorKind::Transient
        );
        assert_eq!(
            classify_error("read timed out after 30s"),
            ErrorKind::Transient
        );
        assert_eq!(
            classify_error("service unavailable"),
            ErrorKind::Transient
        );
    }

    #[test]
    fn classify_throttling_as_rate_limited() {
        assert_eq!(
            classify_error("Rate limit exceeded"),
            ErrorKind::RateLimited
        );
        assert_eq!(
            classify_error("HTTP 429 returned by upstream"),
            ErrorKind::RateLimited
        );
        assert_eq!(
            classify_error("too many requests, slow down"),
            ErrorKind::RateLimited
        );
    }

    #[test]
    fn classify_exhaustion_as_resource() {
        assert_eq!(classify_error("Out of memory"), ErrorKind::Resource);
        assert_eq!(classify_error("disk quota reached"), ErrorKind::Resource);
        assert_eq!(
            classify_error("connection pool exhausted"),
            ErrorKind::Resource
        );
        assert_eq!(
            classify_error("could not acquire lock on table"),
            ErrorKind::Resource
        );
    }

    #[test]
    fn classify_validation_as_permanent() {
        assert_eq!(
            classify_error("Validation failed: missing field"),
            ErrorKind::Permanent
        );
        assert_eq!(
            classify_error("schema mismatch in column 3"),
            ErrorKind::Permanent
        );
        assert_eq!(
            classify_error("unique constraint violated"),
            ErrorKind::Permanent
        );
        assert_eq!(
            classify_error("failed to parse row 17"),
            ErrorKind::Permanent
        );
    }

    #[test]
    fn classify_is_case_insensitive() {
        assert_eq!(classify_error("NETWORK TIMEOUT"), ErrorKind::Transient);
        assert_eq!(classify_error("RATE LIMIT hit"), ErrorKind::RateLimited);
        assert_eq!(classify_error("VALIDATION error"), ErrorKind::Permanent);
    }

    #[test]
    fn classify_unknown_defaults_to_transient() {
        assert_eq!(classify_error("something odd happened"), ErrorKind::Transient);
        assert_eq!(classify_error(""), ErrorKind::Transient);
    }

    #[test]
    fn rate_limit_wins_over_generic_patterns() {
        // "rate limit" appears before "connection" in the rule table.
        assert_eq!(
            classify_error("connection rejected: rate limit"),
            ErrorKind::RateLimited
        );
    }

    #[test]
    fn pool_exhaustion_wins_over_connection() {
        assert_eq!(
            classify_error("connection pool timeout"),
            ErrorKind::Resource
        );
    }
}
