//! Uploaded-file lifecycle state machine.
//!
//! This module lives in `core` (zero internal deps) so it can be used by
//! both the repository layer and the worker. The status IDs are
//! intentionally duplicated from the `db` crate's `FileStatus` enum
//! because `core` must stay dependency-free; both must match the
//! `file_statuses` seed data (1-based SMALLSERIAL).

use crate::error::CoreError;

/// Status IDs matching `file_statuses` seed data.
pub const STATUS_UPLOADED: i16 = 1;
pub const STATUS_PARSING: i16 = 2;
pub const STATUS_VALIDATING: i16 = 3;
pub const STATUS_LOADING: i16 = 4;
pub const STATUS_LOADED: i16 = 5;
pub const STATUS_FAILED: i16 = 6;

/// Returns the set of valid target status IDs reachable from `from_status`.
///
/// `Loaded` is terminal. `Failed` is terminal for processing but allows
/// the explicit retry transition back to `Uploaded`, which reprocesses
/// the file from scratch.
pub fn valid_transitions(from_status: i16) -> &'static [i16] {
    match from_status {
        // Uploaded -> Parsing, Failed
        STATUS_UPLOADED => &[STATUS_PARSING, STATUS_FAILED],
        // Parsing -> Validating, Failed
        STATUS_PARSING => &[STATUS_VALIDATING, STATUS_FAILED],
        // Validating -> Loading, Failed
        STATUS_VALIDATING => &[STATUS_LOADING, STATUS_FAILED],
        // Loading -> Loaded, Failed
        STATUS_LOADING => &[STATUS_LOADED, STATUS_FAILED],
        // Failed -> Uploaded (operator or automatic retry, full reprocess)
        STATUS_FAILED => &[STATUS_UPLOADED],
        // Loaded is terminal; unknown statuses allow nothing
        _ => &[],
    }
}

/// Check whether a transition from `from` to `to` is valid.
pub fn can_transition(from: i16, to: i16) -> bool {
    valid_transitions(from).contains(&to)
}

/// Validate a state transition, returning `InvalidTransition` for
/// illegal ones.
pub fn validate_transition(from: i16, to: i16) -> Result<(), CoreError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition(format!(
            "{} ({from}) -> {} ({to})",
            status_name(from),
            status_name(to)
        )))
    }
}

/// Whether a status is terminal for processing (no worker will pick the
/// file up again without operator action).
pub fn is_terminal(status: i16) -> bool {
    status == STATUS_LOADED || status == STATUS_FAILED
}

/// Human-readable name for a status ID (for logs and error messages).
pub fn status_name(id: i16) -> &'static str {
    match id {
        STATUS_UPLOADED => "Uploaded",
        STATUS_PARSING => "Parsing",
        STATUS_VALIDATING => "Validating",
        STATUS_LOADING => "Loading",
        STATUS_LOADED => "Loaded",
        STATUS_FAILED => "Failed",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn happy_path_transitions_are_valid() {
        assert!(can_transition(STATUS_UPLOADED, STATUS_PARSING));
        assert!(can_transition(STATUS_PARSING, STATUS_VALIDATING));
        assert!(can_transition(STATUS_VALIDATING, STATUS_LOADING));
        assert!(can_transition(STATUS_LOADING, STATUS_LOADED));
    }

    #[test]
    fn failed_is_reachable_from_every_non_terminal_state() {
        for from in [
            STATUS_UPLOADED,
            STATUS_PARSING,
            STATUS_VALIDATING,
            STATUS_LOADING,
        ] {
            assert!(can_transition(from, STATUS_FAILED), "from {from}");
        }
    }

    #[test]
    fn loaded_is_terminal() {
        assert!(valid_transitions(STATUS_LOADED).is_empty());
        assert!(is_terminal(STATUS_LOADED));
    }

    #[test]
    fn failed_only_allows_retry_to_uploaded() {
        assert_eq!(valid_transitions(STATUS_FAILED), &[STATUS_UPLOADED]);
        assert!(is_terminal(STATUS_FAILED));
    }

    #[test]
    fn skipping_states_is_rejected() {
        assert!(!can_transition(STATUS_UPLOADED, STATUS_LOADING));
        assert!(!can_transition(STATUS_PARSING, STATUS_LOADED));
        assert!(!can_transition(STATUS_UPLOADED, STATUS_LOADED));
    }

    #[test]
    fn backwards_transitions_are_rejected() {
        assert!(!can_transition(STATUS_LOADING, STATUS_PARSING));
        assert!(!can_transition(STATUS_LOADED, STATUS_UPLOADED));
    }

    #[test]
    fn unknown_status_allows_nothing() {
        assert!(valid_transitions(0).is_empty());
        assert!(valid_transitions(99).is_empty());
    }

    #[test]
    fn validate_transition_reports_state_names() {
        let err = validate_transition(STATUS_FAILED, STATUS_LOADED).unwrap_err();
        assert_matches!(err, CoreError::InvalidTransition(msg) => {
            assert!(msg.contains("Failed"));
            assert!(msg.contains("Loaded"));
        });
    }

    #[test]
    fn status_names_cover_all_states() {
        assert_eq!(status_name(STATUS_UPLOADED), "Uploaded");
        assert_eq!(status_name(STATUS_PARSING), "Parsing");
        assert_eq!(status_name(STATUS_VALIDATING), "Validating");
        assert_eq!(status_name(STATUS_LOADING), "Loading");
        assert_eq!(status_name(STATUS_LOADED), "Loaded");
        assert_eq!(status_name(STATUS_FAILED), "Failed");
        assert_eq!(status_name(42), "Unknown");
    }
}
