//! Pipeline health assessment constants and logic.
//!
//! The monitoring service feeds aggregate counters into
//! [`assess_health`]; the thresholds come from operator configuration.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Health status constants
// ---------------------------------------------------------------------------

/// All components healthy — no threshold breached.
pub const HEALTH_HEALTHY: &str = "healthy";
/// Non-critical issues — a warning threshold breached.
pub const HEALTH_WARNING: &str = "warning";
/// Critical issues — a critical threshold breached.
pub const HEALTH_CRITICAL: &str = "critical";

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Operator-configured alerting thresholds.
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// Unresolved dead-letter entries at which the pipeline is degraded.
    /// Twice this value escalates the issue to critical.
    pub dead_letter_warning: u64,
    /// Files actively retrying at which the pipeline is degraded.
    pub active_retry_warning: u64,
    /// Errors in the last hour at which the pipeline is degraded.
    pub hourly_error_warning: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            dead_letter_warning: 10,
            active_retry_warning: 25,
            hourly_error_warning: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot and assessment
// ---------------------------------------------------------------------------

/// Aggregate counters sampled by the monitoring service.
#[derive(Debug, Clone, Default)]
pub struct HealthSnapshot {
    pub dead_letter_queue_size: u64,
    pub active_retries: u64,
    pub stale_files: u64,
    pub errors_last_hour: u64,
}

/// A single detected issue with its severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthIssue {
    /// `HEALTH_WARNING` or `HEALTH_CRITICAL`.
    pub severity: &'static str,
    pub message: String,
}

/// Overall assessment: worst severity across all issues.
#[derive(Debug, Clone, Serialize)]
pub struct HealthAssessment {
    /// One of the `HEALTH_*` constants.
    pub status: &'static str,
    pub issues: Vec<HealthIssue>,
}

/// Assess pipeline health from an aggregate snapshot.
///
/// DLQ size at or above the warning threshold is a warning; at or above
/// twice the threshold it escalates to critical. Any stale file is a
/// warning — a file that started processing and never finished means a
/// worker died or is wedged.
pub fn assess_health(snapshot: &HealthSnapshot, thresholds: &HealthThresholds) -> HealthAssessment {
    let mut issues = Vec::new();

    if snapshot.dead_letter_queue_size >= thresholds.dead_letter_warning * 2 {
        issues.push(HealthIssue {
            severity: HEALTH_CRITICAL,
            message: format!(
                "Dead-letter queue has {} unresolved entries (critical threshold {})",
                snapshot.dead_letter_queue_size,
                thresholds.dead_letter_warning * 2
            ),
        });
    } else if snapshot.dead_letter_queue_size >= thresholds.dead_letter_warning {
        issues.push(HealthIssue {
            severity: HEALTH_WARNING,
            message: format!(
                "Dead-letter queue has {} unresolved entries (threshold {})",
                snapshot.dead_letter_queue_size, thresholds.dead_letter_warning
            ),
        });
    }

    if snapshot.active_retries >= thresholds.active_retry_warning {
        issues.push(HealthIssue {
            severity: HEALTH_WARNING,
            message: format!(
                "{} files are actively retrying (threshold {})",
                snapshot.active_retries, thresholds.active_retry_warning
            ),
        });
    }

    if snapshot.stale_files > 0 {
        issues.push(HealthIssue {
            severity: HEALTH_WARNING,
            message: format!(
                "{} files started processing and never finished",
                snapshot.stale_files
            ),
        });
    }

    if snapshot.errors_last_hour >= thresholds.hourly_error_warning {
        issues.push(HealthIssue {
            severity: HEALTH_CRITICAL,
            message: format!(
                "{} errors in the last hour (threshold {})",
                snapshot.errors_last_hour, thresholds.hourly_error_warning
            ),
        });
    }

    let status = if issues.iter().any(|i| i.severity == HEALTH_CRITICAL) {
        HEALTH_CRITICAL
    } else if issues.is_empty() {
        HEALTH_HEALTHY
    } else {
        HEALTH_WARNING
    };

    HealthAssessment { status, issues }
}
