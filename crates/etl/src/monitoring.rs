//! Monitoring: health checks, retry statistics, and alert fan-out.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use cocho_core::health::{assess_health, HealthIssue, HealthSnapshot, HealthThresholds};
use cocho_core::types::DbId;
use cocho_db::models::dead_letter::ErrorTypeCount;

use crate::alert::{Alert, AlertSink};
use crate::error::EtlError;
use crate::store::{DeadLetterStore, FileRecordStore, RunLogStore};

/// Minutes after which an in-flight file counts as stale.
pub const DEFAULT_STALE_AFTER_MINUTES: i64 = 30;

/// A health check result with the counters it was derived from.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub issues: Vec<HealthIssue>,
    pub dead_letter_queue_size: u64,
    pub active_retries: u64,
    pub stale_files: u64,
    pub errors_last_hour: u64,
}

/// Aggregate retry and outcome statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RetryStatistics {
    pub active_retries: i64,
    pub dead_letter_queue_size: i64,
    /// Files in a terminal status.
    pub total_terminal: i64,
    /// Loaded / terminal; 1.0 when nothing is terminal yet.
    pub success_rate: f64,
    /// Mean retries per terminal file.
    pub average_retries: f64,
}

/// Processing-duration percentiles over loaded files, in seconds.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DurationPercentiles {
    pub p50: f64,
    pub p95: f64,
}

/// Periodic health checker and alert dispatcher.
pub struct MonitoringService<S> {
    store: Arc<S>,
    thresholds: HealthThresholds,
    stale_after_minutes: i64,
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl<S> MonitoringService<S>
where
    S: FileRecordStore + RunLogStore + DeadLetterStore,
{
    pub fn new(store: Arc<S>, thresholds: HealthThresholds) -> Self {
        Self {
            store,
            thresholds,
            stale_after_minutes: DEFAULT_STALE_AFTER_MINUTES,
            sinks: Vec::new(),
        }
    }

    pub fn with_stale_after_minutes(mut self, minutes: i64) -> Self {
        self.stale_after_minutes = minutes;
        self
    }

    pub fn register_sink(&mut self, sink: Arc<dyn AlertSink>) {
        self.sinks.push(sink);
    }

    /// Sample the aggregate counters and assess pipeline health.
    pub async fn health_check(&self, organization_id: DbId) -> Result<HealthReport, EtlError> {
        let now = Utc::now();
        let stale_cutoff = now - Duration::minutes(self.stale_after_minutes);
        let hour_ago = now - Duration::hours(1);

        let dead_letter_queue_size = self.store.count_unresolved(organization_id).await?.max(0) as u64;
        let active_retries = self.store.count_active_retries(organization_id).await?.max(0) as u64;
        let stale_files = self.store.list_stale(organization_id, stale_cutoff).await?.len() as u64;
        let errors_last_hour =
            self.store.count_errors_since(organization_id, hour_ago).await?.max(0) as u64;

        let snapshot = HealthSnapshot {
            dead_letter_queue_size,
            active_retries,
            stale_files,
            errors_last_hour,
        };
        let assessment = assess_health(&snapshot, &self.thresholds);
        Ok(HealthReport {
            status: assessment.status,
            issues: assessment.issues,
            dead_letter_queue_size,
            active_retries,
            stale_files,
            errors_last_hour,
        })
    }

    /// Run a health check and push every finding to all registered
    /// sinks. A failing sink is logged and skipped so the rest still
    /// deliver.
    pub async fn check_alerts(&self, organization_id: DbId) -> Result<HealthReport, EtlError> {
        let report = self.health_check(organization_id).await?;
        if report.issues.is_empty() {
            return Ok(report);
        }
        info!(
            status = report.status,
            issues = report.issues.len(),
            "health check found issues, dispatching alerts"
        );
        for issue in &report.issues {
            let alert = Alert::from_issue(issue);
            for sink in &self.sinks {
                if let Err(error) = sink.send(&alert).await {
                    warn!(sink = sink.name(), %error, "alert delivery failed");
                }
            }
        }
        Ok(report)
    }

    /// Aggregate retry/outcome statistics for the status surface.
    pub async fn retry_statistics(
        &self,
        organization_id: DbId,
    ) -> Result<RetryStatistics, EtlError> {
        let (terminal, loaded, retry_sum) = self.store.terminal_counts(organization_id).await?;
        let active_retries = self.store.count_active_retries(organization_id).await?;
        let dead_letter_queue_size = self.store.count_unresolved(organization_id).await?;

        let (success_rate, average_retries) = if terminal > 0 {
            (loaded as f64 / terminal as f64, retry_sum as f64 / terminal as f64)
        } else {
            (1.0, 0.0)
        };

        Ok(RetryStatistics {
            active_retries,
            dead_letter_queue_size,
            total_terminal: terminal,
            success_rate,
            average_retries,
        })
    }

    /// Unresolved dead-letter counts grouped by classified error kind.
    pub async fn dead_letter_breakdown(
        &self,
        organization_id: DbId,
    ) -> Result<Vec<ErrorTypeCount>, EtlError> {
        Ok(self.store.counts_by_error_type(organization_id).await?)
    }

    /// p50/p95 processing durations over loaded files, or `None` when
    /// nothing has loaded yet.
    pub async fn duration_percentiles(
        &self,
        organization_id: DbId,
    ) -> Result<Option<DurationPercentiles>, EtlError> {
        let mut durations = self.store.loaded_durations_secs(organization_id).await?;
        if durations.is_empty() {
            return Ok(None);
        }
        durations.sort_by(|a, b| a.total_cmp(b));
        Ok(Some(DurationPercentiles {
            p50: percentile(&durations, 0.50),
            p95: percentile(&durations, 0.95),
        }))
    }
}

/// Nearest-rank percentile over an ascending-sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- percentile --

    #[test]
    fn percentile_of_single_value() {
        let values = [42.0];
        assert_eq!(percentile(&values, 0.50), 42.0);
        assert_eq!(percentile(&values, 0.95), 42.0);
    }

    #[test]
    fn percentile_nearest_rank() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert_eq!(percentile(&values, 0.50), 50.0);
        assert_eq!(percentile(&values, 0.95), 95.0);
    }

    #[test]
    fn percentile_small_sample() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.50), 2.0);
        assert_eq!(percentile(&values, 0.95), 4.0);
    }
}
