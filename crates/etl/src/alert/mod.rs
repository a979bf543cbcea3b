//! Alert delivery for health-check findings.

pub mod webhook;

use async_trait::async_trait;
use serde::Serialize;

use cocho_core::health::{HealthIssue, HEALTH_CRITICAL};
use cocho_core::types::Timestamp;

use crate::error::EtlError;

/// Alert severity, mirroring health-issue severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

/// An alert ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub triggered_at: Timestamp,
}

impl Alert {
    /// Build an alert from a health-check finding.
    pub fn from_issue(issue: &HealthIssue) -> Self {
        let level = if issue.severity == HEALTH_CRITICAL {
            AlertLevel::Critical
        } else {
            AlertLevel::Warning
        };
        Self {
            level,
            title: format!("Pipeline health: {}", level.as_str()),
            message: issue.message.clone(),
            triggered_at: chrono::Utc::now(),
        }
    }
}

/// A delivery channel for alerts. Sink failures are isolated by the
/// monitoring service; one broken channel never blocks the others.
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, alert: &Alert) -> Result<(), EtlError>;
}
