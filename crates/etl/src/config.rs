//! Worker configuration loaded from environment variables.

use validator::Validate;

use cocho_core::backoff::{
    RetryConfig, DEFAULT_BASE_DELAY_MS, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MAX_RETRIES,
};
use cocho_core::health::HealthThresholds;
use cocho_core::types::DbId;

use crate::monitoring::DEFAULT_STALE_AFTER_MINUTES;

/// Worker configuration loaded from environment variables.
///
/// All fields except `DATABASE_URL` have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone, Validate)]
pub struct WorkerConfig {
    /// Postgres connection string (required).
    pub database_url: String,
    /// Base directory for uploaded files (default: `./storage`).
    pub storage_root: String,
    /// Organization the worker monitors (default: `1`).
    pub organization_id: DbId,
    /// Seconds between polls for uploaded files (default: `5`).
    #[validate(range(min = 1, max = 3600))]
    pub poll_interval_secs: u64,
    /// Seconds between health checks (default: `60`).
    #[validate(range(min = 5, max = 86400))]
    pub health_check_interval_secs: u64,
    /// Minutes after which an in-flight file counts as stale.
    #[validate(range(min = 1))]
    pub stale_after_minutes: i64,

    /// Retry budget per operation (default: `3`).
    #[validate(range(max = 10))]
    pub max_retries: u32,
    /// First backoff delay in milliseconds (default: `1000`).
    #[validate(range(min = 100, max = 60_000))]
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds (default: `60000`).
    #[validate(range(min = 1000))]
    pub max_delay_ms: u64,
    /// Exponential backoff multiplier (default: `2.0`).
    #[validate(range(min = 1.0, max = 10.0))]
    pub backoff_multiplier: f64,

    /// Alerting thresholds (see `cocho_core::health`).
    pub dead_letter_warning: u64,
    pub active_retry_warning: u64,
    pub hourly_error_warning: u64,
    /// Optional webhook endpoint for health alerts.
    pub alert_webhook_url: Option<String>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default      |
    /// |------------------------------|--------------|
    /// | `DATABASE_URL`               | required     |
    /// | `STORAGE_ROOT`               | `./storage`  |
    /// | `ORGANIZATION_ID`            | `1`          |
    /// | `POLL_INTERVAL_SECS`         | `5`          |
    /// | `HEALTH_CHECK_INTERVAL_SECS` | `60`         |
    /// | `STALE_AFTER_MINUTES`        | `30`         |
    /// | `ETL_MAX_RETRIES`            | `3`          |
    /// | `ETL_BASE_DELAY_MS`          | `1000`       |
    /// | `ETL_MAX_DELAY_MS`           | `60000`      |
    /// | `ETL_BACKOFF_MULTIPLIER`     | `2.0`        |
    /// | `DEAD_LETTER_WARNING`        | `10`         |
    /// | `ACTIVE_RETRY_WARNING`       | `25`         |
    /// | `HOURLY_ERROR_WARNING`       | `50`         |
    /// | `ALERT_WEBHOOK_URL`          | unset        |
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let storage_root = std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "./storage".into());
        let defaults = HealthThresholds::default();

        Self {
            database_url,
            storage_root,
            organization_id: env_parse("ORGANIZATION_ID", 1),
            poll_interval_secs: env_parse("POLL_INTERVAL_SECS", 5),
            health_check_interval_secs: env_parse("HEALTH_CHECK_INTERVAL_SECS", 60),
            stale_after_minutes: env_parse("STALE_AFTER_MINUTES", DEFAULT_STALE_AFTER_MINUTES),
            max_retries: env_parse("ETL_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            base_delay_ms: env_parse("ETL_BASE_DELAY_MS", DEFAULT_BASE_DELAY_MS),
            max_delay_ms: env_parse("ETL_MAX_DELAY_MS", DEFAULT_MAX_DELAY_MS),
            backoff_multiplier: env_parse("ETL_BACKOFF_MULTIPLIER", DEFAULT_BACKOFF_MULTIPLIER),
            dead_letter_warning: env_parse("DEAD_LETTER_WARNING", defaults.dead_letter_warning),
            active_retry_warning: env_parse("ACTIVE_RETRY_WARNING", defaults.active_retry_warning),
            hourly_error_warning: env_parse("HOURLY_ERROR_WARNING", defaults.hourly_error_warning),
            alert_webhook_url: std::env::var("ALERT_WEBHOOK_URL").ok(),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            backoff_multiplier: self.backoff_multiplier,
            ..RetryConfig::default()
        }
    }

    pub fn thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            dead_letter_warning: self.dead_letter_warning,
            active_retry_warning: self.active_retry_warning,
            hourly_error_warning: self.hourly_error_warning,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(e) => panic!("{name} must parse: {e}"),
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_config_carries_overrides() {
        let config = WorkerConfig {
            database_url: "postgres://localhost/cocho".into(),
            storage_root: "./storage".into(),
            organization_id: 1,
            poll_interval_secs: 5,
            health_check_interval_secs: 60,
            stale_after_minutes: 30,
            max_retries: 5,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 3.0,
            dead_letter_warning: 10,
            active_retry_warning: 25,
            hourly_error_warning: 50,
            alert_webhook_url: None,
        };
        assert!(config.validate().is_ok());
        let retry = config.retry_config();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.base_delay_ms, 500);
        assert_eq!(retry.backoff_multiplier, 3.0);
    }

    #[test]
    fn out_of_range_backoff_multiplier_fails_validation() {
        let config = WorkerConfig {
            database_url: "postgres://localhost/cocho".into(),
            storage_root: "./storage".into(),
            organization_id: 1,
            poll_interval_secs: 5,
            health_check_interval_secs: 60,
            stale_after_minutes: 30,
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_multiplier: 0.5,
            dead_letter_warning: 10,
            active_retry_warning: 25,
            hourly_error_warning: 50,
            alert_webhook_url: None,
        };
        assert!(config.validate().is_err());
    }
}
