//! Webhook alert sink: JSON POST to a configured endpoint.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::alert::{Alert, AlertSink};
use crate::error::EtlError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts alerts as JSON to an HTTP endpoint. Delivery is one-shot; the
/// monitoring service decides whether a failed send matters.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self, EtlError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EtlError::Config(format!("webhook client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, alert: &Alert) -> Result<(), EtlError> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| EtlError::Storage(format!("webhook send: {e}")))?;

        if !response.status().is_success() {
            return Err(EtlError::Storage(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        debug!(level = alert.level.as_str(), "alert delivered to webhook");
        Ok(())
    }
}
