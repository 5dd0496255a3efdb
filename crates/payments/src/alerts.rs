//! Operational alert sink.
//!
//! Alerts are for faults that survive retries and will not heal on their
//! own, like a storage layer that keeps rejecting a subscription write.
//! Delivery is fire-and-forget: an alert that cannot be posted is logged
//! and dropped, it never changes the outcome of the operation that raised
//! it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error};
use url::Url;

/// Destination for operational alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Raise an alert. Never fails from the caller's point of view.
    async fn fire(&self, summary: &str, detail: &str);
}

/// Sink used when no alert webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAlerts;

#[async_trait]
impl AlertSink for NoopAlerts {
    async fn fire(&self, summary: &str, detail: &str) {
        debug!(summary, detail, "alert sink not configured, dropping alert");
    }
}

/// Posts alerts to a Slack-style incoming webhook.
#[derive(Debug, Clone)]
pub struct WebhookAlerts {
    http: Client,
    url: Url,
}

#[derive(Serialize)]
struct AlertMessage<'a> {
    text: &'a str,
}

impl WebhookAlerts {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            http: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlerts {
    async fn fire(&self, summary: &str, detail: &str) {
        let text = format!(":rotating_light: {summary}\n{detail}");
        let result = self
            .http
            .post(self.url.clone())
            .json(&AlertMessage { text: &text })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(summary, "alert posted");
            }
            Ok(response) => {
                error!(summary, status = %response.status(), "alert webhook rejected the alert");
            }
            Err(err) => {
                error!(summary, error = %err, "could not post alert");
            }
        }
    }
}
