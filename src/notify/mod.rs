//! Best-effort webhook notifications
//!
//! Callers dispatch notifications off the request path and only log failures.
//! There is no retry and no delivery guarantee.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook answered with status {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Open,
    Click,
}

/// JSON body POSTed to the webhook
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub event: EventKind,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub data: Value,
}

impl Notification {
    pub fn new(event: EventKind, data: Value) -> Self {
        Self {
            event,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            data,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

pub struct WebhookNotifier {
    url: Option<String>,
    client: Client,
}

impl WebhookNotifier {
    /// A notifier without a URL accepts every notification and sends nothing
    pub fn new(url: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("naarad/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self { url, client })
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let Some(url) = self.url.as_deref() else {
            return Ok(());
        };

        let response = self.client.post(url).json(notification).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }

        debug!(url = %url, event = ?notification.event, "webhook delivered");
        Ok(())
    }
}
