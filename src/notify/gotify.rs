//! Gotify push delivery.
//!
//! POSTs to `<url>/message` with the application token in `X-Gotify-Key`. The body
//! is always rendered as markdown by the client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use super::{Notification, Notifier, NotifyError};
use crate::config::NotifyConfig;

pub struct GotifyNotifier {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    priority: u8,
}

impl GotifyNotifier {
    pub fn new(config: &NotifyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: message_endpoint(&config.gotify_url),
            token: config.gotify_token.clone(),
            priority: config.priority,
        })
    }

    fn payload(&self, notification: &Notification) -> serde_json::Value {
        json!({
            "title": notification.subject,
            "message": notification.body,
            "priority": self.priority,
            "extras": {
                "client::display": { "contentType": "text/markdown" }
            }
        })
    }
}

fn message_endpoint(base: &str) -> String {
    format!("{}/message", base.trim_end_matches('/'))
}

#[async_trait]
impl Notifier for GotifyNotifier {
    fn name(&self) -> &'static str {
        "gotify"
    }

    async fn send_notification(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Gotify-Key", &self.token)
            .json(&self.payload(notification))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                provider: "gotify",
                status,
                body,
            });
        }

        tracing::debug!(subject = %notification.subject, "gotify message delivered");
        Ok(())
    }
}
