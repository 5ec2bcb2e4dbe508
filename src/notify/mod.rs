//! Outbound notifications.
//!
//! The scheduler talks to a [`Notifier`]; which one is built is decided by
//! `[notify] provider` in the config.

pub mod gotify;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::NotifyConfig;

pub use gotify::GotifyNotifier;

/// A rendered message plus the structured data it was rendered from.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub subject: String,
    /// Markdown body.
    pub body: String,
    pub context: serde_json::Value,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Provider name, for logs.
    fn name(&self) -> &'static str;

    async fn send_notification(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send_notification(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            subject = %notification.subject,
            body = %notification.body,
            "notification"
        );
        Ok(())
    }
}

/// Build the notifier selected by `config.provider`.
pub fn create_notifier(config: &NotifyConfig) -> Result<Arc<dyn Notifier>> {
    match config.provider.as_str() {
        "log" => Ok(Arc::new(LogNotifier)),
        "gotify" => {
            if config.gotify_url.is_empty() || config.gotify_token.is_empty() {
                bail!("gotify provider requires notify.gotify_url and notify.gotify_token");
            }
            Ok(Arc::new(GotifyNotifier::new(config)?))
        }
        other => bail!("unknown notify provider: '{other}'. Use 'log' or 'gotify'"),
    }
}
