use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Guid, ReportCategory, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// First report by this reporter.
    Filed,
    /// Existing report overwritten.
    Revised,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationAlert {
    pub comment_id: Guid,
    pub reporter_id: UserId,
    pub category: ReportCategory,
    pub message: String,
    pub kind: AlertKind,
    pub at: DateTime<Utc>,
}

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("transport error: {0}")] Transport(String),
    #[error("sink answered with status {0}")] Status(u16),
}

#[async_trait]
pub trait ModerationNotifier: Send + Sync {
    async fn notify(&self, alert: &ModerationAlert) -> Result<(), NotifyError>;
}

/// Fire and forget. Must be called from within a tokio runtime.
pub fn dispatch(notifier: Arc<dyn ModerationNotifier>, alert: ModerationAlert) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&alert).await {
            tracing::warn!(comment_id = %alert.comment_id, reporter = %alert.reporter_id, "moderation alert dropped: {e}");
        }
    });
}

/// Writes alerts to the log. Used when no webhook is configured.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl ModerationNotifier for LogNotifier {
    async fn notify(&self, alert: &ModerationAlert) -> Result<(), NotifyError> {
        tracing::info!(
            comment_id = %alert.comment_id,
            reporter = %alert.reporter_id,
            category = %alert.category,
            kind = ?alert.kind,
            "comment reported"
        );
        Ok(())
    }
}

/// POSTs each alert as JSON to a moderation webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl ModerationNotifier for WebhookNotifier {
    async fn notify(&self, alert: &ModerationAlert) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(NotifyError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Webhook sink when `webhook_url` is set, log sink otherwise.
pub fn build_notifier(webhook_url: Option<&str>, timeout: Duration) -> Arc<dyn ModerationNotifier> {
    match webhook_url {
        Some(url) => match WebhookNotifier::new(url, timeout) {
            Ok(n) => Arc::new(n),
            Err(e) => {
                tracing::warn!("moderation webhook unusable ({e}); falling back to log sink");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    }
}
