use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::error::NotificationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    PoisonMessage,
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoisonMessage => write!(f, "poison_message"),
        }
    }
}

/// Best-effort alert delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        title: &str,
        body: &str,
        category: NotificationCategory,
    ) -> Result<(), NotificationError>;
}

/// Writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        title: &str,
        body: &str,
        category: NotificationCategory,
    ) -> Result<(), NotificationError> {
        info!(%category, title, body, "Notification");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    body: &'a str,
    category: NotificationCategory,
}

/// POSTs alerts as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(
        &self,
        title: &str,
        body: &str,
        category: NotificationCategory,
    ) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload {
                title,
                body,
                category,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}
