//! Webhook notification backend

use crate::error::{NotifyError, Result};
use crate::event::CommandEvent;
use crate::Notifier;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Request body, the shape chat webhooks (Discord, Mattermost) accept
#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// POSTs each message as JSON to a fixed URL
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }

    /// Create with a custom HTTP client (useful for testing)
    pub fn with_client(url: String, client: reqwest::Client) -> Self {
        Self { url, client }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        if self.url.is_empty() {
            return Err(NotifyError::NotConfigured);
        }

        debug!("Posting webhook message to {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage { content: message })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::webhook(format!("{} {}", status, body.trim())));
        }

        info!("Webhook notification delivered");
        Ok(())
    }

    async fn send_event(&self, event: &CommandEvent) -> Result<()> {
        self.send(&event.format_message()).await
    }

    fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }
}
