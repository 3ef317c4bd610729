//! sitevisor Notification System
//!
//! Delivers command events (crashes, give-ups, starts, stops) to an
//! operator-configured webhook. Delivery is best effort: callers log
//! failures and carry on.

pub mod config;
mod error;
mod event;
#[cfg(test)]
pub mod mock;
mod webhook;

pub use config::{notify_config_path, NotifyConfig, WebhookConfig, WEBHOOK_URL_ENV};
pub use error::{NotifyError, Result};
pub use event::{CommandEvent, VALID_EVENTS};
pub use webhook::WebhookNotifier;

use async_trait::async_trait;
use std::time::Duration;

/// Trait for notification backends
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a plain text message
    async fn send(&self, message: &str) -> Result<()>;

    /// Send a formatted command event
    async fn send_event(&self, event: &CommandEvent) -> Result<()>;

    /// Check if the notifier is configured and ready
    fn is_configured(&self) -> bool;
}

/// Manager for all notification channels
pub struct NotificationManager {
    webhook: Option<WebhookNotifier>,
    config: NotifyConfig,
}

impl NotificationManager {
    /// Create a new notification manager from config
    pub fn new(config: NotifyConfig) -> Result<Self> {
        let webhook = match config.webhook.as_ref().filter(|w| !w.url.is_empty()) {
            Some(wc) => Some(WebhookNotifier::new(
                wc.url.clone(),
                Duration::from_secs(wc.timeout_secs.max(1)),
            )?),
            None => None,
        };

        Ok(Self { webhook, config })
    }

    /// A manager with no channels
    pub fn disabled() -> Self {
        Self {
            webhook: None,
            config: NotifyConfig::default(),
        }
    }

    /// Create a notification manager by loading config from default path
    pub fn from_config_file() -> Result<Self> {
        Self::new(NotifyConfig::load()?)
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.config
    }

    /// Check if this event type should trigger a notification
    fn should_notify(&self, event: &CommandEvent) -> bool {
        if self.config.events.is_empty() {
            return true;
        }

        let event_type = event.event_type();
        self.config.events.iter().any(|e| e == event_type)
    }
}

#[async_trait]
impl Notifier for NotificationManager {
    async fn send(&self, message: &str) -> Result<()> {
        if let Some(ref webhook) = self.webhook {
            webhook.send(message).await?;
        }
        Ok(())
    }

    async fn send_event(&self, event: &CommandEvent) -> Result<()> {
        if !self.should_notify(event) {
            return Ok(());
        }
        if let Some(ref webhook) = self.webhook {
            webhook.send_event(event).await?;
        }
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.webhook
            .as_ref()
            .map(|w| w.is_configured())
            .unwrap_or(false)
    }
}
