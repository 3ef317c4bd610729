//! Configuration types for notification system

use crate::error::{NotifyError, Result};
use crate::event::VALID_EVENTS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable that overrides the configured webhook URL
pub const WEBHOOK_URL_ENV: &str = "SITEVISOR_WEBHOOK_URL";

/// Default request timeout for webhook delivery
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 5;

/// Get the default notification config path
pub fn notify_config_path() -> PathBuf {
    sitevisor_core::sitevisor_home().join("notify.toml")
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct NotifyConfig {
    /// Webhook notification settings
    pub webhook: Option<WebhookConfig>,

    /// Events to notify on (empty = all events)
    #[serde(default)]
    pub events: Vec<String>,
}

impl NotifyConfig {
    /// Load config from the default path, then apply the env override
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&notify_config_path())?;
        if let Ok(url) = std::env::var(WEBHOOK_URL_ENV) {
            config.apply_url_override(&url);
        }
        Ok(config)
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Notify config not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: NotifyConfig = toml::from_str(&content)?;
        config.validate_events()?;

        debug!("Loaded notify config from {:?}", path);
        Ok(config)
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&notify_config_path())
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, &content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
                tracing::warn!("Failed to set config file permissions: {}", e);
            }
        }

        info!("Saved notify config to {:?}", path);
        Ok(())
    }

    fn apply_url_override(&mut self, url: &str) {
        let url = url.trim();
        if url.is_empty() {
            return;
        }
        match self.webhook.as_mut() {
            Some(webhook) => webhook.url = url.to_string(),
            None => self.webhook = Some(WebhookConfig::new(url)),
        }
    }

    /// Check if any notification channel is configured
    pub fn is_configured(&self) -> bool {
        self.webhook.as_ref().map(|w| !w.url.is_empty()).unwrap_or(false)
    }

    pub fn set_webhook(&mut self, url: String, timeout_secs: Option<u64>) {
        let mut webhook = WebhookConfig::new(url);
        if let Some(secs) = timeout_secs {
            webhook.timeout_secs = secs;
        }
        self.webhook = Some(webhook);
    }

    pub fn remove_webhook(&mut self) {
        self.webhook = None;
    }

    /// Set events to notify on
    pub fn set_events(&mut self, events: Vec<String>) {
        self.events = events;
    }

    /// Validate event names
    pub fn validate_events(&self) -> Result<()> {
        for event in &self.events {
            if !VALID_EVENTS.contains(&event.as_str()) {
                return Err(NotifyError::config(format!(
                    "Invalid event type '{}'. Valid types: {:?}",
                    event, VALID_EVENTS
                )));
            }
        }
        Ok(())
    }
}

/// Webhook endpoint receiving `{"content": "<message>"}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_WEBHOOK_TIMEOUT_SECS
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NotifyConfig::default();
        assert!(config.webhook.is_none());
        assert!(config.events.is_empty());
        assert!(!config.is_configured());
    }

    #[test]
    fn test_load_missing_config() {
        let config = NotifyConfig::load_from(Path::new("/nonexistent/notify.toml")).unwrap();
        assert!(config.webhook.is_none());
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notify.toml");
        std::fs::write(
            &path,
            r#"
events = ["crash", "gave_up"]

[webhook]
url = "https://discord.example/api/webhooks/1/abc"
"#,
        )
        .unwrap();

        let config = NotifyConfig::load_from(&path).unwrap();
        let webhook = config.webhook.unwrap();
        assert_eq!(webhook.url, "https://discord.example/api/webhooks/1/abc");
        assert_eq!(webhook.timeout_secs, DEFAULT_WEBHOOK_TIMEOUT_SECS);
        assert_eq!(config.events, vec!["crash", "gave_up"]);
    }

    #[test]
    fn test_load_rejects_unknown_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notify.toml");
        std::fs::write(&path, "events = [\"memory_limit\"]\n").unwrap();
        assert!(NotifyConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = NotifyConfig::default();
        config.set_webhook("http://127.0.0.1:9/hook".to_string(), Some(2));
        config.set_events(vec!["crash".to_string()]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("notify.toml");
        config.save_to(&path).unwrap();

        let loaded = NotifyConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_url_override() {
        let mut config = NotifyConfig::default();
        config.apply_url_override("  ");
        assert!(!config.is_configured());

        config.apply_url_override("http://hooks.local/a");
        assert!(config.is_configured());

        config.set_webhook("http://hooks.local/b".to_string(), Some(9));
        config.apply_url_override("http://hooks.local/c");
        let webhook = config.webhook.unwrap();
        assert_eq!(webhook.url, "http://hooks.local/c");
        assert_eq!(webhook.timeout_secs, 9);
    }
}
