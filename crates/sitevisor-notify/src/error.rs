//! Error types for the notification system

/// Notification error type
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Webhook rejected the message: {0}")]
    WebhookError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("Notifier not configured")]
    NotConfigured,
}

/// Result type alias for notification operations
pub type Result<T> = std::result::Result<T, NotifyError>;

impl NotifyError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        NotifyError::ConfigError(msg.into())
    }

    pub fn webhook<S: Into<String>>(msg: S) -> Self {
        NotifyError::WebhookError(msg.into())
    }
}
