//! Per-command log sink

use sitevisor_core::{LogLevel, Result};
use sitevisor_db::LogsRepository;
use tracing::{error, info, warn};

/// Appends durable log entries for one site/command and mirrors them to tracing
#[derive(Clone)]
pub struct CommandLog {
    repo: LogsRepository,
    site_id: Option<u32>,
    command_id: Option<u32>,
    label: String,
}

impl CommandLog {
    pub fn new(
        repo: LogsRepository,
        site_id: Option<u32>,
        command_id: Option<u32>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            site_id,
            command_id,
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn command_id(&self) -> Option<u32> {
        self.command_id
    }

    /// Append an entry, returning persistence errors to the caller
    pub async fn append(&self, level: LogLevel, message: &str) -> Result<()> {
        match level {
            LogLevel::Info => info!(target: "sitevisor::command", "[{}] {}", self.label, message),
            LogLevel::Warning => warn!(target: "sitevisor::command", "[{}] {}", self.label, message),
            LogLevel::Error => error!(target: "sitevisor::command", "[{}] {}", self.label, message),
        }
        self.repo
            .append(self.site_id, self.command_id, level, message)
            .await
            .map(|_| ())
    }

    async fn record(&self, level: LogLevel, message: &str) {
        if let Err(e) = self.append(level, message).await {
            warn!("[{}] failed to persist log entry: {}", self.label, e);
        }
    }

    pub async fn info(&self, message: impl AsRef<str>) {
        self.record(LogLevel::Info, message.as_ref()).await;
    }

    pub async fn warning(&self, message: impl AsRef<str>) {
        self.record(LogLevel::Warning, message.as_ref()).await;
    }

    pub async fn error(&self, message: impl AsRef<str>) {
        self.record(LogLevel::Error, message.as_ref()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitevisor_core::{Command, Site};
    use sitevisor_db::Database;

    #[tokio::test]
    async fn test_sink_persists_levels() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("test.db")).await.unwrap();
        let site = db.sites().insert(&Site::new("demo")).await.unwrap();
        let command = db
            .commands()
            .insert(&Command::new(site.id, "worker", "true"))
            .await
            .unwrap();

        let log = CommandLog::new(db.logs(), Some(site.id), Some(command.id), "demo/worker");
        log.info("started").await;
        log.warning("slow").await;
        log.error("boom").await;

        let entries = db.logs().recent(command.id, 10).await.unwrap();
        let levels: Vec<LogLevel> = entries.iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![LogLevel::Error, LogLevel::Warning, LogLevel::Info]);
        assert!(entries.iter().all(|e| e.site_id == Some(site.id)));
    }
}
