//! Log reader for tail queries

use regex::Regex;
use sitevisor_core::{LogEntry, Result, DEFAULT_LOG_LINES, LOG_TAIL_BYTES, MAX_LOG_LINES};
use sitevisor_db::LogsRepository;

/// Format one entry as `[YYYY-MM-DD HH:MM:SS] LEVEL message`
pub fn format_entry(entry: &LogEntry) -> String {
    format!(
        "[{}] {} {}",
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        entry.level,
        entry.message
    )
}

/// Reads the most recent entries of a command for console display
pub struct LogReader {
    repo: LogsRepository,
    max_bytes: usize,
}

impl LogReader {
    pub fn new(repo: LogsRepository) -> Self {
        Self {
            repo,
            max_bytes: LOG_TAIL_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Last `lines` entries (default 100, at most 1000), oldest first, trimmed
    /// to the byte budget by dropping the oldest lines
    pub async fn tail(
        &self,
        command_id: u32,
        lines: Option<usize>,
        grep: Option<&Regex>,
    ) -> Result<Vec<String>> {
        let limit = match lines {
            Some(0) | None => DEFAULT_LOG_LINES,
            Some(n) => n.min(MAX_LOG_LINES),
        };

        let entries = self.repo.recent(command_id, limit).await?;

        let mut out = Vec::with_capacity(entries.len());
        let mut used = 0usize;
        for entry in &entries {
            let line = format_entry(entry);
            if let Some(re) = grep {
                if !re.is_match(&line) {
                    continue;
                }
            }
            let cost = line.len() + 1;
            if used + cost > self.max_bytes {
                break;
            }
            used += cost;
            out.push(line);
        }

        out.reverse();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sitevisor_core::{Command, LogLevel, Site};
    use sitevisor_db::Database;

    #[test]
    fn test_format_entry() {
        let entry = LogEntry {
            id: 1,
            site_id: Some(1),
            command_id: Some(1),
            created_at: chrono::Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap(),
            level: LogLevel::Warning,
            message: "disk almost full".to_string(),
        };
        assert_eq!(
            format_entry(&entry),
            "[2024-03-09 07:05:01] WARNING disk almost full"
        );
    }

    async fn seeded(count: usize) -> (Database, u32, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("test.db")).await.unwrap();
        let site = db.sites().insert(&Site::new("demo")).await.unwrap();
        let command = db
            .commands()
            .insert(&Command::new(site.id, "worker", "true"))
            .await
            .unwrap();
        for i in 0..count {
            let level = if i % 2 == 0 { LogLevel::Info } else { LogLevel::Error };
            db.logs()
                .append(Some(site.id), Some(command.id), level, &format!("line {}", i))
                .await
                .unwrap();
        }
        (db, command.id, dir)
    }

    #[tokio::test]
    async fn test_tail_newest_last() {
        let (db, command_id, _dir) = seeded(5).await;
        let reader = LogReader::new(db.logs());

        let lines = reader.tail(command_id, Some(3), None).await.unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("INFO line 2"));
        assert!(lines[2].ends_with("INFO line 4"));
    }

    #[tokio::test]
    async fn test_tail_byte_budget_keeps_newest() {
        let (db, command_id, _dir) = seeded(10).await;
        let one_line = "[2024-01-01 00:00:00] ERROR line 9".len() + 1;
        let reader = LogReader::new(db.logs()).with_max_bytes(one_line * 2);

        let lines = reader.tail(command_id, None, None).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("line 9"));
    }

    #[tokio::test]
    async fn test_tail_grep() {
        let (db, command_id, _dir) = seeded(6).await;
        let reader = LogReader::new(db.logs());
        let re = Regex::new("ERROR").unwrap();

        let lines = reader.tail(command_id, None, Some(&re)).await.unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.contains("ERROR")));
    }
}
