//! Logs repository - append-only per-command log entries

use chrono::Utc;
use sitevisor_core::{LogEntry, LogLevel, Result};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::{db_err, from_db_time, to_db_time};

/// Repository for log entries
#[derive(Clone)]
pub struct LogsRepository {
    pool: SqlitePool,
}

impl LogsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one entry and return its id
    pub async fn append(
        &self,
        site_id: Option<u32>,
        command_id: Option<u32>,
        level: LogLevel,
        message: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            "INSERT INTO logs (site_id, command_id, created_at, level, message) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(site_id.map(|id| id as i64))
        .bind(command_id.map(|id| id as i64))
        .bind(to_db_time(&Utc::now()))
        .bind(level.as_str())
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.last_insert_rowid() as u64)
    }

    /// Most recent entries for a command, newest first
    pub async fn recent(&self, command_id: u32, limit: usize) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, site_id, command_id, created_at, level, message
            FROM logs
            WHERE command_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(command_id as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_entry).collect()
    }

    /// Count entries for a command, optionally at one level
    pub async fn count(&self, command_id: u32, level: Option<LogLevel>) -> Result<u64> {
        let row: (i64,) = match level {
            Some(level) => {
                sqlx::query_as("SELECT COUNT(*) FROM logs WHERE command_id = ? AND level = ?")
                    .bind(command_id as i64)
                    .bind(level.as_str())
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM logs WHERE command_id = ?")
                    .bind(command_id as i64)
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(db_err)?;

        Ok(row.0 as u64)
    }

    /// Delete every entry of one command
    pub async fn delete_by_command(&self, command_id: u32) -> Result<u64> {
        let result = sqlx::query("DELETE FROM logs WHERE command_id = ?")
            .bind(command_id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected())
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<LogEntry> {
    let id: i64 = row.get("id");
    let site_id: Option<i64> = row.get("site_id");
    let command_id: Option<i64> = row.get("command_id");
    let created_at: String = row.get("created_at");
    let level: String = row.get("level");

    Ok(LogEntry {
        id: id as u64,
        site_id: site_id.map(|v| v as u32),
        command_id: command_id.map(|v| v as u32),
        created_at: from_db_time(&created_at),
        level: level.parse()?,
        message: row.get("message"),
    })
}

#[cfg(test)]
mod tests {
    use crate::test_support::setup_db_with_command;
    use sitevisor_core::LogLevel;

    #[tokio::test]
    async fn test_append_and_recent() {
        let (db, site, command, _dir) = setup_db_with_command().await;
        let logs = db.logs();

        for i in 0..5 {
            logs.append(Some(site.id), Some(command.id), LogLevel::Info, &format!("line {}", i))
                .await
                .unwrap();
        }
        logs.append(Some(site.id), Some(command.id), LogLevel::Error, "boom")
            .await
            .unwrap();

        let recent = logs.recent(command.id, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].message, "boom");
        assert_eq!(recent[0].level, LogLevel::Error);
        assert_eq!(recent[1].message, "line 4");
        assert_eq!(recent[2].message, "line 3");
    }

    #[tokio::test]
    async fn test_count_by_level() {
        let (db, site, command, _dir) = setup_db_with_command().await;
        let logs = db.logs();
        logs.append(Some(site.id), Some(command.id), LogLevel::Info, "a")
            .await
            .unwrap();
        logs.append(Some(site.id), Some(command.id), LogLevel::Warning, "b")
            .await
            .unwrap();

        assert_eq!(logs.count(command.id, None).await.unwrap(), 2);
        assert_eq!(logs.count(command.id, Some(LogLevel::Warning)).await.unwrap(), 1);
        assert_eq!(logs.count(command.id, Some(LogLevel::Error)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_logs_survive_command_deletion() {
        let (db, site, command, _dir) = setup_db_with_command().await;
        let logs = db.logs();
        let id = logs
            .append(Some(site.id), Some(command.id), LogLevel::Info, "kept")
            .await
            .unwrap();

        db.sites().delete(site.id).await.unwrap();

        let row: (Option<i64>, Option<i64>, String) =
            sqlx::query_as("SELECT site_id, command_id, message FROM logs WHERE id = ?")
                .bind(id as i64)
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(row, (None, None, "kept".to_string()));
    }

    #[tokio::test]
    async fn test_delete_by_command() {
        let (db, site, command, _dir) = setup_db_with_command().await;
        let logs = db.logs();
        logs.append(Some(site.id), Some(command.id), LogLevel::Info, "x")
            .await
            .unwrap();

        assert_eq!(logs.delete_by_command(command.id).await.unwrap(), 1);
        assert!(logs.recent(command.id, 10).await.unwrap().is_empty());
    }
}
