//! Runs repository - execution history tracking
//!
//! A run is live while `stop_time` is NULL. Every close is conditional on
//! that, so concurrent observers of the same death never both close it.

use chrono::Utc;
use sitevisor_core::{Result, Run};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::{db_err, from_db_time, to_db_time};

const SELECT_RUN: &str = "SELECT id, command_id, pid, start_time, stop_time, exit_code, \
     manually_stopped, restart_count FROM runs";

/// Repository for run history operations
#[derive(Clone)]
pub struct RunsRepository {
    pool: SqlitePool,
}

impl RunsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new live run
    pub async fn insert(&self, command_id: u32, pid: Option<u32>, restart_count: u32) -> Result<Run> {
        let started_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO runs (command_id, pid, start_time, manually_stopped, restart_count)
            VALUES (?, ?, ?, 0, ?)
            "#,
        )
        .bind(command_id as i64)
        .bind(pid.map(|p| p as i64))
        .bind(to_db_time(&started_at))
        .bind(restart_count as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Run {
            id: result.last_insert_rowid() as u32,
            command_id,
            pid,
            started_at,
            stopped_at: None,
            exit_code: None,
            manually_stopped: false,
            restart_count,
        })
    }

    pub async fn get(&self, run_id: u32) -> Result<Option<Run>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_RUN))
            .bind(run_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.as_ref().map(row_to_run))
    }

    /// Flag a run as stopped by the operator; must precede any signal
    pub async fn mark_manually_stopped(&self, run_id: u32) -> Result<()> {
        sqlx::query("UPDATE runs SET manually_stopped = 1 WHERE id = ?")
            .bind(run_id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    /// Close a live run unconditionally. Returns false if it was already closed.
    pub async fn close(&self, run_id: u32, exit_code: Option<i32>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE runs SET stop_time = ?, exit_code = ? WHERE id = ? AND stop_time IS NULL",
        )
        .bind(to_db_time(&Utc::now()))
        .bind(exit_code)
        .bind(run_id as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    /// Close a live run only if nobody stopped it on purpose.
    ///
    /// Returns true when this call owns the death and should treat it as a
    /// crash; false when the run was stopped manually or already closed.
    pub async fn close_if_crashed(&self, run_id: u32, exit_code: Option<i32>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET stop_time = ?, exit_code = ?
            WHERE id = ? AND stop_time IS NULL AND manually_stopped = 0
            "#,
        )
        .bind(to_db_time(&Utc::now()))
        .bind(exit_code)
        .bind(run_id as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    /// Close every live run carrying `pid` as manually stopped
    pub async fn close_by_pid(&self, pid: u32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET stop_time = ?, manually_stopped = 1
            WHERE pid = ? AND stop_time IS NULL
            "#,
        )
        .bind(to_db_time(&Utc::now()))
        .bind(pid as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    /// All live runs across every command
    pub async fn list_live(&self) -> Result<Vec<Run>> {
        let rows = sqlx::query(&format!("{} WHERE stop_time IS NULL ORDER BY id", SELECT_RUN))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows.iter().map(row_to_run).collect())
    }

    pub async fn live_for_command(&self, command_id: u32) -> Result<Vec<Run>> {
        let rows = sqlx::query(&format!(
            "{} WHERE command_id = ? AND stop_time IS NULL ORDER BY id",
            SELECT_RUN
        ))
        .bind(command_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.iter().map(row_to_run).collect())
    }

    /// Get latest run for a command
    pub async fn get_latest(&self, command_id: u32) -> Result<Option<Run>> {
        let row = sqlx::query(&format!(
            "{} WHERE command_id = ? ORDER BY id DESC LIMIT 1",
            SELECT_RUN
        ))
        .bind(command_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.as_ref().map(row_to_run))
    }

    /// Run history for a command, newest first
    pub async fn get_by_command(&self, command_id: u32, limit: usize) -> Result<Vec<Run>> {
        let rows = sqlx::query(&format!(
            "{} WHERE command_id = ? ORDER BY id DESC LIMIT ?",
            SELECT_RUN
        ))
        .bind(command_id as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.iter().map(row_to_run).collect())
    }
}

fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Run {
    let id: i64 = row.get("id");
    let command_id: i64 = row.get("command_id");
    let pid: Option<i64> = row.get("pid");
    let start_time: String = row.get("start_time");
    let stop_time: Option<String> = row.get("stop_time");
    let restart_count: i64 = row.get("restart_count");

    Run {
        id: id as u32,
        command_id: command_id as u32,
        pid: pid.map(|p| p as u32),
        started_at: from_db_time(&start_time),
        stopped_at: stop_time.as_deref().map(from_db_time),
        exit_code: row.get("exit_code"),
        manually_stopped: row.get("manually_stopped"),
        restart_count: restart_count as u32,
    }
}
