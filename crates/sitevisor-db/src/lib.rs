//! sitevisor Database - SQLite persistence layer

pub mod commands;
pub mod logs;
pub mod runs;
pub mod schema;
pub mod sites;

use chrono::{DateTime, SecondsFormat, Utc};
use sitevisor_core::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub use commands::CommandsRepository;
pub use logs::LogsRepository;
pub use runs::RunsRepository;
pub use sites::SitesRepository;

/// Database connection and operations
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::DbError(e.to_string()))?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        info!("Connecting to database: {}", url);

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| Error::DbError(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
                tracing::warn!("Failed to set database file permissions: {}", e);
            }
        }

        sqlx::query(schema::SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        info!("Database initialized");
        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn sites(&self) -> SitesRepository {
        SitesRepository::new(self.pool.clone())
    }

    pub fn commands(&self) -> CommandsRepository {
        CommandsRepository::new(self.pool.clone())
    }

    pub fn runs(&self) -> RunsRepository {
        RunsRepository::new(self.pool.clone())
    }

    pub fn logs(&self) -> LogsRepository {
        LogsRepository::new(self.pool.clone())
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Timestamps are stored as fixed-width RFC 3339 text so they sort lexically
pub(crate) fn to_db_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn db_err(e: sqlx::Error) -> Error {
    Error::DbError(e.to_string())
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use sitevisor_core::{Command, Site};
    use tempfile::{tempdir, TempDir};

    // Return TempDir to keep it alive during test
    pub async fn setup_db() -> (Database, TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::new(&dir.path().join("test.db")).await.unwrap();
        (db, dir)
    }

    pub async fn setup_db_with_command() -> (Database, Site, Command, TempDir) {
        let (db, dir) = setup_db().await;
        let site = db
            .sites()
            .insert(&Site::new("demo").with_directory("/srv/demo"))
            .await
            .unwrap();
        let command = db
            .commands()
            .insert(&Command::new(site.id, "worker", "echo {msg}").with_env("msg", "hi"))
            .await
            .unwrap();
        (db, site, command, dir)
    }
}
