//! Commands repository - CRUD operations for site commands and their envs

use sitevisor_core::{Command, CommandRef, CommandUpdate, Error, Result};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::BTreeMap;

use crate::{db_err, from_db_time, is_unique_violation, to_db_time};

const SELECT_COMMAND: &str =
    "SELECT c.id, c.site_id, c.name, c.template, c.active, c.created_at FROM commands c";

/// Repository for command operations
#[derive(Clone)]
pub struct CommandsRepository {
    pool: SqlitePool,
}

impl CommandsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a command together with its envs in one transaction
    pub async fn insert(&self, command: &Command) -> Result<Command> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let result = sqlx::query(
            "INSERT INTO commands (site_id, name, template, active, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(command.site_id as i64)
        .bind(&command.name)
        .bind(&command.template)
        .bind(command.active)
        .bind(to_db_time(&command.created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::CommandAlreadyExists(command.name.clone())
            } else {
                db_err(e)
            }
        })?;
        let id = result.last_insert_rowid() as u32;

        for (key, value) in &command.envs {
            sqlx::query("INSERT INTO command_envs (command_id, key, value) VALUES (?, ?, ?)")
                .bind(id as i64)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;

        let mut stored = command.clone();
        stored.id = id;
        Ok(stored)
    }

    pub async fn get_by_id(&self, id: u32) -> Result<Option<Command>> {
        let row = sqlx::query(&format!("{} WHERE c.id = ?", SELECT_COMMAND))
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        self.hydrate_optional(row).await
    }

    pub async fn get_by_name(&self, site_id: u32, name: &str) -> Result<Option<Command>> {
        let row = sqlx::query(&format!(
            "{} WHERE c.site_id = ? AND c.name = ?",
            SELECT_COMMAND
        ))
        .bind(site_id as i64)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        self.hydrate_optional(row).await
    }

    /// Look up a command by id or by `site/command`
    pub async fn get_by_ref(&self, selector: &CommandRef) -> Result<Option<Command>> {
        match selector {
            CommandRef::Id(id) => self.get_by_id(*id).await,
            CommandRef::Name { site, command } => {
                let row = sqlx::query(&format!(
                    "{} JOIN sites s ON s.id = c.site_id WHERE s.name = ? AND c.name = ?",
                    SELECT_COMMAND
                ))
                .bind(site)
                .bind(command)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

                self.hydrate_optional(row).await
            }
        }
    }

    /// List commands, optionally restricted to one site
    pub async fn list(&self, site_id: Option<u32>) -> Result<Vec<Command>> {
        let rows = match site_id {
            Some(site_id) => {
                sqlx::query(&format!(
                    "{} WHERE c.site_id = ? ORDER BY c.id",
                    SELECT_COMMAND
                ))
                .bind(site_id as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!("{} ORDER BY c.id", SELECT_COMMAND))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(db_err)?;

        let mut commands = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut command = row_to_command(row);
            command.envs = self.load_envs(command.id).await?;
            commands.push(command);
        }
        Ok(commands)
    }

    pub async fn update(&self, id: u32, update: &CommandUpdate) -> Result<Command> {
        let mut command = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::CommandNotFound(id.to_string()))?;

        if let Some(name) = &update.name {
            command.name = name.clone();
        }
        if let Some(template) = &update.template {
            command.template = template.clone();
        }
        if let Some(active) = update.active {
            command.active = active;
        }

        sqlx::query("UPDATE commands SET name = ?, template = ?, active = ? WHERE id = ?")
            .bind(&command.name)
            .bind(&command.template)
            .bind(command.active)
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::CommandAlreadyExists(command.name.clone())
                } else {
                    db_err(e)
                }
            })?;

        Ok(command)
    }

    /// Replace the full env set atomically
    pub async fn replace_envs(&self, id: u32, envs: &BTreeMap<String, String>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM command_envs WHERE command_id = ?")
            .bind(id as i64)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for (key, value) in envs {
            sqlx::query("INSERT INTO command_envs (command_id, key, value) VALUES (?, ?, ?)")
                .bind(id as i64)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }

    pub async fn delete(&self, id: u32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM commands WHERE id = ?")
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_envs(&self, id: u32) -> Result<BTreeMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM command_envs WHERE command_id = ?")
            .bind(id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>("key"), row.get::<String, _>("value")))
            .collect())
    }

    async fn hydrate_optional(
        &self,
        row: Option<sqlx::sqlite::SqliteRow>,
    ) -> Result<Option<Command>> {
        match row {
            Some(row) => {
                let mut command = row_to_command(&row);
                command.envs = self.load_envs(command.id).await?;
                Ok(Some(command))
            }
            None => Ok(None),
        }
    }
}

fn row_to_command(row: &sqlx::sqlite::SqliteRow) -> Command {
    let id: i64 = row.get("id");
    let site_id: i64 = row.get("site_id");
    let created_at: String = row.get("created_at");
    Command {
        id: id as u32,
        site_id: site_id as u32,
        name: row.get("name"),
        template: row.get("template"),
        active: row.get("active"),
        envs: BTreeMap::new(),
        created_at: from_db_time(&created_at),
    }
}
