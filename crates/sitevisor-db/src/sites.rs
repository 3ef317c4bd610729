//! Sites repository - CRUD operations for deployment targets

use sitevisor_core::{Error, Result, Site, SiteUpdate};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::{db_err, from_db_time, is_unique_violation, to_db_time};

/// Repository for site operations
#[derive(Clone)]
pub struct SitesRepository {
    pool: SqlitePool,
}

impl SitesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new site and return it with its assigned id
    pub async fn insert(&self, site: &Site) -> Result<Site> {
        let result = sqlx::query(
            "INSERT INTO sites (name, directory, base_command, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&site.name)
        .bind(&site.directory)
        .bind(&site.base_command)
        .bind(to_db_time(&site.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::SiteAlreadyExists(site.name.clone())
            } else {
                db_err(e)
            }
        })?;

        let mut stored = site.clone();
        stored.id = result.last_insert_rowid() as u32;
        Ok(stored)
    }

    pub async fn get_by_id(&self, id: u32) -> Result<Option<Site>> {
        let row = sqlx::query(
            "SELECT id, name, directory, base_command, created_at FROM sites WHERE id = ?",
        )
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.as_ref().map(row_to_site))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Site>> {
        let row = sqlx::query(
            "SELECT id, name, directory, base_command, created_at FROM sites WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.as_ref().map(row_to_site))
    }

    pub async fn get_all(&self) -> Result<Vec<Site>> {
        let rows = sqlx::query(
            "SELECT id, name, directory, base_command, created_at FROM sites ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.iter().map(row_to_site).collect())
    }

    /// Apply an update; the name is immutable
    pub async fn update(&self, id: u32, update: &SiteUpdate) -> Result<Site> {
        let mut site = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::SiteNotFound(id.to_string()))?;

        if let Some(dir) = &update.directory {
            site.directory = Some(dir.clone());
        }
        if let Some(prefix) = &update.base_command {
            site.base_command = prefix.clone();
        }

        sqlx::query("UPDATE sites SET directory = ?, base_command = ? WHERE id = ?")
            .bind(&site.directory)
            .bind(&site.base_command)
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(site)
    }

    /// Delete a site; its commands, envs and runs cascade
    pub async fn delete(&self, id: u32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sites WHERE id = ?")
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_site(row: &sqlx::sqlite::SqliteRow) -> Site {
    let id: i64 = row.get("id");
    let created_at: String = row.get("created_at");
    Site {
        id: id as u32,
        name: row.get("name"),
        directory: row.get("directory"),
        base_command: row.get("base_command"),
        created_at: from_db_time(&created_at),
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::setup_db;
    use sitevisor_core::{Error, Site, SiteUpdate};

    #[tokio::test]
    async fn test_insert_and_get_site() {
        let (db, _dir) = setup_db().await;
        let sites = db.sites();

        let site = sites
            .insert(&Site::new("demo").with_directory("/srv/demo"))
            .await
            .unwrap();
        assert!(site.id > 0);

        let loaded = sites.get_by_name("demo").await.unwrap().unwrap();
        assert_eq!(loaded.id, site.id);
        assert_eq!(loaded.directory.as_deref(), Some("/srv/demo"));
        assert!(loaded.base_command.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_site_name() {
        let (db, _dir) = setup_db().await;
        let sites = db.sites();

        sites.insert(&Site::new("demo")).await.unwrap();
        let err = sites.insert(&Site::new("demo")).await.unwrap_err();
        assert!(matches!(err, Error::SiteAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_site() {
        let (db, _dir) = setup_db().await;
        let sites = db.sites();
        let site = sites
            .insert(&Site::new("demo").with_base_command("python3 manage.py"))
            .await
            .unwrap();

        let updated = sites
            .update(
                site.id,
                &SiteUpdate {
                    directory: Some("/srv/new".to_string()),
                    base_command: Some(None),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.directory.as_deref(), Some("/srv/new"));
        assert!(updated.base_command.is_none());

        let missing = sites.update(9999, &SiteUpdate::default()).await;
        assert!(matches!(missing, Err(Error::SiteNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_site() {
        let (db, _dir) = setup_db().await;
        let sites = db.sites();
        let site = sites.insert(&Site::new("demo")).await.unwrap();

        assert!(sites.delete(site.id).await.unwrap());
        assert!(!sites.delete(site.id).await.unwrap());
        assert!(sites.get_all().await.unwrap().is_empty());
    }
}
