use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use treehole_core::CacheError;

use crate::store::{CacheEntry, CacheStore};

/// SQLite backend. Payloads are stored as JSON, `written_at` as unix seconds.
#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    /// Opens (creating if needed) the database at `url` and ensures the
    /// cache table exists.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        ensure_parent_dir(url)?;

        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool);
        store.run_migrations().await?;
        info!("SQLite result cache ready at {}", url);
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_cache (
                cache_key TEXT PRIMARY KEY NOT NULL,
                keyword TEXT NOT NULL,
                payload TEXT NOT NULL,
                written_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes entries written before `cutoff_unix`. Returns the number removed.
    pub async fn purge_older_than(&self, cutoff_unix: i64) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM search_cache WHERE written_at < ?")
            .bind(cutoff_unix)
            .execute(&self.pool)
            .await?;

        debug!("Purged {} stale cache rows", result.rows_affected());
        Ok(result.rows_affected())
    }
}

fn ensure_parent_dir(url: &str) -> Result<(), CacheError> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);

    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| CacheError::Unavailable {
                reason: format!("cannot create {}: {}", parent.display(), e),
            }),
        _ => Ok(()),
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row = sqlx::query(
            "SELECT keyword, payload, written_at FROM search_cache WHERE cache_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let keyword: String = row.try_get("keyword")?;
        let payload: String = row.try_get("payload")?;
        let written_at: i64 = row.try_get("written_at")?;

        let corrupt = || CacheError::CorruptEntry {
            key: key.to_string(),
        };
        let payload = serde_json::from_str(&payload).map_err(|_| corrupt())?;
        let written_at = Utc.timestamp_opt(written_at, 0).single().ok_or_else(corrupt)?;

        Ok(Some(CacheEntry {
            key: key.to_string(),
            keyword,
            payload,
            written_at,
        }))
    }

    async fn store(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let payload = serde_json::to_string(&entry.payload).map_err(|_| CacheError::CorruptEntry {
            key: entry.key.clone(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO search_cache (cache_key, keyword, payload, written_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET
                keyword = excluded.keyword,
                payload = excluded.payload,
                written_at = excluded.written_at
            "#,
        )
        .bind(&entry.key)
        .bind(&entry.keyword)
        .bind(payload)
        .bind(entry.written_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_dir_created_for_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/nested/cache.db", dir.path().display());
        ensure_parent_dir(&url).unwrap();
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn test_memory_url_needs_no_dir() {
        assert!(ensure_parent_dir("sqlite::memory:").is_ok());
    }
}
