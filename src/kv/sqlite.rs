//! SQLite-backed [`KvStore`].
//!
//! One `kv(key TEXT PRIMARY KEY, value BLOB)` table. SQLite's default
//! BINARY collation on TEXT gives the byte-order range scans the key
//! layout relies on.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::error::Result;

use super::KvStore;

pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    /// Wrap a pool and create the schema if missing. Safe to call on
    /// every startup.
    pub async fn open(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("value")))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let present: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM kv WHERE key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
        Ok(present)
    }

    async fn range_scan(&self, start: &str, end_inclusive: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let rows = sqlx::query("SELECT key, value FROM kv WHERE key >= ? AND key <= ? ORDER BY key")
            .bind(start)
            .bind(end_inclusive)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("key"), r.get::<Vec<u8>, _>("value")))
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM kv").execute(&self.pool).await?;
        Ok(())
    }

    async fn compact(&self) -> Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}
