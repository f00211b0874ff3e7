//! SQLite-backed [`VectorIndex`].
//!
//! Vectors are little-endian f32 BLOBs, payloads JSON text. Search
//! loads the collection's rows and scores them in process; collections
//! here are small enough that a linear scan beats maintaining an ANN
//! structure.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};

use super::{blob_to_vec, rank, vec_to_blob, Distance, Filter, ScoredPoint, VectorIndex, VectorRecord};

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    /// Wrap a pool and create the schema if missing. Safe to call on
    /// every startup.
    pub async fn open(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vector_collections (
                name TEXT PRIMARY KEY,
                vector_size INTEGER NOT NULL,
                distance TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vector_points (
                collection TEXT NOT NULL,
                id INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                payload TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vector_payload_indexes (
                collection TEXT NOT NULL,
                field TEXT NOT NULL,
                schema_type TEXT NOT NULL,
                PRIMARY KEY (collection, field)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    async fn collection_meta(&self, name: &str) -> Result<(usize, Distance)> {
        let row = sqlx::query("SELECT vector_size, distance FROM vector_collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("collection '{name}'")))?;
        let size: i64 = row.get("vector_size");
        let distance = Distance::parse(&row.get::<String, _>("distance"))?;
        Ok((size as usize, distance))
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn create_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<()> {
        if vector_size == 0 {
            return Err(Error::invalid("vector_size must be > 0"));
        }
        let result = sqlx::query(
            "INSERT OR IGNORE INTO vector_collections (name, vector_size, distance) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(vector_size as i64)
        .bind(distance.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::invalid(format!("collection '{name}' already exists")));
        }
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let present: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM vector_collections WHERE name = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(present)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM vector_collections WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("collection '{name}'")));
        }
        sqlx::query("DELETE FROM vector_points WHERE collection = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM vector_payload_indexes WHERE collection = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM vector_collections ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("name")).collect())
    }

    async fn upsert_points(&self, collection: &str, points: Vec<VectorRecord>) -> Result<()> {
        let (vector_size, _) = self.collection_meta(collection).await?;
        for point in &points {
            if point.vector.len() != vector_size {
                return Err(Error::invalid(format!(
                    "vector size {} does not match collection size {}",
                    point.vector.len(),
                    vector_size
                )));
            }
        }
        for point in points {
            let payload = serde_json::to_string(&point.payload)?;
            sqlx::query(
                r#"
                INSERT INTO vector_points (collection, id, embedding, payload)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    embedding = excluded.embedding,
                    payload = excluded.payload
                "#,
            )
            .bind(collection)
            .bind(point.id as i64)
            .bind(vec_to_blob(&point.vector))
            .bind(payload)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn delete_points(&self, collection: &str, ids: &[u64]) -> Result<()> {
        self.collection_meta(collection).await?;
        for id in ids {
            sqlx::query("DELETE FROM vector_points WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(*id as i64)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>> {
        let (vector_size, distance) = self.collection_meta(collection).await?;
        if vector.len() != vector_size {
            return Err(Error::invalid(format!(
                "query vector size {} does not match collection size {}",
                vector.len(),
                vector_size
            )));
        }

        let rows = sqlx::query("SELECT id, embedding, payload FROM vector_points WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            let payload: HashMap<String, serde_json::Value> =
                serde_json::from_str(&row.get::<String, _>("payload"))?;
            candidates.push((id as u64, blob_to_vec(&blob), payload));
        }

        Ok(rank(
            candidates.into_iter(),
            vector,
            distance,
            filter,
            limit,
            score_threshold,
        ))
    }

    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        schema_type: &str,
    ) -> Result<()> {
        self.collection_meta(collection).await?;
        // INSERT OR IGNORE keeps re-declaration from erroring
        sqlx::query(
            "INSERT OR IGNORE INTO vector_payload_indexes (collection, field, schema_type) VALUES (?, ?, ?)",
        )
        .bind(collection)
        .bind(field)
        .bind(schema_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
