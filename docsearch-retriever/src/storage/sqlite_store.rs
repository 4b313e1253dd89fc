//! SQLite implementation of [`VectorStore`].
//!
//! Collections and records live in two tables; embeddings are stored as raw
//! `f16` BLOBs and searched by brute force, which stays fast for the corpus sizes
//! a single document folder produces.
//!
//! ```sql
//! CREATE TABLE collections (
//!     name TEXT PRIMARY KEY,
//!     metadata TEXT NOT NULL,          -- JSON object
//!     dimension INTEGER,               -- fixed by the first upsert
//!     created_at TEXT NOT NULL
//! );
//!
//! CREATE TABLE records (
//!     collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
//!     id TEXT NOT NULL,
//!     document_id TEXT NOT NULL,
//!     chunk_index INTEGER NOT NULL,
//!     document TEXT NOT NULL,
//!     embedding BLOB NOT NULL,         -- f16 vector, native endian
//!     metadata TEXT NOT NULL,          -- JSON object
//!     PRIMARY KEY (collection, id)
//! );
//! ```

use super::{
    Collection, DistanceMetric, Include, Metadata, QueryBatch, Record, StoreError, StoreResult,
    VectorStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use half::f16;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File name of the database inside the configured directory.
pub const DB_FILE_NAME: &str = "docsearch.sqlite3";

/// SQLite-backed vector store.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (creating if needed) the store under `dir`.
    pub async fn open(dir: &Path) -> StoreResult<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let db_path = dir.join(DB_FILE_NAME);

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(&db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true),
        )
        .await?;

        tracing::debug!("Opened vector store at {}", db_path.display());
        Self::new_with_pool(pool, Some(db_path)).await
    }

    /// Opens a private in-memory store for tests.
    pub async fn open_memory() -> StoreResult<Self> {
        // Every connection to `:memory:` is a separate database, so the pool must
        // hold on to exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true))
            .await?;
        Self::new_with_pool(pool, None).await
    }

    async fn new_with_pool(pool: SqlitePool, db_path: Option<PathBuf>) -> StoreResult<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool, db_path })
    }

    async fn create_tables(pool: &SqlitePool) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                metadata TEXT NOT NULL,
                dimension INTEGER,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                document TEXT NOT NULL,
                embedding BLOB NOT NULL,
                metadata TEXT NOT NULL,
                PRIMARY KEY (collection, id),
                FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_document ON records(collection, document_id)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Path of the database file, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Close all connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn require_collection(&self, name: &str) -> StoreResult<Collection> {
        self.get_collection(name)
            .await?
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    fn row_to_collection(row: &SqliteRow) -> StoreResult<Collection> {
        let name: String = row.get("name");
        let metadata: String = row.get("metadata");
        let dimension: Option<i64> = row.get("dimension");
        let created_at: DateTime<Utc> = row.get("created_at");

        Ok(Collection {
            name,
            metadata: serde_json::from_str(&metadata)?,
            dimension: dimension.map(|d| d as usize),
            created_at,
        })
    }
}

fn encode_embedding(embedding: &[f16]) -> &[u8] {
    bytemuck::cast_slice::<f16, u8>(embedding)
}

// SQLite hands back byte buffers without any alignment guarantee, so decode by
// value instead of casting the slice.
fn decode_embedding(bytes: &[u8]) -> Vec<f16> {
    bytes
        .chunks_exact(2)
        .map(|pair| f16::from_ne_bytes([pair[0], pair[1]]))
        .collect()
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn get_or_create_collection(
        &self,
        name: &str,
        metadata: Metadata,
    ) -> StoreResult<Collection> {
        let metadata_json = serde_json::to_string(&metadata)?;

        let result = sqlx::query(
            r#"
            INSERT INTO collections (name, metadata, dimension, created_at)
            VALUES (?1, ?2, NULL, ?3)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(&metadata_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!("Created collection '{}'", name);
        }

        self.require_collection(name).await
    }

    async fn get_collection(&self, name: &str) -> StoreResult<Option<Collection>> {
        let row = sqlx::query(
            "SELECT name, metadata, dimension, created_at FROM collections WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_collection).transpose()
    }

    async fn delete_collection(&self, name: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM collections WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_collections(&self) -> StoreResult<Vec<Collection>> {
        let rows = sqlx::query(
            "SELECT name, metadata, dimension, created_at FROM collections ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_collection).collect()
    }

    async fn upsert(&self, collection: &str, records: Vec<Record>) -> StoreResult<usize> {
        let Some(first) = records.first() else {
            self.require_collection(collection).await?;
            return Ok(0);
        };

        let mut tx = self.pool.begin().await?;

        // The first write into a collection fixes its dimension. Claiming it
        // inside the transaction serializes racing first writers.
        sqlx::query("UPDATE collections SET dimension = ?1 WHERE name = ?2 AND dimension IS NULL")
            .bind(first.embedding.len() as i64)
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        let dimension: Option<i64> =
            sqlx::query_scalar("SELECT dimension FROM collections WHERE name = ?1")
                .bind(collection)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let expected = dimension.map_or(first.embedding.len(), |d| d as usize);
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: bad.embedding.len(),
            });
        }

        for record in &records {
            let metadata_json = serde_json::to_string(&record.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO records (collection, id, document_id, chunk_index, document, embedding, metadata)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document_id = excluded.document_id,
                    chunk_index = excluded.chunk_index,
                    document = excluded.document,
                    embedding = excluded.embedding,
                    metadata = excluded.metadata
                "#,
            )
            .bind(collection)
            .bind(&record.id)
            .bind(&record.document_id)
            .bind(record.chunk_index as i64)
            .bind(&record.document)
            .bind(encode_embedding(&record.embedding))
            .bind(&metadata_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(records.len())
    }

    async fn truncate_document(
        &self,
        collection: &str,
        document_id: &str,
        keep_chunks: usize,
    ) -> StoreResult<usize> {
        let result = sqlx::query(
            "DELETE FROM records WHERE collection = ?1 AND document_id = ?2 AND chunk_index >= ?3",
        )
        .bind(collection)
        .bind(document_id)
        .bind(keep_chunks as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn query(
        &self,
        collection: &str,
        query_embeddings: &[Vec<f16>],
        n_results: usize,
        include: Include,
    ) -> StoreResult<QueryBatch> {
        let existing = self.require_collection(collection).await?;
        let metric: DistanceMetric = existing.distance_metric();

        if let Some(expected) = existing.dimension {
            if let Some(bad) = query_embeddings.iter().find(|q| q.len() != expected) {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        let rows = sqlx::query(
            "SELECT id, document, embedding, metadata FROM records WHERE collection = ?1",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let candidates: Vec<(String, String, Vec<f16>, String)> = rows
            .iter()
            .map(|row| {
                let embedding: Vec<u8> = row.get("embedding");
                (
                    row.get("id"),
                    row.get("document"),
                    decode_embedding(&embedding),
                    row.get("metadata"),
                )
            })
            .collect();

        let mut batch = QueryBatch {
            documents: Some(Vec::with_capacity(query_embeddings.len())),
            distances: Some(Vec::with_capacity(query_embeddings.len())),
            metadatas: include.metadatas.then(Vec::new),
            ..QueryBatch::default()
        };

        for query in query_embeddings {
            let mut scored: Vec<(usize, f32)> = candidates
                .iter()
                .enumerate()
                .map(|(i, (_, _, embedding, _))| (i, metric.distance(query, embedding)))
                .collect();
            scored.sort_by(|a, b| a.1.total_cmp(&b.1));
            scored.truncate(n_results);

            let mut ids = Vec::with_capacity(scored.len());
            let mut documents = Vec::with_capacity(scored.len());
            let mut distances = Vec::with_capacity(scored.len());
            let mut metadatas = Vec::with_capacity(scored.len());

            for (i, distance) in scored {
                let (id, document, _, metadata) = &candidates[i];
                ids.push(id.clone());
                documents.push(document.clone());
                distances.push(distance);
                if include.metadatas {
                    metadatas.push(serde_json::from_str::<Metadata>(metadata)?);
                }
            }

            batch.ids.push(ids);
            if let Some(all) = batch.documents.as_mut() {
                all.push(documents);
            }
            if let Some(all) = batch.distances.as_mut() {
                all.push(distances);
            }
            if let Some(all) = batch.metadatas.as_mut() {
                all.push(metadatas);
            }
        }

        Ok(batch)
    }

    async fn count(&self, collection: &str) -> StoreResult<usize> {
        self.require_collection(collection).await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?1")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;

        for id in ids {
            let result = sqlx::query("DELETE FROM records WHERE collection = ?1 AND id = ?2")
                .bind(collection)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(removed)
    }
}
