//! SQLite document store
//!
//! One `documents` table keyed by `(collection, key)` with a JSON body.
//! Every batch runs inside a single transaction.

use super::{check_batch, check_in_query, Document, DocumentStore, StoreLimits};
use async_trait::async_trait;
use recon_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

fn unavailable(err: sqlx::Error) -> Error {
    Error::RemoteUnavailable(err.to_string())
}

fn decode_body(key: &str, body: &str) -> Result<Document> {
    serde_json::from_str(body)
        .map_err(|e| Error::RemoteUnavailable(format!("Corrupt document '{}': {}", key, e)))
}

fn rows_to_documents(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<(String, Document)>> {
    rows.into_iter()
        .map(|row| {
            let key: String = row.get("key");
            let body: String = row.get("body");
            let doc = decode_body(&key, &body)?;
            Ok((key, doc))
        })
        .collect()
}

pub struct SqliteStore {
    pool: SqlitePool,
    limits: StoreLimits,
}

impl SqliteStore {
    /// Open (or create) the database file and its schema
    pub async fn open(db_path: &Path, limits: StoreLimits) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        debug!("Connecting to document store: {}", db_url);
        let pool = SqlitePool::connect(&db_url).await.map_err(unavailable)?;

        Self::from_pool(pool, limits).await
    }

    /// Wrap an existing pool (e.g. `sqlite::memory:` in tests)
    pub async fn from_pool(pool: SqlitePool, limits: StoreLimits) -> Result<Self> {
        init_tables(&pool).await?;
        Ok(Self { pool, limits })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            key TEXT NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY (collection, key)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(unavailable)?;

    info!("Document store tables initialized");
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    fn limits(&self) -> StoreLimits {
        self.limits
    }

    async fn batch_upsert(&self, collection: &str, docs: &[(String, Document)], merge: bool) -> Result<()> {
        check_batch(self.limits, docs.len())?;

        // json_patch keeps fields absent from the incoming body
        let sql = if merge {
            r#"
            INSERT INTO documents (collection, key, body) VALUES (?, ?, ?)
            ON CONFLICT(collection, key) DO UPDATE SET body = json_patch(documents.body, excluded.body)
            "#
        } else {
            r#"
            INSERT INTO documents (collection, key, body) VALUES (?, ?, ?)
            ON CONFLICT(collection, key) DO UPDATE SET body = excluded.body
            "#
        };

        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        for (key, doc) in docs {
            let body = serde_json::to_string(doc)
                .map_err(|e| Error::Internal(format!("Serialize document '{}': {}", key, e)))?;
            sqlx::query(sql)
                .bind(collection)
                .bind(key)
                .bind(body)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
        }
        tx.commit().await.map_err(unavailable)?;

        debug!(collection, count = docs.len(), merge, "Batch upsert committed");
        Ok(())
    }

    async fn batch_delete(&self, collection: &str, keys: &[String]) -> Result<()> {
        check_batch(self.limits, keys.len())?;

        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        for key in keys {
            sqlx::query("DELETE FROM documents WHERE collection = ? AND key = ?")
                .bind(collection)
                .bind(key)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
        }
        tx.commit().await.map_err(unavailable)?;

        debug!(collection, count = keys.len(), "Batch delete committed");
        Ok(())
    }

    async fn query_in(&self, collection: &str, keys: &[String]) -> Result<Vec<(String, Document)>> {
        check_in_query(self.limits, keys.len())?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; keys.len()].join(", ");
        let sql = format!(
            "SELECT key, body FROM documents WHERE collection = ? AND key IN ({}) ORDER BY key",
            placeholders
        );
        let mut query = sqlx::query(&sql).bind(collection);
        for key in keys {
            query = query.bind(key);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(unavailable)?;
        rows_to_documents(rows)
    }

    async fn query_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<(String, Document)>> {
        let rows = sqlx::query(
            r#"
            SELECT key, body FROM documents
            WHERE collection = ? AND json_extract(body, ?) = ?
            ORDER BY key
            "#,
        )
        .bind(collection)
        .bind(format!("$.\"{}\"", field))
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        rows_to_documents(rows)
    }

    async fn scan_page(&self, collection: &str, after: Option<&str>, limit: usize) -> Result<Vec<(String, Document)>> {
        let rows = sqlx::query(
            r#"
            SELECT key, body FROM documents
            WHERE collection = ? AND (? IS NULL OR key > ?)
            ORDER BY key
            LIMIT ?
            "#,
        )
        .bind(collection)
        .bind(after)
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        rows_to_documents(rows)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;
        let n: i64 = row.get("n");
        Ok(n.max(0) as u64)
    }
}
