//! SQLite-backed document collection.
//!
//! Each collection is a table holding one JSON document per row:
//!
//! ```text
//! CREATE TABLE <collection> (id TEXT PRIMARY KEY, body TEXT NOT NULL, updated_at INTEGER NOT NULL)
//! ```

use super::{apply_set, DeleteAck, Document, DocumentCollection, StoreError, StoreResult, UpdateAck};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Document collection stored in a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteCollection {
    pool: Pool<Sqlite>,
    table: String,
}

impl SqliteCollection {
    /// Open (creating if needed) the database at `path` and the table for `collection`.
    pub async fn open(path: impl AsRef<Path>, collection: &str) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // Writes are already serialized upstream; one connection keeps SQLite
        // free of "database is locked" errors.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        Self::with_pool(pool, collection).await
    }

    /// Open an in-memory database (contents vanish with the pool).
    pub async fn open_in_memory(collection: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool, collection).await
    }

    async fn with_pool(pool: Pool<Sqlite>, collection: &str) -> StoreResult<Self> {
        let table = validate_collection_name(collection)?;
        let store = Self { pool, table };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            self.table
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Name of the backing table.
    pub fn collection(&self) -> &str {
        &self.table
    }
}

fn validate_collection_name(name: &str) -> StoreResult<String> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(name.to_string())
    } else {
        Err(StoreError::Backend(format!(
            "invalid collection name '{}': use letters, digits and underscores",
            name
        )))
    }
}

fn parse_body(body: &str) -> StoreResult<Document> {
    match serde_json::from_str(body)? {
        serde_json::Value::Object(document) => Ok(document),
        _ => Err(StoreError::Backend("stored body is not a JSON object".to_string())),
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[async_trait]
impl DocumentCollection for SqliteCollection {
    async fn find_one(&self, id: &str) -> StoreResult<Option<Document>> {
        let body: Option<String> =
            sqlx::query_scalar(&format!("SELECT body FROM {} WHERE id = ?", self.table))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        body.as_deref().map(parse_body).transpose()
    }

    async fn update_one(&self, id: &str, set: Document, upsert: bool) -> StoreResult<UpdateAck> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<String> =
            sqlx::query_scalar(&format!("SELECT body FROM {} WHERE id = ?", self.table))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let existing = existing.as_deref().map(parse_body).transpose()?;
        let matched = u64::from(existing.is_some());

        if existing.is_none() && !upsert {
            tx.rollback().await?;
            return Ok(UpdateAck::default());
        }

        let body = serde_json::to_string(&apply_set(existing, id, set))?;
        sqlx::query(&format!(
            "INSERT INTO {} (id, body, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            self.table
        ))
        .bind(id)
        .bind(body)
        .bind(now_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(UpdateAck {
            matched,
            upserted: matched == 0,
        })
    }

    async fn delete_one(&self, id: &str) -> StoreResult<DeleteAck> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", self.table))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(DeleteAck {
            deleted: result.rows_affected(),
        })
    }
}
