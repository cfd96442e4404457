//! SQLite storage backend for ChainFeed.
//!
//! Persists the event log and checkpoints to a single SQLite file.
//! Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use chainfeed_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./chainfeed.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainfeed_core::{Checkpoint, CheckpointStore, Event, EventStore, FeedError, Height};

fn storage_err(e: sqlx::Error) -> FeedError {
    FeedError::Storage(e.to_string())
}

/// SQLite-backed event log and checkpoint store.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./chainfeed.db"`) or a full
    /// SQLite URL (`"sqlite:./chainfeed.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, FeedError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, FeedError> {
        // Every connection to `:memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), FeedError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                consumer_id TEXT    NOT NULL PRIMARY KEY,
                height      INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        // One row per recorded height, including heights without events.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS recorded_heights (
                height      INTEGER NOT NULL PRIMARY KEY,
                event_count INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS events (
                height   INTEGER NOT NULL,
                seq      INTEGER NOT NULL,
                name     TEXT    NOT NULL,
                version  INTEGER NOT NULL,
                payload  TEXT    NOT NULL,
                PRIMARY KEY (height, seq)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_name ON events (name);")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }

    /// Total number of stored events.
    pub async fn event_count(&self) -> Result<u64, FeedError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM events")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

// ─── EventStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl EventStore for SqliteStorage {
    async fn append(&self, height: Height, events: Vec<Event>) -> Result<(), FeedError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO recorded_heights (height, event_count) VALUES (?, ?)",
        )
        .bind(height as i64)
        .bind(events.len() as i64)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await.map_err(storage_err)?;
            tracing::warn!(height, events = events.len(), "height already recorded, ignoring append");
            return Ok(());
        }

        for (seq, event) in events.iter().enumerate() {
            let payload = serde_json::to_string(&event.payload)
                .map_err(|e| FeedError::Storage(e.to_string()))?;
            sqlx::query(
                "INSERT INTO events (height, seq, name, version, payload) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(height as i64)
            .bind(seq as i64)
            .bind(&event.name)
            .bind(event.version as i64)
            .bind(&payload)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(height, events = events.len(), "events appended");
        Ok(())
    }

    async fn get_all_by_height(&self, height: Height) -> Result<Vec<Event>, FeedError> {
        let rows = sqlx::query(
            "SELECT name, version, payload FROM events WHERE height = ? ORDER BY seq",
        )
        .bind(height as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: String = row.get("payload");
            let payload = serde_json::from_str(&payload).map_err(|e| {
                FeedError::Storage(format!("corrupt event payload at height {height}: {e}"))
            })?;
            events.push(Event {
                name: row.get("name"),
                height,
                version: row.get::<i64, _>("version") as u32,
                payload,
            });
        }
        Ok(events)
    }

    async fn latest_height(&self) -> Result<Option<Height>, FeedError> {
        let row = sqlx::query("SELECT MAX(height) as latest FROM recorded_heights")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.get::<Option<i64>, _>("latest").map(|h| h as Height))
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn load(&self, consumer_id: &str) -> Result<Option<Checkpoint>, FeedError> {
        let row = sqlx::query(
            "SELECT consumer_id, height, updated_at FROM checkpoints WHERE consumer_id = ?",
        )
        .bind(consumer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| Checkpoint {
            consumer_id: r.get("consumer_id"),
            height: r.get::<i64, _>("height") as Height,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), FeedError> {
        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints (consumer_id, height, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(&checkpoint.consumer_id)
        .bind(checkpoint.height as i64)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(
            consumer_id = %checkpoint.consumer_id,
            height = checkpoint.height,
            "checkpoint saved"
        );
        Ok(())
    }

    async fn delete(&self, consumer_id: &str) -> Result<(), FeedError> {
        sqlx::query("DELETE FROM checkpoints WHERE consumer_id = ?")
            .bind(consumer_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
