//! Checkpoints — the durable "last processed height" of each consumer.
//!
//! Every consumer (the block sync loop, each projection) owns exactly one
//! checkpoint, keyed by its consumer id. Only the owning loop advances it,
//! so no cross-task locking is needed beyond what the store itself does.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::types::Height;

/// A persisted checkpoint for one consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Consumer identifier (`"chain-sync"` or a projection id).
    pub consumer_id: String,
    /// Last successfully processed height.
    pub height: Height,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

/// Trait for storing and loading checkpoints.
///
/// Implementations include `MemoryCheckpointStore` and the storage backends in
/// `chainfeed-storage`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for a consumer.
    async fn load(&self, consumer_id: &str) -> Result<Option<Checkpoint>, FeedError>;

    /// Save (upsert) a checkpoint.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), FeedError>;

    /// Delete a checkpoint (e.g. when resetting a projection).
    async fn delete(&self, consumer_id: &str) -> Result<(), FeedError>;
}

/// A checkpoint store bound to a single consumer id.
#[derive(Clone)]
pub struct Checkpointer {
    store: Arc<dyn CheckpointStore>,
    consumer_id: String,
}

impl Checkpointer {
    pub fn new(store: Arc<dyn CheckpointStore>, consumer_id: impl Into<String>) -> Self {
        Self {
            store,
            consumer_id: consumer_id.into(),
        }
    }

    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    /// Last committed height, `None` if the consumer never committed one.
    pub async fn last_height(&self) -> Result<Option<Height>, FeedError> {
        Ok(self.store.load(&self.consumer_id).await?.map(|cp| cp.height))
    }

    /// Durably record `height` as processed.
    pub async fn commit(&self, height: Height) -> Result<(), FeedError> {
        let cp = Checkpoint {
            consumer_id: self.consumer_id.clone(),
            height,
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.store.save(cp).await
    }

    /// Forget the checkpoint so the consumer starts over from height 1.
    pub async fn reset(&self) -> Result<(), FeedError> {
        self.store.delete(&self.consumer_id).await
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory checkpoint store for tests and ephemeral pipelines.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Checkpoint>>, FeedError> {
        self.data
            .lock()
            .map_err(|_| FeedError::Storage("checkpoint map poisoned".into()))
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, consumer_id: &str) -> Result<Option<Checkpoint>, FeedError> {
        Ok(self.data()?.get(consumer_id).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), FeedError> {
        self.data()?
            .insert(checkpoint.consumer_id.clone(), checkpoint);
        Ok(())
    }

    async fn delete(&self, consumer_id: &str) -> Result<(), FeedError> {
        self.data()?.remove(consumer_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let sync = Checkpointer::new(store, "chain-sync");

        assert_eq!(sync.last_height().await.unwrap(), None);

        sync.commit(1000).await.unwrap();
        assert_eq!(sync.last_height().await.unwrap(), Some(1000));

        sync.commit(1001).await.unwrap();
        assert_eq!(sync.last_height().await.unwrap(), Some(1001));
    }

    #[tokio::test]
    async fn consumers_are_isolated() {
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        let sync = Checkpointer::new(store.clone(), "chain-sync");
        let blocks = Checkpointer::new(store.clone(), "block");

        sync.commit(50).await.unwrap();
        blocks.commit(7).await.unwrap();

        assert_eq!(sync.last_height().await.unwrap(), Some(50));
        assert_eq!(blocks.last_height().await.unwrap(), Some(7));

        blocks.reset().await.unwrap();
        assert_eq!(blocks.last_height().await.unwrap(), None);
        assert_eq!(sync.last_height().await.unwrap(), Some(50));
    }
}
