//! In-memory storage backend.
//!
//! Stores the event log and checkpoints in RAM.
//! Useful for testing and short-lived pipelines that don't need persistence.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chainfeed_core::{Checkpoint, CheckpointStore, Event, EventStore, FeedError, Height};

/// In-memory event log and checkpoint store.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
    /// Recorded heights, including those without events.
    events: Mutex<BTreeMap<Height, Vec<Event>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events.
    pub fn event_count(&self) -> usize {
        self.events
            .lock()
            .map(|e| e.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Return every stored event named `name`, in height order.
    pub fn events_by_name(&self, name: &str) -> Vec<Event> {
        let Ok(events) = self.events.lock() else {
            return Vec::new();
        };
        events
            .values()
            .flatten()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    fn events(&self) -> Result<MutexGuard<'_, BTreeMap<Height, Vec<Event>>>, FeedError> {
        self.events
            .lock()
            .map_err(|_| FeedError::Storage("event log lock poisoned".into()))
    }

    fn checkpoints(&self) -> Result<MutexGuard<'_, HashMap<String, Checkpoint>>, FeedError> {
        self.checkpoints
            .lock()
            .map_err(|_| FeedError::Storage("checkpoint lock poisoned".into()))
    }
}

#[async_trait]
impl EventStore for InMemoryStorage {
    async fn append(&self, height: Height, events: Vec<Event>) -> Result<(), FeedError> {
        let mut log = self.events()?;
        if log.contains_key(&height) {
            tracing::warn!(height, events = events.len(), "height already recorded, ignoring append");
            return Ok(());
        }
        log.insert(height, events);
        Ok(())
    }

    async fn get_all_by_height(&self, height: Height) -> Result<Vec<Event>, FeedError> {
        Ok(self.events()?.get(&height).cloned().unwrap_or_default())
    }

    async fn latest_height(&self) -> Result<Option<Height>, FeedError> {
        Ok(self.events()?.keys().next_back().copied())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn load(&self, consumer_id: &str) -> Result<Option<Checkpoint>, FeedError> {
        Ok(self.checkpoints()?.get(consumer_id).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), FeedError> {
        self.checkpoints()?
            .insert(checkpoint.consumer_id.clone(), checkpoint);
        Ok(())
    }

    async fn delete(&self, consumer_id: &str) -> Result<(), FeedError> {
        self.checkpoints()?.remove(consumer_id);
        Ok(())
    }
}
