//! Domain events and the append-only, height-indexed event store.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::types::Height;

/// A named, height-tagged fact in the event log.
///
/// `name` is the routing key projections filter on. The payload is kept as
/// JSON so every storage backend can persist any event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub height: Height,
    /// Payload schema version.
    pub version: u32,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(name: impl Into<String>, height: Height, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            height,
            version: 1,
            payload,
        }
    }

    /// Build an event by serialising a typed payload.
    pub fn from_payload<T: Serialize>(
        name: impl Into<String>,
        height: Height,
        payload: &T,
    ) -> Result<Self, FeedError> {
        Ok(Self::new(name, height, serde_json::to_value(payload)?))
    }

    /// Deserialise the payload back into its typed form.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, FeedError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            FeedError::Other(format!("event `{}` at {}: {e}", self.name, self.height))
        })
    }
}

/// Events derived for a single height, before they reach the store.
///
/// The block subject gives every subscriber its own batch and the sync loop
/// appends the merged result once, after every subscriber succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    height: Height,
    events: Vec<Event>,
}

impl EventBatch {
    pub fn new(height: Height) -> Self {
        Self {
            height,
            events: Vec::new(),
        }
    }

    pub fn height(&self) -> Height {
        self.height
    }

    /// Add one event. Events tagged with a different height are rejected.
    pub fn push(&mut self, event: Event) -> Result<(), FeedError> {
        if event.height != self.height {
            return Err(FeedError::Other(format!(
                "event `{}` at {} pushed into the batch of height {}",
                event.name, event.height, self.height
            )));
        }
        self.events.push(event);
        Ok(())
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) -> Result<(), FeedError> {
        for event in events {
            self.push(event)?;
        }
        Ok(())
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

/// Append-only log of events, indexed by height.
///
/// Implementations live in `chainfeed-storage` (memory, SQLite).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Atomically record all events produced for `height`.
    ///
    /// A height is recorded once: appending to an already recorded height
    /// leaves the stored events untouched and returns `Ok(())`, so a block
    /// replayed after a crash does not duplicate its events.
    async fn append(&self, height: Height, events: Vec<Event>) -> Result<(), FeedError>;

    /// All events recorded at `height`, in append order (empty if none).
    async fn get_all_by_height(&self, height: Height) -> Result<Vec<Event>, FeedError>;

    /// Highest recorded height, `None` while the log is empty.
    async fn latest_height(&self) -> Result<Option<Height>, FeedError>;
}
