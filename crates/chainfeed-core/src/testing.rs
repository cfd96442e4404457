//! Test doubles for pipeline tests, enabled by the `testing` feature.
//!
//! ```toml
//! [dev-dependencies]
//! chainfeed-core = { workspace = true, features = ["testing"] }
//! ```

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FeedError;
use crate::event::{Event, EventStore};
use crate::retry::Clock;
use crate::types::Height;

/// Minimal in-process [`EventStore`] with the same append contract as the
/// storage backends: the first append of a height wins.
#[derive(Default)]
pub struct VecStore(Mutex<BTreeMap<Height, Vec<Event>>>);

impl VecStore {
    /// Store pre-filled with `events`, grouped by their height.
    pub fn with_events(events: Vec<Event>) -> Self {
        let store = Self::default();
        {
            let mut map = store.log();
            for ev in events {
                map.entry(ev.height).or_default().push(ev);
            }
        }
        store
    }

    /// Record `height` with no events.
    pub fn touch(&self, height: Height) {
        self.log().entry(height).or_default();
    }

    fn log(&self) -> MutexGuard<'_, BTreeMap<Height, Vec<Event>>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl EventStore for VecStore {
    async fn append(&self, height: Height, events: Vec<Event>) -> Result<(), FeedError> {
        self.log().entry(height).or_insert(events);
        Ok(())
    }

    async fn get_all_by_height(&self, height: Height) -> Result<Vec<Event>, FeedError> {
        Ok(self.log().get(&height).cloned().unwrap_or_default())
    }

    async fn latest_height(&self) -> Result<Option<Height>, FeedError> {
        Ok(self.log().keys().next_back().copied())
    }
}

/// Clock that never waits: it records each requested delay and yields.
///
/// Lets tests drive retry loops without wall time.
#[derive(Debug, Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn count(&self, duration: Duration) -> usize {
        self.sleeps().into_iter().filter(|d| *d == duration).count()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

/// Yield until `cond` holds, panicking if it never does.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
