//! In-process publish/subscribe for synced blocks.
//!
//! The sync loop notifies a [`BlockSubject`] once per height. Every attached
//! [`BlockSubscriber`] fills its own [`EventBatch`]; the subject hands back the
//! merged batch only when all of them succeeded, and nothing reaches the
//! [`EventStore`](crate::EventStore) before that.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::FeedError;
use crate::event::EventBatch;
use crate::types::Height;

/// A value delivered to subscribers for one synced height.
pub trait Notification: Send + Sync {
    fn height(&self) -> Height;
}

/// Receives one notification per synced height.
#[async_trait]
pub trait BlockSubscriber<N: Notification>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Derive events from `notification` into `batch`, which is scoped to the
    /// notification's height.
    async fn on_notification(&self, notification: &N, batch: &mut EventBatch)
        -> Result<(), FeedError>;
}

/// A concurrent-safe set of subscribers.
pub struct BlockSubject<N: Notification> {
    subscribers: RwLock<Vec<Arc<dyn BlockSubscriber<N>>>>,
}

impl<N: Notification> BlockSubject<N> {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Attach a subscriber. Attaching the same instance twice is a no-op.
    ///
    /// Returns `true` if the subscriber was newly attached.
    pub fn attach(&self, subscriber: Arc<dyn BlockSubscriber<N>>) -> bool {
        let Ok(mut subscribers) = self.subscribers.write() else {
            return false;
        };
        if subscribers.iter().any(|s| same_instance(s, &subscriber)) {
            return false;
        }
        subscribers.push(subscriber);
        true
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `notification` to every attached subscriber.
    ///
    /// Each failure is logged and the remaining subscribers still run. The
    /// call fails if any subscriber failed, and then none of the derived
    /// events are returned. On success the batches are merged in attach
    /// order.
    pub async fn notify(&self, notification: &N) -> Result<EventBatch, FeedError> {
        let height = notification.height();
        let subscribers = self.snapshot();
        let mut batches: Vec<EventBatch> =
            subscribers.iter().map(|_| EventBatch::new(height)).collect();

        let results = join_all(
            subscribers
                .iter()
                .zip(batches.iter_mut())
                .map(|(s, batch)| s.on_notification(notification, batch)),
        )
        .await;

        let mut failed = 0;
        for (subscriber, result) in subscribers.iter().zip(results) {
            if let Err(e) = result {
                failed += 1;
                tracing::error!(
                    height,
                    subscriber = subscriber.name(),
                    error = %e,
                    "subscriber failed on block notification"
                );
            }
        }

        if failed > 0 {
            return Err(FeedError::Subscriber { height, failed });
        }

        let mut merged = EventBatch::new(height);
        for batch in batches {
            merged.extend(batch.into_events())?;
        }
        Ok(merged)
    }

    fn snapshot(&self) -> Vec<Arc<dyn BlockSubscriber<N>>> {
        self.subscribers
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl<N: Notification> Default for BlockSubject<N> {
    fn default() -> Self {
        Self::new()
    }
}

fn same_instance<N: Notification>(
    a: &Arc<dyn BlockSubscriber<N>>,
    b: &Arc<dyn BlockSubscriber<N>>,
) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
