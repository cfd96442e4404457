//! Projections and the manager that feeds each of them the event log.
//!
//! Every registered projection gets its own Tokio task. The task resumes from
//! the projection's own checkpoint and walks the event store height by
//! height, handing the projection only the events it listens to. A failed
//! height is retried until it succeeds; it is never skipped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::error::FeedError;
use crate::event::{Event, EventStore};
use crate::progress::{Progress, ProgressSnapshot};
use crate::retry::{Clock, RetryPolicy, TokioClock};
use crate::types::{EventFilter, Height};

/// A checkpointed consumer of the event log that maintains one read model.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Unique id; also the key of the projection's checkpoint.
    fn id(&self) -> &str;

    /// Names of the events this projection handles.
    fn events_to_listen(&self) -> Vec<String>;

    /// Last height the projection finished handling, `None` if it never ran.
    async fn last_handled_event_height(&self) -> Result<Option<Height>, FeedError>;

    /// Handle the listened-to events of `height` (possibly none).
    ///
    /// The projection persists its checkpoint for `height` as part of
    /// handling, so a restart resumes from `height + 1`.
    async fn handle_events(&self, height: Height, events: Vec<Event>) -> Result<(), FeedError>;
}

/// Wait intervals of a projection loop.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionSchedule {
    /// Between attempts to read the projection's checkpoint at startup.
    pub init: RetryPolicy,
    /// While the event store is empty or the projection has caught up.
    pub idle: RetryPolicy,
    /// Between attempts on a height whose fetch or handler failed.
    pub error: RetryPolicy,
}

impl Default for ProjectionSchedule {
    fn default() -> Self {
        use std::time::Duration;
        Self {
            init: RetryPolicy::fixed(Duration::from_secs(5)),
            idle: RetryPolicy::fixed(Duration::from_secs(5)),
            error: RetryPolicy::fixed(Duration::from_secs(1)).with_alert_after(10),
        }
    }
}

/// Runs every registered projection in its own loop.
pub struct ProjectionManager {
    event_store: Arc<dyn EventStore>,
    projections: Vec<Arc<dyn Projection>>,
    progress: HashMap<String, Arc<Progress>>,
    schedule: ProjectionSchedule,
    clock: Arc<dyn Clock>,
}

impl ProjectionManager {
    pub fn new(event_store: Arc<dyn EventStore>) -> Self {
        Self {
            event_store,
            projections: Vec::new(),
            progress: HashMap::new(),
            schedule: ProjectionSchedule::default(),
            clock: Arc::new(TokioClock),
        }
    }

    pub fn with_schedule(mut self, schedule: ProjectionSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a projection. Ids must be unique.
    pub fn register(&mut self, projection: Arc<dyn Projection>) -> Result<(), FeedError> {
        let id = projection.id().to_string();
        if self.is_registered(&id) {
            return Err(FeedError::DuplicateProjection(id));
        }
        self.progress.insert(id, Arc::new(Progress::new()));
        self.projections.push(projection);
        Ok(())
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.progress.contains_key(id)
    }

    pub fn projection_ids(&self) -> Vec<&str> {
        self.projections.iter().map(|p| p.id()).collect()
    }

    /// Current progress of a registered projection.
    pub fn progress(&self, id: &str) -> Option<ProgressSnapshot> {
        self.progress.get(id).map(|p| p.snapshot())
    }

    /// Spawn one task per projection. The tasks run until aborted.
    pub fn run(&self) -> Vec<JoinHandle<()>> {
        self.projections
            .iter()
            .map(|projection| {
                let runner = ProjectionRunner {
                    filter: EventFilter::names(projection.events_to_listen()),
                    projection: projection.clone(),
                    event_store: self.event_store.clone(),
                    progress: self.progress[projection.id()].clone(),
                    schedule: self.schedule,
                    clock: self.clock.clone(),
                };
                tokio::spawn(runner.run())
            })
            .collect()
    }
}

struct ProjectionRunner {
    projection: Arc<dyn Projection>,
    filter: EventFilter,
    event_store: Arc<dyn EventStore>,
    progress: Arc<Progress>,
    schedule: ProjectionSchedule,
    clock: Arc<dyn Clock>,
}

impl ProjectionRunner {
    async fn run(self) {
        let id = self.projection.id().to_string();
        tracing::info!(
            projection = %id,
            events_to_listen = ?self.filter.as_slice(),
            "starting projection"
        );

        let mut next = self.resume_height().await;
        self.progress.set_next(next);

        loop {
            let latest = match self.event_store.latest_height().await {
                Ok(Some(latest)) => latest,
                Ok(None) => {
                    tracing::debug!(projection = %id, "no event in the system yet");
                    self.clock.sleep(self.schedule.idle.interval).await;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(projection = %id, error = %e, "error reading latest event height");
                    self.clock.sleep(self.schedule.idle.interval).await;
                    continue;
                }
            };

            if next > latest {
                self.clock.sleep(self.schedule.idle.interval).await;
                continue;
            }

            while next <= latest {
                match self.handle_height(next).await {
                    Ok(handled) => {
                        tracing::info!(
                            projection = %id,
                            height = next,
                            events = handled,
                            "successfully handled events"
                        );
                        next += 1;
                        self.progress.record_success(next);
                    }
                    Err(e) => {
                        let failures = self.progress.record_failure(next, &self.schedule.error);
                        tracing::error!(
                            projection = %id,
                            height = next,
                            attempt = failures,
                            error = %e,
                            "error handling events"
                        );
                        if self.schedule.error.should_alert(failures) {
                            tracing::error!(
                                projection = %id,
                                height = next,
                                failures,
                                "projection stalled: height keeps failing"
                            );
                        }
                        self.clock.sleep(self.schedule.error.interval).await;
                    }
                }
            }
        }
    }

    /// Read the projection's checkpoint, retrying until storage answers.
    async fn resume_height(&self) -> Height {
        loop {
            match self.projection.last_handled_event_height().await {
                Ok(Some(last)) => return last + 1,
                Ok(None) => return 1,
                Err(e) => {
                    tracing::warn!(
                        projection = self.projection.id(),
                        error = %e,
                        "error getting last handled event height from projection"
                    );
                    self.clock.sleep(self.schedule.init.interval).await;
                }
            }
        }
    }

    /// Fetch, filter and hand over the events of one height.
    ///
    /// Returns the number of events handed to the projection.
    async fn handle_height(&self, height: Height) -> Result<usize, FeedError> {
        let events: Vec<Event> = self
            .event_store
            .get_all_by_height(height)
            .await?
            .into_iter()
            .filter(|ev| {
                let listening = self.filter.matches(&ev.name);
                if !listening {
                    tracing::trace!(
                        projection = self.projection.id(),
                        height,
                        event = %ev.name,
                        "skipping because event is not one of the listening events"
                    );
                }
                listening
            })
            .collect();

        let count = events.len();
        self.projection.handle_events(height, events).await?;
        Ok(count)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
