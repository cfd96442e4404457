//! chainfeed-core — the chain-agnostic half of the event-sourcing pipeline.
//!
//! # Architecture
//!
//! ```text
//! SyncManager (per chain) ─→ BlockSubject ─→ BlockSubscriber(s) ─→ EventStore
//!                                                                     │
//!                      ProjectionManager ─┬─ projection loop ◀────────┤
//!                                         ├─ projection loop ◀────────┤
//!                                         └─ …                        │
//!                      CheckpointStore (one key per consumer) ◀───────┘
//! ```

pub mod checkpoint;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod progress;
pub mod projection;
pub mod retry;
pub mod subject;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use checkpoint::{Checkpoint, CheckpointStore, Checkpointer, MemoryCheckpointStore};
pub use command::Command;
pub use config::{FeedConfig, FeedConfigBuilder, LogConfig, StorageConfig};
pub use error::FeedError;
pub use event::{Event, EventBatch, EventStore};
pub use progress::{Progress, ProgressSnapshot};
pub use projection::{Projection, ProjectionManager, ProjectionSchedule};
pub use retry::{Clock, RetryPolicy, TokioClock};
pub use subject::{BlockSubject, BlockSubscriber, Notification};
pub use types::{EventFilter, Height};
