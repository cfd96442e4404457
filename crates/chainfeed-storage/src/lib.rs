//! chainfeed-storage — event store and checkpoint backends for ChainFeed.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single-file persistence)
//!
//! Each backend implements both [`EventStore`](chainfeed_core::EventStore) and
//! [`CheckpointStore`](chainfeed_core::CheckpointStore), so one handle can
//! serve the sync loop and the projection manager.

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
