//! Reference projections over the Cosmos event log.
//!
//! Both keep their read model in memory, and their checkpoint lives next to
//! it in a [`MemoryCheckpointStore`](chainfeed_core::MemoryCheckpointStore):
//! a new instance starts empty and rebuilds itself from the first recorded
//! height. Rows are keyed so that re-handling a height overwrites instead of
//! duplicating.

mod block;
mod transaction;

pub use block::{BlockProjection, BlockRow};
pub use transaction::{TransactionProjection, TransactionRow};

use chainfeed_core::{Event, FeedError, Height};
use serde::de::DeserializeOwned;

fn decode_payload<T: DeserializeOwned>(
    projection: &str,
    height: Height,
    event: &Event,
) -> Result<T, FeedError> {
    event.payload_as().map_err(|e| FeedError::Handler {
        projection: projection.to_string(),
        height,
        reason: e.to_string(),
    })
}
