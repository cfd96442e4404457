//! Commands — intents derived from chain data that turn into events.

use std::fmt::Debug;

use crate::error::FeedError;
use crate::event::Event;
use crate::types::Height;

/// An intent derived from block data (e.g. "create transaction record").
///
/// Executing a command yields the event that records it; the subscriber that
/// produced the command appends that event to the store.
pub trait Command: Debug + Send + Sync {
    /// Command name, e.g. `"CreateTransaction"`.
    fn name(&self) -> &str;

    /// Height of the block the command was derived from.
    fn height(&self) -> Height;

    fn exec(&self) -> Result<Event, FeedError>;
}
