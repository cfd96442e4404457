//! Error types for the chainfeed pipeline.

use thiserror::Error;

/// Errors that can occur while syncing blocks or running projections.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to decode transaction {index} ({tx_len} bytes) at height {height}: {reason}")]
    Decode {
        height: u64,
        index: usize,
        tx_len: usize,
        reason: String,
    },

    #[error("Malformed block at height {height}: {txs} transactions but {results} results")]
    MalformedBlock {
        height: u64,
        txs: usize,
        results: usize,
    },

    #[error("Projection `{0}` already registered")]
    DuplicateProjection(String),

    #[error("Handler error in '{projection}' at height {height}: {reason}")]
    Handler {
        projection: String,
        height: u64,
        reason: String,
    },

    #[error("{failed} subscriber(s) failed on block {height}")]
    Subscriber { height: u64, failed: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl FeedError {
    /// Returns `true` for node/storage hiccups that are expected to clear on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Storage(_))
    }

    /// Returns `true` if the chain data itself could not be interpreted.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::MalformedBlock { .. })
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        Self::Other(format!("json: {e}"))
    }
}
