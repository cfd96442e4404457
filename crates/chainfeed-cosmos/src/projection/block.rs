use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use chainfeed_core::{Checkpointer, Event, FeedError, Height, MemoryCheckpointStore, Projection};

use super::decode_payload;
use crate::command::{CreateBlockParams, BLOCK_CREATED};

/// One row of the block read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockRow {
    pub height: Height,
    pub hash: String,
    pub time: DateTime<Utc>,
    pub app_hash: String,
    pub proposer_address: String,
    pub tx_count: usize,
    pub committed_signatures: usize,
}

/// Materialises `BlockCreated` into a height-indexed table.
pub struct BlockProjection {
    checkpoint: Checkpointer,
    rows: RwLock<BTreeMap<Height, BlockRow>>,
}

impl BlockProjection {
    pub const ID: &'static str = "block";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, height: Height) -> Option<BlockRow> {
        self.rows.read().ok()?.get(&height).cloned()
    }

    pub fn latest(&self) -> Option<BlockRow> {
        self.rows.read().ok()?.values().next_back().cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BlockProjection {
    fn default() -> Self {
        Self {
            checkpoint: Checkpointer::new(Arc::new(MemoryCheckpointStore::new()), Self::ID),
            rows: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl Projection for BlockProjection {
    fn id(&self) -> &str {
        Self::ID
    }

    fn events_to_listen(&self) -> Vec<String> {
        vec![BLOCK_CREATED.to_string()]
    }

    async fn last_handled_event_height(&self) -> Result<Option<Height>, FeedError> {
        self.checkpoint.last_height().await
    }

    async fn handle_events(&self, height: Height, events: Vec<Event>) -> Result<(), FeedError> {
        let mut rows = Vec::with_capacity(events.len());
        for event in &events {
            let params: CreateBlockParams = decode_payload(Self::ID, height, event)?;
            rows.push(BlockRow {
                height: event.height,
                hash: params.hash,
                time: params.time,
                app_hash: params.app_hash,
                proposer_address: params.proposer_address,
                tx_count: params.tx_count,
                committed_signatures: params.committed_signatures,
            });
        }

        {
            let mut table = self
                .rows
                .write()
                .map_err(|_| FeedError::Storage("block table lock poisoned".into()))?;
            for row in rows {
                table.insert(row.height, row);
            }
        }
        self.checkpoint.commit(height).await
    }
}
