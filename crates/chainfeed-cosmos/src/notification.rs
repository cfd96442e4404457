//! The value the sync loop publishes once per synced height.

use chainfeed_core::{Height, Notification};

use crate::types::{Block, BlockResults, RawBlock};

/// Everything the node returned for one height. Not persisted.
#[derive(Debug, Clone)]
pub struct BlockNotification {
    pub height: Height,
    pub block: Block,
    pub raw_block: RawBlock,
    pub block_results: BlockResults,
}

impl BlockNotification {
    pub fn new(block: Block, raw_block: RawBlock, block_results: BlockResults) -> Self {
        Self {
            height: block.height,
            block,
            raw_block,
            block_results,
        }
    }
}

impl Notification for BlockNotification {
    fn height(&self) -> Height {
        self.height
    }
}
