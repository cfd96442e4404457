//! Subscriber that turns a synced block into events.

use async_trait::async_trait;

use chainfeed_core::{BlockSubscriber, Command, EventBatch, FeedError};

use crate::notification::BlockNotification;
use crate::parser::parse_block_commands;
use crate::tx::TxDecoder;

/// Parses each block into commands and executes them into the height's
/// event batch.
pub struct CommandSubscriber {
    decoder: TxDecoder,
}

impl CommandSubscriber {
    pub fn new(decoder: TxDecoder) -> Self {
        Self { decoder }
    }
}

#[async_trait]
impl BlockSubscriber<BlockNotification> for CommandSubscriber {
    fn name(&self) -> &str {
        "command"
    }

    async fn on_notification(
        &self,
        notification: &BlockNotification,
        batch: &mut EventBatch,
    ) -> Result<(), FeedError> {
        let commands =
            parse_block_commands(&self.decoder, &notification.block, &notification.block_results)?;

        let events = commands
            .iter()
            .map(|cmd| cmd.exec())
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            height = notification.height,
            commands = commands.len(),
            "block commands executed"
        );
        batch.extend(events)
    }
}
