//! Block command parser.
//!
//! Transactions and their results are correlated by position only, so the
//! two lists must have the same length.

use chainfeed_core::FeedError;

use crate::command::{CosmosCommand, CreateBlockParams, CreateTransactionParams};
use crate::tx::TxDecoder;
use crate::types::{Block, BlockResults};

/// One `CreateTransaction` per transaction, in transaction-index order.
pub fn parse_transaction_commands(
    decoder: &TxDecoder,
    block: &Block,
    results: &BlockResults,
) -> Result<Vec<CosmosCommand>, FeedError> {
    if block.txs.len() != results.txs_results.len() {
        return Err(FeedError::MalformedBlock {
            height: block.height,
            txs: block.txs.len(),
            results: results.txs_results.len(),
        });
    }

    let mut commands = Vec::with_capacity(block.txs.len());
    for (index, (tx, result)) in block.txs.iter().zip(&results.txs_results).enumerate() {
        let decoded = decoder.decode(tx).map_err(|e| FeedError::Decode {
            height: block.height,
            index,
            tx_len: e.tx_len,
            reason: format!("{} ({})", e.reason, e.tx_hash),
        })?;

        commands.push(CosmosCommand::create_transaction(
            block.height,
            CreateTransactionParams {
                tx_hash: decoded.hash,
                index,
                code: result.code,
                log: result.log.clone(),
                msg_count: decoded.msg_count,
                fee: decoded.fee,
                gas_wanted: result.gas_wanted.clone(),
                gas_used: result.gas_used.clone(),
                memo: decoded.memo,
            },
        ));
    }
    Ok(commands)
}

/// `CreateBlock` followed by the block's transaction commands.
pub fn parse_block_commands(
    decoder: &TxDecoder,
    block: &Block,
    results: &BlockResults,
) -> Result<Vec<CosmosCommand>, FeedError> {
    let txs = parse_transaction_commands(decoder, block, results)?;

    let mut commands = Vec::with_capacity(txs.len() + 1);
    commands.push(CosmosCommand::create_block(
        block.height,
        CreateBlockParams {
            hash: block.hash.clone(),
            time: block.time,
            app_hash: block.app_hash.clone(),
            proposer_address: block.proposer_address.clone(),
            tx_count: block.txs.len(),
            committed_signatures: block.signatures.iter().filter(|s| s.is_commit()).count(),
        },
    ));
    commands.extend(txs);
    Ok(commands)
}
