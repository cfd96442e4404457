//! chainfeed-cosmos — Tendermint/Cosmos support for the chainfeed pipeline.
//!
//! Provides:
//! - The Tendermint RPC data model and an HTTP [`TendermintClient`]
//! - Protobuf transaction decoding ([`TxDecoder`]) with SHA-256 transaction hashes
//! - The block command parser and the `CreateBlock` / `CreateTransaction` commands
//! - [`CommandSubscriber`], which turns a block into its events
//! - [`SyncManager`], the polling loop that drives the block subject
//! - Two reference projections (`block`, `transaction`)

pub mod client;
pub mod coin;
pub mod command;
pub mod notification;
pub mod parser;
pub mod projection;
pub mod subscriber;
pub mod sync;
pub mod tx;
pub mod types;

pub use client::{HttpTendermintClient, TendermintClient};
pub use coin::{Coin, CoinError};
pub use command::{
    CosmosCommand, CreateBlockParams, CreateTransactionParams, BLOCK_CREATED, TRANSACTION_CREATED,
};
pub use notification::BlockNotification;
pub use parser::{parse_block_commands, parse_transaction_commands};
pub use projection::{BlockProjection, TransactionProjection};
pub use subscriber::CommandSubscriber;
pub use sync::{SyncManager, SyncState, SYNC_CONSUMER_ID};
pub use tx::{tx_hash, DecodeError, DecodedTx, TxDecoder};
pub use types::{Block, BlockResults, RawBlock, TxResult};
