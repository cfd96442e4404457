//! Commands derived from a block and the events they produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chainfeed_core::{Command, Event, FeedError, Height};

use crate::coin::Coin;

pub const CREATE_BLOCK: &str = "CreateBlock";
pub const CREATE_TRANSACTION: &str = "CreateTransaction";

pub const BLOCK_CREATED: &str = "BlockCreated";
pub const TRANSACTION_CREATED: &str = "TransactionCreated";

/// Payload of `CreateTransaction` / `TransactionCreated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionParams {
    /// Uppercase hex SHA-256 of the raw transaction.
    pub tx_hash: String,
    pub index: usize,
    pub code: u32,
    /// Message log JSON on success, raw error text on failure.
    pub log: String,
    pub msg_count: usize,
    pub fee: Coin,
    pub gas_wanted: String,
    pub gas_used: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memo: String,
}

/// Payload of `CreateBlock` / `BlockCreated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlockParams {
    pub hash: String,
    pub time: DateTime<Utc>,
    pub app_hash: String,
    pub proposer_address: String,
    pub tx_count: usize,
    pub committed_signatures: usize,
}

/// Every command a Cosmos block can yield.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CosmosCommand {
    CreateBlock {
        height: Height,
        params: CreateBlockParams,
    },
    CreateTransaction {
        height: Height,
        params: CreateTransactionParams,
    },
}

impl CosmosCommand {
    pub fn create_transaction(height: Height, params: CreateTransactionParams) -> Self {
        Self::CreateTransaction { height, params }
    }

    pub fn create_block(height: Height, params: CreateBlockParams) -> Self {
        Self::CreateBlock { height, params }
    }

    /// Transaction params, if this is a `CreateTransaction`.
    pub fn as_transaction(&self) -> Option<&CreateTransactionParams> {
        match self {
            Self::CreateTransaction { params, .. } => Some(params),
            Self::CreateBlock { .. } => None,
        }
    }
}

impl Command for CosmosCommand {
    fn name(&self) -> &str {
        match self {
            Self::CreateBlock { .. } => CREATE_BLOCK,
            Self::CreateTransaction { .. } => CREATE_TRANSACTION,
        }
    }

    fn height(&self) -> Height {
        match self {
            Self::CreateBlock { height, .. } | Self::CreateTransaction { height, .. } => *height,
        }
    }

    fn exec(&self) -> Result<Event, FeedError> {
        match self {
            Self::CreateBlock { height, params } => {
                Event::from_payload(BLOCK_CREATED, *height, params)
            }
            Self::CreateTransaction { height, params } => {
                Event::from_payload(TRANSACTION_CREATED, *height, params)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CreateTransactionParams {
        CreateTransactionParams {
            tx_hash: "2A2A64A310B3D0E84C9831F4353E188A6E63BF451975C859DF40C54047AC6324".into(),
            index: 0,
            code: 11,
            log: "out of gas in location: WriteFlat; gasWanted: 80000000, gasUsed: 80150021: out of gas".into(),
            msg_count: 1,
            fee: Coin::parse("basetcro", "8000000").unwrap(),
            gas_wanted: "80000000".into(),
            gas_used: "80150021".into(),
            memo: String::new(),
        }
    }

    #[test]
    fn transaction_command_becomes_transaction_created() {
        let cmd = CosmosCommand::create_transaction(420_301, params());
        assert_eq!(cmd.name(), CREATE_TRANSACTION);
        assert_eq!(cmd.height(), 420_301);

        let event = cmd.exec().unwrap();
        assert_eq!(event.name, TRANSACTION_CREATED);
        assert_eq!(event.height, 420_301);
        assert_eq!(event.payload["txHash"], params().tx_hash.as_str());
        assert_eq!(event.payload["fee"]["amount"], "8000000");
        assert!(event.payload.get("memo").is_none());

        let back: CreateTransactionParams = event.payload_as().unwrap();
        assert_eq!(back, params());
    }

    #[test]
    fn block_command_becomes_block_created() {
        let cmd = CosmosCommand::create_block(
            7,
            CreateBlockParams {
                hash: "AB".into(),
                time: DateTime::parse_from_rfc3339("2020-11-19T07:37:24Z")
                    .unwrap()
                    .with_timezone(&Utc),
                app_hash: "CD".into(),
                proposer_address: "EF".into(),
                tx_count: 0,
                committed_signatures: 3,
            },
        );
        assert!(cmd.as_transaction().is_none());
        let event = cmd.exec().unwrap();
        assert_eq!(event.name, BLOCK_CREATED);
        assert_eq!(event.payload["committedSignatures"], 3);
    }
}
