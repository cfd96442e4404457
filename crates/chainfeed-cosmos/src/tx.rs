//! Cosmos SDK transaction decoding.
//!
//! Block data carries each transaction as the protobuf encoding of
//! `cosmos.tx.v1beta1.TxRaw`. The transaction hash is the SHA-256 of those
//! exact bytes, so it is computed before (and independently of) decoding.
//!
//! Only the fields the pipeline needs are declared below; prost skips the
//! rest (signer infos, extension options, tip) while decoding.

use prost::Message;
use prost_types::Any;
use sha2::{Digest, Sha256};

use crate::coin::Coin;

/// `cosmos.tx.v1beta1.TxRaw`
#[derive(Clone, PartialEq, Message)]
pub struct TxRaw {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth_info_bytes: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub signatures: Vec<Vec<u8>>,
}

/// `cosmos.tx.v1beta1.TxBody`
#[derive(Clone, PartialEq, Message)]
pub struct TxBody {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<Any>,
    #[prost(string, tag = "2")]
    pub memo: String,
    #[prost(uint64, tag = "3")]
    pub timeout_height: u64,
}

/// `cosmos.tx.v1beta1.AuthInfo`
#[derive(Clone, PartialEq, Message)]
pub struct AuthInfo {
    #[prost(message, optional, tag = "2")]
    pub fee: Option<Fee>,
}

/// `cosmos.tx.v1beta1.Fee`
#[derive(Clone, PartialEq, Message)]
pub struct Fee {
    #[prost(message, repeated, tag = "1")]
    pub amount: Vec<ProtoCoin>,
    #[prost(uint64, tag = "2")]
    pub gas_limit: u64,
    #[prost(string, tag = "3")]
    pub payer: String,
    #[prost(string, tag = "4")]
    pub granter: String,
}

/// `cosmos.base.v1beta1.Coin`
#[derive(Clone, PartialEq, Message)]
pub struct ProtoCoin {
    #[prost(string, tag = "1")]
    pub denom: String,
    #[prost(string, tag = "2")]
    pub amount: String,
}

/// Uppercase hex SHA-256 of the raw transaction bytes.
pub fn tx_hash(tx: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(tx))
}

/// A transaction that could not be decoded.
///
/// Carries the raw length and hash so the caller can still identify the
/// rejected transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot decode transaction {tx_hash} ({tx_len} bytes): {reason}")]
pub struct DecodeError {
    pub tx_len: usize,
    pub tx_hash: String,
    pub reason: String,
}

/// The parts of a transaction the pipeline records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTx {
    pub hash: String,
    pub msg_count: usize,
    pub fee: Coin,
    pub memo: String,
}

/// Stateless transaction decoder for one fee denomination.
#[derive(Debug, Clone)]
pub struct TxDecoder {
    base_denom: String,
}

impl TxDecoder {
    pub fn new(base_denom: impl Into<String>) -> Self {
        Self {
            base_denom: base_denom.into(),
        }
    }

    pub fn base_denom(&self) -> &str {
        &self.base_denom
    }

    /// Decode one raw transaction. Never panics on malformed input.
    pub fn decode(&self, tx: &[u8]) -> Result<DecodedTx, DecodeError> {
        let hash = tx_hash(tx);
        let fail = |reason: String| DecodeError {
            tx_len: tx.len(),
            tx_hash: hash.clone(),
            reason,
        };

        let raw = TxRaw::decode(tx).map_err(|e| fail(format!("TxRaw: {e}")))?;
        let body = TxBody::decode(raw.body_bytes.as_slice())
            .map_err(|e| fail(format!("TxBody: {e}")))?;
        let auth_info = AuthInfo::decode(raw.auth_info_bytes.as_slice())
            .map_err(|e| fail(format!("AuthInfo: {e}")))?;

        let fee = match auth_info.fee {
            Some(fee) => self.sum_fee(&fee.amount).map_err(fail)?,
            None => Coin::zero(&self.base_denom),
        };

        Ok(DecodedTx {
            hash,
            msg_count: body.messages.len(),
            fee,
            memo: body.memo,
        })
    }

    /// Sum the fee coins in the base denomination.
    fn sum_fee(&self, coins: &[ProtoCoin]) -> Result<Coin, String> {
        let mut total = Coin::zero(&self.base_denom);
        for coin in coins {
            if coin.denom != self.base_denom {
                tracing::warn!(
                    denom = %coin.denom,
                    amount = %coin.amount,
                    base_denom = %self.base_denom,
                    "ignoring fee coin outside the base denomination"
                );
                continue;
            }
            let coin = Coin::parse(&coin.denom, &coin.amount).map_err(|e| format!("fee: {e}"))?;
            total = total.checked_add(&coin).map_err(|e| format!("fee: {e}"))?;
        }
        Ok(total)
    }
}
