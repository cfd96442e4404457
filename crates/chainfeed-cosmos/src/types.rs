//! Tendermint RPC data model.
//!
//! The node answers `/block`, `/block_results` and `/status` with JSON-RPC
//! envelopes whose integers are quoted strings and whose transactions are
//! base64. The `Raw*` types mirror that wire shape; `parse_*` turn them into
//! the typed [`Block`] and [`BlockResults`] the pipeline works with.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chainfeed_core::{FeedError, Height};

// ─── Typed model ──────────────────────────────────────────────────────────────

/// A committed block with its transactions in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub height: Height,
    pub hash: String,
    pub chain_id: String,
    pub time: DateTime<Utc>,
    pub app_hash: String,
    pub proposer_address: String,
    /// Raw transaction bytes.
    pub txs: Vec<Vec<u8>>,
    pub signatures: Vec<BlockSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSignature {
    pub block_id_flag: u8,
    pub validator_address: String,
}

impl BlockSignature {
    /// `BLOCK_ID_FLAG_COMMIT`: the validator signed this block.
    pub fn is_commit(&self) -> bool {
        self.block_id_flag == 2
    }
}

/// Verbatim JSON body of the `/block` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock(pub String);

impl RawBlock {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Execution outcomes of one block, positionally matching its transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockResults {
    pub height: Height,
    pub txs_results: Vec<TxResult>,
}

/// Outcome of one transaction (`ResponseDeliverTx`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    #[serde(default)]
    pub code: u32,
    /// JSON message log on success, error text on failure.
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub info: String,
    #[serde(default, rename = "gas_wanted", alias = "gasWanted")]
    pub gas_wanted: String,
    #[serde(default, rename = "gas_used", alias = "gasUsed")]
    pub gas_used: String,
    #[serde(default)]
    pub codespace: String,
}

// ─── Wire model ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct RpcEnvelope<T> {
    pub result: Option<T>,
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

impl<T> RpcEnvelope<T> {
    pub(crate) fn into_result(self, what: &str) -> Result<T, FeedError> {
        if let Some(e) = self.error {
            return Err(FeedError::Rpc(format!(
                "{what}: {} {}{}",
                e.code,
                e.message,
                e.data.map(|d| format!(" ({d})")).unwrap_or_default()
            )));
        }
        self.result
            .ok_or_else(|| FeedError::Rpc(format!("{what}: empty result")))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBlockResult {
    pub block_id: RawBlockId,
    pub block: RawBlockBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBlockId {
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBlockBody {
    pub header: RawHeader,
    pub data: RawData,
    #[serde(default)]
    pub last_commit: Option<RawCommit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawHeader {
    pub chain_id: String,
    pub height: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub app_hash: String,
    #[serde(default)]
    pub proposer_address: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawData {
    #[serde(default)]
    pub txs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCommit {
    #[serde(default)]
    pub signatures: Vec<BlockSignature>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBlockResults {
    pub height: String,
    #[serde(default)]
    pub txs_results: Option<Vec<TxResult>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawStatus {
    pub sync_info: RawSyncInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSyncInfo {
    pub latest_block_height: String,
}

// ─── Parsing ──────────────────────────────────────────────────────────────────

fn parse_height(raw: &str, what: &str) -> Result<Height, FeedError> {
    raw.parse::<Height>()
        .map_err(|_| FeedError::Rpc(format!("{what}: invalid height `{raw}`")))
}

/// Parse a `/block` response body.
pub fn parse_block_resp(body: &str) -> Result<(Block, RawBlock), FeedError> {
    let envelope: RpcEnvelope<RawBlockResult> = serde_json::from_str(body)
        .map_err(|e| FeedError::Rpc(format!("block: malformed response: {e}")))?;
    let raw = envelope.into_result("block")?;
    let height = parse_height(&raw.block.header.height, "block")?;

    let encoded = raw.block.data.txs.unwrap_or_default();
    let mut txs = Vec::with_capacity(encoded.len());
    for (index, tx) in encoded.iter().enumerate() {
        let bytes = BASE64.decode(tx).map_err(|e| FeedError::Decode {
            height,
            index,
            tx_len: tx.len(),
            reason: format!("invalid base64: {e}"),
        })?;
        txs.push(bytes);
    }

    let block = Block {
        height,
        hash: raw.block_id.hash,
        chain_id: raw.block.header.chain_id,
        time: raw.block.header.time,
        app_hash: raw.block.header.app_hash,
        proposer_address: raw.block.header.proposer_address,
        txs,
        signatures: raw
            .block
            .last_commit
            .map(|c| c.signatures)
            .unwrap_or_default(),
    };
    Ok((block, RawBlock(body.to_string())))
}

/// Parse a `/block_results` response body.
pub fn parse_block_results_resp(body: &str) -> Result<BlockResults, FeedError> {
    let envelope: RpcEnvelope<RawBlockResults> = serde_json::from_str(body)
        .map_err(|e| FeedError::Rpc(format!("block_results: malformed response: {e}")))?;
    let raw = envelope.into_result("block_results")?;
    Ok(BlockResults {
        height: parse_height(&raw.height, "block_results")?,
        txs_results: raw.txs_results.unwrap_or_default(),
    })
}

/// Parse a `/status` response body. Height 0 means nothing is committed yet.
pub fn parse_status_resp(body: &str) -> Result<Option<Height>, FeedError> {
    let envelope: RpcEnvelope<RawStatus> = serde_json::from_str(body)
        .map_err(|e| FeedError::Rpc(format!("status: malformed response: {e}")))?;
    let raw = envelope.into_result("status")?;
    let height = parse_height(&raw.sync_info.latest_block_height, "status")?;
    Ok((height > 0).then_some(height))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
