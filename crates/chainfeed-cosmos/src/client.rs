//! Tendermint RPC client.
//!
//! The sync loop needs only three verbs from the node; [`TendermintClient`]
//! is that seam, and [`HttpTendermintClient`] implements it over the node's
//! JSON-over-HTTP URI endpoints.

use std::time::Duration;

use async_trait::async_trait;

use chainfeed_core::{FeedError, Height};

use crate::types::{
    parse_block_resp, parse_block_results_resp, parse_status_resp, Block, BlockResults, RawBlock,
};

/// The chain node as seen by the sync loop.
#[async_trait]
pub trait TendermintClient: Send + Sync {
    /// Block at `height`, with the verbatim response body.
    async fn block(&self, height: Height) -> Result<(Block, RawBlock), FeedError>;

    /// Execution results of the block at `height`.
    async fn block_results(&self, height: Height) -> Result<BlockResults, FeedError>;

    /// Latest committed height, `None` if the node has none yet.
    async fn latest_height(&self) -> Result<Option<Height>, FeedError>;
}

/// [`TendermintClient`] over HTTP, backed by `reqwest`.
pub struct HttpTendermintClient {
    url: String,
    http: reqwest::Client,
}

impl HttpTendermintClient {
    /// Client for the RPC endpoint at `url` (e.g. `http://127.0.0.1:26657`).
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| FeedError::Rpc(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<String, FeedError> {
        let url = format!("{}/{path}", self.url);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| FeedError::Rpc(format!("{path}: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| FeedError::Rpc(format!("{path}: {e}")))?;

        // The node reports RPC errors in a JSON body with a 500 status; let
        // the envelope parser surface the message when there is one.
        if !status.is_success() && !body.trim_start().starts_with('{') {
            return Err(FeedError::Rpc(format!(
                "{path}: HTTP {}: {body}",
                status.as_u16()
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl TendermintClient for HttpTendermintClient {
    async fn block(&self, height: Height) -> Result<(Block, RawBlock), FeedError> {
        let body = self.get("block", &[("height", height.to_string())]).await?;
        tracing::trace!(height, bytes = body.len(), "fetched block");
        parse_block_resp(&body)
    }

    async fn block_results(&self, height: Height) -> Result<BlockResults, FeedError> {
        let body = self
            .get("block_results", &[("height", height.to_string())])
            .await?;
        tracing::trace!(height, bytes = body.len(), "fetched block results");
        parse_block_results_resp(&body)
    }

    async fn latest_height(&self) -> Result<Option<Height>, FeedError> {
        let body = self.get("status", &[]).await?;
        parse_status_resp(&body)
    }
}
