//! Block sync loop.
//!
//! ```text
//! Idle ──(poll interval)──▶ Polling ──(latest height)──▶ Syncing ──▶ Idle
//!                             │ node unavailable                │ any failure
//!                             └───────────────▶ Idle ◀──────────┘
//! ```
//!
//! Each pass walks from the checkpoint + 1 up to, but not including, the
//! node's latest height. The events of a height are appended in one batch
//! once every subscriber succeeded, and only then is its checkpoint
//! committed; any failure ends the pass and the same height is retried on the
//! next tick.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use chainfeed_core::{
    BlockSubject, Checkpointer, CheckpointStore, Clock, EventStore, FeedError, Height, Progress,
    ProgressSnapshot, RetryPolicy, TokioClock,
};

use crate::client::TendermintClient;
use crate::notification::BlockNotification;

/// Checkpoint key of the sync loop.
pub const SYNC_CONSUMER_ID: &str = "chain-sync";

/// Where the sync loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Polling,
    Syncing,
}

/// Polls the node and feeds every new height through the block subject.
pub struct SyncManager {
    client: Arc<dyn TendermintClient>,
    subject: Arc<BlockSubject<BlockNotification>>,
    event_store: Arc<dyn EventStore>,
    checkpoint: Checkpointer,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    progress: Arc<Progress>,
    state: Mutex<SyncState>,
}

impl SyncManager {
    pub fn new(
        client: Arc<dyn TendermintClient>,
        subject: Arc<BlockSubject<BlockNotification>>,
        event_store: Arc<dyn EventStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            client,
            subject,
            event_store,
            checkpoint: Checkpointer::new(checkpoints, SYNC_CONSUMER_ID),
            retry: RetryPolicy::default().with_alert_after(10),
            clock: Arc::new(TokioClock),
            progress: Arc::new(Progress::new()),
            state: Mutex::new(SyncState::Idle),
        }
    }

    /// Poll interval and alarm threshold.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn subject(&self) -> &Arc<BlockSubject<BlockNotification>> {
        &self.subject
    }

    pub fn state(&self) -> SyncState {
        self.state.lock().map(|s| *s).unwrap_or(SyncState::Idle)
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Last height whose events are recorded, `None` before the first one.
    pub async fn last_indexed_height(&self) -> Result<Option<Height>, FeedError> {
        self.checkpoint.last_height().await
    }

    /// Tick forever: poll, sync, then sleep one poll interval.
    pub async fn run(&self) {
        tracing::info!(
            poll_interval_ms = self.retry.interval.as_millis() as u64,
            subscribers = self.subject.len(),
            "starting sync manager"
        );
        loop {
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "error synchronizing blocks");
            }
            self.set_state(SyncState::Idle);
            self.clock.sleep(self.retry.interval).await;
        }
    }

    /// One `Polling → Syncing` pass. Returns the number of heights synced.
    ///
    /// An unreachable node, or one without a committed height, is not an
    /// error: the pass just syncs nothing.
    pub async fn tick(&self) -> Result<u64, FeedError> {
        self.set_state(SyncState::Polling);
        let latest = match self.client.latest_height().await {
            Ok(Some(latest)) => latest,
            Ok(None) => {
                tracing::debug!("node has no committed height yet");
                return Ok(0);
            }
            Err(e) => {
                tracing::warn!(error = %e, "error getting latest block height from node");
                return Ok(0);
            }
        };
        self.sync_blocks(latest).await
    }

    /// Sync every height from the checkpoint + 1 up to `latest - 1`.
    pub async fn sync_blocks(&self, latest: Height) -> Result<u64, FeedError> {
        self.set_state(SyncState::Syncing);
        let last_indexed = self.checkpoint.last_height().await?.unwrap_or(0);
        let mut current = last_indexed + 1;
        self.progress.set_next(current);

        let mut synced = 0;
        while current < latest {
            if let Err(e) = self.sync_height(current).await {
                self.record_failure(current, &e);
                return Err(e);
            }
            tracing::info!(height = current, "block synced and events produced");
            synced += 1;
            current += 1;
            self.progress.record_success(current);
        }
        Ok(synced)
    }

    /// Fetch, publish, record and checkpoint a single height.
    ///
    /// A height without subscribers or events is still recorded, so the
    /// event store and the checkpoint always cover the same heights.
    async fn sync_height(&self, height: Height) -> Result<(), FeedError> {
        let (block, raw_block) = self.client.block(height).await?;
        let block_results = self.client.block_results(height).await?;
        if block.height != height || block_results.height != height {
            return Err(FeedError::Rpc(format!(
                "asked for height {height}, node answered block {} and results {}",
                block.height, block_results.height
            )));
        }

        let notification = BlockNotification::new(block, raw_block, block_results);
        let events = self.subject.notify(&notification).await?.into_events();

        tracing::debug!(height, events = events.len(), "appending block events");
        self.event_store.append(height, events).await?;
        self.checkpoint.commit(height).await
    }

    fn record_failure(&self, height: Height, error: &FeedError) {
        let failures = self.progress.record_failure(height, &self.retry);
        tracing::error!(
            height,
            attempt = failures,
            malformed = error.is_malformed(),
            error = %error,
            "error syncing block"
        );
        if self.retry.should_alert(failures) {
            tracing::error!(
                height,
                failures,
                "sync stalled: height keeps failing"
            );
        }
    }

    fn set_state(&self, state: SyncState) {
        if let Ok(mut s) = self.state.lock() {
            *s = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::CommandSubscriber;
    use crate::tx::TxDecoder;
    use crate::types::{Block, BlockResults, RawBlock};
    use async_trait::async_trait;
    use chainfeed_core::testing::RecordingClock;
    use chainfeed_core::{BlockSubscriber, Event, EventBatch, MemoryCheckpointStore};
    use chainfeed_storage::InMemoryStorage;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedNode {
        latest: Mutex<Option<Height>>,
        /// height → remaining `block_results` failures
        failures: Mutex<HashMap<Height, u32>>,
        unreachable: Mutex<bool>,
    }

    impl ScriptedNode {
        fn at(latest: Height) -> Arc<Self> {
            let node = Self::default();
            *node.latest.lock().unwrap() = Some(latest);
            Arc::new(node)
        }

        fn fail(&self, height: Height, times: u32) {
            self.failures.lock().unwrap().insert(height, times);
        }
    }

    #[async_trait]
    impl TendermintClient for ScriptedNode {
        async fn block(&self, height: Height) -> Result<(Block, RawBlock), FeedError> {
            let block = Block {
                height,
                hash: format!("H{height}"),
                chain_id: "test".into(),
                time: Utc::now(),
                app_hash: String::new(),
                proposer_address: String::new(),
                txs: vec![],
                signatures: vec![],
            };
            Ok((block, RawBlock(String::new())))
        }

        async fn block_results(&self, height: Height) -> Result<BlockResults, FeedError> {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&height) {
                if *left > 0 {
                    *left -= 1;
                    return Err(FeedError::Rpc(format!("results for {height} not ready")));
                }
            }
            Ok(BlockResults {
                height,
                txs_results: vec![],
            })
        }

        async fn latest_height(&self) -> Result<Option<Height>, FeedError> {
            if *self.unreachable.lock().unwrap() {
                return Err(FeedError::Rpc("connection refused".into()));
            }
            Ok(*self.latest.lock().unwrap())
        }
    }

    struct Fixture {
        node: Arc<ScriptedNode>,
        store: Arc<InMemoryStorage>,
        sync: SyncManager,
    }

    fn fixture(latest: Height) -> Fixture {
        let node = ScriptedNode::at(latest);
        let store = Arc::new(InMemoryStorage::new());
        let subject = Arc::new(BlockSubject::new());
        subject.attach(Arc::new(CommandSubscriber::new(TxDecoder::new("basetcro"))));
        let sync = SyncManager::new(node.clone(), subject, store.clone(), store.clone())
            .with_retry(RetryPolicy::fixed(Duration::from_secs(5)).with_alert_after(2));
        Fixture { node, store, sync }
    }

    #[tokio::test]
    async fn stays_one_height_behind_the_node() {
        let f = fixture(4);
        assert_eq!(f.sync.tick().await.unwrap(), 3);
        assert_eq!(f.sync.last_indexed_height().await.unwrap(), Some(3));
        assert_eq!(f.store.latest_height().await.unwrap(), Some(3));
        assert_eq!(f.sync.progress().next_height, 4);

        // Nothing new until the node moves on.
        assert_eq!(f.sync.tick().await.unwrap(), 0);
        *f.node.latest.lock().unwrap() = Some(6);
        assert_eq!(f.sync.tick().await.unwrap(), 2);
        assert_eq!(f.sync.last_indexed_height().await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn fetch_failure_aborts_pass_without_advancing() {
        let f = fixture(6);
        f.node.fail(3, 1);

        let err = f.sync.tick().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(f.sync.last_indexed_height().await.unwrap(), Some(2));
        assert_eq!(f.store.latest_height().await.unwrap(), Some(2));
        assert_eq!(f.sync.progress().consecutive_failures, 1);

        assert_eq!(f.sync.tick().await.unwrap(), 3);
        assert_eq!(f.sync.last_indexed_height().await.unwrap(), Some(5));
        assert_eq!(f.sync.progress().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn repeated_failures_mark_sync_stalled() {
        let f = fixture(3);
        f.node.fail(1, u32::MAX);

        for _ in 0..2 {
            f.sync.tick().await.unwrap_err();
        }
        let progress = f.sync.progress();
        assert_eq!(progress.next_height, 1);
        assert_eq!(progress.consecutive_failures, 2);
        assert!(progress.stalled);
        assert_eq!(f.sync.last_indexed_height().await.unwrap(), None);
    }

    struct Rejecting;

    #[async_trait]
    impl BlockSubscriber<BlockNotification> for Rejecting {
        fn name(&self) -> &str {
            "rejecting"
        }

        async fn on_notification(
            &self,
            n: &BlockNotification,
            _: &mut EventBatch,
        ) -> Result<(), FeedError> {
            Err(FeedError::Other(format!("rejects {}", n.height)))
        }
    }

    /// Adds one `Tagged` event per height; fails chosen heights a number of times.
    #[derive(Default)]
    struct Tagger {
        failures: Mutex<HashMap<Height, u32>>,
    }

    #[async_trait]
    impl BlockSubscriber<BlockNotification> for Tagger {
        fn name(&self) -> &str {
            "tagger"
        }

        async fn on_notification(
            &self,
            n: &BlockNotification,
            batch: &mut EventBatch,
        ) -> Result<(), FeedError> {
            {
                let mut failures = self.failures.lock().unwrap();
                if let Some(left) = failures.get_mut(&n.height) {
                    if *left > 0 {
                        *left -= 1;
                        return Err(FeedError::Other(format!("tagger rejects {}", n.height)));
                    }
                }
            }
            batch.push(Event::new("Tagged", n.height, serde_json::json!({ "height": n.height })))
        }
    }

    async fn names_at(store: &InMemoryStorage, height: Height) -> Vec<String> {
        store
            .get_all_by_height(height)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    #[tokio::test]
    async fn subscriber_failure_blocks_checkpoint() {
        let f = fixture(3);
        f.sync.subject().attach(Arc::new(Rejecting));

        let err = f.sync.tick().await.unwrap_err();
        assert!(matches!(err, FeedError::Subscriber { height: 1, failed: 1 }));
        assert_eq!(f.sync.last_indexed_height().await.unwrap(), None);
        assert_eq!(f.store.latest_height().await.unwrap(), None);
    }

    #[tokio::test]
    async fn every_subscriber_reaches_the_store() {
        let f = fixture(3);
        f.sync.subject().attach(Arc::new(Tagger::default()));

        assert_eq!(f.sync.tick().await.unwrap(), 2);
        for height in [1, 2] {
            assert_eq!(names_at(&f.store, height).await, ["BlockCreated", "Tagged"]);
        }
    }

    #[tokio::test]
    async fn partial_failure_records_nothing_until_retry() {
        let f = fixture(4);
        let tagger = Arc::new(Tagger::default());
        tagger.failures.lock().unwrap().insert(2, 1);
        f.sync.subject().attach(tagger);

        let err = f.sync.tick().await.unwrap_err();
        assert!(matches!(err, FeedError::Subscriber { height: 2, failed: 1 }));
        assert_eq!(f.store.latest_height().await.unwrap(), Some(1));
        assert!(names_at(&f.store, 2).await.is_empty());
        assert_eq!(f.sync.last_indexed_height().await.unwrap(), Some(1));

        assert_eq!(f.sync.tick().await.unwrap(), 2);
        assert_eq!(names_at(&f.store, 2).await, ["BlockCreated", "Tagged"]);
        assert_eq!(f.sync.last_indexed_height().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn unreachable_node_is_not_an_error() {
        let f = fixture(5);
        *f.node.unreachable.lock().unwrap() = true;
        assert_eq!(f.sync.tick().await.unwrap(), 0);

        *f.node.unreachable.lock().unwrap() = false;
        *f.node.latest.lock().unwrap() = None;
        assert_eq!(f.sync.tick().await.unwrap(), 0);
        assert_eq!(f.sync.last_indexed_height().await.unwrap(), None);
    }

    #[tokio::test]
    async fn resumes_from_existing_checkpoint() {
        let node = ScriptedNode::at(10);
        let store = Arc::new(InMemoryStorage::new());
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        Checkpointer::new(checkpoints.clone(), SYNC_CONSUMER_ID)
            .commit(7)
            .await
            .unwrap();

        let sync = SyncManager::new(node, Arc::new(BlockSubject::new()), store.clone(), checkpoints);
        assert_eq!(sync.tick().await.unwrap(), 2);
        assert_eq!(sync.last_indexed_height().await.unwrap(), Some(9));

        // No subscribers: the heights are still recorded, without events.
        assert_eq!(store.latest_height().await.unwrap(), Some(9));
        assert!(store.get_all_by_height(8).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_sleeps_one_poll_interval_between_ticks() {
        let clock = Arc::new(RecordingClock::new());
        let f = fixture(3);
        let sync = Arc::new(f.sync.with_clock(clock.clone()));

        let task = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.run().await })
        };
        while clock.count(Duration::from_secs(5)) < 3 {
            tokio::task::yield_now().await;
        }
        task.abort();

        assert_eq!(sync.last_indexed_height().await.unwrap(), Some(2));
        assert!(clock.sleeps().iter().all(|d| *d == Duration::from_secs(5)));
    }
}
