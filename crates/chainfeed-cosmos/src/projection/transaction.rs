use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;

use chainfeed_core::{Checkpointer, Event, FeedError, Height, MemoryCheckpointStore, Projection};

use super::decode_payload;
use crate::coin::Coin;
use crate::command::{CreateTransactionParams, TRANSACTION_CREATED};

/// One row of the transaction read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRow {
    pub height: Height,
    pub index: usize,
    pub hash: String,
    pub success: bool,
    pub code: u32,
    pub log: String,
    pub msg_count: usize,
    pub fee: Coin,
    pub gas_wanted: String,
    pub gas_used: String,
}

/// Position of a transaction in the chain.
type TxKey = (Height, usize);

#[derive(Default)]
struct Tables {
    rows: BTreeMap<TxKey, TransactionRow>,
    /// The same transaction bytes can be included at more than one height.
    by_hash: HashMap<String, BTreeSet<TxKey>>,
}

impl Tables {
    fn insert(&mut self, row: TransactionRow) {
        let key = (row.height, row.index);
        if let Some(old) = self.rows.get(&key) {
            if old.hash != row.hash {
                let old_hash = old.hash.clone();
                if let Some(keys) = self.by_hash.get_mut(&old_hash) {
                    keys.remove(&key);
                    if keys.is_empty() {
                        self.by_hash.remove(&old_hash);
                    }
                }
            }
        }
        self.by_hash.entry(row.hash.clone()).or_default().insert(key);
        self.rows.insert(key, row);
    }
}

/// Materialises `TransactionCreated` into a table keyed by height and index.
pub struct TransactionProjection {
    checkpoint: Checkpointer,
    tables: RwLock<Tables>,
}

impl TransactionProjection {
    pub const ID: &'static str = "transaction";

    pub fn new() -> Self {
        Self::default()
    }

    /// Latest inclusion of the transaction with `hash`.
    pub fn get(&self, hash: &str) -> Option<TransactionRow> {
        let tables = self.tables.read().ok()?;
        let key = tables.by_hash.get(hash)?.iter().next_back()?;
        tables.rows.get(key).cloned()
    }

    /// Every inclusion of the transaction with `hash`, oldest first.
    pub fn occurrences(&self, hash: &str) -> Vec<TransactionRow> {
        let Ok(tables) = self.tables.read() else {
            return Vec::new();
        };
        tables
            .by_hash
            .get(hash)
            .into_iter()
            .flatten()
            .filter_map(|key| tables.rows.get(key).cloned())
            .collect()
    }

    /// Transactions of `height` in index order.
    pub fn list_by_height(&self, height: Height) -> Vec<TransactionRow> {
        let Ok(tables) = self.tables.read() else {
            return Vec::new();
        };
        tables
            .rows
            .range((height, 0)..=(height, usize::MAX))
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Number of included transactions, counting re-inclusions separately.
    pub fn len(&self) -> usize {
        self.tables.read().map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TransactionProjection {
    fn default() -> Self {
        Self {
            checkpoint: Checkpointer::new(Arc::new(MemoryCheckpointStore::new()), Self::ID),
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl From<(Height, CreateTransactionParams)> for TransactionRow {
    fn from((height, p): (Height, CreateTransactionParams)) -> Self {
        Self {
            height,
            index: p.index,
            hash: p.tx_hash,
            success: p.code == 0,
            code: p.code,
            log: p.log,
            msg_count: p.msg_count,
            fee: p.fee,
            gas_wanted: p.gas_wanted,
            gas_used: p.gas_used,
        }
    }
}

#[async_trait]
impl Projection for TransactionProjection {
    fn id(&self) -> &str {
        Self::ID
    }

    fn events_to_listen(&self) -> Vec<String> {
        vec![TRANSACTION_CREATED.to_string()]
    }

    async fn last_handled_event_height(&self) -> Result<Option<Height>, FeedError> {
        self.checkpoint.last_height().await
    }

    async fn handle_events(&self, height: Height, events: Vec<Event>) -> Result<(), FeedError> {
        let rows = events
            .iter()
            .map(|ev| {
                decode_payload::<CreateTransactionParams>(Self::ID, height, ev)
                    .map(|p| TransactionRow::from((ev.height, p)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        {
            let mut tables = self
                .tables
                .write()
                .map_err(|_| FeedError::Storage("transaction table lock poisoned".into()))?;
            for row in rows {
                tables.insert(row);
            }
        }
        self.checkpoint.commit(height).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CosmosCommand;
    use chainfeed_core::Command;

    fn created(height: Height, index: usize, hash: &str, code: u32) -> Event {
        CosmosCommand::create_transaction(
            height,
            CreateTransactionParams {
                tx_hash: hash.into(),
                index,
                code,
                log: "[]".into(),
                msg_count: 1,
                fee: Coin::zero("basetcro"),
                gas_wanted: "200000".into(),
                gas_used: "80148".into(),
                memo: String::new(),
            },
        )
        .exec()
        .unwrap()
    }

    #[tokio::test]
    async fn rows_and_checkpoint_follow_handled_heights() {
        let projection = TransactionProjection::new();
        assert_eq!(projection.last_handled_event_height().await.unwrap(), None);

        projection
            .handle_events(5, vec![created(5, 1, "BB", 11), created(5, 0, "AA", 0)])
            .await
            .unwrap();
        projection.handle_events(6, vec![]).await.unwrap();

        assert_eq!(projection.last_handled_event_height().await.unwrap(), Some(6));
        let rows = projection.list_by_height(5);
        assert_eq!(rows.iter().map(|r| r.hash.as_str()).collect::<Vec<_>>(), ["AA", "BB"]);
        assert!(!projection.get("BB").unwrap().success);
    }

    #[tokio::test]
    async fn replayed_height_does_not_duplicate_rows() {
        let projection = TransactionProjection::new();
        for _ in 0..2 {
            projection
                .handle_events(5, vec![created(5, 0, "AA", 0)])
                .await
                .unwrap();
        }
        assert_eq!(projection.len(), 1);
        assert_eq!(projection.list_by_height(5).len(), 1);
    }

    #[tokio::test]
    async fn bad_payload_is_handler_error_and_keeps_checkpoint() {
        let projection = TransactionProjection::new();
        let bogus = Event::new(TRANSACTION_CREATED, 3, serde_json::json!({ "txHash": 1 }));

        let err = projection.handle_events(3, vec![bogus]).await.unwrap_err();
        assert!(matches!(err, FeedError::Handler { height: 3, .. }));
        assert_eq!(projection.last_handled_event_height().await.unwrap(), None);
    }

    #[tokio::test]
    async fn same_hash_at_two_heights_keeps_both_rows() {
        let projection = TransactionProjection::new();
        projection
            .handle_events(2, vec![created(2, 0, "2A2A", 0)])
            .await
            .unwrap();
        projection
            .handle_events(4, vec![created(4, 1, "2A2A", 11)])
            .await
            .unwrap();

        let old = projection.list_by_height(2);
        assert_eq!(old.len(), 1);
        assert_eq!((old[0].height, old[0].code), (2, 0));
        assert_eq!(projection.list_by_height(4)[0].height, 4);

        assert_eq!(projection.len(), 2);
        assert_eq!(projection.get("2A2A").unwrap().height, 4);
        let heights: Vec<_> = projection.occurrences("2A2A").iter().map(|r| r.height).collect();
        assert_eq!(heights, [2, 4]);
    }

    #[tokio::test]
    async fn overwritten_slot_drops_the_old_hash() {
        let projection = TransactionProjection::new();
        projection
            .handle_events(3, vec![created(3, 0, "AA", 0)])
            .await
            .unwrap();
        projection
            .handle_events(3, vec![created(3, 0, "BB", 0)])
            .await
            .unwrap();

        assert!(projection.get("AA").is_none());
        assert_eq!(projection.list_by_height(3)[0].hash, "BB");
    }
}
