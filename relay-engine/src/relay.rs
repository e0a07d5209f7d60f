use crate::auction::{AuctionEngine, AuctionError};
use crate::decoder::{DecodeError, TransactionDecoder};
use crate::mempool::MempoolBroadcaster;
use crate::registry::{AccessControl, AccessError, BuilderStatus};
use crate::results::{ResultStore, StoreError};
use crate::scheduler::{SchedulerError, SlotScheduler, SlotTransition};
use crate::transaction::{Transaction, TxHash, Wei};
use crate::transaction_pool::{PoolError, TransactionPool};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::warn;

#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(#[from] DecodeError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Auction(#[from] AuctionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// One settled transaction a builder won, with its payload attached.
#[derive(Debug, Clone, Serialize)]
pub struct WonTransaction {
    pub tx_hash: TxHash,
    pub payment: Wei,
    pub data: serde_json::Value,
}

/// A builder's winnings for a settled slot, ready for the wire.
#[derive(Debug, Clone, Serialize)]
pub struct BuilderResults {
    pub slot: u64,
    pub total_payment: Wei,
    pub transactions: Vec<WonTransaction>,
}

/// The bid map, pool state table and slot pointer move together or not at
/// all, so they live behind one mutex.
struct CoreState {
    pool: TransactionPool,
    engine: AuctionEngine,
    scheduler: SlotScheduler,
    store: ResultStore,
}

/// The relay's command processor.
///
/// Every mutation runs as one serialized command against `CoreState`:
/// settlement observes a frozen snapshot of bids and pool state, and no
/// bid for a slot can land once its settlement has begun. Slow collaborator
/// work (decoding, access checks, rebroadcasting, payment crediting) runs
/// strictly outside the critical section; nothing awaits while the lock is
/// held.
pub struct Relay {
    state: Mutex<CoreState>,
    decoder: Arc<dyn TransactionDecoder>,
    registry: Arc<dyn AccessControl>,
    mempool: Arc<dyn MempoolBroadcaster>,
}

impl Relay {
    pub fn new(
        start_slot: u64,
        decoder: Arc<dyn TransactionDecoder>,
        registry: Arc<dyn AccessControl>,
        mempool: Arc<dyn MempoolBroadcaster>,
    ) -> Self {
        Self {
            state: Mutex::new(CoreState {
                pool: TransactionPool::new(),
                engine: AuctionEngine::new(start_slot),
                scheduler: SlotScheduler::new(start_slot),
                store: ResultStore::new(),
            }),
            decoder,
            registry,
            mempool,
        }
    }

    /// Decode, validate and pool a raw transaction submission.
    pub async fn submit_tx(&self, raw: &[u8]) -> Result<TxHash, RelayError> {
        // Decoding may be slow or IO-bound; never do it under the lock.
        let decoded = self.decoder.decode(raw).await?;
        let mut state = self.state.lock().unwrap();
        Ok(state.pool.submit(decoded)?)
    }

    pub async fn register(&self, pubkey: &str) -> Result<(), RelayError> {
        Ok(self.registry.register(pubkey).await?)
    }

    pub async fn status(&self, pubkey: &str) -> Result<BuilderStatus, RelayError> {
        Ok(self.registry.status(pubkey).await?)
    }

    /// Snapshot of the transactions currently open to bidding.
    pub async fn tx_pool(&self, pubkey: &str) -> Result<Vec<Transaction>, RelayError> {
        self.registry.require_access(pubkey).await?;
        let state = self.state.lock().unwrap();
        Ok(state.pool.list_available())
    }

    /// Place a sealed bid in the currently open slot; returns that slot.
    pub async fn submit_bid(
        &self,
        pubkey: &str,
        tx_hash: TxHash,
        value: Wei,
    ) -> Result<u64, RelayError> {
        self.registry.require_access(pubkey).await?;
        let mut state = self.state.lock().unwrap();
        let slot = state.scheduler.current_slot();
        let CoreState { pool, engine, .. } = &mut *state;
        engine.submit_bid(pool, pubkey, tx_hash, value, slot)?;
        Ok(slot)
    }

    /// A builder's results for a settled slot, with payloads attached.
    pub async fn results(&self, pubkey: &str, slot: u64) -> Result<BuilderResults, RelayError> {
        self.registry.require_access(pubkey).await?;
        let state = self.state.lock().unwrap();
        let report = state.store.query(pubkey, slot)?;
        let transactions = report
            .results
            .into_iter()
            .map(|r| WonTransaction {
                tx_hash: r.tx_hash,
                payment: r.payment,
                // Sold records are retained, so the payload is still here.
                data: state
                    .pool
                    .get(&r.tx_hash)
                    .map(|tx| tx.payload.clone())
                    .unwrap_or(serde_json::Value::Null),
            })
            .collect();
        Ok(BuilderResults {
            slot,
            total_payment: report.total_payment,
            transactions,
        })
    }

    /// Chain-watcher callback: the transaction was confirmed on-chain.
    pub async fn mark_included(&self, tx_hash: TxHash) {
        self.state.lock().unwrap().pool.mark_included(&tx_hash);
    }

    /// The transaction became invalid; drop it from bidding.
    pub async fn mark_invalid(&self, tx_hash: TxHash) {
        self.state.lock().unwrap().pool.mark_invalid(&tx_hash);
    }

    /// Payment-enforcement hook; policy is the operator's call.
    pub async fn revoke_builder(&self, pubkey: &str) {
        self.registry.revoke(pubkey).await;
    }

    /// Slot-clock callback: run the settlement transition for the closing
    /// slot, then credit payments due and rebroadcast released
    /// transactions outside the critical section.
    pub async fn new_slot_observed(&self, slot: u64) -> Result<SlotTransition, RelayError> {
        let transition = {
            let mut state = self.state.lock().unwrap();
            let CoreState {
                pool,
                engine,
                scheduler,
                store,
            } = &mut *state;
            scheduler.advance(slot, engine, pool, store)?
        };

        for result in &transition.results {
            self.registry
                .credit_payment(&result.winner, result.payment)
                .await;
        }
        for tx in &transition.released {
            if let Err(e) = self.mempool.broadcast(tx).await {
                warn!("Failed to rebroadcast released transaction {}: {}", tx.hash, e);
            }
        }
        Ok(transition)
    }

    /// The slot currently accepting bids.
    pub fn current_slot(&self) -> u64 {
        self.state.lock().unwrap().scheduler.current_slot()
    }
}
