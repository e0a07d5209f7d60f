use crate::auction::{AuctionEngine, AuctionError};
use crate::results::{AuctionResult, ResultStore, StoreError};
use crate::transaction::Transaction;
use crate::transaction_pool::TransactionPool;
use tracing::{info, warn};

#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("expected next slot {expected}, got {got}")]
    OutOfOrderSlot { expected: u64, got: u64 },
    #[error(transparent)]
    Auction(#[from] AuctionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything one slot transition produced. Results are already recorded
/// in the store; released transactions still need rebroadcasting, which
/// the caller does outside the critical section.
#[derive(Debug)]
pub struct SlotTransition {
    pub settled_slot: u64,
    pub results: Vec<AuctionResult>,
    pub released: Vec<Transaction>,
}

/// Drives time progression. The scheduler never polls a clock: it only
/// reacts to injected "new slot observed" events, which keeps the whole
/// state machine testable without real time.
pub struct SlotScheduler {
    current_slot: u64,
}

impl SlotScheduler {
    pub fn new(start_slot: u64) -> Self {
        Self { current_slot: start_slot }
    }

    pub fn current_slot(&self) -> u64 {
        self.current_slot
    }

    /// Run the slot transition for an observed new slot:
    ///
    /// 1. settle the closing slot and record its results,
    /// 2. age the pool, collecting released transactions,
    /// 3. open bidding for the new slot.
    ///
    /// Duplicate or out-of-order signals are rejected before any step runs,
    /// so each slot settles exactly once. Callers serialize this with all
    /// other mutations, making the three steps one atomic transition.
    pub fn advance(
        &mut self,
        new_slot: u64,
        engine: &mut AuctionEngine,
        pool: &mut TransactionPool,
        store: &mut ResultStore,
    ) -> Result<SlotTransition, SchedulerError> {
        if new_slot != self.current_slot + 1 {
            warn!(
                "Ignoring slot signal {}: expected {}",
                new_slot,
                self.current_slot + 1
            );
            return Err(SchedulerError::OutOfOrderSlot {
                expected: self.current_slot + 1,
                got: new_slot,
            });
        }

        let settled_slot = self.current_slot;
        let results = engine.settle(pool, settled_slot)?;
        store.record(settled_slot, results.clone())?;
        let released = pool.tick();
        engine.open_next_slot(new_slot)?;
        self.current_slot = new_slot;

        info!(
            "Slot {} settled with {} results, {} transactions released, slot {} open",
            settled_slot,
            results.len(),
            released.len(),
            new_slot
        );
        Ok(SlotTransition {
            settled_slot,
            results,
            released,
        })
    }
}
