use crate::transaction::{TxHash, Wei};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("results for slot {0} already recorded")]
    SlotAlreadyRecorded(u64),
    #[error("slot {0} is not settled")]
    SlotNotSettled(u64),
}

/// Outcome of one transaction's auction in one settled slot. Immutable
/// once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuctionResult {
    pub tx_hash: TxHash,
    pub slot: u64,
    pub winner: String,
    pub payment: Wei,
}

/// A builder's view of one settled slot.
#[derive(Debug, Clone, Serialize)]
pub struct BuilderSlotReport {
    pub slot: u64,
    pub builder: String,
    pub total_payment: Wei,
    pub results: Vec<AuctionResult>,
}

/// Append-only record of settlement outputs, keyed by slot.
pub struct ResultStore {
    slots: BTreeMap<u64, Vec<AuctionResult>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self { slots: BTreeMap::new() }
    }

    /// Record a settled slot's results, exactly once. A second call for the
    /// same slot means a double settlement upstream and is rejected.
    pub fn record(&mut self, slot: u64, results: Vec<AuctionResult>) -> Result<(), StoreError> {
        if self.slots.contains_key(&slot) {
            return Err(StoreError::SlotAlreadyRecorded(slot));
        }
        info!("Recorded {} results for slot {}", results.len(), slot);
        self.slots.insert(slot, results);
        Ok(())
    }

    /// A builder's winnings in a settled slot: the subset of results it
    /// won, plus the sum of their payments.
    pub fn query(&self, builder: &str, slot: u64) -> Result<BuilderSlotReport, StoreError> {
        let results = self.slots.get(&slot).ok_or(StoreError::SlotNotSettled(slot))?;
        let won: Vec<AuctionResult> = results
            .iter()
            .filter(|r| r.winner == builder)
            .cloned()
            .collect();
        let total_payment = won.iter().map(|r| r.payment).sum();
        Ok(BuilderSlotReport {
            slot,
            builder: builder.to_string(),
            total_payment,
            results: won,
        })
    }

    pub fn is_settled(&self, slot: u64) -> bool {
        self.slots.contains_key(&slot)
    }

    pub fn settled_slots(&self) -> usize {
        self.slots.len()
    }
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new()
    }
}
