use crate::results::AuctionResult;
use crate::transaction::{TxHash, Wei};
use crate::transaction_pool::TransactionPool;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuctionError {
    #[error("slot {0} is not open for bidding")]
    SlotClosed(u64),
    #[error("transaction {0} is not open to bidding")]
    UnknownTransaction(TxHash),
    #[error("bid of {bid} wei does not exceed reserve of {reserve} wei")]
    ReserveNotMet { bid: Wei, reserve: Wei },
    #[error("expected next slot {expected}, got {got}")]
    OutOfOrderSlot { expected: u64, got: u64 },
}

/// A sealed bid, scoped to one open slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bid {
    pub builder: String,
    pub tx_hash: TxHash,
    pub value: Wei,
    pub slot: u64,
    /// Monotone submission counter, used to break value ties in favor of
    /// the earliest bid. A replacement bid is a new submission and gets a
    /// fresh counter value.
    pub seq: u64,
}

/// Sealed-bid second-price auction engine with reserve price.
///
/// Owns the bids for the currently open slot and nothing else: transaction
/// state stays authoritative in the `TransactionPool`, and settled bids
/// survive only inside the `AuctionResult`s handed to the caller.
pub struct AuctionEngine {
    open_slot: u64,
    accepting: bool,
    /// Per transaction, the single active bid of each builder. Outer map is
    /// ordered so settlement walks transactions deterministically.
    bids: BTreeMap<TxHash, HashMap<String, Bid>>,
    next_seq: u64,
}

impl AuctionEngine {
    pub fn new(start_slot: u64) -> Self {
        Self {
            open_slot: start_slot,
            accepting: true,
            bids: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// The slot currently accepting bids, if bidding is open.
    pub fn open_slot(&self) -> Option<u64> {
        self.accepting.then_some(self.open_slot)
    }

    /// Record (or overwrite) a builder's sealed bid on a pending
    /// transaction in the open slot. The bid must strictly exceed the
    /// transaction's reserve price.
    pub fn submit_bid(
        &mut self,
        pool: &TransactionPool,
        builder: &str,
        tx_hash: TxHash,
        value: Wei,
        slot: u64,
    ) -> Result<(), AuctionError> {
        if !self.accepting || slot != self.open_slot {
            return Err(AuctionError::SlotClosed(slot));
        }
        if !pool.is_pending(&tx_hash) {
            return Err(AuctionError::UnknownTransaction(tx_hash));
        }
        let reserve = pool
            .reserve_of(&tx_hash)
            .ok_or(AuctionError::UnknownTransaction(tx_hash))?;
        if value <= reserve {
            return Err(AuctionError::ReserveNotMet { bid: value, reserve });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let bid = Bid {
            builder: builder.to_string(),
            tx_hash,
            value,
            slot,
            seq,
        };
        debug!(
            "Recorded bid of {} wei from {} on {} in slot {}",
            value, builder, tx_hash, slot
        );
        self.bids
            .entry(tx_hash)
            .or_default()
            .insert(builder.to_string(), bid);
        Ok(())
    }

    /// Settle the currently open slot, exactly once.
    ///
    /// Closes bidding first, then for every transaction with at least one
    /// bid that is still `Pending`: the highest bid wins (value ties go to
    /// the earliest submission), and the winner pays the second-highest bid
    /// value, or the reserve when the bid stood alone. Winners are flagged
    /// `Sold` in the pool. All bids for the slot are discarded afterwards.
    ///
    /// Deterministic and pure given the bid set and pool snapshot: the same
    /// bids produce the same result sequence.
    pub fn settle(
        &mut self,
        pool: &mut TransactionPool,
        slot: u64,
    ) -> Result<Vec<AuctionResult>, AuctionError> {
        if !self.accepting || slot != self.open_slot {
            return Err(AuctionError::SlotClosed(slot));
        }
        // Hard cutover: no bid for this slot is accepted past this point.
        self.accepting = false;

        let auctions = std::mem::take(&mut self.bids);
        let mut results = Vec::new();
        for (tx_hash, bids) in auctions {
            // A bid-carrying transaction may have been included on-chain or
            // discarded since the bid landed; it simply yields no result.
            if !pool.is_pending(&tx_hash) {
                debug!("Skipping settlement of {}: no longer pending", tx_hash);
                continue;
            }
            let reserve = pool
                .reserve_of(&tx_hash)
                .ok_or(AuctionError::UnknownTransaction(tx_hash))?;

            let mut ranked: Vec<Bid> = bids.into_values().collect();
            ranked.sort_by(|a, b| b.value.cmp(&a.value).then(a.seq.cmp(&b.seq)));

            let winner = &ranked[0];
            let payment = match ranked.get(1) {
                Some(second) => second.value,
                None => reserve,
            };

            pool.mark_sold(&tx_hash)
                .map_err(|_| AuctionError::UnknownTransaction(tx_hash))?;
            info!(
                "Slot {} auction for {}: {} wins with {} wei, pays {} wei ({} bids)",
                slot,
                tx_hash,
                winner.builder,
                winner.value,
                payment,
                ranked.len()
            );
            results.push(AuctionResult {
                tx_hash,
                slot,
                winner: winner.builder.clone(),
                payment,
            });
        }
        Ok(results)
    }

    /// Advance the open-slot pointer. Slots move strictly one at a time.
    pub fn open_next_slot(&mut self, new_slot: u64) -> Result<(), AuctionError> {
        if new_slot != self.open_slot + 1 {
            return Err(AuctionError::OutOfOrderSlot {
                expected: self.open_slot + 1,
                got: new_slot,
            });
        }
        self.open_slot = new_slot;
        self.accepting = true;
        Ok(())
    }

    pub fn bid_count(&self) -> usize {
        self.bids.values().map(|per_tx| per_tx.len()).sum()
    }
}
