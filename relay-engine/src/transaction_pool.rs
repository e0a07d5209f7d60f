use crate::decoder::DecodedTx;
use crate::transaction::{Transaction, TxHash, TxState, MAX_TX_AGE_SLOTS};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("transaction {0} already in the pool")]
    DuplicateTransaction(TxHash),
    #[error("transaction {0} is not open to bidding")]
    UnknownTransaction(TxHash),
}

/// Owns all transaction records and their lifecycle state.
///
/// Keyed by hash in a `BTreeMap` so every walk over the pool is in
/// deterministic hash order. Terminal records are retained for duplicate
/// detection; the retention window is the process lifetime.
pub struct TransactionPool {
    txs: BTreeMap<TxHash, Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self { txs: BTreeMap::new() }
    }

    /// Admit a decoded transaction as `Pending` with age 0.
    pub fn submit(&mut self, decoded: DecodedTx) -> Result<TxHash, PoolError> {
        let hash = decoded.hash;
        if self.txs.contains_key(&hash) {
            return Err(PoolError::DuplicateTransaction(hash));
        }
        info!("Admitting transaction {} with reserve {} wei", hash, decoded.reserve);
        self.txs.insert(
            hash,
            Transaction {
                hash,
                payload: decoded.payload,
                raw: decoded.raw,
                reserve: decoded.reserve,
                age: 0,
                state: TxState::Pending,
            },
        );
        Ok(hash)
    }

    /// Snapshot of all `Pending` transactions, fresh on every call.
    pub fn list_available(&self) -> Vec<Transaction> {
        self.txs
            .values()
            .filter(|tx| tx.state == TxState::Pending)
            .cloned()
            .collect()
    }

    pub fn get(&self, hash: &TxHash) -> Option<&Transaction> {
        self.txs.get(hash)
    }

    /// True only while the transaction is open to bidding.
    pub fn is_pending(&self, hash: &TxHash) -> bool {
        matches!(self.txs.get(hash), Some(tx) if tx.state == TxState::Pending)
    }

    pub fn reserve_of(&self, hash: &TxHash) -> Option<u128> {
        self.txs.get(hash).map(|tx| tx.reserve)
    }

    /// Chain-watcher callback: any non-terminal transaction becomes
    /// `Included`. Idempotent; unknown hashes are ignored because the
    /// watcher also observes transactions that never passed through us.
    pub fn mark_included(&mut self, hash: &TxHash) {
        if let Some(tx) = self.txs.get_mut(hash) {
            if !tx.state.is_terminal() {
                debug!("Transaction {} included on-chain", hash);
                tx.state = TxState::Included;
            }
        }
    }

    /// `Pending`/`Sold` -> `Discarded`. Idempotent, unknown hashes ignored.
    pub fn mark_invalid(&mut self, hash: &TxHash) {
        if let Some(tx) = self.txs.get_mut(hash) {
            if !tx.state.is_terminal() {
                debug!("Transaction {} discarded as invalid", hash);
                tx.state = TxState::Discarded;
            }
        }
    }

    /// Settlement callback: `Pending -> Sold`. Anything else is an error so
    /// a double settlement cannot slip through silently.
    pub fn mark_sold(&mut self, hash: &TxHash) -> Result<(), PoolError> {
        match self.txs.get_mut(hash) {
            Some(tx) if tx.state == TxState::Pending => {
                tx.state = TxState::Sold;
                Ok(())
            }
            _ => Err(PoolError::UnknownTransaction(*hash)),
        }
    }

    /// Advance age by one slot for every `Pending`/`Sold` transaction.
    /// Transactions reaching `MAX_TX_AGE_SLOTS` flip to `Released` and are
    /// returned so the caller can hand them to the public mempool outside
    /// the critical section. Runs once per slot advance.
    pub fn tick(&mut self) -> Vec<Transaction> {
        let mut released = Vec::new();
        for tx in self.txs.values_mut() {
            if !matches!(tx.state, TxState::Pending | TxState::Sold) {
                continue;
            }
            tx.age += 1;
            if tx.age >= MAX_TX_AGE_SLOTS {
                tx.state = TxState::Released;
                released.push(tx.clone());
            }
        }
        if !released.is_empty() {
            info!("Released {} aged-out transactions to the public mempool", released.len());
        }
        released
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}

impl Default for TransactionPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(seed: u8, reserve: u128) -> DecodedTx {
        DecodedTx {
            hash: TxHash::from_bytes([seed; 32]),
            payload: serde_json::json!({ "nonce": seed }),
            raw: vec![seed; 4],
            reserve,
        }
    }

    #[test]
    fn test_submit_creates_pending_record() {
        let mut pool = TransactionPool::new();
        let hash = pool.submit(decoded(1, 500)).unwrap();

        let tx = pool.get(&hash).unwrap();
        assert_eq!(tx.state, TxState::Pending);
        assert_eq!(tx.age, 0);
        assert_eq!(tx.reserve, 500);
    }

    #[test]
    fn test_submit_rejects_duplicate() {
        let mut pool = TransactionPool::new();
        pool.submit(decoded(1, 500)).unwrap();
        assert!(matches!(
            pool.submit(decoded(1, 999)),
            Err(PoolError::DuplicateTransaction(_))
        ));
    }

    #[test]
    fn test_duplicate_detection_covers_terminal_states() {
        let mut pool = TransactionPool::new();
        let hash = pool.submit(decoded(1, 500)).unwrap();
        pool.mark_invalid(&hash);

        // Discarded records still block resubmission.
        assert!(matches!(
            pool.submit(decoded(1, 500)),
            Err(PoolError::DuplicateTransaction(_))
        ));
    }

    #[test]
    fn test_list_available_only_returns_pending() {
        let mut pool = TransactionPool::new();
        let sold = pool.submit(decoded(1, 100)).unwrap();
        let pending = pool.submit(decoded(2, 200)).unwrap();
        pool.mark_sold(&sold).unwrap();

        let available = pool.list_available();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].hash, pending);
    }

    #[test]
    fn test_mark_sold_requires_pending() {
        let mut pool = TransactionPool::new();
        let hash = pool.submit(decoded(1, 100)).unwrap();

        pool.mark_sold(&hash).unwrap();
        // Second settlement attempt must fail loudly.
        assert!(matches!(
            pool.mark_sold(&hash),
            Err(PoolError::UnknownTransaction(_))
        ));

        let unknown = TxHash::from_bytes([9; 32]);
        assert!(pool.mark_sold(&unknown).is_err());
    }

    #[test]
    fn test_mark_included_is_idempotent() {
        let mut pool = TransactionPool::new();
        let hash = pool.submit(decoded(1, 100)).unwrap();

        pool.mark_included(&hash);
        assert_eq!(pool.get(&hash).unwrap().state, TxState::Included);

        // Confirmations can be observed more than once.
        pool.mark_included(&hash);
        assert_eq!(pool.get(&hash).unwrap().state, TxState::Included);
    }

    #[test]
    fn test_mark_included_after_sold() {
        let mut pool = TransactionPool::new();
        let hash = pool.submit(decoded(1, 100)).unwrap();
        pool.mark_sold(&hash).unwrap();

        pool.mark_included(&hash);
        assert_eq!(pool.get(&hash).unwrap().state, TxState::Included);
    }

    #[test]
    fn test_mark_invalid_does_not_touch_terminal_states() {
        let mut pool = TransactionPool::new();
        let hash = pool.submit(decoded(1, 100)).unwrap();
        pool.mark_included(&hash);

        pool.mark_invalid(&hash);
        assert_eq!(pool.get(&hash).unwrap().state, TxState::Included);
    }

    #[test]
    fn test_tick_ages_pending_and_sold() {
        let mut pool = TransactionPool::new();
        let pending = pool.submit(decoded(1, 100)).unwrap();
        let sold = pool.submit(decoded(2, 100)).unwrap();
        let included = pool.submit(decoded(3, 100)).unwrap();
        pool.mark_sold(&sold).unwrap();
        pool.mark_included(&included);

        pool.tick();
        assert_eq!(pool.get(&pending).unwrap().age, 1);
        assert_eq!(pool.get(&sold).unwrap().age, 1);
        assert_eq!(pool.get(&included).unwrap().age, 0);
    }

    #[test]
    fn test_tick_releases_at_max_age() {
        let mut pool = TransactionPool::new();
        let hash = pool.submit(decoded(1, 100)).unwrap();

        for i in 1..MAX_TX_AGE_SLOTS {
            let released = pool.tick();
            assert!(released.is_empty(), "released early at age {i}");
        }

        let released = pool.tick();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].hash, hash);
        assert_eq!(pool.get(&hash).unwrap().state, TxState::Released);
    }

    #[test]
    fn test_sold_transactions_still_age_out() {
        let mut pool = TransactionPool::new();
        let hash = pool.submit(decoded(1, 100)).unwrap();
        pool.mark_sold(&hash).unwrap();

        let mut released = Vec::new();
        for _ in 0..MAX_TX_AGE_SLOTS {
            released = pool.tick();
        }
        assert_eq!(released.len(), 1);
        assert_eq!(pool.get(&hash).unwrap().state, TxState::Released);
    }

    #[test]
    fn test_released_transactions_stop_aging() {
        let mut pool = TransactionPool::new();
        let hash = pool.submit(decoded(1, 100)).unwrap();
        for _ in 0..MAX_TX_AGE_SLOTS {
            pool.tick();
        }
        assert_eq!(pool.get(&hash).unwrap().age, MAX_TX_AGE_SLOTS);

        let released = pool.tick();
        assert!(released.is_empty());
        assert_eq!(pool.get(&hash).unwrap().age, MAX_TX_AGE_SLOTS);
    }
}
