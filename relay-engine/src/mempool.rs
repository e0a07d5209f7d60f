use crate::transaction::Transaction;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Public-mempool collaborator: consumes transactions the pool released
/// after aging out.
#[async_trait]
pub trait MempoolBroadcaster: Send + Sync {
    async fn broadcast(&self, tx: &Transaction) -> Result<()>;
}

/// Forwards released transactions to an external mempool endpoint as
/// `{"rawTx": "0x..."}`.
pub struct HttpMempoolBroadcaster {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMempoolBroadcaster {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl MempoolBroadcaster for HttpMempoolBroadcaster {
    async fn broadcast(&self, tx: &Transaction) -> Result<()> {
        let body = serde_json::json!({ "rawTx": format!("0x{}", hex::encode(&tx.raw)) });
        self.client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        info!("Broadcast released transaction {} to {}", tx.hash, self.endpoint);
        Ok(())
    }
}

/// Discards released transactions. Used when no public mempool endpoint is
/// configured.
pub struct NullBroadcaster;

#[async_trait]
impl MempoolBroadcaster for NullBroadcaster {
    async fn broadcast(&self, tx: &Transaction) -> Result<()> {
        debug!("Dropping released transaction {} (no mempool endpoint)", tx.hash);
        Ok(())
    }
}

/// Test broadcaster that records what it was handed.
#[derive(Clone, Default)]
pub struct RecordingBroadcaster {
    pub broadcasts: Arc<RwLock<Vec<Transaction>>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.read().unwrap().len()
    }
}

#[async_trait]
impl MempoolBroadcaster for RecordingBroadcaster {
    async fn broadcast(&self, tx: &Transaction) -> Result<()> {
        self.broadcasts.write().unwrap().push(tx.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TxHash, TxState};

    fn released_tx() -> Transaction {
        Transaction {
            hash: TxHash::from_bytes([1; 32]),
            payload: serde_json::json!({}),
            raw: vec![1, 2, 3],
            reserve: 100,
            age: 10,
            state: TxState::Released,
        }
    }

    #[tokio::test]
    async fn test_recording_broadcaster_records() {
        let broadcaster = RecordingBroadcaster::new();
        broadcaster.broadcast(&released_tx()).await.unwrap();
        broadcaster.broadcast(&released_tx()).await.unwrap();
        assert_eq!(broadcaster.broadcast_count(), 2);
    }

    #[tokio::test]
    async fn test_null_broadcaster_accepts_everything() {
        assert!(NullBroadcaster.broadcast(&released_tx()).await.is_ok());
    }
}
