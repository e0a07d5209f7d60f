use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Payment and reserve amounts in wei.
pub type Wei = u128;

/// Number of slot advances a transaction may sit in the pool before it is
/// released to the public mempool, sold or not.
pub const MAX_TX_AGE_SLOTS: u64 = 10;

/// 32-byte transaction hash, displayed as 0x-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a 0x-prefixed (or bare) 64-character hex string.
    pub fn parse(s: &str) -> Result<Self, TxHashParseError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(stripped)?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| TxHashParseError::BadLength)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TxHash::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TxHashParseError {
    #[error("transaction hash is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("transaction hash must be exactly 32 bytes")]
    BadLength,
}

/// Lifecycle state of a pooled transaction.
///
/// `Included`, `Released` and `Discarded` are terminal; nothing ever
/// re-enters `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxState {
    /// Awaiting or open to bidding.
    Pending,
    /// Won by a builder in a settled slot, held awaiting on-chain inclusion.
    Sold,
    /// Confirmed on-chain.
    Included,
    /// Aged out and handed to the public mempool.
    Released,
    /// Failed validation or became invalid.
    Discarded,
}

impl TxState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxState::Included | TxState::Released | TxState::Discarded)
    }
}

/// A pooled transaction. Owned exclusively by the `TransactionPool`; the
/// payload is opaque to the core — only the hash and reserve matter here.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub hash: TxHash,
    /// Decoded structured fields, never interpreted by the core.
    pub payload: serde_json::Value,
    /// Raw signed bytes, kept so a released transaction can be rebroadcast.
    pub raw: Vec<u8>,
    /// Minimum acceptable bid, fixed at submission from the priority fee.
    pub reserve: Wei,
    /// Slots elapsed since submission.
    pub age: u64,
    pub state: TxState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_hash_parse_roundtrip() {
        let hash = TxHash::from_bytes([7u8; 32]);
        let parsed = TxHash::parse(&hash.to_string()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn test_tx_hash_parse_without_prefix() {
        let hash = TxHash::from_bytes([0xab; 32]);
        let bare = hex::encode(hash.as_bytes());
        assert_eq!(TxHash::parse(&bare).unwrap(), hash);
    }

    #[test]
    fn test_tx_hash_parse_rejects_bad_length() {
        assert!(matches!(
            TxHash::parse("0xdeadbeef"),
            Err(TxHashParseError::BadLength)
        ));
    }

    #[test]
    fn test_tx_hash_parse_rejects_non_hex() {
        assert!(matches!(
            TxHash::parse("0xzz"),
            Err(TxHashParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TxState::Pending.is_terminal());
        assert!(!TxState::Sold.is_terminal());
        assert!(TxState::Included.is_terminal());
        assert!(TxState::Released.is_terminal());
        assert!(TxState::Discarded.is_terminal());
    }

    #[test]
    fn test_tx_hash_serde_as_hex_string() {
        let hash = TxHash::from_bytes([1u8; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{hash}\""));
        let back: TxHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
