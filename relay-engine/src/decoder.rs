use crate::transaction::{TxHash, Wei};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Raw submissions larger than this are rejected before decoding.
pub const MAX_RAW_TX_BYTES: usize = 128 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("raw transaction is {got} bytes, limit is {max}")]
    Oversized { got: usize, max: usize },
    #[error("raw transaction is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("raw transaction must decode to an object")]
    NotAnObject,
    #[error("raw transaction is missing field `{0}`")]
    MissingField(&'static str),
    #[error("raw transaction field `{0}` is invalid")]
    InvalidField(&'static str),
    #[error("priority fee times gas overflows the reserve price")]
    ReserveOverflow,
    #[error("transaction failed validation: {0}")]
    Rejected(String),
}

/// A validated transaction ready for the pool.
#[derive(Debug, Clone)]
pub struct DecodedTx {
    pub hash: TxHash,
    /// Structured fields served to builders; the core never looks inside.
    pub payload: Value,
    pub raw: Vec<u8>,
    pub reserve: Wei,
}

/// External decoder/validator collaborator. Decoding may be slow or
/// IO-bound, so callers run it before entering the relay's critical
/// section.
#[async_trait]
pub trait TransactionDecoder: Send + Sync {
    async fn decode(&self, raw: &[u8]) -> Result<DecodedTx, DecodeError>;
}

/// Decoder for JSON-encoded signed transactions.
///
/// The raw bytes must be a JSON object carrying at least `gas` and
/// `maxPriorityFeePerGas`. The hash is the SHA-256 of the raw bytes and
/// the reserve price is priority fee times gas. Signature fields are
/// stripped from the payload served to builders; the signed raw bytes are
/// kept aside for rebroadcast.
pub struct JsonPayloadDecoder {
    max_raw_bytes: usize,
}

impl JsonPayloadDecoder {
    pub fn new() -> Self {
        Self { max_raw_bytes: MAX_RAW_TX_BYTES }
    }

    pub fn with_max_raw_bytes(max_raw_bytes: usize) -> Self {
        Self { max_raw_bytes }
    }

    fn required_u128(obj: &serde_json::Map<String, Value>, field: &'static str) -> Result<u128, DecodeError> {
        let value = obj.get(field).ok_or(DecodeError::MissingField(field))?;
        let parsed = match value {
            Value::Number(n) => n.as_u64().map(u128::from),
            Value::String(s) => s.parse::<u128>().ok(),
            _ => None,
        };
        match parsed {
            Some(v) if v > 0 => Ok(v),
            _ => Err(DecodeError::InvalidField(field)),
        }
    }
}

impl Default for JsonPayloadDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionDecoder for JsonPayloadDecoder {
    async fn decode(&self, raw: &[u8]) -> Result<DecodedTx, DecodeError> {
        if raw.len() > self.max_raw_bytes {
            return Err(DecodeError::Oversized {
                got: raw.len(),
                max: self.max_raw_bytes,
            });
        }

        let value: Value = serde_json::from_slice(raw)?;
        let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

        let gas = Self::required_u128(obj, "gas")?;
        let fee = Self::required_u128(obj, "maxPriorityFeePerGas")?;
        let reserve = fee.checked_mul(gas).ok_or(DecodeError::ReserveOverflow)?;

        // Builders see the transaction fields but not the signature until
        // they have won it.
        let mut payload = obj.clone();
        for sig_field in ["v", "r", "s"] {
            payload.remove(sig_field);
        }

        let digest = Sha256::digest(raw);
        let hash = TxHash::from_bytes(digest.into());

        Ok(DecodedTx {
            hash,
            payload: Value::Object(payload),
            raw: raw.to_vec(),
            reserve,
        })
    }
}

/// Test decoder with a fixed reserve and programmable failures.
pub struct MockDecoder {
    pub reserve: Wei,
    pub rejected_raws: Vec<Vec<u8>>,
}

impl MockDecoder {
    pub fn new(reserve: Wei) -> Self {
        Self {
            reserve,
            rejected_raws: Vec::new(),
        }
    }

    pub fn reject(&mut self, raw: Vec<u8>) {
        self.rejected_raws.push(raw);
    }
}

#[async_trait]
impl TransactionDecoder for MockDecoder {
    async fn decode(&self, raw: &[u8]) -> Result<DecodedTx, DecodeError> {
        if self.rejected_raws.iter().any(|r| r == raw) {
            return Err(DecodeError::Rejected("mock decoder failure".to_string()));
        }
        let digest = Sha256::digest(raw);
        Ok(DecodedTx {
            hash: TxHash::from_bytes(digest.into()),
            payload: serde_json::json!({ "len": raw.len() }),
            raw: raw.to_vec(),
            reserve: self.reserve,
        })
    }
}
