pub mod auction;
pub mod decoder;
pub mod mempool;
pub mod registry;
pub mod relay;
pub mod results;
pub mod scheduler;
pub mod server;
pub mod transaction;
pub mod transaction_pool;


// Re-export commonly used types
pub use auction::{AuctionEngine, AuctionError, Bid};
pub use decoder::{DecodedTx, JsonPayloadDecoder, MockDecoder, TransactionDecoder};
pub use mempool::{HttpMempoolBroadcaster, MempoolBroadcaster, NullBroadcaster, RecordingBroadcaster};
pub use registry::{AccessControl, AccessError, BuilderStatus, InMemoryRegistry};
pub use relay::{BuilderResults, Relay, RelayError};
pub use results::{AuctionResult, BuilderSlotReport, ResultStore, StoreError};
pub use scheduler::{SlotScheduler, SlotTransition};
pub use server::{build_router, serve};
pub use transaction::{Transaction, TxHash, TxState, Wei, MAX_TX_AGE_SLOTS};
pub use transaction_pool::{PoolError, TransactionPool};
