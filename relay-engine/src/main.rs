use anyhow::Result;
use clap::Parser;
use relay_engine::{
    server, HttpMempoolBroadcaster, InMemoryRegistry, JsonPayloadDecoder, MempoolBroadcaster,
    NullBroadcaster, Relay, RelayError,
};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "relay-engine", about = "Sealed-bid second-price transaction relay")]
struct Args {
    /// Port for the builder/user HTTP API
    #[arg(long, default_value_t = 8545)]
    port: u16,

    /// Slot length in milliseconds
    #[arg(long, default_value_t = 12_000)]
    slot_ms: u64,

    /// Slot number the relay opens with
    #[arg(long, default_value_t = 0)]
    start_slot: u64,

    /// Public mempool endpoint for aged-out transactions; released
    /// transactions are dropped when unset
    #[arg(long)]
    mempool_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let args = Args::parse();
    info!(
        "Starting relay: slot {} open, {}ms per slot",
        args.start_slot, args.slot_ms
    );

    let mempool: Arc<dyn MempoolBroadcaster> = match &args.mempool_url {
        Some(url) => Arc::new(HttpMempoolBroadcaster::new(url.clone())),
        None => Arc::new(NullBroadcaster),
    };
    let relay = Arc::new(Relay::new(
        args.start_slot,
        Arc::new(JsonPayloadDecoder::new()),
        Arc::new(InMemoryRegistry::new()),
        mempool,
    ));

    spawn_slot_clock(Arc::clone(&relay), args.start_slot, args.slot_ms);

    server::serve(relay, args.port).await
}

/// Translate wall time into injected slot events. The core itself never
/// polls a clock; this task is the only place real time enters.
fn spawn_slot_clock(relay: Arc<Relay>, start_slot: u64, slot_ms: u64) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(slot_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; the opening slot is already
        // live, so swallow it.
        ticker.tick().await;

        let mut slot = start_slot;
        loop {
            ticker.tick().await;
            slot += 1;
            match relay.new_slot_observed(slot).await {
                Ok(transition) => info!(
                    "Slot {} settled: {} results, {} released",
                    transition.settled_slot,
                    transition.results.len(),
                    transition.released.len()
                ),
                Err(RelayError::Scheduler(e)) => warn!("Slot clock out of sync: {}", e),
                Err(e) => warn!("Slot transition failed: {}", e),
            }
        }
    });
}
