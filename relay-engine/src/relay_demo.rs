use anyhow::Result;
use relay_engine::{
    InMemoryRegistry, JsonPayloadDecoder, RecordingBroadcaster, Relay, MAX_TX_AGE_SLOTS,
};
use std::sync::Arc;
use tracing::{info, Level};

/// Walks the full relay lifecycle on an injected slot clock: submission,
/// sealed bidding, second-price settlement, aging and release.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let relay = Relay::new(
        100,
        Arc::new(JsonPayloadDecoder::new()),
        Arc::new(InMemoryRegistry::new()),
        broadcaster.clone(),
    );

    info!("Relay open at slot {}", relay.current_slot());

    relay.register("0xbuilder_a").await?;
    relay.register("0xbuilder_b").await?;

    // Two user transactions with different priority fees.
    let hot_tx = relay
        .submit_tx(&raw_tx(21_000, 3_000_000_000, 1))
        .await?;
    let cold_tx = relay
        .submit_tx(&raw_tx(21_000, 1_000_000_000, 2))
        .await?;
    info!("Pooled {} and {}", hot_tx, cold_tx);

    // Contested auction on the hot transaction: builder_a outbids
    // builder_b and will pay builder_b's price.
    relay
        .submit_bid("0xbuilder_a", hot_tx, 80_000_000_000_000)
        .await?;
    relay
        .submit_bid("0xbuilder_b", hot_tx, 75_000_000_000_000)
        .await?;
    // Lone bid on the cold transaction: builder_b will pay the reserve.
    relay
        .submit_bid("0xbuilder_b", cold_tx, 30_000_000_000_000)
        .await?;

    let transition = relay.new_slot_observed(101).await?;
    info!(
        "Slot {} settled with {} results",
        transition.settled_slot,
        transition.results.len()
    );

    for builder in ["0xbuilder_a", "0xbuilder_b"] {
        let results = relay.results(builder, 100).await?;
        info!(
            "{} owes {} wei for slot 100:\n{}",
            builder,
            results.total_payment,
            serde_json::to_string_pretty(&results)?
        );
    }

    // The hot transaction confirms on-chain; the cold one is left to age
    // out and gets handed to the public mempool.
    relay.mark_included(hot_tx).await;
    for offset in 2..=MAX_TX_AGE_SLOTS {
        relay.new_slot_observed(100 + offset).await?;
    }
    info!(
        "{} transactions rebroadcast to the public mempool",
        broadcaster.broadcast_count()
    );

    Ok(())
}

fn raw_tx(gas: u64, fee: u64, nonce: u64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "nonce": nonce,
        "to": "0x00000000000000000000000000000000000000aa",
        "value": "0",
        "gas": gas,
        "maxPriorityFeePerGas": fee,
        "v": 27,
        "r": "0x01",
        "s": "0x02",
    }))
    .expect("static json")
}
