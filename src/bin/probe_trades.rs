//! Probe: REST trades + activity endpoints
//!
//! Hits GET https://data-api.polymarket.com/trades?limit=N and
//! GET https://data-api.polymarket.com/activity?user=<addr> and documents:
//! - Response shape and fields of the global trade feed
//! - How many records normalize into trades (wallet + timestamp present)
//! - usdcSize availability vs size * price
//! - transactionHash coverage (dedup key source)
//! - Earliest activity for the wallet of the largest trade

use std::collections::HashSet;
use std::time::Instant;

use anyhow::Result;
use polymarket_whalewatch::DATA_API_BASE;
use polymarket_whalewatch::types::{ApiTrade, Trade};
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<()> {
    let client = reqwest::Client::new();
    let limit = std::env::args().nth(1).unwrap_or_else(|| "100".to_string());

    println!("=== Probe: REST trades feed ===");
    println!();

    // 1. Fetch the global feed
    println!("--- 1. Fetch latest {limit} trades ---");
    let start = Instant::now();
    let resp = client
        .get(format!("{DATA_API_BASE}/trades"))
        .query(&[("limit", limit.as_str())])
        .send()
        .await?;
    let latency = start.elapsed();
    println!("Status: {}", resp.status());
    println!("Latency: {:?}", latency);
    let body: Value = resp.json().await?;

    let Some(arr) = body.as_array() else {
        println!("Response is not an array:");
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    };
    println!("Trade count: {}", arr.len());
    if let Some(first) = arr.first() {
        println!("\nSample trade (first):");
        println!("{}", serde_json::to_string_pretty(first)?);
    }
    println!();

    // 2. Normalization coverage
    println!("--- 2. Normalization ---");
    let raw: Vec<ApiTrade> = arr
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect();
    let with_usdc = raw.iter().filter(|t| t.usdc_size.is_some()).count();
    let trades: Vec<Trade> = raw.into_iter().filter_map(Trade::from_api).collect();
    println!("  Decoded + normalized: {} / {}", trades.len(), arr.len());
    println!("  With usdcSize: {with_usdc}");
    println!();

    // 3. transactionHash coverage
    println!("--- 3. transactionHash coverage ---");
    let mut hashes = HashSet::new();
    let mut missing = 0;
    for trade in &trades {
        match &trade.transaction_hash {
            Some(h) => {
                hashes.insert(h.clone());
            }
            None => missing += 1,
        }
    }
    println!("  Unique hashes: {}", hashes.len());
    println!("  Missing hash: {missing}");
    println!();

    // 4. Earliest activity for the largest trade's wallet
    let Some(largest) = trades.iter().max_by_key(|t| t.usd_value) else {
        println!("=== Probe Complete (no trades) ===");
        return Ok(());
    };
    println!(
        "--- 4. Earliest activity for {} (largest trade ${}) ---",
        largest.wallet, largest.usd_value
    );
    let start = Instant::now();
    let resp = client
        .get(format!("{DATA_API_BASE}/activity"))
        .query(&[
            ("user", largest.wallet.as_str()),
            ("type", "TRADE"),
            ("limit", "1"),
            ("sortBy", "TIMESTAMP"),
            ("sortDirection", "ASC"),
        ])
        .send()
        .await?;
    println!("Status: {} (latency: {:?})", resp.status(), start.elapsed());
    let body: Value = resp.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    println!();

    println!("=== Probe Complete ===");
    Ok(())
}
