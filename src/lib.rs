pub mod api;
pub mod classifier;
pub mod config;
pub mod dedup;
pub mod monitor;
pub mod reporter;
pub mod state;
pub mod types;
pub mod wallet_age;

/// Polymarket data API base URL (public, no auth required)
pub const DATA_API_BASE: &str = "https://data-api.polymarket.com";
