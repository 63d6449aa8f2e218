use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Raw trade record as returned by the data API (`/trades`, `/activity`).
///
/// Every field is optional: the feed occasionally carries partial records and
/// a single bad record must not sink the whole batch.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTrade {
    #[serde(default)]
    pub proxy_wallet: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub size: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub usdc_size: Option<Decimal>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized trade, immutable once built from an [`ApiTrade`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub transaction_hash: Option<String>,
    pub wallet: String,
    /// Market condition ID.
    pub market: String,
    pub title: String,
    pub side: TradeSide,
    /// Outcome label the shares were traded on (e.g. "Yes" / "No").
    pub outcome: String,
    pub size: Decimal,
    pub price: Decimal,
    /// USD notional: `usdcSize` when the feed supplies it, else `size * price`.
    pub usd_value: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// Normalize a raw record. Returns `None` when the wallet or timestamp is
    /// missing, since neither age resolution nor dedup can work without them,
    /// or when `size * price` does not fit in a `Decimal`.
    pub fn from_api(raw: ApiTrade) -> Option<Self> {
        let wallet = raw.proxy_wallet.filter(|w| !w.trim().is_empty())?;
        let timestamp = Utc.timestamp_opt(raw.timestamp?, 0).single()?;

        let side = match raw.side.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("SELL") => TradeSide::Sell,
            _ => TradeSide::Buy,
        };
        let size = raw.size.unwrap_or(Decimal::ZERO);
        let price = raw.price.unwrap_or(Decimal::ZERO);
        let usd_value = match raw.usdc_size {
            Some(v) if v > Decimal::ZERO => v,
            _ => size.checked_mul(price)?,
        };

        Some(Self {
            transaction_hash: raw.transaction_hash.filter(|h| !h.trim().is_empty()),
            wallet,
            market: raw.condition_id.unwrap_or_default(),
            title: raw.title.unwrap_or_else(|| "Unknown Market".to_string()),
            side,
            outcome: raw.outcome.unwrap_or_default(),
            size,
            price,
            usd_value,
            timestamp,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Trade at or above the large-trade threshold.
    Whale,
    /// Sizable trade from a wallet younger than the account-age threshold.
    NewAccount,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Whale => "whale",
            AlertKind::NewAccount => "new_account",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One alert for one trade. A trade qualifying for both kinds produces two.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub trade: Trade,
    /// Resolved wallet age in days; `None` when resolution failed.
    pub wallet_age_days: Option<f64>,
}

/// Counters for a single monitoring pass, emitted as JSON at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub timestamp: String,
    pub trades_scanned: usize,
    pub trades_malformed: usize,
    pub duplicates_suppressed: usize,
    pub wallets_resolved: usize,
    pub wallet_resolution_failures: usize,
    pub whale_alerts: usize,
    pub new_account_alerts: usize,
    pub dedup_pruned: usize,
    pub wallet_cache_pruned: usize,
}
