use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Trade;

/// Stable identifier for a trade across runs.
///
/// The transaction hash when the feed has one. Otherwise a composite of
/// `wallet:market:side:outcome:size:timestamp`, with the wallet lower-cased,
/// the size normalized (`1000.0` and `1000` agree) and the timestamp floored to
/// whole Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn from_trade(trade: &Trade) -> Self {
        if let Some(hash) = &trade.transaction_hash {
            return Self(hash.trim().to_ascii_lowercase());
        }
        Self(format!(
            "{}:{}:{}:{}:{}:{}",
            trade.wallet.trim().to_ascii_lowercase(),
            trade.market,
            trade.side,
            trade.outcome,
            trade.size.normalize(),
            trade.timestamp.timestamp(),
        ))
    }

    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Alerted trade keys with the time each was first seen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupStore {
    seen: HashMap<DedupKey, DateTime<Utc>>,
}

impl DedupStore {
    pub fn has_seen(&self, key: &DedupKey) -> bool {
        self.seen.contains_key(key)
    }

    /// Record `key` as seen at `now`. An existing entry keeps its original time
    /// so retention counts from the first alert.
    pub fn mark_seen(&mut self, key: &DedupKey, now: DateTime<Utc>) {
        self.seen.entry(key.clone()).or_insert(now);
    }

    /// Drop entries seen before `now - retention_days`. Returns how many went.
    /// A cutoff before chrono's minimum date keeps everything.
    pub fn prune(&mut self, now: DateTime<Utc>, retention_days: u32) -> usize {
        let Some(cutoff) = Duration::try_days(i64::from(retention_days))
            .and_then(|retention| now.checked_sub_signed(retention))
        else {
            return 0;
        };
        let before = self.seen.len();
        self.seen.retain(|_, seen_at| *seen_at >= cutoff);
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
