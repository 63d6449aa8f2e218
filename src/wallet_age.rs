use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::api::{ApiError, WalletHistory};

const SECS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("wallet history lookup failed for {wallet}: {source}")]
    Upstream {
        wallet: String,
        #[source]
        source: ApiError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalletAgeEntry {
    /// Earliest known trade for the wallet.
    pub first_seen: DateTime<Utc>,
    /// When this entry was written; drives the TTL.
    pub cached_at: DateTime<Utc>,
}

/// Persisted wallet -> first-seen cache. Keys are lower-cased addresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAgeCache {
    entries: HashMap<String, WalletAgeEntry>,
}

impl WalletAgeCache {
    pub fn get(&self, wallet: &str) -> Option<&WalletAgeEntry> {
        self.entries.get(&normalize(wallet))
    }

    pub fn insert(&mut self, wallet: &str, first_seen: DateTime<Utc>, cached_at: DateTime<Utc>) {
        self.entries.insert(
            normalize(wallet),
            WalletAgeEntry {
                first_seen,
                cached_at,
            },
        );
    }

    /// Drop entries whose TTL has elapsed. They would be refreshed on next use
    /// anyway, so this only bounds file growth.
    pub fn prune_expired(&mut self, now: DateTime<Utc>, ttl_days: u32) -> usize {
        let Some(cutoff) = Duration::try_days(i64::from(ttl_days))
            .and_then(|ttl| now.checked_sub_signed(ttl))
        else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|_, e| e.cached_at > cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(wallet: &str) -> String {
    wallet.trim().to_ascii_lowercase()
}

/// A resolved wallet age.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalletAge {
    pub first_seen: DateTime<Utc>,
    /// Fractional days between `first_seen` and the resolution time, never negative.
    pub days: f64,
    /// Whether the answer came from the cache rather than the API.
    pub cached: bool,
}

/// Days from `first_seen` to `now`, floored at zero.
pub fn age_in_days(first_seen: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let secs = (now - first_seen).num_milliseconds() as f64 / 1000.0;
    (secs / SECS_PER_DAY).max(0.0)
}

/// Resolves wallet ages through the cache, falling back to the history API.
pub struct WalletAgeResolver<H> {
    history: H,
    cache: WalletAgeCache,
    ttl: Duration,
}

impl<H: WalletHistory> WalletAgeResolver<H> {
    pub fn new(history: H, cache: WalletAgeCache, ttl_days: u32) -> Self {
        Self {
            history,
            cache,
            ttl: Duration::days(i64::from(ttl_days)),
        }
    }

    /// Age of `wallet` at `now`.
    ///
    /// A fresh cache entry (`now - cached_at < ttl`) is used as-is. Otherwise
    /// the earliest trade is fetched; a wallet with no history is dated from
    /// `trade_timestamp`, the trade being classified. On API failure the cache
    /// is left untouched.
    pub async fn resolve_age(
        &mut self,
        wallet: &str,
        trade_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<WalletAge, ResolveError> {
        if let Some(entry) = self.cache.get(wallet) {
            if now - entry.cached_at < self.ttl {
                return Ok(WalletAge {
                    first_seen: entry.first_seen,
                    days: age_in_days(entry.first_seen, now),
                    cached: true,
                });
            }
            debug!("Wallet age for {wallet} expired, refreshing");
        }

        let first_seen = self
            .history
            .first_trade_timestamp(wallet)
            .await
            .map_err(|source| ResolveError::Upstream {
                wallet: wallet.to_string(),
                source,
            })?
            .unwrap_or(trade_timestamp);

        self.cache.insert(wallet, first_seen, now);
        Ok(WalletAge {
            first_seen,
            days: age_in_days(first_seen, now),
            cached: false,
        })
    }

    pub fn cache(&self) -> &WalletAgeCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut WalletAgeCache {
        &mut self.cache
    }

    pub fn into_cache(self) -> WalletAgeCache {
        self.cache
    }
}
