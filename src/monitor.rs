use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::api::{TradeSource, WalletHistory};
use crate::classifier::TradeClassifier;
use crate::config::Settings;
use crate::dedup::{DedupKey, DedupStore};
use crate::reporter;
use crate::state::StateStore;
use crate::types::{Alert, AlertKind, RunSummary, Trade};
use crate::wallet_age::{WalletAgeCache, WalletAgeResolver};

/// Outcome of one monitoring pass.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub alerts: Vec<Alert>,
    pub summary: RunSummary,
}

/// One pass: fetch, resolve ages, classify, dedup, mark, prune.
///
/// Mutates `resolver`'s cache and `seen` in memory only; persisting them is
/// the caller's job. A fetch failure returns before either is touched.
pub async fn run_once<S, H>(
    source: &S,
    resolver: &mut WalletAgeResolver<H>,
    seen: &mut DedupStore,
    settings: &Settings,
    trade_limit: u32,
    now: DateTime<Utc>,
) -> Result<RunReport>
where
    S: TradeSource,
    H: WalletHistory,
{
    let raw = source
        .recent_trades(trade_limit)
        .await
        .context("failed to fetch recent trades")?;

    let mut summary = RunSummary {
        timestamp: now.to_rfc3339(),
        trades_scanned: raw.len(),
        ..RunSummary::default()
    };

    let trades: Vec<Trade> = raw.into_iter().filter_map(Trade::from_api).collect();
    summary.trades_malformed = summary.trades_scanned - trades.len();
    if summary.trades_malformed > 0 {
        warn!("Skipped {} malformed trade record(s)", summary.trades_malformed);
    }

    let classifier = TradeClassifier::new(settings);
    let min_value = classifier.min_alert_value();

    // Drop already-alerted trades and repeats within the batch up front.
    let mut batch_keys: HashSet<DedupKey> = HashSet::new();
    let mut candidates: Vec<(DedupKey, Trade)> = Vec::new();
    for trade in trades {
        if trade.usd_value < min_value {
            continue;
        }
        let key = DedupKey::from_trade(&trade);
        if seen.has_seen(&key) || !batch_keys.insert(key.clone()) {
            summary.duplicates_suppressed += 1;
            continue;
        }
        candidates.push((key, trade));
    }

    // One lookup per distinct wallet, dated from its earliest trade in the batch.
    let mut earliest: HashMap<String, DateTime<Utc>> = HashMap::new();
    for (_, trade) in &candidates {
        earliest
            .entry(trade.wallet.to_ascii_lowercase())
            .and_modify(|ts| *ts = (*ts).min(trade.timestamp))
            .or_insert(trade.timestamp);
    }

    let mut ages: HashMap<String, Option<f64>> = HashMap::with_capacity(earliest.len());
    for (wallet, trade_ts) in &earliest {
        let age = match resolver.resolve_age(wallet, *trade_ts, now).await {
            Ok(age) => {
                summary.wallets_resolved += 1;
                debug!("Wallet {wallet}: {:.1}d (cached: {})", age.days, age.cached);
                Some(age.days)
            }
            Err(e) => {
                summary.wallet_resolution_failures += 1;
                warn!("{e}; skipping new-account check for {wallet}");
                None
            }
        };
        ages.insert(wallet.clone(), age);
    }

    let mut alerts = Vec::new();
    for (key, trade) in &candidates {
        let age = ages
            .get(&trade.wallet.to_ascii_lowercase())
            .copied()
            .flatten();
        let trade_alerts = classifier.alerts_for(trade, age);
        if trade_alerts.is_empty() {
            continue;
        }
        seen.mark_seen(key, now);
        alerts.extend(trade_alerts);
    }

    summary.whale_alerts = alerts.iter().filter(|a| a.kind == AlertKind::Whale).count();
    summary.new_account_alerts = alerts
        .iter()
        .filter(|a| a.kind == AlertKind::NewAccount)
        .count();

    // Prune after marking so this run's entries survive.
    summary.dedup_pruned = seen.prune(now, settings.seen_trade_retention_days);
    summary.wallet_cache_pruned = resolver
        .cache_mut()
        .prune_expired(now, settings.wallet_ts_ttl_days);

    info!(
        "Run complete: {} scanned, {} whale, {} new-account, {} suppressed",
        summary.trades_scanned,
        summary.whale_alerts,
        summary.new_account_alerts,
        summary.duplicates_suppressed
    );

    Ok(RunReport { alerts, summary })
}

/// Emit a finished pass, then persist its state.
///
/// Alerts and the summary reach stdout (and `alerts_file`, when given) before
/// anything is saved, so a failing state write never swallows them. Either
/// failure is returned as an error once both steps have been attempted.
pub fn finish_run(
    report: &RunReport,
    store: &StateStore,
    wallet_ages: &WalletAgeCache,
    seen: &DedupStore,
    alerts_file: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    reporter::report_alerts(&report.alerts);
    reporter::report_summary(&report.summary);

    let mut file_error = None;
    if let Some(path) = alerts_file {
        if !report.alerts.is_empty() {
            let text = reporter::format_report(&report.alerts, &report.summary);
            if let Err(e) = fs::write(path, text) {
                error!("Failed to write alerts to {}: {e}", path.display());
                file_error = Some(path);
            }
        }
    }

    if dry_run {
        info!("Dry run, state not saved");
    } else {
        store
            .save(wallet_ages, seen)
            .context("failed to persist state")?;
    }

    if let Some(path) = file_error {
        anyhow::bail!("alerts file {} could not be written", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::types::ApiTrade;
    use crate::wallet_age::WalletAgeCache;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::cell::{Cell, RefCell};
    use tempfile::{NamedTempFile, tempdir};

    /// Serves a fixed batch and per-wallet first-trade timestamps.
    #[derive(Default)]
    struct FakeApi {
        trades: Vec<ApiTrade>,
        fail_fetch: bool,
        first_trades: HashMap<String, DateTime<Utc>>,
        failing_wallets: HashSet<String>,
        history_calls: RefCell<Vec<String>>,
        fetches: Cell<usize>,
    }

    impl TradeSource for FakeApi {
        async fn recent_trades(&self, _limit: u32) -> Result<Vec<ApiTrade>, ApiError> {
            self.fetches.set(self.fetches.get() + 1);
            if self.fail_fetch {
                return Err(ApiError::Unexpected("503".into()));
            }
            Ok(self.trades.clone())
        }
    }

    impl WalletHistory for FakeApi {
        async fn first_trade_timestamp(
            &self,
            wallet: &str,
        ) -> Result<Option<DateTime<Utc>>, ApiError> {
            self.history_calls.borrow_mut().push(wallet.to_string());
            if self.failing_wallets.contains(wallet) {
                return Err(ApiError::Unexpected("timeout".into()));
            }
            Ok(self.first_trades.get(wallet).copied())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn raw_trade(wallet: &str, usd: Decimal, hash: Option<&str>) -> ApiTrade {
        ApiTrade {
            proxy_wallet: Some(wallet.to_string()),
            side: Some("BUY".to_string()),
            condition_id: Some("0xcond".to_string()),
            title: Some("Market".to_string()),
            outcome: Some("Yes".to_string()),
            size: Some(usd * dec!(2)),
            price: Some(dec!(0.5)),
            usdc_size: None,
            timestamp: Some((now() - Duration::minutes(5)).timestamp()),
            transaction_hash: hash.map(str::to_string),
        }
    }

    async fn run(api: &FakeApi, cache: WalletAgeCache, seen: &mut DedupStore) -> (RunReport, WalletAgeCache) {
        let settings = Settings::default();
        let mut resolver = WalletAgeResolver::new(api, cache, settings.wallet_ts_ttl_days);
        let report = run_once(api, &mut resolver, seen, &settings, 500, now())
            .await
            .unwrap();
        (report, resolver.into_cache())
    }

    #[tokio::test]
    async fn brand_new_whale_alerts_both_kinds_once() {
        let api = FakeApi {
            trades: vec![raw_trade("0xw", dec!(87200), Some("0xh1"))],
            ..FakeApi::default()
        };
        let mut seen = DedupStore::default();

        let (first, cache) = run(&api, WalletAgeCache::default(), &mut seen).await;
        let kinds: Vec<AlertKind> = first.alerts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::Whale, AlertKind::NewAccount]);
        assert_eq!(first.summary.whale_alerts, 1);
        assert_eq!(first.summary.new_account_alerts, 1);
        assert!(first.alerts[0].wallet_age_days.unwrap() < 0.01);

        let (second, _) = run(&api, cache, &mut seen).await;
        assert!(second.alerts.is_empty());
        assert_eq!(second.summary.duplicates_suppressed, 1);
    }

    #[tokio::test]
    async fn old_wallet_is_whale_only() {
        let mut api = FakeApi {
            trades: vec![raw_trade("0xold", dec!(60000), Some("0xh"))],
            ..FakeApi::default()
        };
        api.first_trades
            .insert("0xold".to_string(), now() - Duration::days(400));
        let mut seen = DedupStore::default();

        let (report, _) = run(&api, WalletAgeCache::default(), &mut seen).await;

        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].kind, AlertKind::Whale);
    }

    #[tokio::test]
    async fn wallet_resolved_once_per_run() {
        let api = FakeApi {
            trades: vec![
                raw_trade("0xw", dec!(20000), Some("0xa")),
                raw_trade("0xW", dec!(30000), Some("0xb")),
                raw_trade("0xw", dec!(15000), Some("0xc")),
            ],
            ..FakeApi::default()
        };
        let mut seen = DedupStore::default();

        let (report, _) = run(&api, WalletAgeCache::default(), &mut seen).await;

        assert_eq!(api.history_calls.borrow().len(), 1);
        assert_eq!(report.summary.wallets_resolved, 1);
        assert_eq!(report.summary.new_account_alerts, 3);
    }

    #[tokio::test]
    async fn small_trades_skip_resolution() {
        let api = FakeApi {
            trades: vec![raw_trade("0xsmall", dec!(500), Some("0xa"))],
            ..FakeApi::default()
        };
        let mut seen = DedupStore::default();

        let (report, _) = run(&api, WalletAgeCache::default(), &mut seen).await;

        assert!(api.history_calls.borrow().is_empty());
        assert!(report.alerts.is_empty());
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn resolution_failure_skips_new_account_only() {
        let mut api = FakeApi {
            trades: vec![
                raw_trade("0xflaky", dec!(87200), Some("0xa")),
                raw_trade("0xflaky", dec!(20000), Some("0xb")),
            ],
            ..FakeApi::default()
        };
        api.failing_wallets.insert("0xflaky".to_string());
        let mut seen = DedupStore::default();

        let (report, cache) = run(&api, WalletAgeCache::default(), &mut seen).await;

        assert_eq!(report.summary.wallet_resolution_failures, 1);
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].kind, AlertKind::Whale);
        assert!(report.alerts[0].wallet_age_days.is_none());
        // The quiet trade is not marked, so a later successful lookup can still alert.
        assert!(!seen.has_seen(&DedupKey::from_raw("0xb")));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn duplicate_within_batch_alerts_once() {
        let api = FakeApi {
            trades: vec![
                raw_trade("0xw", dec!(55000), None),
                raw_trade("0xw", dec!(55000), None),
            ],
            ..FakeApi::default()
        };
        let mut seen = DedupStore::default();

        let (report, _) = run(&api, WalletAgeCache::default(), &mut seen).await;

        assert_eq!(report.summary.whale_alerts, 1);
        assert_eq!(report.summary.duplicates_suppressed, 1);
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn malformed_records_counted() {
        let api = FakeApi {
            trades: vec![
                ApiTrade::default(),
                raw_trade("0xw", dec!(100), Some("0xa")),
            ],
            ..FakeApi::default()
        };
        let mut seen = DedupStore::default();

        let (report, _) = run(&api, WalletAgeCache::default(), &mut seen).await;

        assert_eq!(report.summary.trades_scanned, 2);
        assert_eq!(report.summary.trades_malformed, 1);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_state_untouched() {
        let api = FakeApi {
            fail_fetch: true,
            ..FakeApi::default()
        };
        let settings = Settings::default();
        let mut cache = WalletAgeCache::default();
        cache.insert("0xold", now() - Duration::days(50), now() - Duration::days(30));
        let mut seen = DedupStore::default();
        seen.mark_seen(&DedupKey::from_raw("ancient"), now() - Duration::days(60));
        let mut resolver = WalletAgeResolver::new(&api, cache, settings.wallet_ts_ttl_days);

        let result = run_once(&api, &mut resolver, &mut seen, &settings, 500, now()).await;

        assert!(result.is_err());
        assert_eq!(api.fetches.get(), 1);
        assert_eq!(seen.len(), 1);
        assert_eq!(resolver.cache().len(), 1);
    }

    #[tokio::test]
    async fn prunes_stale_state_after_marking() {
        let api = FakeApi {
            trades: vec![raw_trade("0xw", dec!(70000), Some("0xnew"))],
            ..FakeApi::default()
        };
        let mut cache = WalletAgeCache::default();
        cache.insert("0xgone", now() - Duration::days(200), now() - Duration::days(15));
        let mut seen = DedupStore::default();
        seen.mark_seen(&DedupKey::from_raw("0xexpired"), now() - Duration::days(22));
        seen.mark_seen(&DedupKey::from_raw("0xrecent"), now() - Duration::days(20));

        let (report, cache) = run(&api, cache, &mut seen).await;

        assert_eq!(report.summary.dedup_pruned, 1);
        assert_eq!(report.summary.wallet_cache_pruned, 1);
        assert!(seen.has_seen(&DedupKey::from_raw("0xnew")));
        assert!(seen.has_seen(&DedupKey::from_raw("0xrecent")));
        assert!(!seen.has_seen(&DedupKey::from_raw("0xexpired")));
        assert!(cache.get("0xgone").is_none());
        assert!(cache.get("0xw").is_some());
    }

    #[tokio::test]
    async fn alerts_are_written_even_when_state_cannot_be_saved() {
        let api = FakeApi {
            trades: vec![raw_trade("0xw", dec!(87200), Some("0xh1"))],
            ..FakeApi::default()
        };
        let mut seen = DedupStore::default();
        let (report, cache) = run(&api, WalletAgeCache::default(), &mut seen).await;
        assert_eq!(report.alerts.len(), 2);

        let dir = tempdir().unwrap();
        let alerts_path = dir.path().join("alerts.txt");
        // A regular file where the state directory should be.
        let blocker = NamedTempFile::new_in(dir.path()).unwrap();
        let store = StateStore::new(blocker.path());

        let result = finish_run(
            &report,
            &store,
            &cache,
            &seen,
            Some(alerts_path.as_path()),
            false,
        );

        assert!(result.is_err());
        let text = fs::read_to_string(&alerts_path).unwrap();
        assert!(text.contains("0xh1"));
    }

    #[tokio::test]
    async fn unwritable_alerts_file_still_saves_state() {
        let api = FakeApi {
            trades: vec![raw_trade("0xw", dec!(87200), Some("0xh1"))],
            ..FakeApi::default()
        };
        let mut seen = DedupStore::default();
        let (report, cache) = run(&api, WalletAgeCache::default(), &mut seen).await;

        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state"));
        let alerts_path = dir.path().join("missing").join("alerts.txt");

        let result = finish_run(
            &report,
            &store,
            &cache,
            &seen,
            Some(alerts_path.as_path()),
            false,
        );

        assert!(result.is_err());
        assert!(store.load_seen_trades().has_seen(&DedupKey::from_raw("0xh1")));
    }

    #[tokio::test]
    async fn dry_run_skips_saving() {
        let api = FakeApi {
            trades: vec![raw_trade("0xw", dec!(87200), Some("0xh1"))],
            ..FakeApi::default()
        };
        let mut seen = DedupStore::default();
        let (report, cache) = run(&api, WalletAgeCache::default(), &mut seen).await;

        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state"));

        finish_run(&report, &store, &cache, &seen, None, true).unwrap();

        assert!(!store.seen_trades_path().exists());
    }
}
