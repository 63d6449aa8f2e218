use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::DATA_API_BASE;

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Upper bound for retention and TTL windows (100 years).
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Top-level application config deserialized from `config.toml`.
///
/// Every section is optional; a missing file yields the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Alerting thresholds and state retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    /// Minimum USD value for a new-account alert.
    #[serde(default = "default_new_account")]
    pub new_account: Decimal,
    /// Wallets younger than this many days count as new accounts.
    #[serde(default = "default_account_age_days")]
    pub account_age_days: f64,
    /// Minimum USD value for a whale alert.
    #[serde(default = "default_large_trade")]
    pub large_trade: Decimal,
    #[serde(default = "default_seen_retention_days")]
    pub seen_trade_retention_days: u32,
    #[serde(default = "default_wallet_ttl_days")]
    pub wallet_ts_ttl_days: u32,
}

fn default_new_account() -> Decimal {
    dec!(10000)
}

fn default_account_age_days() -> f64 {
    90.0
}

fn default_large_trade() -> Decimal {
    dec!(50000)
}

fn default_seen_retention_days() -> u32 {
    21
}

fn default_wallet_ttl_days() -> u32 {
    14
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            new_account: default_new_account(),
            account_age_days: default_account_age_days(),
            large_trade: default_large_trade(),
            seen_trade_retention_days: default_seen_retention_days(),
            wallet_ts_ttl_days: default_wallet_ttl_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Directory holding `wallet_ages.json` and `seen_trades.json`.
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".state")
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Number of most recent trades pulled per run.
    #[serde(default = "default_trade_limit")]
    pub trade_limit: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DATA_API_BASE.to_string()
}

fn default_trade_limit() -> u32 {
    500
}

fn default_timeout_secs() -> u64 {
    20
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            trade_limit: default_trade_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Load config if the file exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let config = Self::load(path)?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

/// Fully resolved thresholds used by the pipeline.
///
/// Precedence, highest first: environment variable, `config.toml`, default.
/// The large-trade threshold reads `LARGE_TRADE_THRESHOLD` before the legacy
/// `BIG_TRADE_THRESHOLD`; the legacy name is never consulted when the new one
/// is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub new_account_threshold: Decimal,
    pub account_age_days: f64,
    pub large_trade_threshold: Decimal,
    pub seen_trade_retention_days: u32,
    pub wallet_ts_ttl_days: u32,
}

impl Default for Settings {
    fn default() -> Self {
        let file = ThresholdsConfig::default();
        Self {
            new_account_threshold: file.new_account,
            account_age_days: file.account_age_days,
            large_trade_threshold: file.large_trade,
            seen_trade_retention_days: file.seen_trade_retention_days,
            wallet_ts_ttl_days: file.wallet_ts_ttl_days,
        }
    }
}

impl Settings {
    /// Resolve settings from the process environment over the file config.
    pub fn from_env(file: &ThresholdsConfig) -> Result<Self> {
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Resolve settings using `lookup` as the environment.
    pub fn resolve<F>(file: &ThresholdsConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let large_trade_threshold = match var("LARGE_TRADE_THRESHOLD") {
            Some(v) => parse_var("LARGE_TRADE_THRESHOLD", &v)?,
            None => match var("BIG_TRADE_THRESHOLD") {
                Some(v) => parse_var("BIG_TRADE_THRESHOLD", &v)?,
                None => file.large_trade,
            },
        };

        let settings = Self {
            new_account_threshold: override_with(&var, "NEW_ACCOUNT_THRESHOLD", file.new_account)?,
            account_age_days: override_with(&var, "ACCOUNT_AGE_DAYS", file.account_age_days)?,
            large_trade_threshold,
            seen_trade_retention_days: override_with(
                &var,
                "SEEN_TRADE_RETENTION_DAYS",
                file.seen_trade_retention_days,
            )?,
            wallet_ts_ttl_days: override_with(&var, "WALLET_TS_TTL_DAYS", file.wallet_ts_ttl_days)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.new_account_threshold < Decimal::ZERO || self.large_trade_threshold < Decimal::ZERO {
            anyhow::bail!("trade thresholds must not be negative");
        }
        if !self.account_age_days.is_finite() || self.account_age_days < 0.0 {
            anyhow::bail!("ACCOUNT_AGE_DAYS must be a non-negative number");
        }
        if self.seen_trade_retention_days > MAX_WINDOW_DAYS {
            anyhow::bail!("SEEN_TRADE_RETENTION_DAYS must be at most {MAX_WINDOW_DAYS}");
        }
        if self.wallet_ts_ttl_days > MAX_WINDOW_DAYS {
            anyhow::bail!("WALLET_TS_TTL_DAYS must be at most {MAX_WINDOW_DAYS}");
        }
        Ok(())
    }
}

fn override_with<T, F>(var: &F, key: &str, fallback: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(v) => parse_var(key, &v),
        None => Ok(fallback),
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {key}={value:?}: {e}"))
}
