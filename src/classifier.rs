use rust_decimal::Decimal;

use crate::config::Settings;
use crate::types::{Alert, AlertKind, Trade};

/// Which alert rules a trade satisfies. Not mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub is_whale: bool,
    pub is_new_account: bool,
}

impl Classification {
    pub fn is_alert(&self) -> bool {
        self.is_whale || self.is_new_account
    }

    /// Alert kinds in emission order: whale first, then new-account.
    pub fn kinds(&self) -> Vec<AlertKind> {
        let mut kinds = Vec::with_capacity(2);
        if self.is_whale {
            kinds.push(AlertKind::Whale);
        }
        if self.is_new_account {
            kinds.push(AlertKind::NewAccount);
        }
        kinds
    }
}

/// Threshold rules for whale and new-account alerts.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeClassifier {
    large_trade_threshold: Decimal,
    new_account_threshold: Decimal,
    account_age_days: f64,
}

impl TradeClassifier {
    pub fn new(settings: &Settings) -> Self {
        Self {
            large_trade_threshold: settings.large_trade_threshold,
            new_account_threshold: settings.new_account_threshold,
            account_age_days: settings.account_age_days,
        }
    }

    /// Smallest USD value that can produce any alert. Trades below it never
    /// need a wallet age.
    pub fn min_alert_value(&self) -> Decimal {
        self.large_trade_threshold.min(self.new_account_threshold)
    }

    /// Whale: `usd_value >= large_trade_threshold`, whatever the age.
    /// New account: `usd_value >= new_account_threshold` and a known age
    /// strictly below `account_age_days`. An unknown age never counts as new.
    pub fn classify(&self, trade: &Trade, wallet_age_days: Option<f64>) -> Classification {
        let is_whale = trade.usd_value >= self.large_trade_threshold;
        let is_new_account = trade.usd_value >= self.new_account_threshold
            && wallet_age_days.is_some_and(|age| age < self.account_age_days);
        Classification {
            is_whale,
            is_new_account,
        }
    }

    /// One [`Alert`] per satisfied rule.
    pub fn alerts_for(&self, trade: &Trade, wallet_age_days: Option<f64>) -> Vec<Alert> {
        self.classify(trade, wallet_age_days)
            .kinds()
            .into_iter()
            .map(|kind| Alert {
                kind,
                trade: trade.clone(),
                wallet_age_days,
            })
            .collect()
    }
}
