use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::types::ApiTrade;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid API URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// Source of the most recent platform-wide trades.
#[allow(async_fn_in_trait)]
pub trait TradeSource {
    async fn recent_trades(&self, limit: u32) -> Result<Vec<ApiTrade>, ApiError>;
}

/// Per-wallet trade history, used only to find when a wallet first traded.
#[allow(async_fn_in_trait)]
pub trait WalletHistory {
    /// Timestamp of the wallet's earliest trade, or `None` if it has none.
    async fn first_trade_timestamp(&self, wallet: &str)
    -> Result<Option<DateTime<Utc>>, ApiError>;
}

impl<T: TradeSource> TradeSource for &T {
    async fn recent_trades(&self, limit: u32) -> Result<Vec<ApiTrade>, ApiError> {
        (**self).recent_trades(limit).await
    }
}

impl<T: WalletHistory> WalletHistory for &T {
    async fn first_trade_timestamp(
        &self,
        wallet: &str,
    ) -> Result<Option<DateTime<Utc>>, ApiError> {
        (**self).first_trade_timestamp(wallet).await
    }
}

/// Client for the public Polymarket data API (no auth required).
#[derive(Debug, Clone)]
pub struct DataApi {
    http: Client,
    base_url: Url,
}

impl DataApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(http, &config.base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self, ApiError> {
        // Url::join drops the last path segment unless the base ends with '/'.
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        Ok(Self {
            http,
            base_url: Url::parse(&base)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }
}

impl TradeSource for DataApi {
    /// `GET /trades?limit=N`, newest first.
    async fn recent_trades(&self, limit: u32) -> Result<Vec<ApiTrade>, ApiError> {
        let url = self.endpoint("trades")?;
        let limit = limit.to_string();
        let body: serde_json::Value = self
            .http
            .get(url)
            .query(&[("limit", limit.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let trades = decode_trades(&body)?;
        debug!("Fetched {} recent trades", trades.len());
        Ok(trades)
    }
}

/// Decode a `/trades` response record by record so one odd entry does not
/// fail the batch. Undecodable records come back as an empty [`ApiTrade`],
/// which normalization rejects, so they are counted as malformed downstream.
pub fn decode_trades(body: &serde_json::Value) -> Result<Vec<ApiTrade>, ApiError> {
    let records = body
        .as_array()
        .ok_or_else(|| ApiError::Unexpected(format!("/trades is not an array: {body}")))?;

    let trades = records
        .iter()
        .map(|record| {
            ApiTrade::deserialize(record).unwrap_or_else(|e| {
                warn!("Undecodable trade record: {e}");
                ApiTrade::default()
            })
        })
        .collect();
    Ok(trades)
}

impl WalletHistory for DataApi {
    /// `GET /activity?user=W&type=TRADE&limit=1&sortBy=TIMESTAMP&sortDirection=ASC`.
    async fn first_trade_timestamp(
        &self,
        wallet: &str,
    ) -> Result<Option<DateTime<Utc>>, ApiError> {
        let url = self.endpoint("activity")?;
        let activity: Vec<ApiTrade> = self
            .http
            .get(url)
            .query(&[
                ("user", wallet),
                ("type", "TRADE"),
                ("limit", "1"),
                ("sortBy", "TIMESTAMP"),
                ("sortDirection", "ASC"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(first) = activity.first() else {
            debug!("No prior activity for {wallet}");
            return Ok(None);
        };
        let ts = first
            .timestamp
            .ok_or_else(|| ApiError::Unexpected(format!("activity for {wallet} has no timestamp")))?;
        let first_seen = Utc
            .timestamp_opt(ts, 0)
            .single()
            .ok_or_else(|| ApiError::Unexpected(format!("timestamp {ts} out of range")))?;
        Ok(Some(first_seen))
    }
}
