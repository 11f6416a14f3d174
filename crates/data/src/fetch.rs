//! Remote quote fetching.
//!
//! [`QuoteFetcher`] is the seam the cache and the picklist coordinator fetch
//! through; [`HttpFetcher`] is the production implementation against a
//! Yahoo-style chart endpoint, rate limited and using an explicit, expiring
//! [`FetchSession`] instead of any global session state.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use rust_decimal::Decimal;
use std::num::NonZeroU32;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use stock_track_core::{FetchConfig, Ohlcv};

/// Errors from fetching a quote.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The remote source hiccuped; safe to retry.
    #[error("transient remote data error: {0}")]
    Transient(String),

    /// The ticker is unknown to the data source.
    #[error("unknown ticker: {ticker}")]
    UnknownTicker {
        /// The ticker the source rejected.
        ticker: String,
    },

    /// Network-level failure that is not worth retrying.
    #[error("network error: {0}")]
    Network(String),

    /// The response arrived but could not be interpreted as a quote.
    #[error("malformed quote payload: {0}")]
    Payload(String),
}

/// Fetches the current OHLCV snapshot for a ticker.
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    async fn fetch_quote(&self, ticker: &str) -> Result<Ohlcv, FetchError>;
}

/// An acquired API session (crumb) with an explicit expiry.
#[derive(Debug, Clone)]
pub struct FetchSession {
    crumb: String,
    acquired_at: DateTime<Utc>,
    ttl: Duration,
}

impl FetchSession {
    #[must_use]
    pub fn new(crumb: String, acquired_at: DateTime<Utc>, ttl_hours: i64) -> Self {
        Self {
            crumb,
            acquired_at,
            ttl: Duration::hours(ttl_hours),
        }
    }

    #[must_use]
    pub fn crumb(&self) -> &str {
        &self.crumb
    }

    /// Returns `true` once the session has outlived its configured TTL.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.acquired_at > self.ttl
    }
}

/// HTTP quote fetcher with client-side rate limiting.
pub struct HttpFetcher {
    http_client: reqwest::Client,
    base_url: String,
    session_ttl_hours: i64,
    session: tokio::sync::Mutex<Option<FetchSession>>,
    rate_limiter: Arc<RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>>,
}

impl HttpFetcher {
    /// Creates a fetcher for the configured endpoint.
    #[must_use]
    pub fn new(config: &FetchConfig) -> Self {
        // Stay well under the public endpoint's limits.
        let quota = Quota::per_second(NonZeroU32::new(2).unwrap());
        Self {
            http_client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            session_ttl_hours: config.session_ttl_hours,
            session: tokio::sync::Mutex::new(None),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Returns a valid crumb, acquiring or refreshing the session if needed.
    async fn ensure_session(&self) -> Result<String, FetchError> {
        let mut session = self.session.lock().await;
        let now = Utc::now();
        if let Some(current) = session.as_ref() {
            if !current.is_expired(now) {
                return Ok(current.crumb().to_string());
            }
            debug!("fetch session expired, refreshing");
        }

        let url = format!("{}/v1/test/getcrumb", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(classify_request_error)?;
        if !response.status().is_success() {
            return Err(classify_status(response.status().as_u16(), None));
        }
        let crumb = response.text().await.map_err(classify_request_error)?;
        let fresh = FetchSession::new(crumb.clone(), now, self.session_ttl_hours);
        *session = Some(fresh);
        debug!("acquired fetch session");
        Ok(crumb)
    }

    async fn invalidate_session(&self) {
        *self.session.lock().await = None;
    }
}

#[async_trait]
impl QuoteFetcher for HttpFetcher {
    async fn fetch_quote(&self, ticker: &str) -> Result<Ohlcv, FetchError> {
        self.rate_limiter.until_ready().await;
        let crumb = self.ensure_session().await?;

        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range=1d&crumb={}",
            self.base_url, ticker, crumb
        );
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            // Crumb rejected server-side; drop it so the retry reacquires.
            self.invalidate_session().await;
            warn!(ticker, status, "fetch session rejected");
            return Err(FetchError::Transient(format!("session rejected ({status})")));
        }
        if !response.status().is_success() {
            return Err(classify_status(status, Some(ticker)));
        }

        let body: serde_json::Value = response.json().await.map_err(classify_request_error)?;
        quote_from_chart(&body)
    }
}

fn classify_request_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() {
        FetchError::Transient(err.to_string())
    } else if err.is_decode() {
        FetchError::Payload(err.to_string())
    } else {
        FetchError::Network(err.to_string())
    }
}

fn classify_status(status: u16, ticker: Option<&str>) -> FetchError {
    match (status, ticker) {
        (404, Some(ticker)) => FetchError::UnknownTicker {
            ticker: ticker.to_string(),
        },
        (429, _) | (500..=599, _) => FetchError::Transient(format!("HTTP {status}")),
        _ => FetchError::Network(format!("HTTP {status}")),
    }
}

/// Extracts the latest OHLCV bar from a chart API response.
fn quote_from_chart(body: &serde_json::Value) -> Result<Ohlcv, FetchError> {
    let bar = body
        .pointer("/chart/result/0/indicators/quote/0")
        .ok_or_else(|| FetchError::Payload("missing quote indicators".to_string()))?;

    let field = |name: &str| -> Result<Decimal, FetchError> {
        let value = bar
            .get(name)
            .and_then(|v| v.as_array())
            .and_then(|values| values.iter().rev().find(|v| !v.is_null()))
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| FetchError::Payload(format!("missing field {name}")))?;
        Decimal::try_from(value)
            .map_err(|e| FetchError::Payload(format!("bad value for {name}: {e}")))
    };

    Ok(Ohlcv {
        open: field("open")?,
        high: field("high")?,
        low: field("low")?,
        close: field("close")?,
        volume: field("volume")?,
    })
}
