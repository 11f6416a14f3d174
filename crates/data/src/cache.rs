//! Freshness-gated quote cache.
//!
//! One cached snapshot per ticker on disk. A read first consults the
//! freshness policy; only a stale (or missing) record triggers the remote
//! fetcher, and transient fetch failures are retried with a fixed backoff
//! until they clear or a caller-supplied deadline passes.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use serde::{Deserialize, Serialize};
use stock_track_core::{FreshnessPolicy, Ohlcv};

use crate::fetch::{FetchError, QuoteFetcher};
use crate::store::{Namespace, StoreError};

/// Errors from cache reads.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Underlying cache-file failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The remote fetch failed with a non-retryable error, or the retry
    /// loop was cancelled by its deadline.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// The last fetched snapshot for one ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedQuote {
    pub ticker: String,
    pub snapshot: Ohlcv,
    pub fetched_at: DateTime<Utc>,
}

/// Per-ticker on-disk cache in front of a [`QuoteFetcher`].
pub struct QuoteCache {
    store: Namespace<CachedQuote>,
    policy: FreshnessPolicy,
    fetcher: Arc<dyn QuoteFetcher>,
    retry_backoff: Duration,
}

impl QuoteCache {
    /// Opens the cache directory.
    ///
    /// # Errors
    /// Returns an error if the cache directory cannot be created.
    pub fn open(
        dir: &Path,
        policy: FreshnessPolicy,
        fetcher: Arc<dyn QuoteFetcher>,
        retry_backoff: Duration,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            store: Namespace::open(dir)?,
            policy,
            fetcher,
            retry_backoff,
        })
    }

    /// Returns the quote for `ticker`, fetching only if the cached copy is
    /// stale. Retries transient fetch failures indefinitely.
    ///
    /// # Errors
    /// Returns an error if the cache cannot be read/written or the fetch
    /// fails with a non-transient error.
    pub async fn get(&self, ticker: &str) -> Result<Ohlcv, CacheError> {
        self.get_with_deadline(ticker, None).await
    }

    /// Like [`Self::get`], but the transient-failure retry loop gives up at
    /// `deadline`, surfacing the last transient error.
    ///
    /// # Errors
    /// As [`Self::get`], plus the deadline case above.
    pub async fn get_with_deadline(
        &self,
        ticker: &str,
        deadline: Option<Instant>,
    ) -> Result<Ohlcv, CacheError> {
        let cached = self.store.read(ticker)?;
        let now = Utc::now();
        if let Some(cached) = &cached {
            if !self.policy.is_stale(Some(cached.fetched_at), now) {
                debug!(ticker, fetched_at = %cached.fetched_at, "serving cached quote");
                return Ok(cached.snapshot.clone());
            }
        }

        loop {
            match self.fetcher.fetch_quote(ticker).await {
                Ok(snapshot) => {
                    let record = CachedQuote {
                        ticker: ticker.to_string(),
                        snapshot: snapshot.clone(),
                        fetched_at: Utc::now(),
                    };
                    self.store.write(ticker, &record)?;
                    info!(ticker, "refreshed quote cache");
                    return Ok(snapshot);
                }
                Err(FetchError::Transient(reason)) => {
                    if let Some(deadline) = deadline {
                        if Instant::now() >= deadline {
                            warn!(ticker, reason, "fetch deadline reached");
                            return Err(FetchError::Transient(reason).into());
                        }
                    }
                    warn!(ticker, reason, "transient fetch failure, retrying");
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// The cached record for `ticker`, if any, without fetching.
    ///
    /// # Errors
    /// Returns an error if the cache file cannot be read.
    pub fn peek(&self, ticker: &str) -> Result<Option<CachedQuote>, CacheError> {
        Ok(self.store.read(ticker)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn quote() -> Ohlcv {
        Ohlcv {
            open: dec!(10),
            high: dec!(12),
            low: dec!(9.5),
            close: dec!(11),
            volume: dec!(100000),
        }
    }

    /// Fetcher that replays a scripted list of outcomes, then succeeds.
    struct ScriptedFetcher {
        calls: AtomicUsize,
        failures: Mutex<Vec<FetchError>>,
    }

    impl ScriptedFetcher {
        fn new(failures: Vec<FetchError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures: Mutex::new(failures),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuoteFetcher for ScriptedFetcher {
        async fn fetch_quote(&self, _ticker: &str) -> Result<Ohlcv, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut failures = self.failures.lock().unwrap();
            if failures.is_empty() {
                Ok(quote())
            } else {
                Err(failures.remove(0))
            }
        }
    }

    fn open_cache(dir: &TempDir, fetcher: Arc<ScriptedFetcher>) -> QuoteCache {
        QuoteCache::open(
            dir.path(),
            FreshnessPolicy::new(-7, 300),
            fetcher,
            Duration::from_millis(1),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
        let cache = open_cache(&dir, fetcher.clone());

        assert_eq!(cache.get("AAPL").await.unwrap(), quote());
        assert_eq!(cache.get("AAPL").await.unwrap(), quote());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            FetchError::Transient("flap".to_string()),
            FetchError::Transient("flap".to_string()),
        ]));
        let cache = open_cache(&dir, fetcher.clone());

        assert_eq!(cache.get("AAPL").await.unwrap(), quote());
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn non_transient_failure_aborts_immediately() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new(vec![FetchError::UnknownTicker {
            ticker: "NOPE".to_string(),
        }]));
        let cache = open_cache(&dir, fetcher.clone());

        let err = cache.get("NOPE").await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::Fetch(FetchError::UnknownTicker { .. })
        ));
        assert_eq!(fetcher.calls(), 1);
        assert!(cache.peek("NOPE").unwrap().is_none());
    }

    #[tokio::test]
    async fn deadline_cancels_the_retry_loop() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new(
            std::iter::repeat_with(|| FetchError::Transient("down".to_string()))
                .take(1000)
                .collect(),
        ));
        let cache = open_cache(&dir, fetcher.clone());

        let deadline = Instant::now() + Duration::from_millis(20);
        let err = cache
            .get_with_deadline("AAPL", Some(deadline))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Fetch(FetchError::Transient(_))));
        assert!(fetcher.calls() < 1000);
    }

    #[tokio::test]
    async fn successful_fetch_commits_the_cache_record() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new(vec![]));
        let cache = open_cache(&dir, fetcher);

        cache.get("AAPL").await.unwrap();
        let record = cache.peek("AAPL").unwrap().unwrap();
        assert_eq!(record.ticker, "AAPL");
        assert_eq!(record.snapshot, quote());
    }
}
