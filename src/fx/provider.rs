//! FX rate provider
//!
//! Cache-aside access to upstream FX rate tables with bounded retry and
//! a stale fallback: when the upstream is down, the last successfully
//! fetched table for a base is served from a secondary non-expiring
//! cache entry rather than failing the caller.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::RateCache;
use crate::domain::currency;

use super::{FxError, RateFetcher};

/// Base currency used when the caller does not specify one.
pub const DEFAULT_BASE_CURRENCY: &str = "USD";

const CACHE_KEY_PREFIX: &str = "fx:rates:";
const MAX_FETCH_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// A fetched rate table: every rate is expressed relative to `base`.
/// Lives only in the cache and transiently in memory, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRatesResponse {
    pub base: String,
    pub rates: BTreeMap<String, Decimal>,
    pub fetched_at: DateTime<Utc>,
}

/// Result of converting a minor-unit amount between currencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub amount_destination_minor: i64,
    pub rate: Decimal,
}

/// Serves FX rates from cache, fetching from the upstream API on miss.
#[derive(Clone)]
pub struct FxRateProvider {
    fetcher: Arc<dyn RateFetcher>,
    cache: RateCache,
    ttl: Duration,
}

impl FxRateProvider {
    pub fn new(fetcher: Arc<dyn RateFetcher>, cache: RateCache, ttl: Duration) -> Self {
        Self { fetcher, cache, ttl }
    }

    fn rates_key(base: &str) -> String {
        format!("{CACHE_KEY_PREFIX}{base}")
    }

    /// Secondary non-expiring "last known good" entry, refreshed on
    /// every successful fetch and read only when the upstream is down.
    fn last_good_key(base: &str) -> String {
        format!("{CACHE_KEY_PREFIX}{base}:last_good")
    }

    /// Get the rate table for `base` (see [`DEFAULT_BASE_CURRENCY`]).
    ///
    /// Cache hit: returned as-is. Miss: fetched with bounded retry; on
    /// total upstream failure the last known good table is served, and
    /// only if that is also absent does this fail with
    /// [`FxError::Unavailable`].
    pub async fn get_rates(&self, base: &str) -> Result<FxRatesResponse, FxError> {
        let key = Self::rates_key(base);

        let result: Option<FxRatesResponse> = self
            .cache
            .get_or_set(&key, Some(self.ttl), || async {
                match self.fetch_with_retry(base).await {
                    Ok(rates) => {
                        self.cache
                            .set(&Self::last_good_key(base), &rates, None)
                            .await;
                        Ok(Some(rates))
                    }
                    Err(err) => {
                        tracing::warn!(base, error = %err, "FX upstream fetch failed after retries");
                        Ok::<_, FxError>(None)
                    }
                }
            })
            .await?;

        if let Some(rates) = result {
            return Ok(rates);
        }

        // Upstream exhausted. Serve the last known good table without
        // repopulating the primary key, so the next call goes back to
        // the upstream instead of waiting out a full TTL window.
        match self
            .cache
            .get::<FxRatesResponse>(&Self::last_good_key(base))
            .await
        {
            Some(stale) => {
                tracing::info!(base, "serving stale cached FX rates");
                Ok(stale)
            }
            None => Err(FxError::Unavailable),
        }
    }

    /// Rate from `source` to `destination`. Identical currencies are
    /// exactly 1 with no cache or network access.
    pub async fn get_rate(&self, source: &str, destination: &str) -> Result<Decimal, FxError> {
        if source == destination {
            return Ok(Decimal::ONE);
        }

        let rates = self.get_rates(source).await?;
        rates
            .rates
            .get(destination)
            .copied()
            .ok_or_else(|| FxError::UnsupportedPair {
                source_currency: source.to_string(),
                destination_currency: destination.to_string(),
            })
    }

    /// Convert `amount_minor` of `source` into minor units of
    /// `destination`.
    ///
    /// The destination amount is truncated toward zero, a deliberate
    /// asymmetry with `to_minor`'s half-away-from-zero rounding: a
    /// conversion never credits more than the rate justifies.
    pub async fn convert(
        &self,
        amount_minor: i64,
        source: &str,
        destination: &str,
    ) -> Result<Conversion, FxError> {
        let rate = self.get_rate(source, destination).await?;

        let amount_major = currency::from_minor(amount_minor, source);
        let destination_major = amount_major * rate;
        let destination_minor =
            (destination_major * Decimal::from(currency::multiplier(destination))).trunc();

        let amount_destination_minor = destination_minor
            .to_i64()
            .ok_or(FxError::Overflow(amount_minor))?;

        Ok(Conversion {
            amount_destination_minor,
            rate,
        })
    }

    async fn fetch_with_retry(&self, base: &str) -> Result<FxRatesResponse, FxError> {
        let mut last_error = FxError::Unavailable;

        for attempt in 1..=MAX_FETCH_ATTEMPTS {
            match self.fetcher.fetch_rates(base).await {
                Ok(rates) => return Ok(rates),
                Err(err) => {
                    if attempt < MAX_FETCH_ATTEMPTS {
                        tracing::warn!(
                            base,
                            attempt,
                            max_attempts = MAX_FETCH_ATTEMPTS,
                            error = %err,
                            "FX API fetch attempt failed, retrying"
                        );
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted fetcher: calls whose index falls in `fail_calls` fail,
    /// everything else succeeds with the fixed table.
    struct ScriptedFetcher {
        rates: BTreeMap<String, Decimal>,
        fail_calls: std::ops::Range<usize>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn failing_calls(
            fail_calls: std::ops::Range<usize>,
            rates: BTreeMap<String, Decimal>,
        ) -> Self {
            Self {
                rates,
                fail_calls,
                calls: AtomicUsize::new(0),
            }
        }

        fn succeeding(rates: BTreeMap<String, Decimal>) -> Self {
            Self::failing_calls(0..0, rates)
        }

        fn failing_first(attempts: usize, rates: BTreeMap<String, Decimal>) -> Self {
            Self::failing_calls(0..attempts, rates)
        }

        fn always_failing() -> Self {
            Self::failing_calls(0..usize::MAX, BTreeMap::new())
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateFetcher for ScriptedFetcher {
        async fn fetch_rates(&self, base: &str) -> Result<FxRatesResponse, FxError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_calls.contains(&call) {
                return Err(FxError::Upstream("scripted failure".into()));
            }
            Ok(FxRatesResponse {
                base: base.to_string(),
                rates: self.rates.clone(),
                fetched_at: Utc::now(),
            })
        }
    }

    fn usd_rates() -> BTreeMap<String, Decimal> {
        BTreeMap::from([
            ("NGN".to_string(), dec!(1388.5769)),
            ("EUR".to_string(), dec!(0.92)),
        ])
    }

    fn provider(fetcher: Arc<ScriptedFetcher>) -> FxRateProvider {
        FxRateProvider::new(fetcher, RateCache::new(), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_same_currency_rate_is_one_without_fetch() {
        let fetcher = Arc::new(ScriptedFetcher::always_failing());
        let provider = provider(fetcher.clone());

        let rate = provider.get_rate("USD", "USD").await.unwrap();
        assert_eq!(rate, Decimal::ONE);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_get_rates_served_from_cache_on_second_call() {
        let fetcher = Arc::new(ScriptedFetcher::succeeding(usd_rates()));
        let provider = provider(fetcher.clone());

        let first = provider.get_rates("USD").await.unwrap();
        let second = provider.get_rates("USD").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_retries_then_succeeds() {
        let fetcher = Arc::new(ScriptedFetcher::failing_first(2, usd_rates()));
        let provider = provider(fetcher.clone());

        let rates = provider.get_rates("USD").await.unwrap();
        assert_eq!(rates.rates["NGN"], dec!(1388.5769));
        assert_eq!(fetcher.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fallback_after_ttl_expiry() {
        let fetcher = Arc::new(ScriptedFetcher::failing_calls(1..usize::MAX, usd_rates()));
        let cache = RateCache::new();
        let provider =
            FxRateProvider::new(fetcher.clone(), cache.clone(), Duration::from_secs(60));

        let fresh = provider.get_rates("USD").await.unwrap();
        assert_eq!(fetcher.call_count(), 1);

        // Let the primary entry expire; every upstream attempt now fails.
        tokio::time::advance(Duration::from_secs(61)).await;

        let stale = provider.get_rates("USD").await.unwrap();
        assert_eq!(stale.rates, fresh.rates);
        assert_eq!(stale.fetched_at, fresh.fetched_at);
        assert_eq!(fetcher.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fallback_does_not_mask_upstream_recovery() {
        // Succeeds once, fails for one retry cycle (3 attempts), then
        // recovers.
        let fetcher = Arc::new(ScriptedFetcher::failing_calls(1..4, usd_rates()));
        let provider = FxRateProvider::new(
            fetcher.clone(),
            RateCache::new(),
            Duration::from_secs(60),
        );

        provider.get_rates("USD").await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        // Upstream down: served stale, primary key left unpopulated.
        provider.get_rates("USD").await.unwrap();
        assert_eq!(fetcher.call_count(), 4);

        // Upstream back: the very next call fetches fresh rates instead
        // of sitting on the stale table for a TTL window.
        provider.get_rates("USD").await.unwrap();
        assert_eq!(fetcher.call_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_upstream_failure_without_cache() {
        let fetcher = Arc::new(ScriptedFetcher::always_failing());
        let provider = provider(fetcher.clone());

        let err = provider.get_rates("USD").await.unwrap_err();
        assert_eq!(err, FxError::Unavailable);
        assert_eq!(fetcher.call_count(), 3);
    }

    #[tokio::test]
    async fn test_unsupported_pair() {
        let fetcher = Arc::new(ScriptedFetcher::succeeding(usd_rates()));
        let provider = provider(fetcher);

        let err = provider.get_rate("USD", "JPY").await.unwrap_err();
        assert_eq!(
            err,
            FxError::UnsupportedPair {
                source_currency: "USD".to_string(),
                destination_currency: "JPY".to_string(),
            }
        );
        assert_eq!(err.to_string(), "Unsupported currency pair: USD/JPY");
    }

    #[tokio::test]
    async fn test_convert_floors_destination_minor_units() {
        let fetcher = Arc::new(ScriptedFetcher::succeeding(usd_rates()));
        let provider = provider(fetcher);

        // 1.00 USD at 1388.5769 -> 1388.5769 NGN -> 138857.69 minor -> 138857
        let conversion = provider.convert(100, "USD", "NGN").await.unwrap();
        assert_eq!(conversion.amount_destination_minor, 138_857);
        assert_eq!(conversion.rate, dec!(1388.5769));
    }

    #[tokio::test]
    async fn test_convert_same_currency_is_identity_on_rate() {
        let fetcher = Arc::new(ScriptedFetcher::always_failing());
        let provider = provider(fetcher);

        let conversion = provider.convert(2500, "EUR", "EUR").await.unwrap();
        assert_eq!(conversion.amount_destination_minor, 2500);
        assert_eq!(conversion.rate, Decimal::ONE);
    }
}
