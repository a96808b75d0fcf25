//! Upstream FX rate client
//!
//! Fetches a base currency's rate table from the exchangerate-api.com
//! v6 endpoint. The `RateFetcher` trait is the seam the provider (and
//! tests) depend on; only this file knows the wire format.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::{FxError, FxRatesResponse};

/// Upstream request timeout.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A source of FX rate tables.
#[async_trait]
pub trait RateFetcher: Send + Sync {
    /// Fetch the rate table for `base`. A failed transport, a non-2xx
    /// status, a non-success result flag, or a missing rate mapping are
    /// all fetch failures.
    async fn fetch_rates(&self, base: &str) -> Result<FxRatesResponse, FxError>;
}

/// Raw upstream payload. Anything other than `result == "success"` with
/// a populated `conversion_rates` map is rejected.
#[derive(Debug, Deserialize)]
struct ExchangeRateApiPayload {
    result: String,
    base_code: Option<String>,
    conversion_rates: Option<BTreeMap<String, Decimal>>,
}

/// HTTP client for the exchangerate-api.com v6 API.
#[derive(Debug, Clone)]
pub struct ExchangeRateApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ExchangeRateApiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, FxError> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| FxError::Upstream(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn latest_url(&self, base: &str) -> String {
        format!(
            "{}/{}/latest/{}",
            self.base_url.trim_end_matches('/'),
            self.api_key,
            base
        )
    }
}

#[async_trait]
impl RateFetcher for ExchangeRateApiClient {
    async fn fetch_rates(&self, base: &str) -> Result<FxRatesResponse, FxError> {
        let response = self
            .http
            .get(self.latest_url(base))
            .send()
            .await
            .map_err(|e| FxError::Upstream(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FxError::Upstream(format!("FX API returned {status}")));
        }

        let payload: ExchangeRateApiPayload = response
            .json()
            .await
            .map_err(|e| FxError::Upstream(format!("invalid FX API response: {e}")))?;

        if payload.result != "success" {
            return Err(FxError::Upstream(format!(
                "FX API reported result {:?}",
                payload.result
            )));
        }

        let rates = payload
            .conversion_rates
            .ok_or_else(|| FxError::Upstream("FX API response missing conversion_rates".into()))?;

        Ok(FxRatesResponse {
            base: payload.base_code.unwrap_or_else(|| base.to_string()),
            rates,
            fetched_at: Utc::now(),
        })
    }
}
