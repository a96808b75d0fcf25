//! FX rates module
//!
//! Upstream rate fetching, cache-aside serving with stale fallback, and
//! minor-unit currency conversion.

mod client;
mod error;
mod provider;

pub use client::{ExchangeRateApiClient, RateFetcher};
pub use error::FxError;
pub use provider::{Conversion, FxRateProvider, FxRatesResponse, DEFAULT_BASE_CURRENCY};
