//! FX error types

/// Errors surfaced by the FX rate layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FxError {
    /// Every fetch attempt failed and no cached rates exist. Retryable.
    #[error("FX rates unavailable: upstream fetch failed and no cached rates")]
    Unavailable,

    /// The rate table was fetched but lacks the requested destination.
    #[error("Unsupported currency pair: {source_currency}/{destination_currency}")]
    UnsupportedPair {
        source_currency: String,
        destination_currency: String,
    },

    /// A single upstream fetch attempt failed (transport, non-2xx, or
    /// a malformed payload). Retried internally before surfacing.
    #[error("FX upstream error: {0}")]
    Upstream(String),

    /// The converted amount does not fit in minor units.
    #[error("Conversion overflow for {0} minor units")]
    Overflow(i64),
}
