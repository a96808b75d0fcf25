//! Error handling module
//!
//! Crate-wide error taxonomy. Rejected-input and insufficient-balance
//! kinds are caller-correctable and signaled before/without side
//! effects; upstream-unavailable is retryable later; transactional
//! failures are rolled back, logged with detail, and surfaced opaquely.

use crate::config::ConfigError;
use crate::domain::AmountError;
use crate::fx::FxError;
use crate::wallet::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Rejected input: signaled before any transaction opens
    #[error("Unsupported currency: {currency}. Supported: {supported}")]
    UnsupportedCurrency { currency: String, supported: String },

    #[error(transparent)]
    InvalidAmount(#[from] AmountError),

    #[error("Source and destination currencies must differ")]
    SameCurrency,

    // Guarded decrement failed; never folded into a generic failure
    #[error("Insufficient balance")]
    InsufficientBalance,

    // The same idempotency key was used by a different operation type
    #[error("Idempotency conflict: key already used by a different operation")]
    IdempotencyConflict,

    // Opaque transactional failure; the cause is logged, not exposed
    #[error("Conversion failed")]
    ConversionFailed,

    // FX layer: upstream-unavailable (retryable) or unsupported pair
    #[error(transparent)]
    Fx(#[from] FxError),

    // Unexpected datastore errors
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AppError {
    /// True for errors the caller can correct and resubmit.
    pub fn is_caller_correctable(&self) -> bool {
        matches!(
            self,
            AppError::UnsupportedCurrency { .. }
                | AppError::InvalidAmount(_)
                | AppError::SameCurrency
                | AppError::InsufficientBalance
                | AppError::Fx(FxError::UnsupportedPair { .. })
        )
    }

    /// True for errors worth retrying later without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Fx(FxError::Unavailable))
    }
}
