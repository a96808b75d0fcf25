//! Domain module
//!
//! Core domain types: validated amounts, currency support, and
//! minor-unit arithmetic.

pub mod amount;
pub mod currency;

pub use amount::{Amount, AmountError};
pub use currency::{SupportedCurrencies, DEFAULT_SUPPORTED_CURRENCIES};
