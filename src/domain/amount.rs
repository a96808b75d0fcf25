//! Amount type
//!
//! Domain primitive for major-unit monetary amounts. Validated at
//! construction time, so invalid values cannot reach the ledger and
//! minor-unit conversion can never overflow.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum allowed amount (1 trillion major units)
const MAX_AMOUNT: Decimal = Decimal::from_parts(3567587328, 232, 0, false, 0);

/// Maximum decimal places accepted at the boundary. Callers may send
/// more precision than the currency carries (1.235 USD is valid input
/// and rounds to 124 minor units), but not unbounded precision.
const MAX_SCALE: u32 = 8;

/// A validated, strictly positive major-unit amount.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - At most 8 decimal places
/// - At most 10^12
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooManyDecimals` if more than 8 decimal places
    /// - `AmountError::Overflow` if value > 1 trillion
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        if value.scale() > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }

        if value > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }

        Ok(Self(value))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s).map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Amount::from_str(&value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.0.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_max_amount_constant() {
        assert_eq!(MAX_AMOUNT, dec!(1000000000000));
    }

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(dec!(100));
        assert!(amount.is_ok());
        assert_eq!(amount.unwrap().value(), dec!(100));
    }

    #[test]
    fn test_amount_zero_rejected() {
        let amount = Amount::new(Decimal::ZERO);
        assert!(matches!(amount, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_negative_rejected() {
        let amount = Amount::new(dec!(-100));
        assert!(matches!(amount, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_too_many_decimals() {
        // 0.123456789 has 9 decimal places
        let amount = Amount::new(Decimal::new(123456789, 9));
        assert!(matches!(amount, Err(AmountError::TooManyDecimals(9))));
    }

    #[test]
    fn test_amount_max_decimals_ok() {
        // 0.12345678 has 8 decimal places
        let amount = Amount::new(Decimal::new(12345678, 8));
        assert!(amount.is_ok());
    }

    #[test]
    fn test_amount_overflow() {
        let amount = Amount::new(dec!(1000000000001));
        assert!(matches!(amount, Err(AmountError::Overflow)));
    }

    #[test]
    fn test_amount_max_value_ok() {
        let amount = Amount::new(dec!(1000000000000));
        assert!(amount.is_ok());
    }

    #[test]
    fn test_amount_from_str() {
        let amount: Result<Amount, _> = "123.456".parse();
        assert!(amount.is_ok());
        assert_eq!(amount.unwrap().value(), dec!(123.456));
    }

    #[test]
    fn test_amount_from_str_garbage() {
        let amount: Result<Amount, _> = "not-a-number".parse();
        assert!(matches!(amount, Err(AmountError::ParseError(_))));
    }
}
