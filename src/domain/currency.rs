//! Currency support and minor-unit arithmetic
//!
//! All balances are stored as integer minor units (e.g. cents). The
//! conversions here are pure: no binary floating point is ever involved,
//! so amounts survive round trips exactly.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::ToPrimitive;

/// Default supported-currency list (comma-separated codes).
pub const DEFAULT_SUPPORTED_CURRENCIES: &str = "NGN,USD,EUR,GBP";

/// Minor-unit exponents per currency. Unknown codes fall back to 2;
/// rejecting unknown codes is `SupportedCurrencies::normalize`'s job,
/// not this table's.
const CURRENCY_DECIMALS: &[(&str, u32)] = &[
    ("NGN", 2),
    ("USD", 2),
    ("EUR", 2),
    ("GBP", 2),
];

/// Number of decimal places for a currency (default 2).
pub fn decimals(currency: &str) -> u32 {
    CURRENCY_DECIMALS
        .iter()
        .find(|(code, _)| *code == currency)
        .map(|(_, d)| *d)
        .unwrap_or(2)
}

/// Minor-unit multiplier for a currency: 10^decimals.
pub fn multiplier(currency: &str) -> i64 {
    10i64.pow(decimals(currency))
}

/// Convert a major-unit amount to integer minor units, rounding ties
/// away from zero: 1.234 -> 123, 1.235 -> 124 for a 2-decimal currency.
///
/// Inputs are bounded by `Amount` validation; out-of-range values
/// saturate rather than panic.
pub fn to_minor(amount: Decimal, currency: &str) -> i64 {
    let scaled = (amount * Decimal::from(multiplier(currency)))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    scaled.to_i64().unwrap_or(if scaled.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Convert integer minor units back to an exact major-unit decimal.
pub fn from_minor(amount_minor: i64, currency: &str) -> Decimal {
    Decimal::new(amount_minor, decimals(currency))
}

/// The configured set of currencies the wallet accepts.
///
/// Parsed from a comma-separated list (`SUPPORTED_CURRENCIES`), trimmed
/// and uppercased. Membership is checked here; the decimals table above
/// never rejects anything.
#[derive(Debug, Clone)]
pub struct SupportedCurrencies {
    codes: Vec<String>,
}

impl SupportedCurrencies {
    /// Parse a comma-separated currency list.
    pub fn parse(raw: &str) -> Self {
        let mut codes: Vec<String> = Vec::new();
        for code in raw.split(',') {
            let code = code.trim().to_uppercase();
            if !code.is_empty() && !codes.contains(&code) {
                codes.push(code);
            }
        }
        Self { codes }
    }

    /// Validate a currency code against the supported set, returning
    /// the canonical (uppercased) code.
    pub fn normalize(&self, currency: &str) -> Option<String> {
        let upper = currency.trim().to_uppercase();
        self.codes.contains(&upper).then_some(upper)
    }

    pub fn contains(&self, currency: &str) -> bool {
        self.normalize(currency).is_some()
    }

    /// Supported codes, in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.codes.iter()
    }

    /// Human-readable list for error messages.
    pub fn display_list(&self) -> String {
        self.codes.join(", ")
    }
}

impl Default for SupportedCurrencies {
    fn default() -> Self {
        Self::parse(DEFAULT_SUPPORTED_CURRENCIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_multiplier_known_currencies() {
        assert_eq!(multiplier("NGN"), 100);
        assert_eq!(multiplier("USD"), 100);
        assert_eq!(multiplier("EUR"), 100);
        assert_eq!(multiplier("GBP"), 100);
    }

    #[test]
    fn test_multiplier_unknown_currency_defaults_to_two_decimals() {
        assert_eq!(multiplier("XYZ"), 100);
    }

    #[test]
    fn test_to_minor_rounds_half_away_from_zero() {
        assert_eq!(to_minor(dec!(1.234), "USD"), 123);
        assert_eq!(to_minor(dec!(1.235), "USD"), 124);
    }

    #[test]
    fn test_to_minor_exact_amounts() {
        assert_eq!(to_minor(dec!(1000), "NGN"), 100_000);
        assert_eq!(to_minor(dec!(0.01), "USD"), 1);
        assert_eq!(to_minor(dec!(12.50), "GBP"), 1250);
    }

    #[test]
    fn test_from_minor_is_exact() {
        assert_eq!(from_minor(123, "USD"), dec!(1.23));
        assert_eq!(from_minor(138857, "NGN"), dec!(1388.57));
        assert_eq!(from_minor(0, "EUR"), dec!(0.00));
    }

    #[test]
    fn test_round_trip_integer_majors() {
        for amount in [1i64, 7, 50, 1000, 999_999] {
            let major = Decimal::from(amount);
            for currency in ["NGN", "USD", "EUR", "GBP"] {
                assert_eq!(from_minor(to_minor(major, currency), currency), major);
            }
        }
    }

    #[test]
    fn test_supported_currencies_parse_and_normalize() {
        let supported = SupportedCurrencies::parse(" ngn, usd ,EUR,gbp,");
        assert_eq!(supported.normalize("usd"), Some("USD".to_string()));
        assert_eq!(supported.normalize("NGN"), Some("NGN".to_string()));
        assert_eq!(supported.normalize("JPY"), None);
        assert!(supported.contains("gbp"));
        assert!(!supported.contains(""));
    }

    #[test]
    fn test_supported_currencies_default_set() {
        let supported = SupportedCurrencies::default();
        let codes: Vec<&String> = supported.iter().collect();
        assert_eq!(codes, ["NGN", "USD", "EUR", "GBP"]);
    }
}
