//! Multi-currency wallet core
//!
//! A custodial wallet engine backed by PostgreSQL: per-user, per-currency
//! balances held in integer minor units, funded and converted through an
//! exchange-rate provider with caching, bounded retry, and stale-rate
//! fallback. Every balance mutation is idempotent and exactly-once.

pub mod cache;
pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod fx;
pub mod wallet;

pub use cache::RateCache;
pub use config::{Config, ConfigError};
pub use domain::{Amount, AmountError, SupportedCurrencies};
pub use error::{AppError, AppResult};
pub use fx::{
    Conversion, ExchangeRateApiClient, FxError, FxRateProvider, FxRatesResponse, RateFetcher,
};
pub use wallet::{
    BalanceView, ConvertOutcome, FundOutcome, HistoryFilter, LedgerStore, TradeOutcome,
    TransactionStatus, TransactionType, TransactionView, WalletLedger,
};
