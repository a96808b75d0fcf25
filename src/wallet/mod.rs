//! Wallet module
//!
//! The ledger engine (fund / convert / trade), its storage layer, and
//! the persisted/view data model.

mod ledger;
mod model;
mod store;

pub use ledger::{HistoryFilter, WalletLedger};
pub use model::{
    BalanceView, ConvertOutcome, FundOutcome, NewTransactionRecord, TradeOutcome,
    TransactionRecord, TransactionStatus, TransactionType, TransactionView, WalletBalance,
};
pub use store::{LedgerStore, StoreError};
