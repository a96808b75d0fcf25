//! Wallet data model
//!
//! Row types for the two persisted tables, the closed transaction
//! type/status enums, and the major-unit views returned to callers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::currency;

/// Economic operation recorded by a transaction.
///
/// A closed set: idempotent-replay branching matches on this
/// exhaustively, so a new type cannot silently fall through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Fund,
    Convert,
    Trade,
}

/// Settlement status. The core only ever writes `Completed`; `Pending`
/// and `Failed` are reserved for future asynchronous settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// Error for unrecognized enum strings read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {field} value: {value}")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Fund => "FUND",
            TransactionType::Convert => "CONVERT",
            TransactionType::Trade => "TRADE",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FUND" => Ok(TransactionType::Fund),
            "CONVERT" => Ok(TransactionType::Convert),
            "TRADE" => Ok(TransactionType::Trade),
            other => Err(UnknownVariant {
                field: "transaction type",
                value: other.to_string(),
            }),
        }
    }
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(UnknownVariant {
                field: "transaction status",
                value: other.to_string(),
            }),
        }
    }
}

/// One (user, currency) balance row. `balance_minor` never goes
/// negative; the guarded decrement enforces it.
#[derive(Debug, Clone)]
pub struct WalletBalance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: String,
    pub balance_minor: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit/idempotency record. Immutable once written; the
/// sole source of truth for idempotent replay and user-facing history.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub amount_destination_minor: Option<i64>,
    pub currency_destination: Option<String>,
    pub rate_used: Option<Decimal>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A transaction record about to be inserted.
#[derive(Debug, Clone)]
pub struct NewTransactionRecord {
    pub user_id: Uuid,
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub amount_destination_minor: Option<i64>,
    pub currency_destination: Option<String>,
    pub rate_used: Option<Decimal>,
    pub idempotency_key: Option<String>,
}

impl NewTransactionRecord {
    /// A completed single-leg FUND record.
    pub fn fund(
        user_id: Uuid,
        amount_minor: i64,
        currency: &str,
        idempotency_key: Option<&str>,
    ) -> Self {
        Self {
            user_id,
            kind: TransactionType::Fund,
            status: TransactionStatus::Completed,
            amount_minor,
            currency: currency.to_string(),
            amount_destination_minor: None,
            currency_destination: None,
            rate_used: None,
            idempotency_key: idempotency_key.map(str::to_string),
        }
    }

    /// A completed two-leg CONVERT record with the rate applied.
    #[allow(clippy::too_many_arguments)]
    pub fn convert(
        user_id: Uuid,
        amount_minor: i64,
        currency: &str,
        amount_destination_minor: i64,
        currency_destination: &str,
        rate_used: Decimal,
        idempotency_key: Option<&str>,
    ) -> Self {
        Self {
            user_id,
            kind: TransactionType::Convert,
            status: TransactionStatus::Completed,
            amount_minor,
            currency: currency.to_string(),
            amount_destination_minor: Some(amount_destination_minor),
            currency_destination: Some(currency_destination.to_string()),
            rate_used: Some(rate_used),
            idempotency_key: idempotency_key.map(str::to_string),
        }
    }
}

/// Result of a successful fund.
#[derive(Debug, Clone, Serialize)]
pub struct FundOutcome {
    pub currency: String,
    pub new_balance: Decimal,
}

/// Result of a successful conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertOutcome {
    pub source_currency: String,
    pub destination_currency: String,
    pub amount_source: Decimal,
    pub amount_destination: Decimal,
    pub rate_used: Decimal,
}

/// Result of a successful trade. Semantically identical to
/// [`ConvertOutcome`]; only the field names differ.
#[derive(Debug, Clone, Serialize)]
pub struct TradeOutcome {
    pub from_currency: String,
    pub to_currency: String,
    pub amount_from: Decimal,
    pub amount_to: Decimal,
    pub rate_used: Decimal,
}

impl From<ConvertOutcome> for TradeOutcome {
    fn from(outcome: ConvertOutcome) -> Self {
        Self {
            from_currency: outcome.source_currency,
            to_currency: outcome.destination_currency,
            amount_from: outcome.amount_source,
            amount_to: outcome.amount_destination,
            rate_used: outcome.rate_used,
        }
    }
}

/// One per-currency balance view, zero-filled for currencies the user
/// has never held.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceView {
    pub currency: String,
    pub balance: Decimal,
    pub balance_minor: i64,
}

/// User-facing transaction history entry, amounts in major units.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub currency: String,
    pub amount_destination: Option<Decimal>,
    pub currency_destination: Option<String>,
    pub rate_used: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl From<TransactionRecord> for TransactionView {
    fn from(record: TransactionRecord) -> Self {
        let amount_destination = match (
            record.amount_destination_minor,
            record.currency_destination.as_deref(),
        ) {
            (Some(minor), Some(currency)) => Some(currency::from_minor(minor, currency)),
            _ => None,
        };

        Self {
            id: record.id,
            kind: record.kind,
            status: record.status,
            amount: currency::from_minor(record.amount_minor, &record.currency),
            currency: record.currency,
            amount_destination,
            currency_destination: record.currency_destination,
            rate_used: record.rate_used,
            created_at: record.created_at,
        }
    }
}
