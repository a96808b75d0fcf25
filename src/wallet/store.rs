//! Ledger Store
//!
//! Storage layer for balances and transaction records: row lookup, lazy
//! row creation, guarded (conditional) balance mutation, pessimistic row
//! locking, and unit-of-work boundaries.
//!
//! All mutating operations take an open transaction; a unit of work that
//! is dropped without commit rolls back.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::model::{
    NewTransactionRecord, TransactionRecord, TransactionStatus, TransactionType, WalletBalance,
};

/// Ledger Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unique violation on the idempotency key: another request with
    /// the same key already committed its record.
    #[error("Idempotency key already recorded")]
    IdempotencyKeyExists,

    #[error("Corrupt row: {0}")]
    Decode(String),
}

/// Balance row tuple as read from `wallet_balances`.
type BalanceRow = (Uuid, Uuid, String, i64, DateTime<Utc>, DateTime<Utc>);

/// Transaction row tuple as read from `transactions`.
type TransactionRow = (
    Uuid,
    Uuid,
    String,
    String,
    i64,
    String,
    Option<i64>,
    Option<String>,
    Option<Decimal>,
    Option<String>,
    DateTime<Utc>,
);

const TRANSACTION_COLUMNS: &str = "id, user_id, type, status, amount_minor, currency, \
     amount_destination_minor, currency_destination, rate_used, idempotency_key, created_at";

/// Repository over the wallet balance and transaction tables.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    pool: PgPool,
}

impl LedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a unit of work. Dropping the returned transaction without
    /// committing rolls everything back.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        Ok(self.pool.begin().await?)
    }

    // =========================================================================
    // Balance rows
    // =========================================================================

    /// All balance rows for a user, ordered by currency code ascending.
    pub async fn find_balances(&self, user_id: Uuid) -> Result<Vec<WalletBalance>, StoreError> {
        let rows: Vec<BalanceRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, currency, balance_minor, created_at, updated_at
            FROM wallet_balances
            WHERE user_id = $1
            ORDER BY currency ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(balance_from_row).collect())
    }

    /// Balance row for one (user, currency) pair, if it exists.
    pub async fn find_balance(
        &self,
        user_id: Uuid,
        currency: &str,
    ) -> Result<Option<WalletBalance>, StoreError> {
        let row: Option<BalanceRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, currency, balance_minor, created_at, updated_at
            FROM wallet_balances
            WHERE user_id = $1 AND currency = $2
            "#,
        )
        .bind(user_id)
        .bind(currency)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(balance_from_row))
    }

    /// Read a balance row under a pessimistic write lock, held for the
    /// rest of the unit of work.
    pub async fn lock_balance(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        currency: &str,
    ) -> Result<Option<WalletBalance>, StoreError> {
        let row: Option<BalanceRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, currency, balance_minor, created_at, updated_at
            FROM wallet_balances
            WHERE user_id = $1 AND currency = $2
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(currency)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(balance_from_row))
    }

    /// Create the (user, currency) balance row with a zero balance if it
    /// does not exist yet. Balance rows are never deleted.
    pub async fn ensure_balance_row(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        currency: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO wallet_balances (id, user_id, currency, balance_minor)
            VALUES ($1, $2, $3, 0)
            ON CONFLICT (user_id, currency) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(currency)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Unconditionally add to a balance. The row-level write lock taken
    /// by UPDATE serializes concurrent mutations of the same row.
    pub async fn add_balance(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        currency: &str,
        delta_minor: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE wallet_balances
            SET balance_minor = balance_minor + $3, updated_at = NOW()
            WHERE user_id = $1 AND currency = $2
            "#,
        )
        .bind(user_id)
        .bind(currency)
        .bind(delta_minor)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Guarded decrement: subtract `amount_minor` only if the balance
    /// stays non-negative, as a single atomic conditional write.
    ///
    /// Returns false when the guard fails, including when the row does
    /// not exist, which is the same "insufficient funds" answer.
    pub async fn subtract_balance_guarded(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        currency: &str,
        amount_minor: i64,
    ) -> Result<bool, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE wallet_balances
            SET balance_minor = balance_minor - $3, updated_at = NOW()
            WHERE user_id = $1 AND currency = $2 AND balance_minor >= $3
            "#,
        )
        .bind(user_id)
        .bind(currency)
        .bind(amount_minor)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    // =========================================================================
    // Transaction records
    // =========================================================================

    /// Append a transaction record inside the unit of work.
    ///
    /// A unique violation on the idempotency key maps to
    /// [`StoreError::IdempotencyKeyExists`]: the constraint is the real
    /// guard against double effects, not the pre-transaction check.
    pub async fn insert_transaction(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        record: &NewTransactionRecord,
    ) -> Result<Uuid, StoreError> {
        let result: Result<Uuid, sqlx::Error> = sqlx::query_scalar(
            r#"
            INSERT INTO transactions (
                id, user_id, type, status, amount_minor, currency,
                amount_destination_minor, currency_destination, rate_used, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.user_id)
        .bind(record.kind.as_str())
        .bind(record.status.as_str())
        .bind(record.amount_minor)
        .bind(&record.currency)
        .bind(record.amount_destination_minor)
        .bind(record.currency_destination.as_deref())
        .bind(record.rate_used)
        .bind(record.idempotency_key.as_deref())
        .fetch_one(&mut **tx)
        .await;

        match result {
            Ok(id) => Ok(id),
            Err(err) => {
                if is_idempotency_key_violation(&err) {
                    return Err(StoreError::IdempotencyKeyExists);
                }
                Err(StoreError::Database(err))
            }
        }
    }

    /// Look up a transaction record by its idempotency key.
    pub async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(transaction_from_row).transpose()
    }

    /// Transaction history for a user, newest first.
    pub async fn find_transactions(
        &self,
        user_id: Uuid,
        kind: Option<TransactionType>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let rows: Vec<TransactionRow> = match kind {
            Some(kind) => {
                sqlx::query_as(&format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM transactions \
                     WHERE user_id = $1 AND type = $2 \
                     ORDER BY created_at DESC LIMIT $3 OFFSET $4"
                ))
                .bind(user_id)
                .bind(kind.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM transactions \
                     WHERE user_id = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3"
                ))
                .bind(user_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(transaction_from_row).collect()
    }
}

fn balance_from_row(row: BalanceRow) -> WalletBalance {
    let (id, user_id, currency, balance_minor, created_at, updated_at) = row;
    WalletBalance {
        id,
        user_id,
        currency,
        balance_minor,
        created_at,
        updated_at,
    }
}

fn transaction_from_row(row: TransactionRow) -> Result<TransactionRecord, StoreError> {
    let (
        id,
        user_id,
        kind,
        status,
        amount_minor,
        currency,
        amount_destination_minor,
        currency_destination,
        rate_used,
        idempotency_key,
        created_at,
    ) = row;

    Ok(TransactionRecord {
        id,
        user_id,
        kind: kind
            .parse::<TransactionType>()
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        status: status
            .parse::<TransactionStatus>()
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        amount_minor,
        currency,
        amount_destination_minor,
        currency_destination,
        rate_used,
        idempotency_key,
        created_at,
    })
}

/// Postgres unique_violation (23505) on the idempotency key constraint.
fn is_idempotency_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("23505")
                && db.constraint().is_some_and(|c| c.contains("idempotency"))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::IdempotencyKeyExists;
        assert!(err.to_string().contains("already recorded"));

        let err = StoreError::Decode("bad type".to_string());
        assert!(err.to_string().contains("Corrupt row"));
    }

    #[test]
    fn test_non_database_errors_are_not_unique_violations() {
        assert!(!is_idempotency_key_violation(&sqlx::Error::RowNotFound));
    }
}
