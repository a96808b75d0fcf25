//! Wallet Ledger
//!
//! Orchestrates fund, convert and trade as short-lived atomic
//! operations over two invariants: balances never go negative, and a
//! completed idempotency key always replays the same result without a
//! second economic effect.
//!
//! Each operation is `VALIDATING -> (IDEMPOTENT_REPLAY | EXECUTING) ->
//! COMMITTED | FAILED`: it either fully commits or fully rolls back;
//! the caller never observes a pending state.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{currency, Amount, SupportedCurrencies};
use crate::error::{AppError, AppResult};
use crate::fx::FxRateProvider;

use super::model::{
    BalanceView, ConvertOutcome, FundOutcome, NewTransactionRecord, TradeOutcome,
    TransactionRecord, TransactionType, TransactionView,
};
use super::store::{LedgerStore, StoreError};

/// Default page size for transaction history.
const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// History query options.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub kind: Option<TransactionType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// The wallet ledger engine.
pub struct WalletLedger {
    store: LedgerStore,
    fx: FxRateProvider,
    currencies: SupportedCurrencies,
}

impl WalletLedger {
    pub fn new(pool: PgPool, fx: FxRateProvider, currencies: SupportedCurrencies) -> Self {
        Self {
            store: LedgerStore::new(pool),
            fx,
            currencies,
        }
    }

    fn validate_currency(&self, code: &str) -> AppResult<String> {
        self.currencies
            .normalize(code)
            .ok_or_else(|| AppError::UnsupportedCurrency {
                currency: code.to_string(),
                supported: self.currencies.display_list(),
            })
    }

    // =========================================================================
    // fund
    // =========================================================================

    /// Credit a user's balance in one currency.
    ///
    /// With an idempotency key, a retried request that already completed
    /// returns the current balance without a second credit.
    pub async fn fund(
        &self,
        user_id: Uuid,
        currency_code: &str,
        amount: Decimal,
        idempotency_key: Option<&str>,
    ) -> AppResult<FundOutcome> {
        let currency = self.validate_currency(currency_code)?;
        let amount = Amount::new(amount)?;
        let amount_minor = currency::to_minor(amount.value(), &currency);

        // Fast-path replay. The unique constraint on the key remains the
        // real guard; this check only skips work for the common retry.
        if let Some(key) = idempotency_key {
            if let Some(existing) = self.store.find_by_idempotency_key(key).await? {
                if existing.kind == TransactionType::Fund {
                    return self.fund_replay(user_id, &currency).await;
                }
            }
        }

        let mut tx = self.store.begin().await?;
        self.store
            .ensure_balance_row(&mut tx, user_id, &currency)
            .await?;

        // Lock the row for the rest of the unit of work. The locked value
        // gives the exact post-credit balance for the outcome; a read
        // after commit could already see later concurrent credits.
        let current_minor = self
            .store
            .lock_balance(&mut tx, user_id, &currency)
            .await?
            .map(|b| b.balance_minor)
            .unwrap_or(0);
        self.store
            .add_balance(&mut tx, user_id, &currency, amount_minor)
            .await?;

        let record = NewTransactionRecord::fund(user_id, amount_minor, &currency, idempotency_key);
        match self.store.insert_transaction(&mut tx, &record).await {
            Ok(_) => {
                tx.commit().await.map_err(StoreError::from)?;
            }
            Err(StoreError::IdempotencyKeyExists) => {
                // Lost the insert race: someone else committed this key.
                tx.rollback().await.map_err(StoreError::from)?;
                return self.replay_won_by_other(user_id, &currency, idempotency_key).await;
            }
            Err(err) => return Err(err.into()),
        }

        tracing::debug!(%user_id, %currency, amount_minor, "fund committed");
        Ok(FundOutcome {
            new_balance: currency::from_minor(current_minor + amount_minor, &currency),
            currency,
        })
    }

    /// Current balance view for a fund whose effect already committed
    /// (idempotent replay).
    async fn fund_replay(&self, user_id: Uuid, currency: &str) -> AppResult<FundOutcome> {
        let balance_minor = self
            .store
            .find_balance(user_id, currency)
            .await?
            .map(|b| b.balance_minor)
            .unwrap_or(0);

        Ok(FundOutcome {
            currency: currency.to_string(),
            new_balance: currency::from_minor(balance_minor, currency),
        })
    }

    /// Resolve a lost insert race for fund: re-read the winning record
    /// and return its result, or flag a cross-type key reuse.
    async fn replay_won_by_other(
        &self,
        user_id: Uuid,
        currency: &str,
        idempotency_key: Option<&str>,
    ) -> AppResult<FundOutcome> {
        let key = idempotency_key.ok_or_else(|| {
            AppError::Internal("idempotency race without a key".to_string())
        })?;
        let existing = self
            .store
            .find_by_idempotency_key(key)
            .await?
            .ok_or_else(|| AppError::Internal("winning idempotency record vanished".to_string()))?;

        match existing.kind {
            TransactionType::Fund => self.fund_replay(user_id, currency).await,
            TransactionType::Convert | TransactionType::Trade => {
                Err(AppError::IdempotencyConflict)
            }
        }
    }

    // =========================================================================
    // convert / trade
    // =========================================================================

    /// Exchange `amount` of `source_code` into `destination_code` at the
    /// current rate.
    ///
    /// The rate is fetched before the balance transaction opens, keeping
    /// upstream latency outside the lock window. The source debit is a
    /// guarded decrement; insufficient funds abort with no destination
    /// credit.
    pub async fn convert(
        &self,
        user_id: Uuid,
        source_code: &str,
        destination_code: &str,
        amount: Decimal,
        idempotency_key: Option<&str>,
    ) -> AppResult<ConvertOutcome> {
        let source = self.validate_currency(source_code)?;
        let destination = self.validate_currency(destination_code)?;
        if source == destination {
            return Err(AppError::SameCurrency);
        }
        let amount = Amount::new(amount)?;
        let amount_minor = currency::to_minor(amount.value(), &source);

        if let Some(key) = idempotency_key {
            if let Some(existing) = self.store.find_by_idempotency_key(key).await? {
                if existing.kind == TransactionType::Convert {
                    return convert_replay(&existing, &source, &destination, amount.value());
                }
            }
        }

        let conversion = self.fx.convert(amount_minor, &source, &destination).await?;

        let mut tx = self.store.begin().await?;

        let debited = match self
            .store
            .subtract_balance_guarded(&mut tx, user_id, &source, amount_minor)
            .await
        {
            Ok(debited) => debited,
            Err(err) => {
                tracing::error!(%user_id, %source, error = %err, "conversion debit failed");
                return Err(AppError::ConversionFailed);
            }
        };
        if !debited {
            // Rolls back on drop; the destination leg is never touched.
            return Err(AppError::InsufficientBalance);
        }

        let record = NewTransactionRecord::convert(
            user_id,
            amount_minor,
            &source,
            conversion.amount_destination_minor,
            &destination,
            conversion.rate,
            idempotency_key,
        );

        let credit_and_record: Result<(), StoreError> = async {
            self.store
                .ensure_balance_row(&mut tx, user_id, &destination)
                .await?;
            self.store
                .add_balance(
                    &mut tx,
                    user_id,
                    &destination,
                    conversion.amount_destination_minor,
                )
                .await?;
            self.store.insert_transaction(&mut tx, &record).await?;
            Ok(())
        }
        .await;

        match credit_and_record {
            Ok(()) => {
                tx.commit().await.map_err(|err| {
                    tracing::error!(%user_id, error = %err, "conversion commit failed");
                    AppError::ConversionFailed
                })?;
            }
            Err(StoreError::IdempotencyKeyExists) => {
                tx.rollback().await.map_err(StoreError::from)?;
                let key = idempotency_key.ok_or_else(|| {
                    AppError::Internal("idempotency race without a key".to_string())
                })?;
                let existing = self.store.find_by_idempotency_key(key).await?.ok_or_else(
                    || AppError::Internal("winning idempotency record vanished".to_string()),
                )?;
                return match existing.kind {
                    TransactionType::Convert => {
                        convert_replay(&existing, &source, &destination, amount.value())
                    }
                    TransactionType::Fund | TransactionType::Trade => {
                        Err(AppError::IdempotencyConflict)
                    }
                };
            }
            Err(err) => {
                tracing::error!(%user_id, %source, %destination, error = %err, "conversion failed, rolling back");
                return Err(AppError::ConversionFailed);
            }
        }

        tracing::debug!(
            %user_id,
            %source,
            %destination,
            amount_minor,
            amount_destination_minor = conversion.amount_destination_minor,
            "conversion committed"
        );

        Ok(ConvertOutcome {
            source_currency: source.clone(),
            destination_currency: destination.clone(),
            amount_source: amount.value(),
            amount_destination: currency::from_minor(
                conversion.amount_destination_minor,
                &destination,
            ),
            rate_used: conversion.rate,
        })
    }

    /// Trade one currency for another. Byte-for-byte delegation to
    /// [`convert`](Self::convert); only the result field names differ.
    pub async fn trade(
        &self,
        user_id: Uuid,
        from_currency: &str,
        to_currency: &str,
        amount: Decimal,
        idempotency_key: Option<&str>,
    ) -> AppResult<TradeOutcome> {
        self.convert(user_id, from_currency, to_currency, amount, idempotency_key)
            .await
            .map(TradeOutcome::from)
    }

    // =========================================================================
    // queries
    // =========================================================================

    /// Per-currency balances: one row per supported currency,
    /// zero-filled for currencies never held, sorted by code ascending.
    pub async fn get_balances(&self, user_id: Uuid) -> AppResult<Vec<BalanceView>> {
        let rows = self.store.find_balances(user_id).await?;
        let mut views: Vec<BalanceView> = rows
            .into_iter()
            .map(|row| BalanceView {
                balance: currency::from_minor(row.balance_minor, &row.currency),
                balance_minor: row.balance_minor,
                currency: row.currency,
            })
            .collect();

        for code in self.currencies.iter() {
            if !views.iter().any(|v| &v.currency == code) {
                views.push(BalanceView {
                    currency: code.clone(),
                    balance: currency::from_minor(0, code),
                    balance_minor: 0,
                });
            }
        }

        views.sort_by(|a, b| a.currency.cmp(&b.currency));
        Ok(views)
    }

    /// Transaction history, newest first.
    pub async fn get_history(
        &self,
        user_id: Uuid,
        filter: HistoryFilter,
    ) -> AppResult<Vec<TransactionView>> {
        let limit = filter.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let offset = filter.offset.unwrap_or(0);
        let records = self
            .store
            .find_transactions(user_id, filter.kind, limit, offset)
            .await?;

        Ok(records.into_iter().map(TransactionView::from).collect())
    }
}

/// Shape a recorded CONVERT transaction into the caller's view without
/// re-executing anything.
fn convert_replay(
    record: &TransactionRecord,
    source: &str,
    destination: &str,
    amount_source: Decimal,
) -> AppResult<ConvertOutcome> {
    let amount_destination_minor = record.amount_destination_minor.ok_or_else(|| {
        AppError::Internal("convert record missing destination amount".to_string())
    })?;
    let rate_used = record
        .rate_used
        .ok_or_else(|| AppError::Internal("convert record missing rate".to_string()))?;

    Ok(ConvertOutcome {
        source_currency: source.to_string(),
        destination_currency: destination.to_string(),
        amount_source,
        amount_destination: currency::from_minor(amount_destination_minor, destination),
        rate_used,
    })
}
