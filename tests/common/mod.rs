//! Shared integration test setup.
//!
//! Tests talk to a real PostgreSQL instance via `DATABASE_URL` and skip
//! (returning `None`) when it is not configured. Each test uses a fresh
//! random user id, so no cross-test cleanup is needed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use fx_wallet::{
    db, FxError, FxRateProvider, FxRatesResponse, RateCache, RateFetcher, SupportedCurrencies,
    WalletLedger,
};

/// Connect to the test database, or `None` if DATABASE_URL is unset.
pub async fn setup() -> Option<PgPool> {
    dotenvy::dotenv().ok();

    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set, skipping integration test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to test database");

    apply_schema(&pool).await;

    db::verify_connection(&pool)
        .await
        .expect("database connectivity check failed");
    assert!(
        db::check_schema(&pool).await.expect("schema check failed"),
        "wallet tables missing after migration"
    );

    Some(pool)
}

async fn apply_schema(pool: &PgPool) {
    for statement in migration_statements() {
        sqlx::query(&statement)
            .execute(pool)
            .await
            .expect("failed to apply migration statement");
    }
}

/// Split the migration into executable statements. SQL comments are
/// stripped first so punctuation inside them cannot cut a statement.
fn migration_statements() -> Vec<String> {
    let migration = include_str!("../../migrations/0001_create_wallet_tables.sql");
    migration
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[test]
fn test_migration_statements_are_clean() {
    let statements = migration_statements();
    assert_eq!(statements.len(), 4);
    for statement in &statements {
        assert!(!statement.contains("--"), "comment leaked into: {statement}");
        assert!(
            statement.starts_with("CREATE"),
            "statement cut mid-way: {statement}"
        );
    }
}

/// Rate fetcher returning a fixed table per base currency. Fails for
/// bases it has no table for, like the real upstream would.
pub struct FixedRateFetcher {
    tables: BTreeMap<String, BTreeMap<String, Decimal>>,
}

impl FixedRateFetcher {
    pub fn with_test_rates() -> Self {
        let usd = BTreeMap::from([
            ("NGN".to_string(), dec!(1500)),
            ("EUR".to_string(), dec!(0.9)),
            ("GBP".to_string(), dec!(0.8)),
        ]);
        let ngn = BTreeMap::from([
            ("USD".to_string(), dec!(0.00066)),
            ("EUR".to_string(), dec!(0.0006)),
            ("GBP".to_string(), dec!(0.00053)),
        ]);

        Self {
            tables: BTreeMap::from([("USD".to_string(), usd), ("NGN".to_string(), ngn)]),
        }
    }
}

#[async_trait]
impl RateFetcher for FixedRateFetcher {
    async fn fetch_rates(&self, base: &str) -> Result<FxRatesResponse, FxError> {
        let rates = self
            .tables
            .get(base)
            .cloned()
            .ok_or_else(|| FxError::Upstream(format!("no table for base {base}")))?;

        Ok(FxRatesResponse {
            base: base.to_string(),
            rates,
            fetched_at: Utc::now(),
        })
    }
}

/// A ledger wired to the fixed-rate fetcher and default currencies.
pub fn test_ledger(pool: PgPool) -> WalletLedger {
    let fx = FxRateProvider::new(
        Arc::new(FixedRateFetcher::with_test_rates()),
        RateCache::new(),
        Duration::from_secs(3600),
    );
    WalletLedger::new(pool, fx, SupportedCurrencies::default())
}
