//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;

use crate::domain::currency::DEFAULT_SUPPORTED_CURRENCIES;

/// Default upstream FX rate API endpoint.
const DEFAULT_EXCHANGE_RATE_API_BASE_URL: &str = "https://v6.exchangerate-api.com/v6";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Comma-separated supported currency codes
    pub supported_currencies: String,

    /// FX rate cache TTL in seconds
    pub fx_rates_cache_ttl_secs: u64,

    /// API key for the upstream FX rate API
    pub exchange_rate_api_key: String,

    /// Base URL of the upstream FX rate API
    pub exchange_rate_api_base_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let supported_currencies = env::var("SUPPORTED_CURRENCIES")
            .unwrap_or_else(|_| DEFAULT_SUPPORTED_CURRENCIES.to_string());

        let fx_rates_cache_ttl_secs = env::var("FX_RATES_CACHE_TTL")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("FX_RATES_CACHE_TTL"))?;

        let exchange_rate_api_key = env::var("EXCHANGE_RATE_API_KEY")
            .map_err(|_| ConfigError::MissingEnv("EXCHANGE_RATE_API_KEY"))?;

        let exchange_rate_api_base_url = env::var("EXCHANGE_RATE_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_EXCHANGE_RATE_API_BASE_URL.to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            supported_currencies,
            fx_rates_cache_ttl_secs,
            exchange_rate_api_key,
            exchange_rate_api_base_url,
        })
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
