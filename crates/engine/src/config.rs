//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required for `PostgreSQL` commands
//! - `ORDERLINE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `ORDERLINE_SHIPPING_COST` - Flat shipping charge per order (default: 10.00)
//! - `ORDERLINE_TAX_RATE` - Tax rate applied to the subtotal (default: 0.10)
//! - `ORDERLINE_CHECKOUT_TIMEOUT_SECS` - Checkout deadline, 0 disables it (default: 30)
//! - `ORDERLINE_DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

use orderline_core::Money;

use crate::services::checkout::{PricingError, PricingPolicy};

const DEFAULT_CHECKOUT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// Maximum pooled database connections
    pub max_connections: u32,
    /// Checkout pricing and deadline
    pub checkout: CheckoutConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Settings for [`crate::CheckoutService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    pub pricing: PricingPolicy,
    /// Deadline for one checkout; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            pricing: PricingPolicy::default(),
            timeout: Some(Duration::from_secs(DEFAULT_CHECKOUT_TIMEOUT_SECS)),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("ORDERLINE_DATABASE_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .map(SecretString::from);

        let max_connections: u32 =
            parse_or_default(&lookup, "ORDERLINE_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "ORDERLINE_DB_MAX_CONNECTIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let defaults = PricingPolicy::default();
        let shipping_cost: Decimal = parse_or_default(
            &lookup,
            "ORDERLINE_SHIPPING_COST",
            defaults.shipping_cost.amount(),
        )?;
        let tax_rate: Decimal = parse_or_default(&lookup, "ORDERLINE_TAX_RATE", defaults.tax_rate)?;
        let pricing = PricingPolicy::new(Money::new(shipping_cost), tax_rate).map_err(|e| {
            let key = match e {
                PricingError::NegativeShipping(_) => "ORDERLINE_SHIPPING_COST",
                PricingError::RateOutOfRange(_) => "ORDERLINE_TAX_RATE",
            };
            ConfigError::InvalidEnvVar(key.to_string(), e.to_string())
        })?;

        let timeout_secs: u64 = parse_or_default(
            &lookup,
            "ORDERLINE_CHECKOUT_TIMEOUT_SECS",
            DEFAULT_CHECKOUT_TIMEOUT_SECS,
        )?;
        let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        Ok(Self {
            database_url,
            max_connections,
            checkout: CheckoutConfig { pricing, timeout },
            sentry_dsn: lookup("SENTRY_DSN").filter(|dsn| !dsn.is_empty()),
        })
    }

    /// The database URL, for commands that need `PostgreSQL`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if neither URL variable was set.
    pub fn require_database_url(&self) -> Result<&SecretString, ConfigError> {
        self.database_url
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("ORDERLINE_DATABASE_URL".to_string()))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse an optional variable, falling back to a default when unset.
fn parse_or_default<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
