//! Cart engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CART_API_BASE_URL` - Base URL of the remote cart store
//!
//! ## Optional
//! - `CART_API_TOKEN` - Bearer token for the store; operations fail with an
//!   auth error when absent
//! - `CART_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 10)
//! - `CART_CURRENCY` - ISO 4217 currency code (default: USD)
//! - `CART_FREE_SHIPPING_THRESHOLD` - Subtotal at which shipping is free
//!   (default: 75.00)
//! - `CART_SHIPPING_FEE` - Flat shipping fee below the threshold
//!   (default: 9.99)

use std::time::Duration;

use golden_kiwi_core::types::CurrencyCode;
use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Full cart engine configuration.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Remote store connection settings.
    pub store: StoreConfig,
    /// Shipping and currency policy for derived totals.
    pub pricing: PricingPolicy,
}

/// Connection settings for the remote cart store.
///
/// Implements `Debug` manually to redact the bearer token.
#[derive(Clone)]
pub struct StoreConfig {
    /// Base URL of the store API (e.g., <https://shop.example.com/api>).
    pub base_url: Url,
    /// Bearer token; `None` means the session is not authenticated.
    pub bearer_token: Option<SecretString>,
    /// Per-request timeout. A hung request fails instead of pinning its
    /// control in the disabled state forever.
    pub timeout: Duration,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("base_url", &self.base_url.as_str())
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Shipping policy used when deriving the summary.
#[derive(Debug, Clone, Copy)]
pub struct PricingPolicy {
    /// Currency for empty-cart summaries.
    pub currency: CurrencyCode,
    /// Subtotal at or above which shipping is free.
    pub free_shipping_threshold: Decimal,
    /// Flat fee charged below the threshold.
    pub flat_shipping_fee: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            currency: CurrencyCode::USD,
            free_shipping_threshold: Decimal::new(75_00, 2),
            flat_shipping_fee: Decimal::new(9_99, 2),
        }
    }
}

impl CartConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            store: StoreConfig::from_env()?,
            pricing: PricingPolicy::from_env()?,
        })
    }
}

impl StoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = parse_url("CART_API_BASE_URL", &get_required_env("CART_API_BASE_URL")?)?;
        let bearer_token = get_optional_env("CART_API_TOKEN").map(SecretString::from);
        let timeout_secs = parse_u64(
            "CART_REQUEST_TIMEOUT_SECS",
            &get_env_or_default("CART_REQUEST_TIMEOUT_SECS", "10"),
        )?;

        Ok(Self {
            base_url,
            bearer_token,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl PricingPolicy {
    fn from_env() -> Result<Self, ConfigError> {
        let currency = get_env_or_default("CART_CURRENCY", "USD")
            .parse::<CurrencyCode>()
            .map_err(|e| ConfigError::InvalidEnvVar("CART_CURRENCY".to_string(), e.to_string()))?;
        let free_shipping_threshold = parse_decimal(
            "CART_FREE_SHIPPING_THRESHOLD",
            &get_env_or_default("CART_FREE_SHIPPING_THRESHOLD", "75.00"),
        )?;
        let flat_shipping_fee = parse_decimal(
            "CART_SHIPPING_FEE",
            &get_env_or_default("CART_SHIPPING_FEE", "9.99"),
        )?;

        Ok(Self {
            currency,
            free_shipping_threshold,
            flat_shipping_fee,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value
        .parse::<Decimal>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
