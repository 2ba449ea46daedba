//! Application configuration loaded from environment variables.

use checkout::{CheckoutSettings, PaymentMode};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` bind address (default: `"0.0.0.0"`)
/// - `PORT` listen port (default: `3000`)
/// - `RUST_LOG` tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL` PostgreSQL URL; unset runs on in-memory storage
/// - `DATABASE_MAX_CONNECTIONS` pool size (default: `10`)
/// - `PROMO_EXPERIMENT_KEY` experiment used by checkout (default: `"checkout_promo"`)
/// - `ORDER_NUMBER_PREFIX` (default: `"ORD"`)
/// - `ORDER_NUMBER_ATTEMPTS` sequence draws per checkout (default: `5`)
/// - `PAYMENT_MODE` `offline` or `gateway` (default: `offline`)
/// - `PAYMENT_GATEWAY_URL` required by `gateway` mode
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub experiment_key: String,
    pub order_number_prefix: String,
    pub order_number_attempts: u32,
    pub payment: PaymentMode,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from any key lookup. Unparseable values fall back
    /// to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let payment = match var("PAYMENT_MODE").map(|m| m.to_ascii_lowercase()) {
            Some(mode) if mode == "gateway" => PaymentMode::Gateway {
                url: var("PAYMENT_GATEWAY_URL"),
            },
            _ => PaymentMode::Offline,
        };

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: var("DATABASE_URL"),
            database_max_connections: var("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            experiment_key: var("PROMO_EXPERIMENT_KEY").unwrap_or(defaults.experiment_key),
            order_number_prefix: var("ORDER_NUMBER_PREFIX")
                .unwrap_or(defaults.order_number_prefix),
            order_number_attempts: var("ORDER_NUMBER_ATTEMPTS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.order_number_attempts),
            payment,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            experiment_key: self.experiment_key.clone(),
            order_number_prefix: self.order_number_prefix.clone(),
            order_number_attempts: self.order_number_attempts,
            payment: self.payment.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let checkout = CheckoutSettings::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            experiment_key: checkout.experiment_key,
            order_number_prefix: checkout.order_number_prefix,
            order_number_attempts: checkout.order_number_attempts,
            payment: checkout.payment,
        }
    }
}
