//! Application configuration loaded from environment variables.

use crate::errors::{AppError, Result};
use crate::models::Currency;

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Secret key used to authenticate against the payment provider
    pub stripe_secret_key: String,
    /// Payment provider API base (e.g. https://api.stripe.com)
    pub stripe_api_base: String,
    /// Timeout (in seconds) for outbound HTTP calls
    pub http_timeout_secs: u64,
    /// Currency used when a checkout request omits one
    pub default_currency: Currency,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key).ok_or_else(|| AppError::Config(format!("Missing env var: {key}")))
        };

        Ok(Config {
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./donations.db".to_string()),
            api_port: var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid API_PORT".to_string()))?,
            stripe_secret_key: var("STRIPE_SECRET_KEY").map_err(|_| {
                AppError::Config("STRIPE_SECRET_KEY environment variable is required".to_string())
            })?,
            stripe_api_base: var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            http_timeout_secs: var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid HTTP_TIMEOUT_SECS".to_string()))?,
            default_currency: var("DEFAULT_CURRENCY")
                .unwrap_or_else(|_| "usd".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid DEFAULT_CURRENCY".to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = Config::from_lookup(lookup(&[("STRIPE_SECRET_KEY", "sk_test_1")])).unwrap();
        assert_eq!(config.database_url, "sqlite:./donations.db");
        assert_eq!(config.api_port, 3001);
        assert_eq!(config.stripe_api_base, "https://api.stripe.com");
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.default_currency, Currency::Usd);
    }

    #[test]
    fn secret_key_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("STRIPE_SECRET_KEY")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("STRIPE_SECRET_KEY", "sk_test_1"),
            ("API_PORT", "not-a-port"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg == "Invalid API_PORT"));

        let err = Config::from_lookup(lookup(&[
            ("STRIPE_SECRET_KEY", "sk_test_1"),
            ("DEFAULT_CURRENCY", "doubloons"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg == "Invalid DEFAULT_CURRENCY"));
    }

    #[test]
    fn api_base_trailing_slash_is_trimmed() {
        let config = Config::from_lookup(lookup(&[
            ("STRIPE_SECRET_KEY", "sk_test_1"),
            ("STRIPE_API_BASE", "http://localhost:12111/"),
        ]))
        .unwrap();
        assert_eq!(config.stripe_api_base, "http://localhost:12111");
    }
}
