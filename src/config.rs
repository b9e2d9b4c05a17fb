//! Environment-driven configuration.

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use crate::domain::aggregates::PricingPolicy;
use crate::domain::value_objects::Money;
use crate::{MarketplaceError, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// PostgreSQL is used when set; otherwise records live in memory.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    /// Storefront origin used for checkout success/cancel and onboarding return URLs.
    pub app_base_url: String,
    pub currency: String,
    pub pricing: PricingPolicy,
    pub gateway_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8083,
            database_url: None,
            database_max_connections: 10,
            nats_url: None,
            app_base_url: "http://localhost:5173".to_string(),
            currency: "usd".to_string(),
            pricing: PricingPolicy::default(),
            gateway_timeout: Duration::from_secs(10),
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let pricing = PricingPolicy {
            shipping_fee: parse_or(&get("SHIPPING_FEE"), "SHIPPING_FEE", defaults.pricing.shipping_fee.amount()).map(Money::new)?,
            free_shipping_threshold: parse_or(&get("FREE_SHIPPING_THRESHOLD"), "FREE_SHIPPING_THRESHOLD", defaults.pricing.free_shipping_threshold.amount()).map(Money::new)?,
            tax_rate: parse_or::<Decimal>(&get("TAX_RATE"), "TAX_RATE", defaults.pricing.tax_rate)?,
        };
        if pricing.shipping_fee.is_negative() || pricing.tax_rate < Decimal::ZERO {
            return Err(MarketplaceError::Validation("SHIPPING_FEE and TAX_RATE must not be negative".into()));
        }

        let config = Self {
            port: parse_or(&get("PORT"), "PORT", defaults.port)?,
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_or(&get("DATABASE_MAX_CONNECTIONS"), "DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?,
            nats_url: get("NATS_URL"),
            app_base_url: get("APP_BASE_URL").unwrap_or(defaults.app_base_url).trim_end_matches('/').to_string(),
            currency: get("CURRENCY").unwrap_or(defaults.currency).to_lowercase(),
            pricing,
            gateway_timeout: Duration::from_millis(parse_or(&get("GATEWAY_TIMEOUT_MS"), "GATEWAY_TIMEOUT_MS", defaults.gateway_timeout.as_millis() as u64)?),
        };
        tracing::info!(port = config.port, persistent = config.database_url.is_some(), events = config.nats_url.is_some(), "configuration loaded");
        Ok(config)
    }
}

fn parse_or<T: FromStr>(raw: &Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v.parse::<T>().map_err(|e| MarketplaceError::Validation(format!("invalid {key} '{v}': {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(c.port, 8083);
        assert_eq!(c.pricing, PricingPolicy::default());
        assert!(c.database_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let c = AppConfig::from_lookup(lookup(&[("PORT", "9000"), ("TAX_RATE", "0.1"), ("CURRENCY", "EUR"), ("APP_BASE_URL", "https://shop.example/")])).unwrap();
        assert_eq!(c.port, 9000);
        assert_eq!(c.pricing.tax_rate, Decimal::new(1, 1));
        assert_eq!(c.currency, "eur");
        assert_eq!(c.app_base_url, "https://shop.example");
    }

    #[test]
    fn test_invalid_values() {
        assert!(AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("TAX_RATE", "-0.5")])).is_err());
    }
}
