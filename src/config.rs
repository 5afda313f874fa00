use std::{env, str::FromStr, time::Duration};

use anyhow::Context;
use rust_decimal::Decimal;

use crate::services::pricing::ShippingPolicy;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Unset means every store runs in memory, seeded with the demo catalog.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub reservation_ttl: Duration,
    pub guest_cart_ttl: Duration,
    pub sweep_interval: Duration,
    pub max_qty_per_line: u32,
    pub shipping: ShippingPolicy,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("APP_PORT", 3000);
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;

        let shipping = ShippingPolicy {
            flat_rate: parse_or("SHIPPING_FLAT_RATE", Decimal::ZERO),
            free_over: env::var("FREE_SHIPPING_OVER")
                .ok()
                .and_then(|v| v.parse::<Decimal>().ok()),
        };

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            reservation_ttl: Duration::from_secs(parse_or("RESERVATION_TTL_SECS", 300)),
            guest_cart_ttl: Duration::from_secs(parse_or("GUEST_CART_TTL_SECS", 14 * 24 * 3600)),
            sweep_interval: Duration::from_secs(parse_or("SWEEP_INTERVAL_SECS", 30)),
            max_qty_per_line: parse_or("MAX_QTY_PER_LINE", 99),
            shipping,
        })
    }

    /// Settings for tests and local tooling: in-memory stores, no shipping fee.
    pub fn for_tests(jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: None,
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: jwt_secret.into(),
            reservation_ttl: Duration::from_secs(300),
            guest_cart_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(30),
            max_qty_per_line: 99,
            shipping: ShippingPolicy::default(),
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
