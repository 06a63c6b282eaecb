//! Configuration loading from environment.

use std::env;
use std::str::FromStr;

use marketplace_types::FeePolicy;
use marketplace_types::domain::{DEFAULT_FEE_PERCENT, DEFAULT_MINIMUM_FEE};
use payment_gateway::{DEFAULT_API_BASE, DEFAULT_WEBHOOK_TOLERANCE_SECS, StripeConfig};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 100;

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub stripe: StripeConfig,
    pub fees: FeePolicy,
    pub rate_limit_per_minute: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = parsed(&lookup, "PORT", DEFAULT_PORT)?;

        let database_url = required(&lookup, "DATABASE_URL")?;

        let stripe = StripeConfig::new(
            required(&lookup, "STRIPE_SECRET_KEY")?,
            required(&lookup, "STRIPE_WEBHOOK_SECRET")?,
        )
        .with_api_base(lookup("STRIPE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()))
        .with_webhook_tolerance(parsed(
            &lookup,
            "STRIPE_WEBHOOK_TOLERANCE_SECS",
            DEFAULT_WEBHOOK_TOLERANCE_SECS,
        )?);

        let fees = FeePolicy::new(
            parsed(&lookup, "MARKETPLACE_FEE_PERCENT", DEFAULT_FEE_PERCENT)?,
            parsed(&lookup, "MARKETPLACE_MINIMUM_FEE", DEFAULT_MINIMUM_FEE)?,
        )
        .map_err(|e| anyhow::anyhow!("Invalid marketplace fee settings: {}", e))?;

        let rate_limit_per_minute = parsed(
            &lookup,
            "RATE_LIMIT_PER_MINUTE",
            DEFAULT_RATE_LIMIT_PER_MINUTE,
        )?;

        Ok(Self {
            port,
            database_url,
            stripe,
            fees,
            rate_limit_per_minute,
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("{} environment variable is required", key))
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value {:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}
