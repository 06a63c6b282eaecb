use std::time::Duration;

use marketplace_types::GatewayError;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Credentials and endpoints for one Stripe account.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_base: String,
    /// Maximum age of a webhook signature timestamp, in seconds
    pub webhook_tolerance_secs: i64,
    pub timeout: Duration,
}

impl StripeConfig {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_webhook_tolerance(mut self, secs: i64) -> Self {
        self.webhook_tolerance_secs = secs;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), GatewayError> {
        if self.secret_key.trim().is_empty() || self.webhook_secret.trim().is_empty() {
            return Err(GatewayError::Rejected(
                "secret key and webhook secret are required".into(),
            ));
        }
        if self.webhook_tolerance_secs <= 0 {
            return Err(GatewayError::Rejected(
                "webhook tolerance must be positive".into(),
            ));
        }
        Ok(())
    }
}
