//! Marketplace CLI
//!
//! Developer tooling for the Marketplace API: fee previews and signed
//! webhook replay against a running server.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use marketplace_types::{Currency, FeePolicy, Money};
use marketplace_types::domain::{DEFAULT_FEE_PERCENT, DEFAULT_MINIMUM_FEE};
use payment_gateway::{SIGNATURE_HEADER, signature};

#[derive(Parser)]
#[command(name = "marketplace")]
#[command(author, version, about = "Marketplace API developer CLI", long_about = None)]
struct Cli {
    /// Base URL of the Marketplace API
    #[arg(
        long,
        env = "MARKETPLACE_API_URL",
        default_value = "http://localhost:3000"
    )]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview the marketplace fee and seller payout for a price
    Fee {
        /// Price in minor units (cents)
        #[arg(long)]
        price: i64,
        /// Percentage kept by the marketplace
        #[arg(long, env = "MARKETPLACE_FEE_PERCENT", default_value_t = DEFAULT_FEE_PERCENT)]
        percent: i64,
        /// Flat fee added on top, in minor units
        #[arg(long, env = "MARKETPLACE_MINIMUM_FEE", default_value_t = DEFAULT_MINIMUM_FEE)]
        minimum: i64,
        #[arg(long, default_value = "USD")]
        currency: String,
    },
    /// Print a Stripe-Signature header value for a payload file
    SignWebhook {
        #[arg(long, env = "STRIPE_WEBHOOK_SECRET")]
        secret: String,
        /// JSON payload to sign
        #[arg(long)]
        file: PathBuf,
        /// Unix timestamp to sign with (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,
    },
    /// Sign a payload file and POST it to a webhook endpoint
    SendWebhook {
        #[arg(long, env = "STRIPE_WEBHOOK_SECRET")]
        secret: String,
        #[arg(long)]
        file: PathBuf,
        /// Full endpoint URL; overrides --kind
        #[arg(long)]
        url: Option<String>,
        /// Which marketplace webhook route to target
        #[arg(long, value_enum, default_value_t = WebhookKind::Success)]
        kind: WebhookKind,
    },
    /// Check API health
    Health,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum WebhookKind {
    Success,
    Refund,
}

impl WebhookKind {
    fn path(self) -> &'static str {
        match self {
            WebhookKind::Success => "/api/v1/payments/webhook/success",
            WebhookKind::Refund => "/api/v1/payments/webhook/refund",
        }
    }
}

/// Fee preview for one price.
#[derive(Debug, PartialEq, Eq)]
struct FeeBreakdown {
    price: Money,
    fee: Money,
    seller_amount: Money,
}

fn fee_breakdown(
    price: i64,
    percent: i64,
    minimum: i64,
    currency: Currency,
) -> Result<FeeBreakdown> {
    let policy = FeePolicy::new(percent, minimum)?;
    let price = Money::new(price, currency)?;
    let fee = policy.calculate(price)?;
    let seller_amount = price.checked_sub(fee)?;
    Ok(FeeBreakdown {
        price,
        fee,
        seller_amount,
    })
}

fn webhook_url(api_url: &str, url: Option<String>, kind: WebhookKind) -> String {
    url.unwrap_or_else(|| format!("{}{}", api_url.trim_end_matches('/'), kind.path()))
}

fn read_payload(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fee {
            price,
            percent,
            minimum,
            currency,
        } => {
            let currency: Currency = currency.parse()?;
            let breakdown = fee_breakdown(price, percent, minimum, currency)?;
            println!("Price:         {}", breakdown.price);
            println!("Fee:           {} ({}% + {})", breakdown.fee, percent, minimum);
            println!("Seller payout: {}", breakdown.seller_amount);
        }

        Commands::SignWebhook {
            secret,
            file,
            timestamp,
        } => {
            let payload = read_payload(&file)?;
            let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp());
            println!("{}", signature::header_value(&payload, &secret, timestamp));
        }

        Commands::SendWebhook {
            secret,
            file,
            url,
            kind,
        } => {
            let payload = read_payload(&file)?;
            let header = signature::header_value(&payload, &secret, chrono::Utc::now().timestamp());
            let url = webhook_url(&cli.api_url, url, kind);

            let resp = reqwest::Client::new()
                .post(&url)
                .header(SIGNATURE_HEADER, header)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(payload)
                .send()
                .await
                .with_context(|| format!("Failed to POST {}", url))?;

            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            println!("{} {}", status.as_u16(), url);
            match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                Err(_) => println!("{}", body),
            }
            if !status.is_success() {
                std::process::exit(1);
            }
        }

        Commands::Health => {
            let url = format!("{}/health", cli.api_url.trim_end_matches('/'));
            let healthy = reqwest::get(&url)
                .await
                .map(|r| r.status().is_success())
                .unwrap_or(false);
            if healthy {
                println!("✓ API is healthy");
            } else {
                println!("✗ API is not healthy");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
