//! # Marketplace Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository adapter and the Stripe gateway
//! - Create the marketplace service
//! - Start the HTTP server

mod config;

use opentelemetry::global;
use opentelemetry_sdk::{metrics::SdkMeterProvider, propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marketplace_hex::{MarketplaceService, inbound::HttpServer};
use marketplace_repo::build_repo;
use payment_gateway::StripeGateway;

fn init_tracer() -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("marketplace-service"), provider))
}

/// Installs the global meter provider read by the HTTP metrics layer and
/// the settlement counters.
fn init_meter() -> anyhow::Result<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .build()?;

    let provider = SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .build();

    global::set_meter_provider(provider.clone());
    Ok(provider)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize OpenTelemetry tracing and metrics
    let (otel_tracer, otel_provider) = init_tracer()?;
    let meter_provider = init_meter()?;
    let telemetry = tracing_opentelemetry::layer().with_tracer(otel_tracer);

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,marketplace_app=debug,marketplace_hex=debug,payment_gateway=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    // Load configuration
    let config = config::Config::from_env()?;

    tracing::info!("Starting marketplace server on port {}", config.port);
    tracing::info!(
        api_base = %config.stripe.api_base,
        rate_limit_per_minute = config.rate_limit_per_minute,
        "Payment provider configured"
    );

    // Build repository (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;

    let gateway = StripeGateway::new(config.stripe)?;

    // Create the marketplace service
    let service = MarketplaceService::new(repo, gateway, config.fees);

    // Create and run the HTTP server
    let server = HttpServer::with_rate_limit(service, config.rate_limit_per_minute);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    // Ensure traces and metrics are flushed before exit
    let _ = otel_provider.shutdown();
    let _ = meter_provider.shutdown();
    Ok(())
}
