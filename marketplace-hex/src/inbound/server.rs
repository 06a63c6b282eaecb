//! HTTP Server configuration and startup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use marketplace_types::{MarketplaceRepository, PaymentGateway};

use super::handlers::{self, AppState};
use super::rate_limit::{RateLimiterState, rate_limit_middleware};
use crate::MarketplaceService;
use crate::openapi::ApiDoc;

/// HTTP Server for the Marketplace API.
pub struct HttpServer<R: MarketplaceRepository, G: PaymentGateway> {
    state: Arc<AppState<R, G>>,
    rate_limiter: Arc<RateLimiterState>,
}

impl<R: MarketplaceRepository, G: PaymentGateway> HttpServer<R, G> {
    /// Creates a new HTTP server with the default limit of 100 requests per minute.
    pub fn new(service: MarketplaceService<R, G>) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            rate_limiter: Arc::new(RateLimiterState::default()),
        }
    }

    /// Creates a new HTTP server with custom rate limiting.
    pub fn with_rate_limit(service: MarketplaceService<R, G>, requests_per_minute: u32) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            rate_limiter: Arc::new(RateLimiterState::new(
                requests_per_minute,
                Duration::from_secs(60),
            )),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/v1/users/me", put(handlers::sync_user::<R, G>))
            .route(
                "/api/v1/categories",
                get(handlers::list_categories::<R, G>).post(handlers::create_category::<R, G>),
            )
            .route(
                "/api/v1/listings",
                get(handlers::list_listings::<R, G>).post(handlers::create_listing::<R, G>),
            )
            .route("/api/v1/listings/{id}", get(handlers::get_listing::<R, G>))
            .route(
                "/api/v1/payments/link-seller",
                post(handlers::link_seller::<R, G>),
            )
            .route(
                "/api/v1/payments/webhook/success",
                post(handlers::payment_succeeded_webhook::<R, G>),
            )
            .route(
                "/api/v1/payments/webhook/refund",
                post(handlers::refund_webhook::<R, G>),
            )
            .route(
                "/api/v1/payments/{listing_id}",
                post(handlers::create_checkout_session::<R, G>),
            )
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .layer(metrics)
            .layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
