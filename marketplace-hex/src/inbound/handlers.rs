//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use marketplace_types::{
    AppError, CheckoutSessionRequest, CreateCategoryRequest, CreateListingRequest, ErrorKind,
    LinkSellerRequest, ListingId, ListingsQuery, MarketplaceRepository, PaymentGateway,
    SellerAccountResponse, UserProfileRequest, WebhookAck,
};

use super::identity::Identity;
use crate::MarketplaceService;

/// Application state shared across handlers.
pub struct AppState<R: MarketplaceRepository, G: PaymentGateway> {
    pub service: MarketplaceService<R, G>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::UserIsNotSeller => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ProviderRejected(_) => StatusCode::BAD_GATEWAY,
            AppError::ProviderUnavailable(_) | AppError::SellerClaimIncomplete { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            err => match err.kind() {
                ErrorKind::Validation | ErrorKind::TrustBoundary => StatusCode::BAD_REQUEST,
                ErrorKind::StateConflict => StatusCode::CONFLICT,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::ExternalProvider => StatusCode::BAD_GATEWAY,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self.0 {
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                "Internal server error".to_string()
            }
            err => err.to_string(),
        };

        let mut body = serde_json::json!({
            "error": message,
            "code": status.as_u16(),
        });
        if self.0.is_retriable() {
            body["retriable"] = serde_json::Value::Bool(true);
        }
        if let AppError::SellerClaimIncomplete { seller_id, .. } = &self.0 {
            body["pending_seller_id"] = serde_json::Value::String(seller_id.clone());
        }

        (status, Json(body)).into_response()
    }
}

fn parse_listing_id(id: &str) -> Result<ListingId, ApiError> {
    id.parse()
        .map_err(|_| AppError::BadRequest("Invalid listing ID".into()).into())
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// Mirror the caller's profile.
#[tracing::instrument(skip(state, req), fields(user_id = %principal.id))]
pub async fn sync_user<R: MarketplaceRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Identity(principal): Identity,
    Json(req): Json<UserProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state.service.sync_user(&principal, req).await?;
    Ok(Json(SellerAccountResponse::from(account)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Categories
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state))]
pub async fn list_categories<R: MarketplaceRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
) -> Result<impl IntoResponse, ApiError> {
    let categories = state.service.list_categories().await?;
    Ok(Json(categories))
}

#[tracing::instrument(skip(state), fields(user_id = %principal.id))]
pub async fn create_category<R: MarketplaceRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Identity(principal): Identity,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state.service.create_category(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Listings
// ─────────────────────────────────────────────────────────────────────────────

/// List open listings.
#[tracing::instrument(skip(state))]
pub async fn list_listings<R: MarketplaceRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Query(query): Query<ListingsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.service.list_listings(query).await?;
    Ok(Json(page))
}

#[tracing::instrument(skip(state, req), fields(user_id = %principal.id))]
pub async fn create_listing<R: MarketplaceRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Identity(principal): Identity,
    Json(req): Json<CreateListingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state.service.create_listing(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

/// Get listing by ID.
#[tracing::instrument(skip(state), fields(listing_id = %id))]
pub async fn get_listing<R: MarketplaceRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state.service.get_listing(parse_listing_id(&id)?).await?;
    Ok(Json(listing))
}

// ─────────────────────────────────────────────────────────────────────────────
// Payments
// ─────────────────────────────────────────────────────────────────────────────

/// Start or resume provider onboarding for the caller.
#[tracing::instrument(skip(state, req), fields(user_id = %principal.id))]
pub async fn link_seller<R: MarketplaceRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Identity(principal): Identity,
    Json(req): Json<LinkSellerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let link = state.service.link_seller_account(&principal, req).await?;
    Ok(Json(link))
}

/// Open a provider checkout for a listing.
#[tracing::instrument(skip(state, req), fields(buyer_id = %principal.id, listing_id = %id))]
pub async fn create_checkout_session<R: MarketplaceRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Identity(principal): Identity,
    Path(id): Path<String>,
    Json(req): Json<CheckoutSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let listing_id = parse_listing_id(&id)?;
    let session = state
        .service
        .create_checkout_session(&principal, listing_id, req)
        .await?;
    Ok(Json(session))
}

fn signature<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Payment provider callback for completed payments.
///
/// Takes the body as raw bytes: the signature covers them exactly.
#[tracing::instrument(skip_all, fields(bytes = body.len()))]
pub async fn payment_succeeded_webhook<R: MarketplaceRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let header = state.service.gateway().signature_header();
    let outcome = state
        .service
        .handle_payment_succeeded(&body, signature(&headers, header))
        .await?;

    Ok(Json(WebhookAck {
        received: true,
        status: outcome.status(),
    }))
}

/// Payment provider callback for refunds.
#[tracing::instrument(skip_all, fields(bytes = body.len()))]
pub async fn refund_webhook<R: MarketplaceRepository, G: PaymentGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let header = state.service.gateway().signature_header();
    let outcome = state
        .service
        .handle_refund(&body, signature(&headers, header))
        .await?;

    Ok(Json(WebhookAck {
        received: true,
        status: outcome.status(),
    }))
}
