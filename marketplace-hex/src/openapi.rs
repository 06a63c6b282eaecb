//! OpenAPI specification and documentation.

#![allow(dead_code)] // Path functions are only used by utoipa for documentation generation

use marketplace_types::domain::{
    Category, CategoryId, Currency, Listing, ListingId, ListingStatus, Money, Provider, UserId,
    UserRole,
};
use marketplace_types::dto::{
    CheckoutSessionRequest, CheckoutSessionResponse, CreateCategoryRequest, CreateListingRequest,
    LinkSellerRequest, ListingsPage, ListingsQuery, SellerAccountResponse, SellerLinkResponse,
    UserProfileRequest, WebhookAck, WebhookStatus,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

// Dummy functions to generate path documentation
// These are not the actual handlers, just for OpenAPI path generation

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = inline(serde_json::Value), example = json!({"status": "healthy"}))
    )
)]
async fn health() {}

/// Mirror the caller's profile from the auth subsystem
#[utoipa::path(
    put,
    path = "/api/v1/users/me",
    tag = "users",
    request_body = UserProfileRequest,
    security(("user_id" = [])),
    responses(
        (status = 200, description = "Profile stored", body = SellerAccountResponse),
        (status = 400, description = "Invalid email or username"),
        (status = 401, description = "Missing identity")
    )
)]
async fn sync_user() {}

/// List categories
#[utoipa::path(
    get,
    path = "/api/v1/categories",
    tag = "categories",
    responses(
        (status = 200, description = "All categories", body = Vec<Category>)
    )
)]
async fn list_categories() {}

/// Create a category (admin only)
#[utoipa::path(
    post,
    path = "/api/v1/categories",
    tag = "categories",
    request_body = CreateCategoryRequest,
    security(("user_id" = [])),
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 403, description = "Caller is not an admin"),
        (status = 409, description = "Category already exists")
    )
)]
async fn create_category() {}

/// List open listings
#[utoipa::path(
    get,
    path = "/api/v1/listings",
    tag = "listings",
    params(ListingsQuery),
    responses(
        (status = 200, description = "One page of open listings", body = ListingsPage),
        (status = 400, description = "Invalid pagination")
    )
)]
async fn list_listings() {}

/// Create a listing
#[utoipa::path(
    post,
    path = "/api/v1/listings",
    tag = "listings",
    request_body = CreateListingRequest,
    security(("user_id" = [])),
    responses(
        (status = 201, description = "Listing created", body = Listing),
        (status = 400, description = "Invalid title, description or price"),
        (status = 401, description = "Missing identity")
    )
)]
async fn create_listing() {}

/// Get listing by ID
#[utoipa::path(
    get,
    path = "/api/v1/listings/{id}",
    tag = "listings",
    params(
        ("id" = ListingId, Path, description = "Listing ID (UUID)")
    ),
    responses(
        (status = 200, description = "Listing details", body = Listing),
        (status = 404, description = "Listing not found")
    )
)]
async fn get_listing() {}

/// Start or resume seller onboarding
#[utoipa::path(
    post,
    path = "/api/v1/payments/link-seller",
    tag = "payments",
    request_body = LinkSellerRequest,
    security(("user_id" = [])),
    responses(
        (status = 200, description = "Onboarding link", body = SellerLinkResponse),
        (status = 400, description = "pending_seller_id is not the caller's reserved identity"),
        (status = 404, description = "Caller has no profile"),
        (status = 409, description = "Seller id already claimed"),
        (status = 502, description = "Provider rejected the request"),
        (status = 503, description = "Provider unavailable, or claim incomplete (retry resumes the reserved id)")
    )
)]
async fn link_seller() {}

/// Open a checkout session for a listing
#[utoipa::path(
    post,
    path = "/api/v1/payments/{listing_id}",
    tag = "payments",
    request_body = CheckoutSessionRequest,
    security(("user_id" = [])),
    params(
        ("listing_id" = ListingId, Path, description = "Listing ID (UUID)")
    ),
    responses(
        (status = 200, description = "Checkout URL and price split", body = CheckoutSessionResponse),
        (status = 404, description = "Listing not found"),
        (status = 409, description = "Listing is not open"),
        (status = 422, description = "Seller has not completed onboarding"),
        (status = 503, description = "Provider unavailable")
    )
)]
async fn create_checkout_session() {}

/// Provider callback: payment completed
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook/success",
    tag = "webhooks",
    request_body(content = String, description = "Raw provider event, verified by signature"),
    responses(
        (status = 200, description = "Recorded, or already recorded", body = WebhookAck),
        (status = 400, description = "Invalid signature or malformed event"),
        (status = 409, description = "Listing already settled by another payment")
    )
)]
async fn payment_succeeded_webhook() {}

/// Provider callback: payment refunded
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook/refund",
    tag = "webhooks",
    request_body(content = String, description = "Raw provider event, verified by signature"),
    responses(
        (status = 200, description = "Recorded, or already recorded", body = WebhookAck),
        (status = 400, description = "Invalid signature, malformed event or partial refund"),
        (status = 404, description = "Unknown payment"),
        (status = 409, description = "Listing is not sold")
    )
)]
async fn refund_webhook() {}

/// OpenAPI documentation for the Marketplace API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Marketplace Transaction API",
        version = "1.0.0",
        description = "Listings, seller onboarding, checkout and payment settlement for a two-sided marketplace.\n\n## Identity\n\nRequests are authenticated upstream. The caller is forwarded in the `X-User-Id` header (UUID) with an optional `X-User-Role` (`user` or `admin`). Webhook routes carry no identity; they are authenticated by the provider signature.",
        license(name = "MIT"),
    ),
    paths(
        health,
        sync_user,
        list_categories,
        create_category,
        list_listings,
        create_listing,
        get_listing,
        link_seller,
        create_checkout_session,
        payment_succeeded_webhook,
        refund_webhook,
    ),
    components(
        schemas(
            Category,
            CategoryId,
            CreateCategoryRequest,
            Listing,
            ListingId,
            ListingStatus,
            ListingsPage,
            CreateListingRequest,
            Money,
            Currency,
            UserId,
            UserRole,
            Provider,
            UserProfileRequest,
            SellerAccountResponse,
            LinkSellerRequest,
            SellerLinkResponse,
            CheckoutSessionRequest,
            CheckoutSessionResponse,
            WebhookAck,
            WebhookStatus,
        )
    ),

    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "users", description = "Local mirror of authenticated users"),
        (name = "categories", description = "Listing categories"),
        (name = "listings", description = "Listing lifecycle"),
        (name = "payments", description = "Seller onboarding and checkout"),
        (name = "webhooks", description = "Signed payment provider callbacks"),
    )
)]
pub struct ApiDoc;

/// Security scheme modifier for the forwarded user id header.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "user_id",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-User-Id"))),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();

        for path in [
            "/health",
            "/api/v1/users/me",
            "/api/v1/categories",
            "/api/v1/listings",
            "/api/v1/listings/{id}",
            "/api/v1/payments/link-seller",
            "/api/v1/payments/{listing_id}",
            "/api/v1/payments/webhook/success",
            "/api/v1/payments/webhook/refund",
        ] {
            assert!(paths.contains(&path), "missing {}", path);
        }
    }
}
