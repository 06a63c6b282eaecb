//! End-to-end tests through the HTTP router.
//!
//! Runs the real Stripe gateway against a local stand-in for the Stripe API
//! and an in-memory SQLite ledger, with webhooks signed the way Stripe signs
//! them.
//!
//! This test requires the `sqlite` feature flag.

#![cfg(feature = "sqlite")]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    Form, Json, Router,
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    routing::post,
};
use http_body_util::BodyExt;
use marketplace_hex::{
    MarketplaceService,
    inbound::{HttpServer, USER_ID_HEADER, USER_ROLE_HEADER},
};
use marketplace_repo::SqliteRepo;
use marketplace_types::{FeePolicy, UserId};
use payment_gateway::{SIGNATURE_HEADER, StripeConfig, StripeGateway, signature};
use serde_json::{Value, json};
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_test_secret";
const SELLER_ACCOUNT: &str = "acct_test_seller";

// ─────────────────────────────────────────────────────────────────────────────
// Stripe stand-in
// ─────────────────────────────────────────────────────────────────────────────

type Captured = Arc<Mutex<Vec<HashMap<String, String>>>>;

async fn create_account() -> Json<Value> {
    Json(json!({ "id": SELLER_ACCOUNT }))
}

async fn create_account_link(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    Json(json!({
        "url": format!("https://connect.stripe.test/setup/{}", form["account"])
    }))
}

async fn create_checkout(
    State(captured): State<Captured>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    captured.lock().unwrap().push(form);
    Json(json!({ "id": "cs_test_1", "url": "https://checkout.stripe.test/cs_test_1" }))
}

/// Serves the three Stripe endpoints the gateway calls; returns the base URL.
async fn spawn_stripe(captured: Captured) -> String {
    let app = Router::new()
        .route("/v1/accounts", post(create_account))
        .route("/v1/account_links", post(create_account_link))
        .route("/v1/checkout/sessions", post(create_checkout))
        .with_state(captured);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

struct Harness {
    app: Router,
    checkouts: Captured,
}

async fn harness(requests_per_minute: u32) -> Harness {
    harness_on("sqlite::memory:", requests_per_minute).await
}

async fn harness_on(database_url: &str, requests_per_minute: u32) -> Harness {
    let checkouts: Captured = Arc::default();
    let api_base = spawn_stripe(checkouts.clone()).await;

    let gateway = StripeGateway::new(
        StripeConfig::new("sk_test_123", WEBHOOK_SECRET).with_api_base(api_base),
    )
    .unwrap();
    let repo = SqliteRepo::new(database_url).await.unwrap();
    let service = MarketplaceService::new(repo, gateway, FeePolicy::default());

    Harness {
        app: HttpServer::with_rate_limit(service, requests_per_minute).router(),
        checkouts,
    }
}

fn request(method: Method, uri: &str, user: Option<(UserId, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = user {
        builder = builder
            .header(USER_ID_HEADER, id.to_string())
            .header(USER_ROLE_HEADER, role);
    }
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn webhook(uri: &str, payload: &[u8], signature: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Content-Type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(payload.to_vec()))
        .unwrap()
}

fn sign(payload: &[u8]) -> String {
    signature::header_value(payload, WEBHOOK_SECRET, chrono::Utc::now().timestamp())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn register(app: &Router, name: &str) -> UserId {
    let id = UserId::new();
    let (status, _) = send(
        app,
        request(
            Method::PUT,
            "/api/v1/users/me",
            Some((id, "user")),
            Some(json!({ "email": format!("{}@example.com", name), "username": name })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    id
}

struct Market {
    seller: UserId,
    category_id: Value,
    listing_id: String,
}

async fn list_item(app: &Router, seller: UserId, category_id: &Value) -> String {
    let (status, listing) = send(
        app,
        request(
            Method::POST,
            "/api/v1/listings",
            Some((seller, "user")),
            Some(json!({
                "category_id": category_id,
                "title": "Vintage film camera",
                "description": "Fully working, with strap",
                "price_in_cents": 10000
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(listing["status"], "open");
    listing["id"].as_str().unwrap().to_string()
}

/// A linked seller with one open listing priced 100.00 USD.
async fn open_market(app: &Router) -> Market {
    let seller = register(app, "sam").await;

    let (status, category) = send(
        app,
        request(
            Method::POST,
            "/api/v1/categories",
            Some((UserId::new(), "admin")),
            Some(json!({ "title": "Cameras" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let listing_id = list_item(app, seller, &category["id"]).await;

    let (status, link) = send(
        app,
        request(
            Method::POST,
            "/api/v1/payments/link-seller",
            Some((seller, "user")),
            Some(json!({
                "refresh_url": "https://market.test/refresh",
                "return_url": "https://market.test/done"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(link["seller_id"], SELLER_ACCOUNT);

    Market {
        seller,
        category_id: category["id"].clone(),
        listing_id,
    }
}

fn payment_event(listing_id: &str, buyer: UserId, payment_intent: &str) -> Vec<u8> {
    json!({
        "id": format!("evt_{}", payment_intent),
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": payment_intent,
            "amount": 10000,
            "currency": "usd",
            "application_fee_amount": 500,
            "metadata": { "listing_id": listing_id, "buyer_id": buyer.to_string() }
        }}
    })
    .to_string()
    .into_bytes()
}

fn refund_event(payment_intent: &str, amount_refunded: i64) -> Vec<u8> {
    json!({
        "id": "evt_refund",
        "type": "charge.refunded",
        "data": { "object": {
            "id": "ch_test_1",
            "amount": 10000,
            "amount_refunded": amount_refunded,
            "currency": "usd",
            "refunded": true,
            "payment_intent": payment_intent
        }}
    })
    .to_string()
    .into_bytes()
}

async fn listing_status(app: &Router, listing_id: &str) -> String {
    let (status, listing) = send(
        app,
        request(
            Method::GET,
            &format!("/api/v1/listings/{}", listing_id),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    listing["status"].as_str().unwrap().to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_checkout_routes_price_minus_fee_to_seller() {
    let h = harness(100).await;
    let market = open_market(&h.app).await;
    let buyer = register(&h.app, "bea").await;

    let (status, session) = send(
        &h.app,
        request(
            Method::POST,
            &format!("/api/v1/payments/{}", market.listing_id),
            Some((buyer, "user")),
            Some(json!({
                "success_url": "https://market.test/success",
                "cancel_url": "https://market.test/cancel"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["url"], "https://checkout.stripe.test/cs_test_1");
    assert_eq!(session["amount"], 10000);
    assert_eq!(session["fee"], 500);
    assert_eq!(session["seller_amount"], 9500);

    let forms = h.checkouts.lock().unwrap().clone();
    assert_eq!(forms.len(), 1);
    let form = &forms[0];
    assert_eq!(form["line_items[0][price_data][unit_amount]"], "10000");
    assert_eq!(form["payment_intent_data[application_fee_amount]"], "500");
    assert_eq!(
        form["payment_intent_data[transfer_data][destination]"],
        SELLER_ACCOUNT
    );
    assert_eq!(
        form["payment_intent_data[metadata][listing_id]"],
        market.listing_id
    );
    assert_eq!(
        form["payment_intent_data[metadata][buyer_id]"],
        buyer.to_string()
    );
    assert_eq!(
        form["line_items[0][price_data][product_data][name]"],
        "Buying Vintage film camera from @sam"
    );

    assert_eq!(listing_status(&h.app, &market.listing_id).await, "open");
}

#[tokio::test]
async fn test_seller_cannot_buy_own_listing() {
    let h = harness(100).await;
    let market = open_market(&h.app).await;

    let (status, _) = send(
        &h.app,
        request(
            Method::POST,
            &format!("/api/v1/payments/{}", market.listing_id),
            Some((market.seller, "user")),
            Some(json!({
                "success_url": "https://market.test/success",
                "cancel_url": "https://market.test/cancel"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.checkouts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_payment_webhook_redelivery_records_once() {
    let h = harness(100).await;
    let market = open_market(&h.app).await;
    let buyer = register(&h.app, "bea").await;
    let payload = payment_event(&market.listing_id, buyer, "pi_1");

    let (status, ack) = send(
        &h.app,
        webhook("/api/v1/payments/webhook/success", &payload, &sign(&payload)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "received": true, "status": "recorded" }));
    assert_eq!(listing_status(&h.app, &market.listing_id).await, "sold");

    let (status, ack) = send(
        &h.app,
        webhook("/api/v1/payments/webhook/success", &payload, &sign(&payload)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "already_recorded");
    assert_eq!(listing_status(&h.app, &market.listing_id).await, "sold");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_deliveries_settle_each_listing_once() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("market.db").display());
    let h = harness_on(&url, 100).await;
    let market = open_market(&h.app).await;
    let buyer_a = register(&h.app, "ada").await;
    let buyer_b = register(&h.app, "bob").await;

    let mut listings = vec![market.listing_id.clone()];
    for _ in 0..9 {
        listings.push(list_item(&h.app, market.seller, &market.category_id).await);
    }

    let mut races = Vec::new();
    for (i, listing_id) in listings.iter().enumerate() {
        // Even listings race a redelivery of one event, odd ones race two buyers.
        let payloads = if i % 2 == 0 {
            let event = payment_event(listing_id, buyer_a, &format!("pi_{}", i));
            [event.clone(), event]
        } else {
            [
                payment_event(listing_id, buyer_a, &format!("pi_a_{}", i)),
                payment_event(listing_id, buyer_b, &format!("pi_b_{}", i)),
            ]
        };
        let tasks = payloads.map(|payload| {
            let app = h.app.clone();
            tokio::spawn(async move {
                send(
                    &app,
                    webhook("/api/v1/payments/webhook/success", &payload, &sign(&payload)),
                )
                .await
            })
        });
        races.push((i, listing_id.clone(), tasks));
    }

    for (i, listing_id, tasks) in races {
        let mut outcomes = Vec::new();
        for task in tasks {
            let (status, body) = task.await.unwrap();
            outcomes.push(match status {
                StatusCode::OK => body["status"].as_str().unwrap().to_string(),
                StatusCode::CONFLICT => "conflict".to_string(),
                other => panic!("unexpected status {} for listing {}", other, listing_id),
            });
        }
        outcomes.sort();

        let loser = if i % 2 == 0 { "already_recorded" } else { "conflict" };
        let mut expected = vec!["recorded".to_string(), loser.to_string()];
        expected.sort();
        assert_eq!(outcomes, expected, "listing {}", listing_id);
        assert_eq!(listing_status(&h.app, &listing_id).await, "sold");
    }
}

#[tokio::test]
async fn test_webhook_with_bad_signature_is_rejected() {
    let h = harness(100).await;
    let market = open_market(&h.app).await;
    let payload = payment_event(&market.listing_id, UserId::new(), "pi_1");

    let forged =
        signature::header_value(&payload, "whsec_wrong", chrono::Utc::now().timestamp());
    let (status, body) = send(
        &h.app,
        webhook("/api/v1/payments/webhook/success", &payload, &forged),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let stale = signature::header_value(
        &payload,
        WEBHOOK_SECRET,
        chrono::Utc::now().timestamp() - 3600,
    );
    let (status, _) = send(
        &h.app,
        webhook("/api/v1/payments/webhook/success", &payload, &stale),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unsigned = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/payments/webhook/success")
        .body(Body::from(payload.clone()))
        .unwrap();
    let (status, _) = send(&h.app, unsigned).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(listing_status(&h.app, &market.listing_id).await, "open");
}

#[tokio::test]
async fn test_second_buyer_after_sale_is_a_conflict() {
    let h = harness(100).await;
    let market = open_market(&h.app).await;
    let buyer_a = register(&h.app, "ada").await;
    let buyer_b = register(&h.app, "bob").await;

    let first = payment_event(&market.listing_id, buyer_a, "pi_a");
    let (status, _) = send(
        &h.app,
        webhook("/api/v1/payments/webhook/success", &first, &sign(&first)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let second = payment_event(&market.listing_id, buyer_b, "pi_b");
    let (status, body) = send(
        &h.app,
        webhook("/api/v1/payments/webhook/success", &second, &sign(&second)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already recorded"));

    // Checkout is closed once the listing is sold.
    let (status, _) = send(
        &h.app,
        request(
            Method::POST,
            &format!("/api/v1/payments/{}", market.listing_id),
            Some((buyer_b, "user")),
            Some(json!({
                "success_url": "https://market.test/success",
                "cancel_url": "https://market.test/cancel"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_refund_webhook_after_sale() {
    let h = harness(100).await;
    let market = open_market(&h.app).await;
    let buyer = register(&h.app, "bea").await;

    let paid = payment_event(&market.listing_id, buyer, "pi_1");
    send(
        &h.app,
        webhook("/api/v1/payments/webhook/success", &paid, &sign(&paid)),
    )
    .await;

    let partial = refund_event("pi_1", 2500);
    let (status, _) = send(
        &h.app,
        webhook("/api/v1/payments/webhook/refund", &partial, &sign(&partial)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(listing_status(&h.app, &market.listing_id).await, "sold");

    let refund = refund_event("pi_1", 10000);
    for expected in ["recorded", "already_recorded"] {
        let (status, ack) = send(
            &h.app,
            webhook("/api/v1/payments/webhook/refund", &refund, &sign(&refund)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["status"], expected);
    }
    assert_eq!(listing_status(&h.app, &market.listing_id).await, "refunded");
}

#[tokio::test]
async fn test_refund_for_unknown_payment_is_not_found() {
    let h = harness(100).await;
    let refund = refund_event("pi_never_seen", 10000);

    let (status, _) = send(
        &h.app,
        webhook("/api/v1/payments/webhook/refund", &refund, &sign(&refund)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_link_refuses_pending_id_not_reserved_for_caller() {
    let h = harness(100).await;
    let mallory = register(&h.app, "mallory").await;

    let (status, body) = send(
        &h.app,
        request(
            Method::POST,
            "/api/v1/payments/link-seller",
            Some((mallory, "user")),
            Some(json!({
                "refresh_url": "https://market.test/refresh",
                "return_url": "https://market.test/done",
                "pending_seller_id": SELLER_ACCOUNT
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_identity_required_for_writes() {
    let h = harness(100).await;

    let (status, body) = send(
        &h.app,
        request(
            Method::POST,
            "/api/v1/listings",
            None,
            Some(json!({ "title": "Anything" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);

    let (status, _) = send(
        &h.app,
        request(
            Method::POST,
            "/api/v1/categories",
            Some((UserId::new(), "user")),
            Some(json!({ "title": "Cameras" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_listing_pagination_is_validated() {
    let h = harness(100).await;

    let (status, page) = send(
        &h.app,
        request(Method::GET, "/api/v1/listings?limit=5&page=0", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["limit"], 5);
    assert_eq!(page["items"], json!([]));

    let (status, _) = send(
        &h.app,
        request(Method::GET, "/api/v1/listings?limit=500", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rate_limit_per_caller() {
    let h = harness(3).await;
    let caller = UserId::new();

    for i in 1..=3 {
        let (status, _) = send(
            &h.app,
            request(Method::GET, "/api/v1/categories", Some((caller, "user")), None),
        )
        .await;
        assert_ne!(
            status,
            StatusCode::TOO_MANY_REQUESTS,
            "Request {} should not be rate limited",
            i
        );
    }

    let (status, body) = send(
        &h.app,
        request(Method::GET, "/api/v1/categories", Some((caller, "user")), None),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .contains("Rate limit exceeded")
    );

    // Another caller has its own bucket.
    let (status, _) = send(
        &h.app,
        request(
            Method::GET,
            "/api/v1/categories",
            Some((UserId::new(), "user")),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_and_webhooks_bypass_rate_limit() {
    let h = harness(1).await;

    for _ in 0..5 {
        let (status, _) = send(&h.app, request(Method::GET, "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let refund = refund_event("pi_missing", 10000);
    for _ in 0..5 {
        let (status, _) = send(
            &h.app,
            webhook("/api/v1/payments/webhook/refund", &refund, &sign(&refund)),
        )
        .await;
        assert_ne!(status, StatusCode::TOO_MANY_REQUESTS);
    }
}
