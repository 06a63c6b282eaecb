//! Stripe REST client implementing the gateway port.

use serde::Deserialize;
use tracing::{debug, warn};

use marketplace_types::{
    CheckoutRequest, CheckoutSession, ExternalSellerId, GatewayError, LinkingSession,
    OnboardingUrls, PaymentEvent, PaymentGateway, Provider, RefundEvent,
};

use crate::config::StripeConfig;
use crate::events::{self, METADATA_BUYER_ID, METADATA_LISTING_ID};
use crate::signature::{self, SIGNATURE_HEADER};

type Form = Vec<(String, String)>;

#[derive(Debug, Deserialize)]
struct AccountResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AccountLinkResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Maps a non-success HTTP status to a gateway error.
///
/// Rate limits and server errors are transient; other client errors mean
/// the provider refused the request.
pub(crate) fn classify_status(status: u16, message: String) -> GatewayError {
    if status == 429 || status >= 500 {
        GatewayError::Unavailable(format!("HTTP {}: {}", status, message))
    } else {
        GatewayError::Rejected(message)
    }
}

fn account_link_form(seller_id: &str, urls: &OnboardingUrls) -> Form {
    vec![
        ("account".into(), seller_id.to_string()),
        ("refresh_url".into(), urls.refresh_url.clone()),
        ("return_url".into(), urls.return_url.clone()),
        ("type".into(), "account_onboarding".into()),
    ]
}

/// Form body for `POST /v1/checkout/sessions`.
pub(crate) fn checkout_form(request: &CheckoutRequest) -> Result<Form, GatewayError> {
    let seller_id = request
        .seller_id
        .as_ref()
        .ok_or_else(|| GatewayError::Rejected("seller has no linked payment account".into()))?;
    let currency = request.price.currency().provider_code();

    Ok(vec![
        ("mode".into(), "payment".into()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
        ("line_items[0][quantity]".into(), "1".into()),
        ("line_items[0][price_data][currency]".into(), currency.into()),
        (
            "line_items[0][price_data][unit_amount]".into(),
            request.price.amount().to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".into(),
            request.item_name(),
        ),
        (
            "payment_intent_data[application_fee_amount]".into(),
            request.fee.amount().to_string(),
        ),
        (
            "payment_intent_data[transfer_data][destination]".into(),
            seller_id.to_string(),
        ),
        (
            format!("payment_intent_data[metadata][{}]", METADATA_LISTING_ID),
            request.listing_id.to_string(),
        ),
        (
            format!("payment_intent_data[metadata][{}]", METADATA_BUYER_ID),
            request.buyer_id.to_string(),
        ),
    ])
}

/// Stripe Connect gateway. Cheap to clone; holds its own credentials.
#[derive(Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    config: StripeConfig,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("api_base", &self.config.api_base)
            .finish_non_exhaustive()
    }
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        Ok(Self { http, config })
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &Form,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), path);
        debug!(%url, "Calling Stripe");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .ok()
                .and_then(|env| env.error.message)
                .unwrap_or_else(|| status.to_string());
            warn!(%url, status = status.as_u16(), %message, "Stripe request failed");
            return Err(classify_status(status.as_u16(), message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("unreadable response: {}", e)))
    }

    async fn account_link(
        &self,
        seller_id: &str,
        urls: &OnboardingUrls,
    ) -> Result<String, GatewayError> {
        let link: AccountLinkResponse = self
            .post_form("/v1/account_links", &account_link_form(seller_id, urls))
            .await?;
        Ok(link.url)
    }

    fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), GatewayError> {
        let header = header
            .ok_or_else(|| GatewayError::InvalidSignature("missing signature header".into()))?;
        signature::verify(
            payload,
            header,
            &self.config.webhook_secret,
            self.config.webhook_tolerance_secs,
            chrono::Utc::now().timestamp(),
        )
    }
}

#[async_trait::async_trait]
impl PaymentGateway for StripeGateway {
    fn provider(&self) -> Provider {
        Provider::Stripe
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    async fn create_linking_session(
        &self,
        email: &str,
        urls: &OnboardingUrls,
    ) -> Result<LinkingSession, GatewayError> {
        let form: Form = vec![
            ("type".into(), "express".into()),
            ("email".into(), email.to_string()),
        ];
        let account: AccountResponse = self.post_form("/v1/accounts", &form).await?;
        let seller_id = ExternalSellerId::new(account.id)
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let url = self.account_link(seller_id.as_str(), urls).await?;
        Ok(LinkingSession { seller_id, url })
    }

    async fn create_update_session(
        &self,
        seller_id: &ExternalSellerId,
        urls: &OnboardingUrls,
    ) -> Result<String, GatewayError> {
        self.account_link(seller_id.as_str(), urls).await
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let form = checkout_form(request)?;
        let session: CheckoutSessionResponse =
            self.post_form("/v1/checkout/sessions", &form).await?;
        let url = session.url.ok_or_else(|| {
            GatewayError::Unavailable(format!("checkout session {} has no url", session.id))
        })?;
        Ok(CheckoutSession { url })
    }

    fn verify_success_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<PaymentEvent, GatewayError> {
        self.verify(payload, signature)?;
        events::decode_payment_event(payload)
    }

    fn verify_refund_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<RefundEvent, GatewayError> {
        self.verify(payload, signature)?;
        events::decode_refund_event(payload)
    }
}
