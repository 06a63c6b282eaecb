//! Marketplace Application Service
//!
//! The transaction orchestrator. Drives the listing store, seller directory,
//! payment ledger and payment gateway through their ports; contains no
//! infrastructure logic.

use marketplace_types::{
    AppError, Category, CheckoutRequest, CheckoutSessionRequest, CheckoutSessionResponse,
    CreateCategoryRequest, CreateListingRequest, ErrorKind, ExternalSellerId, FeePolicy,
    LinkSellerRequest, Listing, ListingId, ListingsPage, ListingsQuery, MarketplaceRepository,
    NewCategory, OnboardingUrls, Payment, PaymentGateway, Principal, Refund, RepoError,
    SellerAccount, SellerLinkResponse, UserProfileRequest, WebhookStatus,
};

use crate::metrics::{
    RECONCILIATION_ANOMALIES, WEBHOOK_REDELIVERED, WEBHOOK_REJECTED, WEBHOOK_SETTLED, event_attr,
    reason_attr,
};

/// Result of applying a webhook to the ledger.
///
/// Providers deliver at least once, so a second delivery of the same event
/// is answered with the entry the first one wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome<T> {
    Recorded(T),
    AlreadyRecorded(T),
}

impl<T> SettlementOutcome<T> {
    pub fn status(&self) -> WebhookStatus {
        match self {
            SettlementOutcome::Recorded(_) => WebhookStatus::Recorded,
            SettlementOutcome::AlreadyRecorded(_) => WebhookStatus::AlreadyRecorded,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            SettlementOutcome::Recorded(t) | SettlementOutcome::AlreadyRecorded(t) => t,
        }
    }
}

/// Application service for marketplace operations.
///
/// Generic over the repository and the gateway so both can be replaced by
/// in-memory doubles in tests. Neither is retried internally: provider
/// failures surface as retriable errors and the caller decides.
pub struct MarketplaceService<R: MarketplaceRepository, G: PaymentGateway> {
    repo: R,
    gateway: G,
    fees: FeePolicy,
}

impl<R: MarketplaceRepository, G: PaymentGateway> MarketplaceService<R, G> {
    pub fn new(repo: R, gateway: G, fees: FeePolicy) -> Self {
        Self {
            repo,
            gateway,
            fees,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn fees(&self) -> &FeePolicy {
        &self.fees
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Users and categories
    // ─────────────────────────────────────────────────────────────────────────────

    /// Mirrors the caller's profile from the auth subsystem.
    #[tracing::instrument(skip(self, req), fields(user_id = %principal.id))]
    pub async fn sync_user(
        &self,
        principal: &Principal,
        req: UserProfileRequest,
    ) -> Result<SellerAccount, AppError> {
        req.validate()?;
        self.repo
            .upsert_user(principal.id, req.email.trim(), req.username.trim())
            .await
            .map_err(Into::into)
    }

    /// Creates a category. Admins only.
    #[tracing::instrument(skip(self), fields(user_id = %principal.id))]
    pub async fn create_category(
        &self,
        principal: &Principal,
        req: CreateCategoryRequest,
    ) -> Result<Category, AppError> {
        if !principal.is_admin() {
            return Err(AppError::Forbidden(
                "Only admins can create categories".into(),
            ));
        }

        let category = NewCategory::new(req.title, req.description)?;
        self.repo.create_category(category).await.map_err(Into::into)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, AppError> {
        self.repo.list_categories().await.map_err(Into::into)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Listings
    // ─────────────────────────────────────────────────────────────────────────────

    /// Creates an open listing owned by the caller.
    ///
    /// The price goes through the fee policy here, so a listing that could
    /// never be sold is refused up front.
    #[tracing::instrument(skip(self, req), fields(user_id = %principal.id, price = req.price_in_cents))]
    pub async fn create_listing(
        &self,
        principal: &Principal,
        req: CreateListingRequest,
    ) -> Result<Listing, AppError> {
        let listing = Listing::new(principal.id, req.into(), &self.fees)?;
        let listing = self.repo.create_listing(&listing).await?;

        tracing::info!(listing_id = %listing.id, "Listing created");
        Ok(listing)
    }

    pub async fn get_listing(&self, id: ListingId) -> Result<Listing, AppError> {
        self.repo
            .get_listing(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Listing {}", id))))
    }

    /// Lists open listings, newest first.
    pub async fn list_listings(&self, query: ListingsQuery) -> Result<ListingsPage, AppError> {
        let filter = query.into_filter()?;
        let items = self.repo.list_open_listings(&filter).await?;

        Ok(ListingsPage {
            items,
            page: filter.offset / filter.limit,
            limit: filter.limit,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Seller linking
    // ─────────────────────────────────────────────────────────────────────────────

    /// Opens provider onboarding for the caller.
    ///
    /// A linked seller always gets an update session and is never claimed
    /// again. A user with a reserved but unclaimed identity has that identity
    /// reopened and claimed. Otherwise a new external identity is registered,
    /// reserved for the caller, and then claimed.
    ///
    /// `pending_seller_id` is only a confirmation: it must match the caller's
    /// own reservation, never anyone else's.
    #[tracing::instrument(skip(self, req), fields(user_id = %principal.id))]
    pub async fn link_seller_account(
        &self,
        principal: &Principal,
        req: LinkSellerRequest,
    ) -> Result<SellerLinkResponse, AppError> {
        if req.refresh_url.trim().is_empty() || req.return_url.trim().is_empty() {
            return Err(AppError::BadRequest(
                "refresh_url and return_url are required".into(),
            ));
        }
        let urls = OnboardingUrls {
            refresh_url: req.refresh_url,
            return_url: req.return_url,
        };

        let account = self
            .repo
            .get_seller_account(principal.id)
            .await
            .map_err(|e| match e {
                RepoError::NotFound => {
                    AppError::NotFound(format!("No profile for user {}", principal.id))
                }
                e => e.into(),
            })?;

        if let Some(seller_id) = account.seller_id {
            let url = self.gateway.create_update_session(&seller_id, &urls).await?;
            tracing::info!(seller_id = %seller_id, "Reopened onboarding for linked seller");
            return Ok(SellerLinkResponse {
                url,
                seller_id: seller_id.to_string(),
            });
        }

        let requested = req.pending_seller_id.as_deref().map(str::trim);
        let (seller_id, url) = match (account.pending_seller_id, requested) {
            (Some(stored), Some(requested)) if stored.as_str() != requested => {
                tracing::warn!(
                    pending_seller_id = %stored,
                    requested,
                    "Refused to resume a seller id not reserved for this user"
                );
                return Err(AppError::BadRequest(
                    "pending_seller_id does not match the identity reserved for this user".into(),
                ));
            }
            (None, Some(requested)) => {
                tracing::warn!(requested, "Refused to resume an unreserved seller id");
                return Err(AppError::BadRequest(
                    "No pending seller identity to resume for this user".into(),
                ));
            }
            (Some(stored), _) => {
                let url = self.gateway.create_update_session(&stored, &urls).await?;
                (stored, url)
            }
            (None, None) => {
                let session = self
                    .gateway
                    .create_linking_session(&account.email, &urls)
                    .await?;
                self.reserve_seller_id(principal, &session.seller_id).await?;
                (session.seller_id, session.url)
            }
        };

        match self
            .repo
            .claim_seller_id(principal.id, &seller_id, self.gateway.provider())
            .await
        {
            Ok(_) => {
                tracing::info!(seller_id = %seller_id, "Seller id claimed");
                Ok(SellerLinkResponse {
                    url,
                    seller_id: seller_id.to_string(),
                })
            }
            Err(RepoError::AlreadyClaimed) => {
                tracing::error!(
                    seller_id = %seller_id,
                    "Seller id not claimed: user or id already bound; external identity orphaned"
                );
                RECONCILIATION_ANOMALIES.add(1, &[reason_attr("orphaned_seller_id")]);
                Err(AppError::AlreadyClaimed)
            }
            Err(e) => {
                tracing::error!(
                    seller_id = %seller_id,
                    error = %e,
                    "Seller id registered at provider but claim failed"
                );
                RECONCILIATION_ANOMALIES.add(1, &[reason_attr("orphaned_seller_id")]);
                Err(AppError::SellerClaimIncomplete {
                    seller_id: seller_id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Stores a freshly registered identity against the caller so that a
    /// failed claim can only be resumed by them.
    async fn reserve_seller_id(
        &self,
        principal: &Principal,
        seller_id: &ExternalSellerId,
    ) -> Result<(), AppError> {
        self.repo
            .reserve_seller_id(principal.id, seller_id, self.gateway.provider())
            .await
            .map_err(|e| {
                tracing::error!(
                    seller_id = %seller_id,
                    error = %e,
                    "Seller id registered at provider but could not be reserved; external identity orphaned"
                );
                RECONCILIATION_ANOMALIES.add(1, &[reason_attr("orphaned_seller_id")]);
                e.into()
            })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Checkout
    // ─────────────────────────────────────────────────────────────────────────────

    /// Requests a provider checkout for an open listing.
    ///
    /// Does not touch the listing status: an abandoned checkout must not lock
    /// the listing, and concurrent checkouts for one listing are allowed.
    #[tracing::instrument(skip(self, req), fields(buyer_id = %principal.id, listing_id = %listing_id))]
    pub async fn create_checkout_session(
        &self,
        principal: &Principal,
        listing_id: ListingId,
        req: CheckoutSessionRequest,
    ) -> Result<CheckoutSessionResponse, AppError> {
        if req.success_url.trim().is_empty() || req.cancel_url.trim().is_empty() {
            return Err(AppError::BadRequest(
                "success_url and cancel_url are required".into(),
            ));
        }

        let checkout = self
            .repo
            .get_open_listing_for_checkout(listing_id)
            .await
            .map_err(|e| match e {
                RepoError::NotFound => AppError::NotFound(format!("Listing {}", listing_id)),
                e => e.into(),
            })?;

        if checkout.listing.user_id == principal.id {
            return Err(AppError::BadRequest(
                "Cannot buy your own listing".into(),
            ));
        }

        let Some(seller_id) = checkout.seller.seller_id else {
            return Err(AppError::UserIsNotSeller);
        };

        let price = checkout.listing.price;
        let fee = self.fees.calculate(price)?;
        let seller_amount = price.checked_sub(fee)?;

        let request = CheckoutRequest {
            listing_id,
            buyer_id: principal.id,
            title: checkout.listing.title,
            seller_username: checkout.seller.username,
            seller_id: Some(seller_id),
            price,
            fee,
            success_url: req.success_url,
            cancel_url: req.cancel_url,
        };
        let session = self.gateway.create_checkout_session(&request).await?;

        tracing::info!(fee = fee.amount(), "Checkout session created");
        Ok(CheckoutSessionResponse {
            url: session.url,
            listing_id,
            amount: price.amount(),
            fee: fee.amount(),
            seller_amount: seller_amount.amount(),
            currency: price.currency(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Webhooks
    // ─────────────────────────────────────────────────────────────────────────────

    /// Records a completed payment and marks its listing sold, atomically.
    ///
    /// The signature is checked before anything in the payload is used.
    #[tracing::instrument(skip_all, fields(provider = %self.gateway.provider()))]
    pub async fn handle_payment_succeeded(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<SettlementOutcome<Payment>, AppError> {
        let event = self
            .gateway
            .verify_success_webhook(payload, signature)
            .map_err(|e| rejected("payment", e))?;
        let payment = Payment::record(event).map_err(|e| rejected("payment", e))?;

        match self.settle_payment(&payment).await {
            Ok(()) => {
                tracing::info!(
                    payment_id = %payment.id,
                    listing_id = %payment.listing_id,
                    external_payment_id = %payment.external_payment_id,
                    amount = payment.amount.amount(),
                    "Payment recorded, listing sold"
                );
                WEBHOOK_SETTLED.add(1, &[event_attr("payment")]);
                Ok(SettlementOutcome::Recorded(payment))
            }
            Err(RepoError::DuplicatePayment { .. }) => self.resolve_duplicate_payment(payment).await,
            Err(e) => Err(rejected("payment", e)),
        }
    }

    async fn settle_payment(&self, payment: &Payment) -> Result<(), RepoError> {
        let mut unit = self.repo.begin_settlement().await?;
        unit.insert_payment(payment).await?;
        unit.mark_sold(payment.listing_id).await?;
        unit.commit().await
    }

    /// The ledger refused a payment. Either the same event arrived again or
    /// a second buyer paid for a listing that is already sold.
    async fn resolve_duplicate_payment(
        &self,
        payment: Payment,
    ) -> Result<SettlementOutcome<Payment>, AppError> {
        let existing = match self.repo.find_payment_by_listing(payment.listing_id).await? {
            Some(existing) => Some(existing),
            None => {
                self.repo
                    .find_payment_by_external_id(payment.provider, &payment.external_payment_id)
                    .await?
            }
        };

        match existing {
            Some(existing)
                if existing.provider == payment.provider
                    && existing.external_payment_id == payment.external_payment_id
                    && existing.listing_id == payment.listing_id =>
            {
                tracing::info!(
                    payment_id = %existing.id,
                    external_payment_id = %existing.external_payment_id,
                    "Payment webhook redelivered, already recorded"
                );
                WEBHOOK_REDELIVERED.add(1, &[event_attr("payment")]);
                Ok(SettlementOutcome::AlreadyRecorded(existing))
            }
            Some(existing) => {
                tracing::error!(
                    listing_id = %payment.listing_id,
                    recorded_payment = %existing.external_payment_id,
                    recorded_buyer = %existing.buyer_id,
                    conflicting_payment = %payment.external_payment_id,
                    conflicting_buyer = %payment.buyer_id,
                    amount = payment.amount.amount(),
                    "Second payment for an already settled listing needs reconciliation"
                );
                RECONCILIATION_ANOMALIES.add(1, &[reason_attr("conflicting_payment")]);
                Err(AppError::DuplicatePayment {
                    listing_id: payment.listing_id,
                })
            }
            None => Err(AppError::Internal(format!(
                "Ledger reported a duplicate for listing {} but holds no payment",
                payment.listing_id
            ))),
        }
    }

    /// Records a full refund and marks its listing refunded, atomically.
    #[tracing::instrument(skip_all, fields(provider = %self.gateway.provider()))]
    pub async fn handle_refund(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<SettlementOutcome<Refund>, AppError> {
        let event = self
            .gateway
            .verify_refund_webhook(payload, signature)
            .map_err(|e| rejected("refund", e))?;

        let payment = self
            .repo
            .find_payment_by_external_id(event.provider, &event.external_payment_id)
            .await?
            .ok_or_else(|| {
                rejected(
                    "refund",
                    AppError::NotFound(format!("Payment {}", event.external_payment_id)),
                )
            })?;
        let refund = Refund::for_payment(&payment, event).map_err(|e| rejected("refund", e))?;

        match self.settle_refund(&refund).await {
            Ok(()) => {
                tracing::info!(
                    refund_id = %refund.id,
                    payment_id = %refund.payment_id,
                    listing_id = %refund.listing_id,
                    "Refund recorded, listing refunded"
                );
                WEBHOOK_SETTLED.add(1, &[event_attr("refund")]);
                Ok(SettlementOutcome::Recorded(refund))
            }
            Err(RepoError::DuplicateRefund { .. }) => self.resolve_duplicate_refund(refund).await,
            Err(e) => Err(rejected("refund", e)),
        }
    }

    async fn settle_refund(&self, refund: &Refund) -> Result<(), RepoError> {
        let mut unit = self.repo.begin_settlement().await?;
        unit.insert_refund(refund).await?;
        unit.mark_refunded(refund.listing_id).await?;
        unit.commit().await
    }

    /// The ledger already holds a refund for this payment. Only the same
    /// provider refund is a redelivery; anything else needs reconciliation.
    async fn resolve_duplicate_refund(
        &self,
        refund: Refund,
    ) -> Result<SettlementOutcome<Refund>, AppError> {
        let existing = self
            .repo
            .find_refund_by_payment(refund.payment_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Ledger reported a duplicate refund for payment {} but holds none",
                    refund.payment_id
                ))
            })?;

        if existing.external_refund_id == refund.external_refund_id {
            tracing::info!(
                refund_id = %existing.id,
                external_refund_id = %existing.external_refund_id,
                "Refund webhook redelivered, already recorded"
            );
            WEBHOOK_REDELIVERED.add(1, &[event_attr("refund")]);
            return Ok(SettlementOutcome::AlreadyRecorded(existing));
        }

        tracing::error!(
            payment_id = %refund.payment_id,
            listing_id = %refund.listing_id,
            recorded_refund = %existing.external_refund_id,
            conflicting_refund = %refund.external_refund_id,
            amount = refund.amount.amount(),
            "Second refund for an already refunded payment needs reconciliation"
        );
        RECONCILIATION_ANOMALIES.add(1, &[reason_attr("conflicting_refund")]);
        Err(AppError::Conflict(format!(
            "Payment {} already has refund {}",
            refund.payment_id, existing.external_refund_id
        )))
    }
}

/// Logs and counts a webhook that will not be applied.
fn rejected(event: &'static str, err: impl Into<AppError>) -> AppError {
    let err = err.into();
    let reason = match err.kind() {
        ErrorKind::TrustBoundary => "trust_boundary",
        ErrorKind::StateConflict => "state_conflict",
        ErrorKind::NotFound => "not_found",
        ErrorKind::Validation => "validation",
        _ => "internal",
    };

    tracing::warn!(event, reason, error = %err, "Webhook rejected");
    WEBHOOK_REJECTED.add(1, &[event_attr(event), reason_attr(reason)]);
    err
}
