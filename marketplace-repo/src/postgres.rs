//! PostgreSQL repository adapter.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool, Postgres};

use marketplace_types::{
    Category, CategoryId, CheckoutListing, ExternalSellerId, Listing, ListingFilter, ListingId,
    ListingStatus, ListingStore, NewCategory, Payment, PaymentId, PaymentLedger, Provider,
    Refund, RepoError, SellerAccount, SellerDirectory, Settlement, UserId,
};

use crate::types::{
    DbCategory, DbCheckoutListing, DbListing, DbPayment, DbRefund, DbSellerAccount, db_err,
    is_foreign_key_violation, is_unique_violation, parse_status, tx_err,
};

const LISTING_COLUMNS: &str = "l.id, l.user_id, l.category_id, l.title, l.description, \
     l.price_in_cents, l.currency, l.status, l.created_at, l.updated_at, l.deleted_at";

const PAYMENT_COLUMNS: &str = "id, listing_id, buyer_id, provider, external_payment_id, \
     amount_in_cents, fee_amount_in_cents, currency, created_at";

const SELLER_ACCOUNT_QUERY: &str = r#"SELECT u.id AS user_id, u.email, u.username,
       s.external_seller_id AS seller_id, s.provider,
       p.external_seller_id AS pending_seller_id
  FROM users u
  LEFT JOIN seller_accounts s ON s.user_id = u.id
  LEFT JOIN pending_seller_accounts p ON p.user_id = u.id
 WHERE u.id = $1"#;

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository with row-level locking.
pub struct PostgresRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        execute_migration(
            &pool,
            include_str!("../migrations/0001_create_tables_pg.sql"),
            "0001",
        )
        .await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listings
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ListingStore for PostgresRepo {
    async fn create_category(&self, category: NewCategory) -> Result<Category, RepoError> {
        let id = CategoryId::new();

        sqlx::query(r#"INSERT INTO categories (id, title, description) VALUES ($1, $2, $3)"#)
            .bind(id.into_uuid())
            .bind(&category.title)
            .bind(&category.description)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepoError::Conflict(format!("category '{}' already exists", category.title))
                } else {
                    db_err(e)
                }
            })?;

        Ok(Category {
            id,
            title: category.title,
            description: category.description,
        })
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepoError> {
        let rows: Vec<DbCategory> =
            sqlx::query_as(r#"SELECT id, title, description FROM categories ORDER BY title"#)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(rows.into_iter().map(DbCategory::into_domain).collect())
    }

    async fn create_listing(&self, listing: &Listing) -> Result<Listing, RepoError> {
        sqlx::query(
            r#"INSERT INTO listings (id, user_id, category_id, title, description, price_in_cents, currency, status, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(listing.id.into_uuid())
        .bind(listing.user_id.into_uuid())
        .bind(listing.category_id.into_uuid())
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(listing.price.amount())
        .bind(listing.price.currency().to_string())
        .bind(listing.status.as_str())
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                RepoError::NotFound
            } else {
                db_err(e)
            }
        })?;

        Ok(listing.clone())
    }

    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>, RepoError> {
        let sql = format!(
            "SELECT {} FROM listings l WHERE l.id = $1 AND l.deleted_at IS NULL",
            LISTING_COLUMNS
        );
        let row: Option<DbListing> = sqlx::query_as(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(DbListing::into_domain).transpose()
    }

    async fn list_open_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>, RepoError> {
        let sql = format!(
            r#"SELECT {} FROM listings l JOIN categories c ON c.id = l.category_id
                WHERE l.status = 'open' AND l.deleted_at IS NULL
                  AND ($1::text IS NULL OR c.title = $1)
                ORDER BY l.created_at DESC
                LIMIT $2 OFFSET $3"#,
            LISTING_COLUMNS
        );
        let rows: Vec<DbListing> = sqlx::query_as(&sql)
            .bind(&filter.category)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(DbListing::into_domain).collect()
    }

    async fn get_open_listing_for_checkout(
        &self,
        id: ListingId,
    ) -> Result<CheckoutListing, RepoError> {
        let sql = format!(
            r#"SELECT {}, u.username AS seller_username, s.external_seller_id AS seller_id
                 FROM listings l
                 JOIN users u ON u.id = l.user_id
                 LEFT JOIN seller_accounts s ON s.user_id = l.user_id
                WHERE l.id = $1 AND l.deleted_at IS NULL"#,
            LISTING_COLUMNS
        );
        let row: Option<DbCheckoutListing> = sqlx::query_as(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.ok_or(RepoError::NotFound)?.into_open_listing()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Seller accounts
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl SellerDirectory for PostgresRepo {
    async fn upsert_user(
        &self,
        user_id: UserId,
        email: &str,
        username: &str,
    ) -> Result<SellerAccount, RepoError> {
        sqlx::query(
            r#"INSERT INTO users (id, email, username, created_at) VALUES ($1, $2, $3, $4)
               ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email, username = EXCLUDED.username"#,
        )
        .bind(user_id.into_uuid())
        .bind(email)
        .bind(username)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepoError::Conflict("email or username already taken".into())
            } else {
                db_err(e)
            }
        })?;

        self.get_seller_account(user_id).await
    }

    async fn get_seller_account(&self, user_id: UserId) -> Result<SellerAccount, RepoError> {
        let row: Option<DbSellerAccount> = sqlx::query_as(SELLER_ACCOUNT_QUERY)
            .bind(user_id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.ok_or(RepoError::NotFound)?.into_domain()
    }

    async fn reserve_seller_id(
        &self,
        user_id: UserId,
        seller_id: &ExternalSellerId,
        provider: Provider,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"INSERT INTO pending_seller_accounts (user_id, external_seller_id, provider, created_at)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(user_id.into_uuid())
        .bind(seller_id.as_str())
        .bind(provider.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(RepoError::AlreadyClaimed),
            Err(e) if is_foreign_key_violation(&e) => Err(RepoError::NotFound),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn claim_seller_id(
        &self,
        user_id: UserId,
        seller_id: &ExternalSellerId,
        provider: Provider,
    ) -> Result<SellerAccount, RepoError> {
        let mut tx = self.pool.begin().await.map_err(tx_err)?;

        let result = sqlx::query(
            r#"INSERT INTO seller_accounts (user_id, external_seller_id, provider, created_at)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(user_id.into_uuid())
        .bind(seller_id.as_str())
        .bind(provider.as_str())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Err(RepoError::AlreadyClaimed),
            Err(e) if is_foreign_key_violation(&e) => return Err(RepoError::NotFound),
            Err(e) => return Err(db_err(e)),
        }

        sqlx::query(r#"DELETE FROM pending_seller_accounts WHERE user_id = $1"#)
            .bind(user_id.into_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(tx_err)?;

        self.get_seller_account(user_id).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ledger
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PaymentLedger for PostgresRepo {
    async fn find_payment_by_listing(
        &self,
        listing_id: ListingId,
    ) -> Result<Option<Payment>, RepoError> {
        let sql = format!("SELECT {} FROM payments WHERE listing_id = $1", PAYMENT_COLUMNS);
        let row: Option<DbPayment> = sqlx::query_as(&sql)
            .bind(listing_id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn find_payment_by_external_id(
        &self,
        provider: Provider,
        external_payment_id: &str,
    ) -> Result<Option<Payment>, RepoError> {
        let sql = format!(
            "SELECT {} FROM payments WHERE provider = $1 AND external_payment_id = $2",
            PAYMENT_COLUMNS
        );
        let row: Option<DbPayment> = sqlx::query_as(&sql)
            .bind(provider.as_str())
            .bind(external_payment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn find_refund_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<Refund>, RepoError> {
        let row: Option<DbRefund> = sqlx::query_as(
            r#"SELECT id, payment_id, listing_id, external_refund_id, amount_in_cents, currency, created_at
               FROM refunds WHERE payment_id = $1"#,
        )
        .bind(payment_id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbRefund::into_domain).transpose()
    }

    async fn begin_settlement(&self) -> Result<Box<dyn Settlement>, RepoError> {
        let tx = self.pool.begin().await.map_err(tx_err)?;
        Ok(Box::new(PgSettlement { tx: Some(tx) }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Settlement (single transaction, listing row locked)
// ─────────────────────────────────────────────────────────────────────────────

pub struct PgSettlement {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PgSettlement {
    fn conn(&mut self) -> Result<&mut PgConnection, RepoError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| RepoError::Transaction("settlement already committed".into()))
    }

    async fn transition(
        &mut self,
        listing_id: ListingId,
        next: ListingStatus,
    ) -> Result<(), RepoError> {
        let conn = self.conn()?;

        // Lock the listing row for the rest of the transaction
        let current: Option<String> = sqlx::query_scalar(
            r#"SELECT status FROM listings WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"#,
        )
        .bind(listing_id.into_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

        let current = parse_status(&current.ok_or(RepoError::NotFound)?)?;
        let next = current.transition_to(next)?;

        sqlx::query(r#"UPDATE listings SET status = $1, updated_at = $2 WHERE id = $3"#)
            .bind(next.as_str())
            .bind(Utc::now())
            .bind(listing_id.into_uuid())
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;

        tracing::debug!(%listing_id, from = %current, to = %next, "Listing status changed");
        Ok(())
    }
}

#[async_trait]
impl Settlement for PgSettlement {
    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), RepoError> {
        let conn = self.conn()?;

        let result = sqlx::query(
            r#"INSERT INTO payments (id, listing_id, buyer_id, provider, external_payment_id, amount_in_cents, fee_amount_in_cents, currency, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(payment.id.into_uuid())
        .bind(payment.listing_id.into_uuid())
        .bind(payment.buyer_id.into_uuid())
        .bind(payment.provider.as_str())
        .bind(&payment.external_payment_id)
        .bind(payment.amount.amount())
        .bind(payment.fee.amount())
        .bind(payment.amount.currency().to_string())
        .bind(payment.created_at)
        .execute(&mut *conn)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(RepoError::DuplicatePayment {
                listing_id: payment.listing_id,
            }),
            Err(e) if is_foreign_key_violation(&e) => Err(RepoError::NotFound),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn insert_refund(&mut self, refund: &Refund) -> Result<(), RepoError> {
        let conn = self.conn()?;

        let result = sqlx::query(
            r#"INSERT INTO refunds (id, payment_id, listing_id, external_refund_id, amount_in_cents, currency, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(refund.id.into_uuid())
        .bind(refund.payment_id.into_uuid())
        .bind(refund.listing_id.into_uuid())
        .bind(&refund.external_refund_id)
        .bind(refund.amount.amount())
        .bind(refund.amount.currency().to_string())
        .bind(refund.created_at)
        .execute(&mut *conn)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(RepoError::DuplicateRefund {
                payment_id: refund.payment_id,
            }),
            Err(e) if is_foreign_key_violation(&e) => Err(RepoError::NotFound),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn mark_sold(&mut self, listing_id: ListingId) -> Result<(), RepoError> {
        self.transition(listing_id, ListingStatus::Sold).await
    }

    async fn mark_refunded(&mut self, listing_id: ListingId) -> Result<(), RepoError> {
        self.transition(listing_id, ListingStatus::Refunded).await
    }

    async fn commit(&mut self) -> Result<(), RepoError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| RepoError::Transaction("settlement already committed".into()))?;
        tx.commit().await.map_err(tx_err)
    }
}
