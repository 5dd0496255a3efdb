//! Transactional store abstraction.
//!
//! The store is the only shared mutable resource in the service. Every
//! cross-record invariant (job + quote, quota counter, ledger + order) is
//! enforced by wrapping the read-check-write sequence in a single [`StoreTx`]
//! rather than by external locking.
//!
//! Two implementations exist: [`postgres::PostgresStore`] for production and
//! [`memory::MemoryStore`] for tests and local development. Handlers only
//! ever see `Arc<dyn Store>`.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/payments/migrations/` and run via:
//! ```bash
//! cargo run -p toolbelt-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use toolbelt_core::{
    AccountId, CheckoutSessionRef, CustomerRef, EventId, JobId, OrderId, PaymentIntentRef,
    ProductId, QuoteId,
};

use crate::models::{Account, Job, Order, ProcessedEvent, Product, Quote};

/// Errors surfaced by either store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the store doesn't match expected invariants.
    #[error("Data corruption: {0}")]
    DataCorruption(String),

    /// A concurrent write won; the caller may re-run its transaction.
    #[error("Write conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Whether re-running the whole transaction could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Conflict(_))
    }
}

/// Handle to the transactional store.
///
/// Non-transactional reads exist for display paths; anything that mutates
/// state or feeds a financial computation goes through [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Open an atomic transaction.
    ///
    /// Dropping the returned handle without calling [`StoreTx::commit`]
    /// rolls everything back.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Cheap connectivity probe for readiness checks.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Fetch an account without locking it.
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Fetch a job without locking it.
    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Fetch a quote without locking it.
    async fn get_quote(&self, id: QuoteId) -> Result<Option<Quote>, StoreError>;

    /// Fetch an order with its line items.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Fetch a catalog product.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Insert or replace a catalog product (seeding, catalog sync).
    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError>;

    /// Insert a new account (seeding, registration flows upstream).
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;

    /// Insert a new job (seeding, posting flows upstream).
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError>;
}

/// An open atomic transaction.
///
/// `*_for_update` reads lock the row for the rest of the transaction, which
/// is what serializes concurrent quota increments and quote acceptances.
#[async_trait]
pub trait StoreTx: Send {
    // --- event ledger ---

    /// Look up a prior processing record for an event ID.
    async fn find_processed_event(
        &mut self,
        event_id: &EventId,
    ) -> Result<Option<ProcessedEvent>, StoreError>;

    /// Record that an event was processed.
    ///
    /// A duplicate event ID surfaces as [`StoreError::Conflict`].
    async fn insert_processed_event(&mut self, event: &ProcessedEvent) -> Result<(), StoreError>;

    // --- orders ---

    /// Find an order by its checkout-session reference.
    async fn find_order_by_checkout(
        &mut self,
        checkout: &CheckoutSessionRef,
    ) -> Result<Option<Order>, StoreError>;

    /// Find an order by its payment-intent reference.
    async fn find_order_by_payment_intent(
        &mut self,
        intent: &PaymentIntentRef,
    ) -> Result<Option<Order>, StoreError>;

    /// Insert a new order with its line items.
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    // --- products ---

    /// Read a product at transaction time (financial path, never cached).
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    // --- jobs and quotes ---

    /// Read a job, locking it for the rest of the transaction.
    async fn get_job_for_update(&mut self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Write back a mutated job.
    async fn update_job(&mut self, job: &Job) -> Result<(), StoreError>;

    /// Read a quote, locking it for the rest of the transaction.
    async fn get_quote_for_update(&mut self, id: QuoteId) -> Result<Option<Quote>, StoreError>;

    /// Insert a new quote.
    async fn insert_quote(&mut self, quote: &Quote) -> Result<(), StoreError>;

    /// Write back a mutated quote.
    async fn update_quote(&mut self, quote: &Quote) -> Result<(), StoreError>;

    // --- accounts ---

    /// Read an account, locking it for the rest of the transaction.
    async fn get_account_for_update(
        &mut self,
        id: AccountId,
    ) -> Result<Option<Account>, StoreError>;

    /// Find an account by its provider customer reference.
    async fn find_account_by_customer_ref(
        &mut self,
        customer: &CustomerRef,
    ) -> Result<Option<Account>, StoreError>;

    /// Write back a mutated account.
    async fn update_account(&mut self, account: &Account) -> Result<(), StoreError>;

    /// Commit the transaction.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    use secrecy::ExposeSecret;

    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
