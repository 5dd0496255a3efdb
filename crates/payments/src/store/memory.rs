//! In-memory store for tests and local development.
//!
//! The whole state sits behind one `tokio::sync::Mutex`, so transactions are
//! fully serialized: [`MemoryStore::begin`] holds the lock until the
//! transaction commits or drops. That is coarser than row locks but gives the
//! same observable guarantee the production store relies on, which is what
//! the concurrency tests exercise.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use toolbelt_core::{
    AccountId, CheckoutSessionRef, CustomerRef, EventId, JobId, OrderId, PaymentIntentRef,
    ProductId, QuoteId,
};

use crate::models::{Account, Job, Order, ProcessedEvent, Product, Quote};

use super::{Store, StoreError, StoreTx};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    jobs: HashMap<JobId, Job>,
    quotes: HashMap<QuoteId, Quote>,
    orders: HashMap<OrderId, Order>,
    products: HashMap<ProductId, Product>,
    processed_events: HashMap<EventId, ProcessedEvent>,
}

/// Store implementation backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            snapshot,
            committed: false,
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.state.lock().await.accounts.get(&id).cloned())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn get_quote(&self, id: QuoteId) -> Result<Option<Quote>, StoreError> {
        Ok(self.state.lock().await.quotes.get(&id).cloned())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        self.state
            .lock()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&account.id) {
            return Err(StoreError::Conflict(format!(
                "account {} already exists",
                account.id
            )));
        }
        if state
            .accounts
            .values()
            .any(|existing| existing.email == account.email)
        {
            return Err(StoreError::Conflict(format!(
                "email {} already registered",
                account.email
            )));
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("job {} already exists", job.id)));
        }
        state.jobs.insert(job.id, job.clone());
        Ok(())
    }
}

/// Transaction over [`MemoryStore`].
///
/// Mutates the live state in place while holding the state lock; the
/// pre-transaction snapshot is restored on drop unless `commit` ran.
struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: MemoryState,
    committed: bool,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.committed {
            *self.guard = std::mem::take(&mut self.snapshot);
        }
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_processed_event(
        &mut self,
        event_id: &EventId,
    ) -> Result<Option<ProcessedEvent>, StoreError> {
        Ok(self.guard.processed_events.get(event_id).cloned())
    }

    async fn insert_processed_event(&mut self, event: &ProcessedEvent) -> Result<(), StoreError> {
        if self.guard.processed_events.contains_key(&event.event_id) {
            return Err(StoreError::Conflict(format!(
                "event {} already recorded",
                event.event_id
            )));
        }
        self.guard
            .processed_events
            .insert(event.event_id.clone(), event.clone());
        Ok(())
    }

    async fn find_order_by_checkout(
        &mut self,
        checkout: &CheckoutSessionRef,
    ) -> Result<Option<Order>, StoreError> {
        Ok(self
            .guard
            .orders
            .values()
            .find(|order| order.checkout_ref == *checkout)
            .cloned())
    }

    async fn find_order_by_payment_intent(
        &mut self,
        intent: &PaymentIntentRef,
    ) -> Result<Option<Order>, StoreError> {
        Ok(self
            .guard
            .orders
            .values()
            .find(|order| order.payment_intent_ref.as_ref() == Some(intent))
            .cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self
            .guard
            .orders
            .values()
            .any(|existing| existing.checkout_ref == order.checkout_ref)
        {
            return Err(StoreError::Conflict(format!(
                "order for checkout {} already exists",
                order.checkout_ref
            )));
        }
        if let Some(intent) = &order.payment_intent_ref {
            if self
                .guard
                .orders
                .values()
                .any(|existing| existing.payment_intent_ref.as_ref() == Some(intent))
            {
                return Err(StoreError::Conflict(format!(
                    "order for payment intent {intent} already exists"
                )));
            }
        }
        self.guard.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.guard.products.get(&id).cloned())
    }

    async fn get_job_for_update(&mut self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.guard.jobs.get(&id).cloned())
    }

    async fn update_job(&mut self, job: &Job) -> Result<(), StoreError> {
        if !self.guard.jobs.contains_key(&job.id) {
            return Err(StoreError::DataCorruption(format!(
                "job {} vanished mid-transaction",
                job.id
            )));
        }
        self.guard.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_quote_for_update(&mut self, id: QuoteId) -> Result<Option<Quote>, StoreError> {
        Ok(self.guard.quotes.get(&id).cloned())
    }

    async fn insert_quote(&mut self, quote: &Quote) -> Result<(), StoreError> {
        if self.guard.quotes.contains_key(&quote.id) {
            return Err(StoreError::Conflict(format!(
                "quote {} already exists",
                quote.id
            )));
        }
        self.guard.quotes.insert(quote.id, quote.clone());
        Ok(())
    }

    async fn update_quote(&mut self, quote: &Quote) -> Result<(), StoreError> {
        if !self.guard.quotes.contains_key(&quote.id) {
            return Err(StoreError::DataCorruption(format!(
                "quote {} vanished mid-transaction",
                quote.id
            )));
        }
        self.guard.quotes.insert(quote.id, quote.clone());
        Ok(())
    }

    async fn get_account_for_update(
        &mut self,
        id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self.guard.accounts.get(&id).cloned())
    }

    async fn find_account_by_customer_ref(
        &mut self,
        customer: &CustomerRef,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .guard
            .accounts
            .values()
            .find(|account| account.subscription.customer_ref.as_ref() == Some(customer))
            .cloned())
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), StoreError> {
        if !self.guard.accounts.contains_key(&account.id) {
            return Err(StoreError::DataCorruption(format!(
                "account {} vanished mid-transaction",
                account.id
            )));
        }
        self.guard.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.committed = true;
        Ok(())
    }
}
