//! Postgres-backed store.
//!
//! Queries are written at runtime with positional binds so the crate builds
//! without a live database. Row decoding funnels through the `row_to_*`
//! mappers, which turn stored TEXT enums back into domain types and report
//! anything unparseable as [`StoreError::DataCorruption`].

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use toolbelt_core::{
    AccountId, CheckoutSessionRef, CustomerRef, EventId, JobId, OrderId, PaymentIntentRef,
    ProductId, QuoteId,
};

use crate::models::{
    Account, DomainRef, Job, Order, OrderItem, ProcessedEvent, Product, Quote, QuotaCounter,
    SubscriptionState,
};

use super::{Store, StoreError, StoreTx};

/// Embedded migrations, run by the CLI `migrate` command.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

const SELECT_ACCOUNT: &str = "SELECT id, email, display_name, role, role_promoted, quota_used, \
     quota_resets_at, subscription_tier, subscription_status, customer_ref, subscription_ref, \
     created_at, updated_at FROM accounts";

const SELECT_JOB: &str = "SELECT id, customer_id, title, status, tradesperson_id, quote_count, \
     created_at, updated_at, completed_at FROM jobs";

const SELECT_QUOTE: &str = "SELECT id, job_id, tradesperson_id, price_minor, deposit_minor, \
     status, created_at, accepted_at FROM quotes";

const SELECT_ORDER: &str = "SELECT id, account_id, email, currency, subtotal_minor, \
     shipping_minor, total_minor, status, checkout_ref, payment_intent_ref, event_id, \
     created_at, updated_at FROM orders";

const SELECT_PRODUCT: &str = "SELECT id, name, price_minor, currency, image_url, active, \
     created_at, updated_at FROM products";

/// Store implementation backed by a Postgres pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTx { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_ACCOUNT} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_account).transpose()
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_JOB} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn get_quote(&self, id: QuoteId) -> Result<Option<Quote>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_QUOTE} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_quote).transpose()
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_ORDER} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let mut order = row_to_order(&row)?;
        order.items = load_order_items(&self.pool, order.id).await?;
        Ok(Some(order))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_PRODUCT} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO products (id, name, price_minor, currency, image_url, active, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, \
             price_minor = EXCLUDED.price_minor, currency = EXCLUDED.currency, \
             image_url = EXCLUDED.image_url, active = EXCLUDED.active, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.currency.as_str())
        .bind(product.image_url.as_deref())
        .bind(product.active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO accounts (id, email, display_name, role, role_promoted, quota_used, \
             quota_resets_at, subscription_tier, subscription_status, customer_ref, \
             subscription_ref, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.display_name)
        .bind(account.role.to_string())
        .bind(account.role_promoted)
        .bind(i64::from(account.quota.used))
        .bind(account.quota.resets_at)
        .bind(account.subscription.tier.to_string())
        .bind(account.subscription.status.to_string())
        .bind(account.subscription.customer_ref.as_ref())
        .bind(account.subscription.subscription_ref.as_ref())
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| conflict_on_unique(err, "account already exists"))?;
        Ok(())
    }

    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO jobs (id, customer_id, title, status, tradesperson_id, quote_count, \
             created_at, updated_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(job.id)
        .bind(job.customer_id)
        .bind(&job.title)
        .bind(job.status.to_string())
        .bind(job.tradesperson_id)
        .bind(i64::from(job.quote_count))
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|err| conflict_on_unique(err, "job already exists"))?;
        Ok(())
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn find_processed_event(
        &mut self,
        event_id: &EventId,
    ) -> Result<Option<ProcessedEvent>, StoreError> {
        let row = sqlx::query(
            "SELECT event_id, entity_kind, entity_id, processed_at FROM processed_events \
             WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_processed_event).transpose()
    }

    async fn insert_processed_event(&mut self, event: &ProcessedEvent) -> Result<(), StoreError> {
        let (entity_kind, entity_id) = match &event.entity {
            Some(entity) => (Some(entity.kind()), Some(entity.entity_uuid())),
            None => (None, None),
        };
        sqlx::query(
            "INSERT INTO processed_events (event_id, entity_kind, entity_id, processed_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&event.event_id)
        .bind(entity_kind)
        .bind(entity_id)
        .bind(event.processed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| conflict_on_unique(err, "event already recorded"))?;
        Ok(())
    }

    async fn find_order_by_checkout(
        &mut self,
        checkout: &CheckoutSessionRef,
    ) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_ORDER} WHERE checkout_ref = $1"))
            .bind(checkout)
            .fetch_optional(&mut *self.tx)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let mut order = row_to_order(&row)?;
        order.items = load_order_items(&mut *self.tx, order.id).await?;
        Ok(Some(order))
    }

    async fn find_order_by_payment_intent(
        &mut self,
        intent: &PaymentIntentRef,
    ) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_ORDER} WHERE payment_intent_ref = $1"))
            .bind(intent)
            .fetch_optional(&mut *self.tx)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let mut order = row_to_order(&row)?;
        order.items = load_order_items(&mut *self.tx, order.id).await?;
        Ok(Some(order))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO orders (id, account_id, email, currency, subtotal_minor, \
             shipping_minor, total_minor, status, checkout_ref, payment_intent_ref, event_id, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(order.id)
        .bind(order.account_id)
        .bind(order.email.as_ref())
        .bind(order.currency.as_str())
        .bind(order.subtotal)
        .bind(order.shipping)
        .bind(order.total)
        .bind(order.status.to_string())
        .bind(&order.checkout_ref)
        .bind(order.payment_intent_ref.as_ref())
        .bind(&order.event_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| conflict_on_unique(err, "order already exists for this checkout"))?;

        for (position, item) in order.items.iter().enumerate() {
            let position = i32::try_from(position).map_err(|_| {
                StoreError::DataCorruption(format!("order {} has too many items", order.id))
            })?;
            sqlx::query(
                "INSERT INTO order_items (order_id, position, product_id, name, unit_minor, \
                 quantity, image_url) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(order.id)
            .bind(position)
            .bind(item.product_id)
            .bind(&item.name)
            .bind(item.unit_price)
            .bind(i64::from(item.quantity))
            .bind(item.image_url.as_deref())
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_PRODUCT} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn get_job_for_update(&mut self, id: JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_JOB} WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn update_job(&mut self, job: &Job) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = $2, tradesperson_id = $3, quote_count = $4, \
             updated_at = $5, completed_at = $6 WHERE id = $1",
        )
        .bind(job.id)
        .bind(job.status.to_string())
        .bind(job.tradesperson_id)
        .bind(i64::from(job.quote_count))
        .bind(job.updated_at)
        .bind(job.completed_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one_row(result.rows_affected(), "job", &job.id.to_string())
    }

    async fn get_quote_for_update(&mut self, id: QuoteId) -> Result<Option<Quote>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_QUOTE} WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_quote).transpose()
    }

    async fn insert_quote(&mut self, quote: &Quote) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO quotes (id, job_id, tradesperson_id, price_minor, deposit_minor, \
             status, created_at, accepted_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(quote.id)
        .bind(quote.job_id)
        .bind(quote.tradesperson_id)
        .bind(quote.price)
        .bind(quote.deposit)
        .bind(quote.status.to_string())
        .bind(quote.created_at)
        .bind(quote.accepted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| conflict_on_unique(err, "quote already exists"))?;
        Ok(())
    }

    async fn update_quote(&mut self, quote: &Quote) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE quotes SET status = $2, accepted_at = $3 WHERE id = $1",
        )
        .bind(quote.id)
        .bind(quote.status.to_string())
        .bind(quote.accepted_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one_row(result.rows_affected(), "quote", &quote.id.to_string())
    }

    async fn get_account_for_update(
        &mut self,
        id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_ACCOUNT} WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_account).transpose()
    }

    async fn find_account_by_customer_ref(
        &mut self,
        customer: &CustomerRef,
    ) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_ACCOUNT} WHERE customer_ref = $1 FOR UPDATE"))
            .bind(customer)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_account).transpose()
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE accounts SET role = $2, role_promoted = $3, quota_used = $4, \
             quota_resets_at = $5, subscription_tier = $6, subscription_status = $7, \
             customer_ref = $8, subscription_ref = $9, updated_at = $10 WHERE id = $1",
        )
        .bind(account.id)
        .bind(account.role.to_string())
        .bind(account.role_promoted)
        .bind(i64::from(account.quota.used))
        .bind(account.quota.resets_at)
        .bind(account.subscription.tier.to_string())
        .bind(account.subscription.status.to_string())
        .bind(account.subscription.customer_ref.as_ref())
        .bind(account.subscription.subscription_ref.as_ref())
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one_row(result.rows_affected(), "account", &account.id.to_string())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

async fn load_order_items<'e, E>(executor: E, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query(
        "SELECT product_id, name, unit_minor, quantity, image_url FROM order_items \
         WHERE order_id = $1 ORDER BY position",
    )
    .bind(order_id)
    .fetch_all(executor)
    .await?;
    rows.iter().map(row_to_order_item).collect()
}

fn conflict_on_unique(err: sqlx::Error, message: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(message.to_owned())
        }
        _ => StoreError::Database(err),
    }
}

fn expect_one_row(affected: u64, entity: &str, id: &str) -> Result<(), StoreError> {
    if affected == 1 {
        Ok(())
    } else {
        Err(StoreError::DataCorruption(format!(
            "update of {entity} {id} touched {affected} rows"
        )))
    }
}

fn parse_column<T>(raw: &str, entity: &str, column: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse().map_err(|err| {
        StoreError::DataCorruption(format!("{entity}.{column} holds {raw:?}: {err}"))
    })
}

fn counter_from_i64(raw: i64, entity: &str, column: &str) -> Result<u32, StoreError> {
    u32::try_from(raw).map_err(|_| {
        StoreError::DataCorruption(format!("{entity}.{column} holds out-of-range value {raw}"))
    })
}

fn row_to_account(row: &PgRow) -> Result<Account, StoreError> {
    let role_raw: String = row.try_get("role")?;
    let tier_raw: String = row.try_get("subscription_tier")?;
    let status_raw: String = row.try_get("subscription_status")?;
    let quota_used: i64 = row.try_get("quota_used")?;

    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        role: parse_column(&role_raw, "accounts", "role")?,
        role_promoted: row.try_get("role_promoted")?,
        quota: QuotaCounter {
            used: counter_from_i64(quota_used, "accounts", "quota_used")?,
            resets_at: row.try_get("quota_resets_at")?,
        },
        subscription: SubscriptionState {
            tier: parse_column(&tier_raw, "accounts", "subscription_tier")?,
            status: parse_column(&status_raw, "accounts", "subscription_status")?,
            customer_ref: row.try_get("customer_ref")?,
            subscription_ref: row.try_get("subscription_ref")?,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_job(row: &PgRow) -> Result<Job, StoreError> {
    let status_raw: String = row.try_get("status")?;
    let quote_count: i64 = row.try_get("quote_count")?;

    Ok(Job {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        title: row.try_get("title")?,
        status: parse_column(&status_raw, "jobs", "status")?,
        tradesperson_id: row.try_get("tradesperson_id")?,
        quote_count: counter_from_i64(quote_count, "jobs", "quote_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn row_to_quote(row: &PgRow) -> Result<Quote, StoreError> {
    let status_raw: String = row.try_get("status")?;

    Ok(Quote {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        tradesperson_id: row.try_get("tradesperson_id")?,
        price: row.try_get("price_minor")?,
        deposit: row.try_get("deposit_minor")?,
        status: parse_column(&status_raw, "quotes", "status")?,
        created_at: row.try_get("created_at")?,
        accepted_at: row.try_get("accepted_at")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<Order, StoreError> {
    let currency_raw: String = row.try_get("currency")?;
    let status_raw: String = row.try_get("status")?;

    Ok(Order {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        email: row.try_get("email")?,
        items: Vec::new(),
        currency: parse_column(&currency_raw, "orders", "currency")?,
        subtotal: row.try_get("subtotal_minor")?,
        shipping: row.try_get("shipping_minor")?,
        total: row.try_get("total_minor")?,
        status: parse_column(&status_raw, "orders", "status")?,
        checkout_ref: row.try_get("checkout_ref")?,
        payment_intent_ref: row.try_get("payment_intent_ref")?,
        event_id: row.try_get("event_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_item(row: &PgRow) -> Result<OrderItem, StoreError> {
    let quantity: i64 = row.try_get("quantity")?;

    Ok(OrderItem {
        product_id: row.try_get("product_id")?,
        name: row.try_get("name")?,
        unit_price: row.try_get("unit_minor")?,
        quantity: counter_from_i64(quantity, "order_items", "quantity")?,
        image_url: row.try_get("image_url")?,
    })
}

fn row_to_product(row: &PgRow) -> Result<Product, StoreError> {
    let currency_raw: String = row.try_get("currency")?;

    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        price: row.try_get("price_minor")?,
        currency: parse_column(&currency_raw, "products", "currency")?,
        image_url: row.try_get("image_url")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_processed_event(row: &PgRow) -> Result<ProcessedEvent, StoreError> {
    let entity_kind: Option<String> = row.try_get("entity_kind")?;
    let entity_id: Option<uuid::Uuid> = row.try_get("entity_id")?;

    let entity = match (entity_kind, entity_id) {
        (Some(kind), Some(id)) => Some(DomainRef::from_parts(&kind, id).ok_or_else(|| {
            StoreError::DataCorruption(format!(
                "processed_events.entity_kind holds unknown kind {kind:?}"
            ))
        })?),
        (None, None) => None,
        _ => {
            return Err(StoreError::DataCorruption(
                "processed_events row with half-set entity reference".to_owned(),
            ));
        }
    };

    Ok(ProcessedEvent {
        event_id: row.try_get("event_id")?,
        entity,
        processed_at: row.try_get("processed_at")?,
    })
}
