//! Order materialization.
//!
//! Turns a completed checkout into exactly one persisted [`Order`]. The
//! transaction checks the event ledger, then looks for an existing order by
//! checkout reference and by payment intent, and only then creates one.
//! Because the same logical purchase can arrive under more than one event
//! id, the order lookup is the dominant idempotency path; the ledger catches
//! byte-identical redeliveries.
//!
//! Line items are priced from the catalog at transaction time. When a
//! product has disappeared from the catalog the event's own snapshot is
//! used instead; a missing catalog entry must not fail an order the
//! customer already paid for.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use toolbelt_core::{
    AccountId, CheckoutSessionRef, CurrencyCode, Email, EventId, Money, OrderId, OrderStatus,
    PaymentIntentRef, ProductId,
};

use crate::models::{DomainRef, Order, OrderItem, ProcessedEvent};
use crate::provider::CheckoutSession;
use crate::store::{Store, StoreError, StoreTx};

use super::DomainError;
use super::notify::{NotificationKind, Notifier, Outbound, dispatch_all};

/// Normalized input for order materialization, provider-agnostic.
#[derive(Debug, Clone)]
pub struct MaterializeOrder {
    pub event_id: EventId,
    pub checkout_ref: CheckoutSessionRef,
    pub payment_intent_ref: Option<PaymentIntentRef>,
    pub account_id: Option<AccountId>,
    pub email: Option<Email>,
    pub currency: CurrencyCode,
    pub items: Vec<IncomingLineItem>,
    pub shipping: Money,
    /// Whether the provider reports the payment already settled.
    pub settled: bool,
}

/// One purchased line as delivered by the provider.
#[derive(Debug, Clone)]
pub struct IncomingLineItem {
    pub product_id: Option<ProductId>,
    pub name: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
    pub image_url: Option<String>,
}

impl MaterializeOrder {
    /// Normalize a checkout session into materializer input.
    ///
    /// Metadata and contact fields arrive as untrusted strings; anything
    /// unparseable is dropped with a warning rather than failing the order.
    #[must_use]
    pub fn from_session(event_id: EventId, session: &CheckoutSession) -> Self {
        let account_id = session.metadata.account_id.as_deref().and_then(|raw| {
            raw.parse::<AccountId>().map_or_else(
                |_| {
                    warn!(raw, "checkout metadata carries an unparseable account id");
                    None
                },
                Some,
            )
        });

        let email = session.customer_email.as_deref().and_then(|raw| {
            Email::parse(raw).map_or_else(
                |err| {
                    warn!(%err, "checkout carries an invalid customer email");
                    None
                },
                Some,
            )
        });

        let currency = session.currency.as_deref().map_or_else(
            || {
                warn!(checkout = %session.id, "checkout has no currency, assuming default");
                CurrencyCode::default()
            },
            |raw| {
                raw.parse::<CurrencyCode>().unwrap_or_else(|err| {
                    warn!(%err, "checkout carries an unknown currency, assuming default");
                    CurrencyCode::default()
                })
            },
        );

        let items = session
            .line_items
            .iter()
            .map(|line| IncomingLineItem {
                product_id: line.product_id.as_deref().and_then(|raw| {
                    raw.parse::<ProductId>().map_or_else(
                        |_| {
                            warn!(raw, "line item carries an unparseable product id");
                            None
                        },
                        Some,
                    )
                }),
                name: line.name.clone(),
                unit_price: Money::from_minor(line.unit_amount),
                quantity: line.quantity,
                image_url: line.image_url.clone(),
            })
            .collect();

        Self {
            event_id,
            checkout_ref: session.id.clone(),
            payment_intent_ref: session.payment_intent.clone(),
            account_id,
            email,
            currency,
            items,
            shipping: Money::from_minor(session.amount_shipping.unwrap_or(0)),
            settled: session.payment_status.is_settled(),
        }
    }
}

/// Result of a materialization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// This delivery created the order.
    Created(OrderId),
    /// The purchase was already materialized. The order id is present
    /// unless the ledger entry predates order tracking for this event.
    Duplicate(Option<OrderId>),
}

impl MaterializeOutcome {
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Order materialization service.
pub struct OrderService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl OrderService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Materialize an order from a completed checkout, exactly once.
    ///
    /// A ledger insert conflict means a concurrent delivery of the same
    /// purchase committed first; the transaction is re-run once and lands
    /// on the duplicate path.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] on storage failure or when amounts overflow.
    pub async fn materialize(
        &self,
        input: MaterializeOrder,
    ) -> Result<MaterializeOutcome, DomainError> {
        let (outcome, notifications) = match self.materialize_once(&input).await {
            Err(DomainError::Store(StoreError::Conflict(reason))) => {
                debug!(%reason, "materialization raced a concurrent delivery, re-running");
                self.materialize_once(&input).await?
            }
            other => other?,
        };

        dispatch_all(self.notifier.as_ref(), notifications).await;
        Ok(outcome)
    }

    async fn materialize_once(
        &self,
        input: &MaterializeOrder,
    ) -> Result<(MaterializeOutcome, Vec<Outbound>), DomainError> {
        let mut tx = self.store.begin().await?;

        if let Some(record) = tx.find_processed_event(&input.event_id).await? {
            let order_id = record.entity.and_then(|entity| entity.order_id());
            if order_id.is_none() {
                warn!(
                    event_id = %input.event_id,
                    "checkout event already in ledger without an order reference"
                );
            }
            return Ok((MaterializeOutcome::Duplicate(order_id), Vec::new()));
        }

        if let Some(existing) = tx.find_order_by_checkout(&input.checkout_ref).await? {
            return Self::mark_duplicate(tx, input, existing.id).await;
        }
        if let Some(intent) = &input.payment_intent_ref {
            if let Some(existing) = tx.find_order_by_payment_intent(intent).await? {
                return Self::mark_duplicate(tx, input, existing.id).await;
            }
        }

        let mut items = Vec::with_capacity(input.items.len());
        let mut subtotal = Money::ZERO;
        for line in &input.items {
            let resolved = resolve_line(tx.as_mut(), line).await?;
            let line_total = resolved
                .unit_price
                .checked_mul(resolved.quantity)
                .ok_or(DomainError::AmountOverflow)?;
            subtotal = subtotal
                .checked_add(line_total)
                .ok_or(DomainError::AmountOverflow)?;
            items.push(resolved);
        }
        let total = subtotal
            .checked_add(input.shipping)
            .ok_or(DomainError::AmountOverflow)?;

        let now = Utc::now();
        let order = Order {
            id: OrderId::generate(),
            account_id: input.account_id,
            email: input.email.clone(),
            items,
            currency: input.currency,
            subtotal,
            shipping: input.shipping,
            total,
            status: if input.settled {
                OrderStatus::Paid
            } else {
                OrderStatus::Created
            },
            checkout_ref: input.checkout_ref.clone(),
            payment_intent_ref: input.payment_intent_ref.clone(),
            event_id: input.event_id.clone(),
            created_at: now,
            updated_at: now,
        };

        tx.insert_order(&order).await?;
        tx.insert_processed_event(&ProcessedEvent::new(
            input.event_id.clone(),
            Some(DomainRef::Order(order.id)),
        ))
        .await?;
        tx.commit().await?;

        info!(
            order_id = %order.id,
            checkout = %order.checkout_ref,
            total = %order.total,
            currency = %order.currency,
            status = %order.status,
            "order materialized"
        );

        let mut notifications = Vec::new();
        if order.account_id.is_some() || order.email.is_some() {
            notifications.push(Outbound {
                account_id: order.account_id,
                email: order.email.clone(),
                kind: NotificationKind::OrderConfirmed,
                payload: serde_json::json!({
                    "order_id": order.id,
                    "total": order.total.to_string(),
                    "currency": order.currency.as_str(),
                }),
            });
        }

        Ok((MaterializeOutcome::Created(order.id), notifications))
    }

    /// Record the ledger entry for an event whose order already exists.
    async fn mark_duplicate(
        mut tx: Box<dyn StoreTx>,
        input: &MaterializeOrder,
        order_id: OrderId,
    ) -> Result<(MaterializeOutcome, Vec<Outbound>), DomainError> {
        tx.insert_processed_event(&ProcessedEvent::new(
            input.event_id.clone(),
            Some(DomainRef::Order(order_id)),
        ))
        .await?;
        tx.commit().await?;

        debug!(
            event_id = %input.event_id,
            order_id = %order_id,
            "purchase already materialized under another event id"
        );
        Ok((MaterializeOutcome::Duplicate(Some(order_id)), Vec::new()))
    }
}

/// Price a line from the catalog, falling back to the event snapshot when
/// the product is gone.
async fn resolve_line(
    tx: &mut dyn StoreTx,
    line: &IncomingLineItem,
) -> Result<OrderItem, StoreError> {
    if let Some(product_id) = line.product_id {
        if let Some(product) = tx.get_product(product_id).await? {
            return Ok(OrderItem {
                product_id: Some(product.id),
                name: product.name,
                unit_price: product.price,
                quantity: line.quantity,
                image_url: product.image_url,
            });
        }
        warn!(
            product_id = %product_id,
            "product missing from catalog, pricing from event snapshot"
        );
    }

    Ok(OrderItem {
        product_id: line.product_id,
        name: line.name.clone().unwrap_or_else(|| "Item".to_owned()),
        unit_price: line.unit_price,
        quantity: line.quantity,
        image_url: line.image_url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use toolbelt_core::ProductId;

    use crate::models::Product;
    use crate::services::notify::testing::RecordingNotifier;
    use crate::store::memory::MemoryStore;

    use super::*;

    struct Fixture {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        service: OrderService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = OrderService::new(store.clone(), notifier.clone());
        Fixture {
            store,
            notifier,
            service,
        }
    }

    fn money(s: &str) -> Money {
        Money::from_decimal_str(s).unwrap()
    }

    async fn seed_product(store: &MemoryStore, price: &str) -> ProductId {
        let product = Product::new("Cordless Drill", money(price), CurrencyCode::GBP);
        let id = product.id;
        store.upsert_product(&product).await.unwrap();
        id
    }

    fn input(event: &str, checkout: &str, items: Vec<IncomingLineItem>) -> MaterializeOrder {
        MaterializeOrder {
            event_id: EventId::new(event),
            checkout_ref: CheckoutSessionRef::new(checkout),
            payment_intent_ref: Some(PaymentIntentRef::new(format!("pi_{checkout}"))),
            account_id: None,
            email: Some(Email::parse("buyer@example.com").unwrap()),
            currency: CurrencyCode::GBP,
            items,
            shipping: money("4.50"),
            settled: true,
        }
    }

    fn line(product_id: Option<ProductId>, unit: &str, quantity: u32) -> IncomingLineItem {
        IncomingLineItem {
            product_id,
            name: Some("Snapshot Name".to_owned()),
            unit_price: money(unit),
            quantity,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn materializes_order_with_catalog_pricing() {
        let fx = fixture();
        // Catalog says 19.99; the event snapshot claims something else.
        let drill = seed_product(&fx.store, "19.99").await;

        let outcome = fx
            .service
            .materialize(input(
                "evt_1",
                "cs_1",
                vec![line(Some(drill), "0.01", 1), line(None, "5.00", 2)],
            ))
            .await
            .unwrap();

        let MaterializeOutcome::Created(order_id) = outcome else {
            panic!("expected creation, got {outcome:?}");
        };
        let order = fx.store.get_order(order_id).await.unwrap().unwrap();

        // 19.99 + 2 x 5.00 + 4.50 shipping = 34.49
        assert_eq!(order.subtotal, Money::from_minor(2999));
        assert_eq!(order.total, Money::from_minor(3449));
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].name, "Cordless Drill");
        assert_eq!(order.items[0].unit_price, money("19.99"));
        assert_eq!(order.items[1].name, "Snapshot Name");

        let sent = fx.notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::OrderConfirmed);
    }

    #[tokio::test]
    async fn unsettled_payment_creates_order_in_created_status() {
        let fx = fixture();
        let mut order_input = input("evt_1", "cs_1", vec![line(None, "10.00", 1)]);
        order_input.settled = false;

        let outcome = fx.service.materialize(order_input).await.unwrap();
        let MaterializeOutcome::Created(order_id) = outcome else {
            panic!("expected creation");
        };
        let order = fx.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Created);
    }

    #[tokio::test]
    async fn redelivered_event_short_circuits_on_ledger() {
        let fx = fixture();
        let order_input = input("evt_1", "cs_1", vec![line(None, "10.00", 1)]);

        let first = fx.service.materialize(order_input.clone()).await.unwrap();
        let second = fx.service.materialize(order_input).await.unwrap();

        let MaterializeOutcome::Created(order_id) = first else {
            panic!("expected creation");
        };
        assert_eq!(second, MaterializeOutcome::Duplicate(Some(order_id)));

        // Confirmation went out once.
        assert_eq!(fx.notifier.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn same_purchase_under_new_event_id_is_deduped_by_checkout_ref() {
        let fx = fixture();

        let first = fx
            .service
            .materialize(input("evt_a", "cs_1", vec![line(None, "10.00", 1)]))
            .await
            .unwrap();
        let second = fx
            .service
            .materialize(input("evt_b", "cs_1", vec![line(None, "10.00", 1)]))
            .await
            .unwrap();

        let MaterializeOutcome::Created(order_id) = first else {
            panic!("expected creation");
        };
        assert_eq!(second, MaterializeOutcome::Duplicate(Some(order_id)));
        assert_eq!(fx.notifier.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn same_purchase_is_deduped_by_payment_intent() {
        let fx = fixture();

        let mut first_input = input("evt_a", "cs_1", vec![line(None, "10.00", 1)]);
        first_input.payment_intent_ref = Some(PaymentIntentRef::new("pi_shared"));
        let first = fx.service.materialize(first_input).await.unwrap();

        // Same intent resurfaces under a different checkout reference.
        let mut second_input = input("evt_b", "cs_2", vec![line(None, "10.00", 1)]);
        second_input.payment_intent_ref = Some(PaymentIntentRef::new("pi_shared"));
        let second = fx.service.materialize(second_input).await.unwrap();

        let MaterializeOutcome::Created(order_id) = first else {
            panic!("expected creation");
        };
        assert_eq!(second, MaterializeOutcome::Duplicate(Some(order_id)));
    }

    #[tokio::test]
    async fn guest_checkout_without_contact_sends_no_notification() {
        let fx = fixture();
        let mut order_input = input("evt_1", "cs_1", vec![line(None, "10.00", 1)]);
        order_input.email = None;

        let outcome = fx.service.materialize(order_input).await.unwrap();
        assert!(outcome.is_created());
        assert!(fx.notifier.sent.lock().await.is_empty());
    }
}
