//! Order domain types.

use chrono::{DateTime, Utc};

use toolbelt_core::{
    AccountId, CheckoutSessionRef, CurrencyCode, Email, EventId, Money, OrderId, OrderStatus,
    PaymentIntentRef, ProductId,
};

/// A storefront order materialized from a completed checkout.
///
/// Created exactly once per distinct checkout session or payment intent;
/// mutated only by status transitions; never deleted (audit trail). The
/// total is always recomputed server-side from the line-item snapshots,
/// never trusted from client input.
#[derive(Debug, Clone)]
pub struct Order {
    /// Unique order ID.
    pub id: OrderId,
    /// Buying account, absent for guest checkout.
    pub account_id: Option<AccountId>,
    /// Contact email, when the provider reported one.
    pub email: Option<Email>,
    /// Ordered line items with price/name snapshots.
    pub items: Vec<OrderItem>,
    /// Currency all amounts are denominated in.
    pub currency: CurrencyCode,
    /// Sum of line-item totals, in minor units.
    pub subtotal: Money,
    /// Shipping charge, in minor units.
    pub shipping: Money,
    /// subtotal + shipping, in minor units.
    pub total: Money,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Provider checkout-session reference.
    pub checkout_ref: CheckoutSessionRef,
    /// Provider payment-intent reference, once known.
    pub payment_intent_ref: Option<PaymentIntentRef>,
    /// Provider event that materialized this order.
    pub event_id: EventId,
    /// When the order was materialized.
    pub created_at: DateTime<Utc>,
    /// When the order was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A line item snapshot within an order.
///
/// Name, unit price, and image are copied at materialization time so later
/// catalog edits never rewrite order history.
#[derive(Debug, Clone)]
pub struct OrderItem {
    /// Catalog product, when it still existed at materialization time.
    pub product_id: Option<ProductId>,
    /// Product name snapshot.
    pub name: String,
    /// Unit price snapshot, in minor units.
    pub unit_price: Money,
    /// Units ordered.
    pub quantity: u32,
    /// Product image snapshot.
    pub image_url: Option<String>,
}
