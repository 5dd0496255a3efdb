//! Webhook event envelope parsing.
//!
//! Deliveries arrive as `{"id": "...", "type": "...", "data": {"object":
//! {...}}}`. The envelope is decoded first, then the inner object is decoded
//! into the shape that event type carries. Unknown event types parse
//! successfully as [`ProviderEvent::Unrecognized`] so the endpoint can
//! acknowledge them without retry storms.
//!
//! Metadata values stay raw strings here; the services parse them where they
//! are used and log what does not parse.

use serde::Deserialize;
use thiserror::Error;

use toolbelt_core::{
    CheckoutSessionRef, CustomerRef, EventId, PaymentIntentRef, PriceRef, SubscriptionRef,
    SubscriptionStatus,
};

/// Event payload that could not be decoded.
#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("malformed event payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Events without an ID cannot be deduplicated, so they are rejected.
    #[error("event is missing an id")]
    MissingId,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    object: serde_json::Value,
}

/// A decoded webhook event.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// `checkout.session.completed`
    CheckoutCompleted(CheckoutSession),
    /// `payment_intent.succeeded`
    PaymentIntentSucceeded(PaymentIntentEvent),
    /// `customer.subscription.created` / `customer.subscription.updated`
    SubscriptionUpserted(SubscriptionEvent),
    /// `customer.subscription.deleted`
    SubscriptionDeleted(SubscriptionEvent),
    /// `invoice.payment_failed`
    InvoicePaymentFailed(InvoiceEvent),
    /// Any event type this service does not consume.
    Unrecognized { kind: String },
}

impl ProviderEvent {
    /// Decode a raw webhook body into the event ID and typed event.
    ///
    /// # Errors
    ///
    /// Returns [`EventParseError`] when the envelope or the inner object for
    /// a recognized event type does not decode, or the event ID is empty.
    pub fn parse(body: &[u8]) -> Result<(EventId, Self), EventParseError> {
        let envelope: RawEnvelope = serde_json::from_slice(body)?;
        if envelope.id.is_empty() {
            return Err(EventParseError::MissingId);
        }

        let event = match envelope.kind.as_str() {
            "checkout.session.completed" => {
                Self::CheckoutCompleted(serde_json::from_value(envelope.data.object)?)
            }
            "payment_intent.succeeded" => {
                Self::PaymentIntentSucceeded(serde_json::from_value(envelope.data.object)?)
            }
            "customer.subscription.created" | "customer.subscription.updated" => {
                Self::SubscriptionUpserted(serde_json::from_value(envelope.data.object)?)
            }
            "customer.subscription.deleted" => {
                Self::SubscriptionDeleted(serde_json::from_value(envelope.data.object)?)
            }
            "invoice.payment_failed" => {
                Self::InvoicePaymentFailed(serde_json::from_value(envelope.data.object)?)
            }
            _ => Self::Unrecognized { kind: envelope.kind },
        };

        Ok((EventId::new(envelope.id), event))
    }

    /// Event type name for logging.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::CheckoutCompleted(_) => "checkout.session.completed",
            Self::PaymentIntentSucceeded(_) => "payment_intent.succeeded",
            Self::SubscriptionUpserted(_) => "customer.subscription.upserted",
            Self::SubscriptionDeleted(_) => "customer.subscription.deleted",
            Self::InvoicePaymentFailed(_) => "invoice.payment_failed",
            Self::Unrecognized { kind } => kind,
        }
    }
}

/// A checkout session, as embedded in webhook payloads and as returned by
/// the provider's REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: CheckoutSessionRef,
    pub mode: CheckoutMode,
    pub payment_intent: Option<PaymentIntentRef>,
    pub payment_status: PaymentStatus,
    pub customer: Option<CustomerRef>,
    pub customer_email: Option<String>,
    /// Lowercase ISO currency code, e.g. `"gbp"`.
    pub currency: Option<String>,
    /// Shipping charged at checkout, in minor units.
    pub amount_shipping: Option<i64>,
    #[serde(default)]
    pub metadata: EventMetadata,
    /// Absent unless the delivery was configured to expand line items.
    #[serde(default)]
    pub line_items: Vec<EventLineItem>,
    pub subscription: Option<SubscriptionRef>,
}

/// What the checkout session was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    Payment,
    Subscription,
    Setup,
    #[serde(other)]
    Unknown,
}

/// Provider-reported payment state of a checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    /// Whether the money is settled (or no payment was due).
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Paid | Self::NoPaymentRequired)
    }
}

/// Key-value metadata attached by our checkout flow.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventMetadata {
    /// Account UUID stamped at checkout creation, if any.
    pub account_id: Option<String>,
    /// Tier name stamped at checkout creation, if any.
    pub tier: Option<String>,
}

/// One purchased line, in minor units.
#[derive(Debug, Clone, Deserialize)]
pub struct EventLineItem {
    pub product_id: Option<String>,
    pub name: Option<String>,
    pub unit_amount: i64,
    pub quantity: u32,
    pub image_url: Option<String>,
}

/// The object of a `payment_intent.succeeded` event.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentEvent {
    pub id: PaymentIntentRef,
}

/// The object of a subscription lifecycle event.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionEvent {
    pub id: SubscriptionRef,
    pub customer: Option<CustomerRef>,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub metadata: EventMetadata,
    #[serde(default)]
    items: SubscriptionItems,
}

impl SubscriptionEvent {
    /// Price reference of the first subscription item, if present.
    #[must_use]
    pub fn price(&self) -> Option<&PriceRef> {
        self.items.data.first().map(|item| &item.price.id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SubscriptionItems {
    #[serde(default)]
    data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubscriptionItem {
    price: ItemPrice,
}

#[derive(Debug, Clone, Deserialize)]
struct ItemPrice {
    id: PriceRef,
}

/// The object of an `invoice.payment_failed` event.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceEvent {
    pub customer: Option<CustomerRef>,
    pub subscription: Option<SubscriptionRef>,
    #[serde(default)]
    pub metadata: EventMetadata,
}
