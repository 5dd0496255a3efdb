//! Payment provider integration.
//!
//! Everything that touches the provider's wire formats lives here: webhook
//! signature verification ([`signature`]), event envelope parsing
//! ([`events`]), and the REST client used to re-fetch checkout sessions when
//! a webhook payload arrives without line items ([`client`]).

pub mod client;
pub mod events;
pub mod signature;

pub use client::{CheckoutLookup, HttpProviderClient, ProviderError};
pub use events::{
    CheckoutMode, CheckoutSession, EventLineItem, EventMetadata, EventParseError, InvoiceEvent,
    PaymentIntentEvent, PaymentStatus, ProviderEvent, SubscriptionEvent,
};
pub use signature::{SignatureError, sign, verify};
