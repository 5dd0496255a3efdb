//! Processed-event ledger types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use toolbelt_core::{AccountId, EventId, OrderId};

/// Reference to the domain entity a processed event produced or touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainRef {
    /// The event materialized or matched an order.
    Order(OrderId),
    /// The event updated an account's subscription state.
    Account(AccountId),
}

impl DomainRef {
    /// Stable kind discriminator used in storage.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Order(_) => "order",
            Self::Account(_) => "account",
        }
    }

    /// The referenced entity's UUID.
    #[must_use]
    pub const fn entity_uuid(&self) -> Uuid {
        match self {
            Self::Order(id) => id.as_uuid(),
            Self::Account(id) => id.as_uuid(),
        }
    }

    /// Rebuild a reference from its stored (kind, uuid) pair.
    #[must_use]
    pub fn from_parts(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "order" => Some(Self::Order(OrderId::from_uuid(id))),
            "account" => Some(Self::Account(AccountId::from_uuid(id))),
            _ => None,
        }
    }

    /// The order this reference points at, if it is one.
    #[must_use]
    pub const fn order_id(&self) -> Option<OrderId> {
        match self {
            Self::Order(id) => Some(*id),
            Self::Account(_) => None,
        }
    }
}

/// A ledger row recording that a provider event was fully processed.
///
/// Written in the same transaction as the domain mutation it guards, so the
/// two can only succeed or fail together. Never updated afterwards; its
/// presence is the dedup guard.
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    /// Provider event ID (primary key).
    pub event_id: EventId,
    /// Entity the processing produced or matched.
    pub entity: Option<DomainRef>,
    /// When processing committed.
    pub processed_at: DateTime<Utc>,
}

impl ProcessedEvent {
    /// A fresh ledger row for the given event.
    #[must_use]
    pub fn new(event_id: EventId, entity: Option<DomainRef>) -> Self {
        Self {
            event_id,
            entity,
            processed_at: Utc::now(),
        }
    }
}
