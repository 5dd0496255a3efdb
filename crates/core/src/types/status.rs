//! Status enums and tiers for marketplace entities.
//!
//! Every enum serializes as `snake_case` and round-trips through
//! `Display`/`FromStr` with the same spelling, which is also the form stored
//! in Postgres `TEXT` columns.

use serde::{Deserialize, Serialize};

/// Order lifecycle status.
///
/// Orders are created by the payment webhook and only ever move forward;
/// they are never deleted (audit trail).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Created,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Canceled,
    Refunded,
    Failed,
}

impl OrderStatus {
    /// Statuses that represent settled payment or later.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Paid | Self::Processing | Self::Shipped | Self::Delivered
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Canceled => "canceled",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "paid" => Ok(Self::Paid),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "canceled" => Ok(Self::Canceled),
            "refunded" => Ok(Self::Refunded),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// Quote lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl QuoteStatus {
    /// Only pending quotes can be accepted.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for QuoteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("invalid quote status: {s}")),
        }
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Open,
    Quoted,
    Assigned,
    Completed,
    Canceled,
}

impl JobStatus {
    /// Whether the job is still taking quotes and can accept one.
    ///
    /// Acceptance and quote submission share this gate: once a job is
    /// assigned, completed, or canceled, neither is possible.
    #[must_use]
    pub const fn accepts_quotes(&self) -> bool {
        matches!(self, Self::Open | Self::Quoted)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Quoted => "quoted",
            Self::Assigned => "assigned",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "quoted" => Ok(Self::Quoted),
            "assigned" => Ok(Self::Assigned),
            "completed" => Ok(Self::Completed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(format!("invalid job status: {s}")),
        }
    }
}

/// Subscription plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Basic,
    Pro,
    Business,
}

impl Tier {
    /// Monthly quote allowance for the tier; `None` means unlimited.
    #[must_use]
    pub const fn monthly_quote_limit(&self) -> Option<u32> {
        match self {
            Self::Basic => Some(5),
            Self::Pro | Self::Business => None,
        }
    }

    /// The top tier carries the business-owner role promotion.
    #[must_use]
    pub const fn is_top(&self) -> bool {
        matches!(self, Self::Business)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Basic => "basic",
            Self::Pro => "pro",
            Self::Business => "business",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Self::Basic),
            "pro" => Ok(Self::Pro),
            "business" => Ok(Self::Business),
            _ => Err(format!("invalid tier: {s}")),
        }
    }
}

/// Account role on the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    /// Posts jobs and buys from the storefront.
    #[default]
    Customer,
    /// Submits quotes on open jobs.
    Tradesperson,
    /// Tradesperson on the top subscription tier.
    BusinessOwner,
}

impl std::fmt::Display for AccountRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Customer => "customer",
            Self::Tradesperson => "tradesperson",
            Self::BusinessOwner => "business_owner",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AccountRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "tradesperson" => Ok(Self::Tradesperson),
            "business_owner" => Ok(Self::BusinessOwner),
            _ => Err(format!("invalid account role: {s}")),
        }
    }
}

/// Provider-reported subscription status.
///
/// The provider owns this vocabulary; [`SubscriptionStatus::Unknown`]
/// absorbs values added upstream so deserialization never fails on a new
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    #[default]
    Incomplete,
    IncompleteExpired,
    Unpaid,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Unpaid => "unpaid",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "trialing" => Ok(Self::Trialing),
            "past_due" => Ok(Self::PastDue),
            "canceled" => Ok(Self::Canceled),
            "incomplete" => Ok(Self::Incomplete),
            "incomplete_expired" => Ok(Self::IncompleteExpired),
            "unpaid" => Ok(Self::Unpaid),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("invalid subscription status: {s}")),
        }
    }
}
