//! Account domain types, including the embedded quota counter and
//! subscription state.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

use toolbelt_core::{
    AccountId, AccountRole, CustomerRef, Email, SubscriptionRef, SubscriptionStatus, Tier,
};

/// A marketplace account (domain type).
///
/// Customers and tradespeople share one account shape; the role and the
/// embedded subscription decide what they can do.
#[derive(Debug, Clone)]
pub struct Account {
    /// Unique account ID.
    pub id: AccountId,
    /// Contact email address.
    pub email: Email,
    /// Name shown across the marketplace.
    pub display_name: String,
    /// Marketplace role.
    pub role: AccountRole,
    /// Set when a subscription upgrade granted the business-owner role.
    /// A later downgrade reverts the role only while this is set.
    pub role_promoted: bool,
    /// Monthly quote allowance tracking.
    pub quota: QuotaCounter,
    /// Subscription tier and provider references.
    pub subscription: SubscriptionState,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a fresh account on the entry tier with an unused quota.
    #[must_use]
    pub fn new(email: Email, display_name: impl Into<String>, role: AccountRole) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::generate(),
            email,
            display_name: display_name.into(),
            role,
            role_promoted: false,
            quota: QuotaCounter::starting(now),
            subscription: SubscriptionState::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Monthly quote allowance counter, embedded in the account.
///
/// The reset date is always the first instant (UTC) of a calendar month.
/// `used` is zero immediately after a reset and only ever increments, and
/// only when a quote was actually persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCounter {
    /// Quotes submitted since the last reset.
    pub used: u32,
    /// First instant of the next calendar month.
    pub resets_at: DateTime<Utc>,
}

impl QuotaCounter {
    /// A fresh counter whose window opened at `now`.
    #[must_use]
    pub fn starting(now: DateTime<Utc>) -> Self {
        Self {
            used: 0,
            resets_at: next_month_start(now),
        }
    }

    /// Zero the counter and advance the reset date if the window elapsed.
    ///
    /// Returns `true` if a reset happened.
    pub fn roll_if_elapsed(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.resets_at {
            return false;
        }
        self.used = 0;
        self.resets_at = next_month_start(now);
        true
    }

    /// Count one more persisted quote.
    pub const fn record_use(&mut self) {
        self.used = self.used.saturating_add(1);
    }
}

/// Subscription tier and provider references, embedded in the account.
///
/// Mutated exclusively by the subscription synchronizer.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionState {
    /// Current plan tier.
    pub tier: Tier,
    /// Provider-reported subscription status.
    pub status: SubscriptionStatus,
    /// Provider customer reference, once known.
    pub customer_ref: Option<CustomerRef>,
    /// Provider subscription reference, once known.
    pub subscription_ref: Option<SubscriptionRef>,
}

/// First instant of the calendar month after `after`, in UTC.
#[must_use]
pub fn next_month_start(after: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if after.month() == 12 {
        (after.year() + 1, 1)
    } else {
        (after.year(), after.month() + 1)
    };
    // Day 1 of a valid month always exists; the fallback is unreachable.
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(after, |naive| Utc.from_utc_datetime(&naive))
}
