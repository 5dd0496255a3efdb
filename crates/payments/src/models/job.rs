//! Job and quote domain types.

use chrono::{DateTime, Utc};

use toolbelt_core::{AccountId, JobId, JobStatus, Money, QuoteId, QuoteStatus};

/// A posted job (domain type).
///
/// The quote-count counter is informational (dashboards, matching); it is
/// still incremented inside the quote-creating transaction so it can never
/// drift from the stored quotes.
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique job ID.
    pub id: JobId,
    /// Customer who posted the job.
    pub customer_id: AccountId,
    /// Short description shown in listings.
    pub title: String,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Tradesperson assigned by quote acceptance.
    pub tradesperson_id: Option<AccountId>,
    /// Number of quotes ever submitted for this job.
    pub quote_count: u32,
    /// When the job was posted.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the assigned tradesperson marked the work done.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new open job for a customer.
    #[must_use]
    pub fn new(customer_id: AccountId, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::generate(),
            customer_id,
            title: title.into(),
            status: JobStatus::Open,
            tradesperson_id: None,
            quote_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// A tradesperson's quote on a job (domain type).
///
/// Immutable once accepted, apart from payment-status annotations handled
/// elsewhere.
#[derive(Debug, Clone)]
pub struct Quote {
    /// Unique quote ID.
    pub id: QuoteId,
    /// Job the quote was submitted against.
    pub job_id: JobId,
    /// Tradesperson who submitted the quote.
    pub tradesperson_id: AccountId,
    /// Quoted price in minor units.
    pub price: Money,
    /// Optional up-front deposit, never more than the price.
    pub deposit: Option<Money>,
    /// Lifecycle status.
    pub status: QuoteStatus,
    /// When the quote was submitted.
    pub created_at: DateTime<Utc>,
    /// When the customer accepted the quote.
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Quote {
    /// Create a new pending quote.
    #[must_use]
    pub fn new(
        job_id: JobId,
        tradesperson_id: AccountId,
        price: Money,
        deposit: Option<Money>,
    ) -> Self {
        Self {
            id: QuoteId::generate(),
            job_id,
            tradesperson_id,
            price,
            deposit,
            status: QuoteStatus::Pending,
            created_at: Utc::now(),
            accepted_at: None,
        }
    }
}
