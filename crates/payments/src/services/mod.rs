//! Domain services.
//!
//! Each service owns one slice of the transaction core: order
//! materialization, quote lifecycle (with quota enforcement), and
//! subscription synchronization. Services hold `Arc<dyn Store>` and run
//! every cross-record mutation inside a single store transaction;
//! notifications collected along the way are dispatched only after commit.

pub mod notify;
pub mod orders;
pub mod quotes;
pub mod subscriptions;

use thiserror::Error;

use toolbelt_core::{JobStatus, QuoteStatus};

use crate::store::StoreError;

/// Domain operation failures.
///
/// Precondition variants carry enough context for an actionable client
/// message; storage variants collapse to a generic server failure at the
/// HTTP boundary.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Entry-tier monthly allowance is used up.
    #[error("monthly quote limit reached ({used}/{limit})")]
    QuotaExceeded { used: u32, limit: u32 },

    /// The job no longer takes quotes or acceptances.
    #[error("job is not taking quotes (status {status})")]
    JobNotOpen { status: JobStatus },

    /// The quote has already left `pending`.
    #[error("quote is not pending (status {status})")]
    QuoteNotPending { status: QuoteStatus },

    /// Completion requires an assigned job.
    #[error("job is not assigned (status {status})")]
    JobNotAssigned { status: JobStatus },

    #[error("only the job's customer can accept a quote")]
    NotJobCustomer,

    #[error("only the assigned tradesperson can complete the job")]
    NotAssignedTradesperson,

    #[error("only tradespeople can submit quotes")]
    NotTradesperson,

    #[error("deposit cannot exceed the quoted price")]
    DepositExceedsPrice,

    #[error("amount must be positive")]
    NonPositiveAmount,

    #[error("job not found")]
    UnknownJob,

    #[error("quote not found")]
    UnknownQuote,

    #[error("account not found")]
    UnknownAccount,

    /// Summed amounts left the representable range.
    #[error("monetary amount out of range")]
    AmountOverflow,
}
