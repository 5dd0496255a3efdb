//! Marketplace quote actions and quota introspection.
//!
//! These endpoints sit behind the marketplace gateway, which authenticates
//! the caller and forwards the acting account in `X-Account-Id`. Monetary
//! amounts cross this boundary as decimal display strings; everything
//! behind it is integer minor units.

use axum::{
    Json,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use toolbelt_core::{AccountId, JobId, JobStatus, Money, QuoteId, QuoteStatus};

use crate::error::AppError;
use crate::models::{Job, Quote};
use crate::services::quotes::QuotaUsage;
use crate::state::AppState;

/// Header carrying the authenticated account, set by the gateway.
const ACCOUNT_HEADER: &str = "X-Account-Id";

/// Extractor for the acting account.
///
/// The gateway always sets the header for authenticated traffic, so a
/// missing or malformed value is a 401, not a 400.
pub struct ActingAccount(pub AccountId);

impl<S> FromRequestParts<S> for ActingAccount
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACCOUNT_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {ACCOUNT_HEADER} header")))?;

        let id = raw
            .parse::<AccountId>()
            .map_err(|_| AppError::Unauthorized(format!("malformed account id {raw:?}")))?;

        Ok(Self(id))
    }
}

/// Request to submit a quote. Amounts are decimal display units.
#[derive(Debug, Deserialize)]
pub struct SubmitQuoteRequest {
    pub price: String,
    pub deposit: Option<String>,
}

/// A quote as rendered to clients.
#[derive(Debug, Serialize)]
pub struct QuoteBody {
    pub id: QuoteId,
    pub job_id: JobId,
    pub tradesperson_id: AccountId,
    pub price: String,
    pub deposit: Option<String>,
    pub status: QuoteStatus,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl From<&Quote> for QuoteBody {
    fn from(quote: &Quote) -> Self {
        Self {
            id: quote.id,
            job_id: quote.job_id,
            tradesperson_id: quote.tradesperson_id,
            price: quote.price.to_string(),
            deposit: quote.deposit.map(|deposit| deposit.to_string()),
            status: quote.status,
            created_at: quote.created_at,
            accepted_at: quote.accepted_at,
        }
    }
}

/// A job as rendered to clients.
#[derive(Debug, Serialize)]
pub struct JobBody {
    pub id: JobId,
    pub customer_id: AccountId,
    pub title: String,
    pub status: JobStatus,
    pub tradesperson_id: Option<AccountId>,
    pub quote_count: u32,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobBody {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            customer_id: job.customer_id,
            title: job.title.clone(),
            status: job.status,
            tradesperson_id: job.tradesperson_id,
            quote_count: job.quote_count,
            completed_at: job.completed_at,
        }
    }
}

/// Response from submitting a quote.
#[derive(Debug, Serialize)]
pub struct SubmitQuoteResponse {
    pub quote: QuoteBody,
    pub quota: QuotaUsage,
}

/// Response from accepting a quote.
#[derive(Debug, Serialize)]
pub struct AcceptQuoteResponse {
    pub job: JobBody,
    pub quote: QuoteBody,
}

/// Submit a quote on a job.
///
/// POST /jobs/{job_id}/quotes
///
/// # Errors
///
/// 403 with usage numbers when the monthly allowance is exhausted, 404 for
/// an unknown job, 409 when the job is no longer taking quotes, 422 for
/// invalid amounts.
#[instrument(skip(state, request))]
pub async fn submit_quote(
    State(state): State<AppState>,
    ActingAccount(account_id): ActingAccount,
    Path(job_id): Path<JobId>,
    Json(request): Json<SubmitQuoteRequest>,
) -> Result<(StatusCode, Json<SubmitQuoteResponse>), AppError> {
    let price = parse_amount(&request.price)?;
    let deposit = request.deposit.as_deref().map(parse_amount).transpose()?;

    let submission = state
        .quotes()
        .submit_quote(account_id, job_id, price, deposit)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitQuoteResponse {
            quote: QuoteBody::from(&submission.quote),
            quota: submission.usage,
        }),
    ))
}

/// Accept a quote on one of the caller's jobs.
///
/// POST /quotes/{quote_id}/accept
///
/// # Errors
///
/// 403 when the caller is not the job's customer, 409 when the job has
/// already been assigned or the quote is no longer pending.
#[instrument(skip(state))]
pub async fn accept_quote(
    State(state): State<AppState>,
    ActingAccount(account_id): ActingAccount,
    Path(quote_id): Path<QuoteId>,
) -> Result<Json<AcceptQuoteResponse>, AppError> {
    let acceptance = state.quotes().accept_quote(account_id, quote_id).await?;

    Ok(Json(AcceptQuoteResponse {
        job: JobBody::from(&acceptance.job),
        quote: QuoteBody::from(&acceptance.quote),
    }))
}

/// Mark an assigned job as done.
///
/// POST /jobs/{job_id}/complete
///
/// # Errors
///
/// 403 when the caller is not the assigned tradesperson, 409 when the job
/// is not assigned.
#[instrument(skip(state))]
pub async fn complete_job(
    State(state): State<AppState>,
    ActingAccount(account_id): ActingAccount,
    Path(job_id): Path<JobId>,
) -> Result<Json<JobBody>, AppError> {
    let job = state.quotes().complete_job(account_id, job_id).await?;
    Ok(Json(JobBody::from(&job)))
}

/// Current quota usage for the calling account.
///
/// GET /accounts/me/quota
///
/// # Errors
///
/// 404 when the account does not exist.
#[instrument(skip(state))]
pub async fn quota(
    State(state): State<AppState>,
    ActingAccount(account_id): ActingAccount,
) -> Result<Json<QuotaUsage>, AppError> {
    Ok(Json(state.quotes().quota_status(account_id).await?))
}

fn parse_amount(raw: &str) -> Result<Money, AppError> {
    Money::from_decimal_str(raw)
        .map_err(|err| AppError::BadRequest(format!("invalid amount {raw:?}: {err}")))
}
