//! Request-level error type and its HTTP mapping.
//!
//! Every route handler returns `Result<T, AppError>`. Server-side faults
//! are captured to Sentry before the response is built; client-facing
//! messages never include internal detail.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::provider::{EventParseError, ProviderError, SignatureError};
use crate::services::DomainError;

/// Application-level error type for the payments service.
#[derive(Debug, Error)]
pub enum AppError {
    /// Domain precondition failed or storage misbehaved.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Webhook signature missing, stale, or wrong.
    #[error("Invalid signature: {0}")]
    BadSignature(#[from] SignatureError),

    /// Webhook payload did not parse as an event envelope.
    #[error("Invalid payload: {0}")]
    BadPayload(#[from] EventParseError),

    /// Provider REST API call failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Caller identity missing or malformed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Internal(_)
                | Self::Provider(_)
                | Self::Domain(DomainError::Store(_) | DomainError::AmountOverflow)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Only 5xx faults are worth an alert; 4xx is the caller's problem.
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "request failed"
            );
        }

        // Quota exhaustion carries its numbers so clients can render an
        // upgrade prompt.
        if let Self::Domain(DomainError::QuotaExceeded { used, limit }) = &self {
            let body = Json(serde_json::json!({
                "error": self.to_string(),
                "used": used,
                "limit": limit,
            }));
            return (StatusCode::FORBIDDEN, body).into_response();
        }

        let status = match &self {
            Self::Domain(err) => match err {
                DomainError::QuotaExceeded { .. }
                | DomainError::NotJobCustomer
                | DomainError::NotAssignedTradesperson
                | DomainError::NotTradesperson => StatusCode::FORBIDDEN,
                DomainError::JobNotOpen { .. }
                | DomainError::QuoteNotPending { .. }
                | DomainError::JobNotAssigned { .. } => StatusCode::CONFLICT,
                DomainError::UnknownJob
                | DomainError::UnknownQuote
                | DomainError::UnknownAccount => StatusCode::NOT_FOUND,
                DomainError::DepositExceedsPrice | DomainError::NonPositiveAmount => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                DomainError::Store(_) | DomainError::AmountOverflow => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::BadSignature(_) | Self::BadPayload(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Storage and upstream failures get a generic body; everything else
        // renders its Display form.
        let message = match &self {
            Self::Internal(_) | Self::Domain(DomainError::Store(_) | DomainError::AmountOverflow) => {
                "Internal server error".to_string()
            }
            Self::Provider(_) => "External service error".to_string(),
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
