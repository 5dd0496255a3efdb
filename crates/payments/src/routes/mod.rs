//! HTTP route handlers for the payments service.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                    - Liveness probe
//! GET  /ready                     - Readiness probe (store round-trip)
//!
//! # Provider webhooks
//! POST /webhooks/payments         - Signed event deliveries
//!
//! # Marketplace actions (gateway-authenticated via X-Account-Id)
//! POST /jobs/{job_id}/quotes      - Submit a quote
//! POST /quotes/{quote_id}/accept  - Accept a quote
//! POST /jobs/{job_id}/complete    - Mark assigned work done
//! GET  /accounts/me/quota         - Current quota usage
//! ```

pub mod quotes;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the marketplace action routes.
pub fn marketplace_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/{job_id}/quotes", post(quotes::submit_quote))
        .route("/jobs/{job_id}/complete", post(quotes::complete_job))
        .route("/quotes/{quote_id}/accept", post(quotes::accept_quote))
        .route("/accounts/me/quota", get(quotes::quota))
}

/// Create all routes for the payments service.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(webhooks::router())
        .merge(marketplace_routes())
}
