//! Toolbelt payments service library.
//!
//! This crate provides the payments functionality as a library,
//! allowing it to be tested and reused. The binary in `main.rs` wires
//! production collaborators (Postgres, SMTP, the provider REST API) into
//! [`build_app`]; tests wire in-memory substitutes.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod alerts;
pub mod config;
pub mod error;
pub mod models;
pub mod profiles;
pub mod provider;
pub mod retry;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the service router over prepared application state.
#[must_use]
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(readiness))
        .merge(routes::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies store connectivity before returning OK.
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
