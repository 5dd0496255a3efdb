//! Toolbelt Payments - webhook and transaction core.
//!
//! This binary serves the payments service on port 3002.
//!
//! # Architecture
//!
//! - Axum web framework behind the marketplace gateway
//! - Payment provider webhooks drive orders and subscription state
//! - `PostgreSQL` for the event ledger, orders, jobs, quotes, and accounts
//! - SMTP (lettre) and the marketplace hub for outbound notifications
//!
//! # Security
//!
//! This binary only has access to:
//! - The payment provider's REST API (read-only checkout retrieval)
//! - The payments `PostgreSQL` database (`toolbelt_payments`)
//!
//! It does NOT serve end users directly; the gateway terminates auth and
//! forwards the acting account id.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toolbelt_payments::alerts::{AlertSink, NoopAlerts, WebhookAlerts};
use toolbelt_payments::build_app;
use toolbelt_payments::config::PaymentsConfig;
use toolbelt_payments::provider::{CheckoutLookup, HttpProviderClient};
use toolbelt_payments::services::notify::CompositeNotifier;
use toolbelt_payments::state::AppState;
use toolbelt_payments::store::postgres::PostgresStore;
use toolbelt_payments::store::{Store, create_pool};

/// Log filter applied when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "toolbelt_payments=info,tower_http=debug";

/// Start error tracking when a DSN is configured. The returned guard flushes
/// pending events on drop and has to outlive the server.
fn init_sentry(config: &PaymentsConfig) -> Option<sentry::ClientInitGuard> {
    config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                attach_stacktrace: true,
                ..Default::default()
            },
        ))
    })
}

/// Route tracing events into Sentry: warnings and errors become events,
/// info and debug lines become breadcrumbs attached to them.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        Level::ERROR | Level::WARN => sentry_tracing::EventFilter::Event,
        Level::INFO | Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let config = PaymentsConfig::from_env().expect("configuration");

    // Sentry hooks the tracing pipeline, so it comes up first.
    let sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
    if sentry_guard.is_some() {
        tracing::info!("sentry error tracking enabled");
    }

    // Schema changes are applied out of band: cargo run -p toolbelt-cli -- migrate
    let pool = create_pool(&config.database_url)
        .await
        .expect("database pool");
    let store: Arc<dyn Store> = Arc::new(PostgresStore::new(pool));
    tracing::info!("database pool ready");

    let notifier =
        CompositeNotifier::new(config.email.as_ref(), config.notify_hub_url.clone())
            .expect("notifier");

    let alerts: Arc<dyn AlertSink> = match config.alert_webhook_url.clone() {
        Some(url) => Arc::new(WebhookAlerts::new(url)),
        None => Arc::new(NoopAlerts),
    };

    let checkout_lookup: Option<Arc<dyn CheckoutLookup>> = match &config.provider_api {
        Some(provider) => Some(Arc::new(
            HttpProviderClient::new(provider.base_url.clone(), provider.api_key.clone())
                .expect("provider client"),
        )),
        None => {
            tracing::warn!("no provider API configured; webhook payloads must carry line items");
            None
        }
    };

    let addr = config.socket_addr();
    let state = AppState::new(config, store, Arc::new(notifier), alerts, checkout_lookup);

    // Sentry request layers wrap everything else so every handler runs
    // inside a hub scope.
    let app = build_app(state)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind");
    tracing::info!("payments service listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server");
}

/// Resolve when the process is asked to stop, via Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        tokio::signal::ctrl_c().await.expect("ctrl-c handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {},
        () = sigterm => {},
    }

    tracing::info!("shutdown signal received, draining in-flight requests");
}
