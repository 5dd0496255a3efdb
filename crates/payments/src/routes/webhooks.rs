//! Payment provider webhook endpoint.
//!
//! One endpoint receives every delivery. The raw body is verified against
//! the shared signing secret before anything is parsed, then the typed
//! event is routed to the owning service. Signature and parse failures are
//! 400s the provider will not retry; storage failures surface as 5xxs so
//! it will.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use toolbelt_core::EventId;

use crate::error::AppError;
use crate::provider::{
    CheckoutMode, CheckoutSession, PaymentIntentEvent, ProviderEvent, verify,
};
use crate::services::orders::{MaterializeOrder, MaterializeOutcome};
use crate::services::subscriptions::{SubscriptionChange, SyncOutcome};
use crate::state::AppState;

/// Header carrying the delivery signature.
const SIGNATURE_HEADER: &str = "Toolbelt-Signature";

/// Create the webhook routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/payments", post(receive))
}

/// Acknowledgement body returned for every accepted delivery.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

impl WebhookAck {
    /// The event was processed and changed state.
    pub const RECEIVED: Self = Self { status: "received" };
    /// The event had already been processed; nothing changed.
    pub const DUPLICATE: Self = Self { status: "duplicate" };
    /// The event carries nothing for this service to act on.
    pub const IGNORED: Self = Self { status: "ignored" };
}

/// Handle a signed provider delivery.
#[instrument(skip(state, headers, body))]
async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest(format!("missing {SIGNATURE_HEADER} header")))?;

    verify(&state.config().webhook_secret, signature, &body)?;

    let (event_id, event) = ProviderEvent::parse(&body)?;
    debug!(event_id = %event_id, kind = event.kind(), "webhook delivery verified");

    match event {
        ProviderEvent::CheckoutCompleted(session) => {
            handle_checkout(&state, event_id, session).await
        }
        ProviderEvent::PaymentIntentSucceeded(intent) => {
            handle_payment_intent(&state, event_id, intent).await
        }
        ProviderEvent::SubscriptionUpserted(event) => Ok(sync_ack(
            state
                .subscriptions()
                .apply(event_id, SubscriptionChange::upsert(event))
                .await,
        )),
        ProviderEvent::SubscriptionDeleted(event) => Ok(sync_ack(
            state
                .subscriptions()
                .apply(event_id, SubscriptionChange::delete(event))
                .await,
        )),
        ProviderEvent::InvoicePaymentFailed(invoice) => Ok(sync_ack(
            state
                .subscriptions()
                .apply(event_id, SubscriptionChange::payment_failed(invoice))
                .await,
        )),
        ProviderEvent::Unrecognized { kind } => {
            debug!(kind, "event type not consumed by this service");
            Ok(Json(WebhookAck::IGNORED))
        }
    }
}

async fn handle_checkout(
    state: &AppState,
    event_id: EventId,
    session: CheckoutSession,
) -> Result<Json<WebhookAck>, AppError> {
    match session.mode {
        CheckoutMode::Subscription => {
            let Some(change) = SubscriptionChange::subscription_checkout(&session) else {
                warn!(
                    checkout = %session.id,
                    "subscription checkout carries no subscription reference"
                );
                return Ok(Json(WebhookAck::IGNORED));
            };
            Ok(sync_ack(state.subscriptions().apply(event_id, change).await))
        }
        CheckoutMode::Payment => {
            let session = expand_line_items(state, session).await?;
            materialize_ack(state, MaterializeOrder::from_session(event_id, &session)).await
        }
        CheckoutMode::Setup | CheckoutMode::Unknown => {
            debug!(checkout = %session.id, mode = ?session.mode, "checkout mode carries no purchase");
            Ok(Json(WebhookAck::IGNORED))
        }
    }
}

/// Re-fetch the checkout when the delivery did not embed line items.
async fn expand_line_items(
    state: &AppState,
    session: CheckoutSession,
) -> Result<CheckoutSession, AppError> {
    if !session.line_items.is_empty() {
        return Ok(session);
    }

    let Some(lookup) = state.checkout_lookup() else {
        warn!(
            checkout = %session.id,
            "no provider API configured, materializing from the payload alone"
        );
        return Ok(session);
    };

    match lookup.checkout_by_ref(&session.id).await? {
        Some(full) => Ok(full),
        None => {
            warn!(
                checkout = %session.id,
                "provider has no record of the session, materializing from the payload alone"
            );
            Ok(session)
        }
    }
}

async fn handle_payment_intent(
    state: &AppState,
    event_id: EventId,
    intent: PaymentIntentEvent,
) -> Result<Json<WebhookAck>, AppError> {
    let Some(lookup) = state.checkout_lookup() else {
        warn!(
            intent = %intent.id,
            "no provider API configured, cannot resolve a checkout for the payment intent"
        );
        return Ok(Json(WebhookAck::IGNORED));
    };

    let Some(session) = lookup.checkout_by_intent(&intent.id).await? else {
        debug!(intent = %intent.id, "payment intent has no checkout session");
        return Ok(Json(WebhookAck::IGNORED));
    };
    if session.mode == CheckoutMode::Subscription {
        // Subscription invoices are settled by their own events.
        debug!(intent = %intent.id, "payment intent belongs to a subscription checkout");
        return Ok(Json(WebhookAck::IGNORED));
    }

    let mut input = MaterializeOrder::from_session(event_id, &session);
    // The event itself proves settlement even when the fetched snapshot lags.
    input.settled = true;
    materialize_ack(state, input).await
}

async fn materialize_ack(
    state: &AppState,
    input: MaterializeOrder,
) -> Result<Json<WebhookAck>, AppError> {
    let outcome = state.orders().materialize(input).await?;
    Ok(Json(match outcome {
        MaterializeOutcome::Created(_) => WebhookAck::RECEIVED,
        MaterializeOutcome::Duplicate(_) => WebhookAck::DUPLICATE,
    }))
}

fn sync_ack(outcome: SyncOutcome) -> Json<WebhookAck> {
    Json(match outcome {
        SyncOutcome::Applied { .. } => WebhookAck::RECEIVED,
        SyncOutcome::Duplicate => WebhookAck::DUPLICATE,
        SyncOutcome::NoAccount | SyncOutcome::Abandoned => WebhookAck::IGNORED,
    })
}
