//! Integration tests for webhook deliveries that materialize orders.
//!
//! These drive the full HTTP surface: signature verification on the raw
//! body, envelope parsing, idempotent materialization, and the
//! acknowledgement contract (`received` / `duplicate` / `ignored`).

use serde_json::json;

use toolbelt_core::{Money, OrderStatus};
use toolbelt_integration_tests::{SIGNATURE_HEADER, TestApp, envelope, unix_now};
use toolbelt_payments::provider::{CheckoutSession, sign};

/// A payment-mode checkout session object, as the provider embeds it.
fn checkout_object(checkout: &str, payment_status: &str, items: serde_json::Value) -> serde_json::Value {
    json!({
        "id": checkout,
        "mode": "payment",
        "payment_intent": format!("pi_{checkout}"),
        "payment_status": payment_status,
        "customer": null,
        "customer_email": "buyer@example.com",
        "currency": "gbp",
        "amount_shipping": 450,
        "metadata": {},
        "line_items": items,
        "subscription": null
    })
}

// =============================================================================
// Materialization
// =============================================================================

#[tokio::test]
async fn test_checkout_completed_creates_order_with_catalog_pricing() {
    let app = TestApp::spawn().await;
    let drill = app.seed_product("Cordless Drill", 7999).await;

    // The event snapshot deliberately claims a different unit price; the
    // catalog must win for products it still carries.
    let event = envelope(
        "evt_checkout_1",
        "checkout.session.completed",
        checkout_object(
            "cs_1",
            "paid",
            json!([{
                "product_id": drill.id,
                "name": "Cordless Drill",
                "unit_amount": 1,
                "quantity": 2,
                "image_url": null
            }]),
        ),
    );
    let response = app.deliver_webhook(&event).await;

    assert_eq!(response.status(), 200);
    let ack: serde_json::Value = response.json().await.expect("ack body");
    assert_eq!(ack, json!({"status": "received"}));

    let order = app.order_by_checkout("cs_1").await.expect("order exists");
    // 2 x 79.99 catalog price plus 4.50 shipping.
    assert_eq!(order.subtotal, Money::from_minor(15998));
    assert_eq!(order.total, Money::from_minor(16448));
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(app.notification_kinds().await, vec!["order_confirmed"]);
}

#[tokio::test]
async fn test_redelivered_event_acks_duplicate_and_sends_nothing() {
    let app = TestApp::spawn().await;
    let event = envelope(
        "evt_replay",
        "checkout.session.completed",
        checkout_object(
            "cs_replay",
            "paid",
            json!([{
                "product_id": null,
                "name": "Roof Sealant 5L",
                "unit_amount": 2450,
                "quantity": 1,
                "image_url": null
            }]),
        ),
    );

    let first = app.deliver_webhook(&event).await;
    assert_eq!(first.status(), 200);

    let second = app.deliver_webhook(&event).await;
    assert_eq!(second.status(), 200);
    let ack: serde_json::Value = second.json().await.expect("ack body");
    assert_eq!(ack, json!({"status": "duplicate"}));

    // One order, one confirmation.
    assert!(app.order_by_checkout("cs_replay").await.is_some());
    assert_eq!(app.notification_kinds().await, vec!["order_confirmed"]);
}

#[tokio::test]
async fn test_same_checkout_under_new_event_id_acks_duplicate() {
    let app = TestApp::spawn().await;
    let object = checkout_object(
        "cs_shared",
        "paid",
        json!([{
            "product_id": null,
            "name": "Extension Ladder",
            "unit_amount": 12950,
            "quantity": 1,
            "image_url": null
        }]),
    );

    let first = app
        .deliver_webhook(&envelope("evt_a", "checkout.session.completed", object.clone()))
        .await;
    assert_eq!(first.status(), 200);

    let second = app
        .deliver_webhook(&envelope("evt_b", "checkout.session.completed", object))
        .await;
    let ack: serde_json::Value = second.json().await.expect("ack body");
    assert_eq!(ack, json!({"status": "duplicate"}));
    assert_eq!(app.notification_kinds().await, vec!["order_confirmed"]);
}

#[tokio::test]
async fn test_unsettled_checkout_materializes_as_created() {
    let app = TestApp::spawn().await;
    let event = envelope(
        "evt_unpaid",
        "checkout.session.completed",
        checkout_object(
            "cs_unpaid",
            "unpaid",
            json!([{
                "product_id": null,
                "name": "Workbench",
                "unit_amount": 8900,
                "quantity": 1,
                "image_url": null
            }]),
        ),
    );

    let response = app.deliver_webhook(&event).await;
    assert_eq!(response.status(), 200);

    let order = app.order_by_checkout("cs_unpaid").await.expect("order exists");
    assert_eq!(order.status, OrderStatus::Created);
}

// =============================================================================
// Rejected Deliveries
// =============================================================================

#[tokio::test]
async fn test_missing_signature_header_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/webhooks/payments"))
        .header("Content-Type", "application/json")
        .body("{}")
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_tampered_body_is_rejected_without_side_effects() {
    let app = TestApp::spawn().await;
    let event = envelope(
        "evt_tamper",
        "checkout.session.completed",
        checkout_object("cs_tamper", "paid", json!([])),
    );
    let body = event.to_string();
    let header = sign(&app.webhook_secret, unix_now(), body.as_bytes());

    let response = app
        .deliver_webhook_raw(&header, body.replace("cs_tamper", "cs_other"))
        .await;

    assert_eq!(response.status(), 400);
    assert!(app.order_by_checkout("cs_other").await.is_none());
}

#[tokio::test]
async fn test_stale_signature_is_rejected() {
    let app = TestApp::spawn().await;
    let event = envelope(
        "evt_stale",
        "checkout.session.completed",
        checkout_object("cs_stale", "paid", json!([])),
    );
    let body = event.to_string();
    let header = sign(&app.webhook_secret, unix_now() - 3600, body.as_bytes());

    let response = app.deliver_webhook_raw(&header, body).await;

    assert_eq!(response.status(), 400);
    assert!(app.order_by_checkout("cs_stale").await.is_none());
}

#[tokio::test]
async fn test_garbage_payload_with_valid_signature_is_rejected() {
    let app = TestApp::spawn().await;
    let body = "not an event envelope".to_owned();
    let header = sign(&app.webhook_secret, unix_now(), body.as_bytes());

    let response = app.deliver_webhook_raw(&header, body).await;

    assert_eq!(response.status(), 400);
}

// =============================================================================
// Acknowledged Without Action
// =============================================================================

#[tokio::test]
async fn test_unconsumed_event_type_acks_ignored() {
    let app = TestApp::spawn().await;
    let event = envelope("evt_refund", "charge.refunded", json!({"anything": true}));

    let response = app.deliver_webhook(&event).await;

    assert_eq!(response.status(), 200);
    let ack: serde_json::Value = response.json().await.expect("ack body");
    assert_eq!(ack, json!({"status": "ignored"}));
}

#[tokio::test]
async fn test_setup_mode_checkout_acks_ignored() {
    let app = TestApp::spawn().await;
    let event = envelope(
        "evt_setup",
        "checkout.session.completed",
        json!({
            "id": "cs_setup",
            "mode": "setup",
            "payment_intent": null,
            "payment_status": "no_payment_required",
            "customer": "cus_1",
            "customer_email": null,
            "currency": null,
            "amount_shipping": null,
            "subscription": null
        }),
    );

    let response = app.deliver_webhook(&event).await;

    let ack: serde_json::Value = response.json().await.expect("ack body");
    assert_eq!(ack, json!({"status": "ignored"}));
    assert!(app.order_by_checkout("cs_setup").await.is_none());
}

// =============================================================================
// Provider REST Lookups
// =============================================================================

#[tokio::test]
async fn test_slim_delivery_expands_line_items_from_provider() {
    // The provider's REST API holds the full session with line items.
    let full: CheckoutSession = serde_json::from_value(checkout_object(
        "cs_slim",
        "paid",
        json!([{
            "product_id": null,
            "name": "Cordless Drill",
            "unit_amount": 7999,
            "quantity": 1,
            "image_url": null
        }]),
    ))
    .expect("session fixture");
    let app = TestApp::spawn_with_sessions(vec![full]).await;

    // The delivery itself arrives without line items.
    let event = envelope(
        "evt_slim",
        "checkout.session.completed",
        checkout_object("cs_slim", "paid", json!([])),
    );
    let response = app.deliver_webhook(&event).await;

    let ack: serde_json::Value = response.json().await.expect("ack body");
    assert_eq!(ack, json!({"status": "received"}));

    let order = app.order_by_checkout("cs_slim").await.expect("order exists");
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.total, Money::from_minor(7999 + 450));
}

#[tokio::test]
async fn test_slim_delivery_without_provider_api_still_materializes() {
    // No REST credentials configured: the payload is all there is, so the
    // order lands with no items and shipping as its only charge.
    let app = TestApp::spawn().await;
    let event = envelope(
        "evt_bare",
        "checkout.session.completed",
        checkout_object("cs_bare", "paid", json!([])),
    );

    let response = app.deliver_webhook(&event).await;

    let ack: serde_json::Value = response.json().await.expect("ack body");
    assert_eq!(ack, json!({"status": "received"}));

    let order = app.order_by_checkout("cs_bare").await.expect("order exists");
    assert!(order.items.is_empty());
    assert_eq!(order.total, Money::from_minor(450));
}

#[tokio::test]
async fn test_payment_intent_settles_order_before_checkout_arrives() {
    // The provider still reports the session unpaid; the succeeded intent
    // is the proof of settlement.
    let session: CheckoutSession = serde_json::from_value(checkout_object(
        "cs_race",
        "unpaid",
        json!([{
            "product_id": null,
            "name": "Roof Sealant 5L",
            "unit_amount": 2450,
            "quantity": 2,
            "image_url": null
        }]),
    ))
    .expect("session fixture");
    let app = TestApp::spawn_with_sessions(vec![session]).await;

    let intent_event = envelope(
        "evt_intent",
        "payment_intent.succeeded",
        json!({"id": "pi_cs_race"}),
    );
    let response = app.deliver_webhook(&intent_event).await;

    let ack: serde_json::Value = response.json().await.expect("ack body");
    assert_eq!(ack, json!({"status": "received"}));

    let order = app.order_by_checkout("cs_race").await.expect("order exists");
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.total, Money::from_minor(2 * 2450 + 450));

    // The checkout completion arrives late and finds its purchase done.
    let late = envelope(
        "evt_late",
        "checkout.session.completed",
        checkout_object("cs_race", "paid", json!([])),
    );
    let ack: serde_json::Value = app
        .deliver_webhook(&late)
        .await
        .json()
        .await
        .expect("ack body");
    assert_eq!(ack, json!({"status": "duplicate"}));
    assert_eq!(app.notification_kinds().await, vec!["order_confirmed"]);
}

#[tokio::test]
async fn test_payment_intent_without_provider_api_acks_ignored() {
    let app = TestApp::spawn().await;
    let event = envelope(
        "evt_orphan_intent",
        "payment_intent.succeeded",
        json!({"id": "pi_orphan"}),
    );

    let response = app.deliver_webhook(&event).await;

    assert_eq!(response.status(), 200);
    let ack: serde_json::Value = response.json().await.expect("ack body");
    assert_eq!(ack, json!({"status": "ignored"}));
}

#[tokio::test]
async fn test_payment_intent_with_no_matching_session_acks_ignored() {
    let app = TestApp::spawn_with_sessions(Vec::new()).await;
    let event = envelope(
        "evt_unmatched_intent",
        "payment_intent.succeeded",
        json!({"id": "pi_unmatched"}),
    );

    let response = app.deliver_webhook(&event).await;

    let ack: serde_json::Value = response.json().await.expect("ack body");
    assert_eq!(ack, json!({"status": "ignored"}));
}

// Webhook responses must never depend on the signature header casing the
// provider happens to use.
#[tokio::test]
async fn test_signature_header_is_case_insensitive() {
    let app = TestApp::spawn().await;
    let event = envelope(
        "evt_case",
        "checkout.session.completed",
        checkout_object("cs_case", "paid", json!([])),
    );
    let body = event.to_string();
    let header = sign(&app.webhook_secret, unix_now(), body.as_bytes());

    let response = app
        .client
        .post(app.url("/webhooks/payments"))
        .header(SIGNATURE_HEADER.to_lowercase(), header)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
}
