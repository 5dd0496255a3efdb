//! End-to-end scenarios mixing webhook deliveries with marketplace traffic.
//!
//! Where the other suites pin down one endpoint at a time, these walk whole
//! journeys: a hire from first quote to completion, an upgrade that lifts
//! the quote allowance mid-month, and a billing lapse that runs through to
//! cancellation.

use serde_json::json;

use toolbelt_core::{
    AccountRole, Email, JobStatus, OrderStatus, QuoteStatus, SubscriptionStatus, Tier,
};
use toolbelt_integration_tests::{TestApp, envelope};
use toolbelt_payments::models::Account;
use toolbelt_payments::store::Store;

// =============================================================================
// Hire Journey
// =============================================================================

#[tokio::test]
async fn test_full_hire_and_purchase_journey() {
    let app = TestApp::spawn().await;
    let customer = app
        .seed_account("homeowner@example.com", AccountRole::Customer)
        .await;
    let tp = app
        .seed_account("roofer@example.com", AccountRole::Tradesperson)
        .await;
    let job = app.seed_job(&customer, "Re-felt the shed roof").await;
    let sealant = app.seed_product("Roof Sealant 5L", 2450).await;

    // The tradesperson quotes and the customer accepts.
    let response = app
        .post_as(tp.id, &format!("/jobs/{}/quotes", job.id))
        .json(&json!({"price": "180.00", "deposit": "30.00"}))
        .send()
        .await
        .expect("submit request");
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.expect("submit body");
    let quote_id = body["quote"]["id"].as_str().expect("quote id").to_owned();

    let response = app
        .post_as(customer.id, &format!("/quotes/{quote_id}/accept"))
        .send()
        .await
        .expect("accept request");
    assert_eq!(response.status(), 200);

    // The customer buys materials; the provider reports the settled checkout.
    let event = envelope(
        "evt_journey_1",
        "checkout.session.completed",
        json!({
            "id": "cs_journey",
            "mode": "payment",
            "payment_intent": "pi_journey",
            "payment_status": "paid",
            "customer": null,
            "customer_email": "homeowner@example.com",
            "currency": "gbp",
            "amount_shipping": 300,
            "metadata": {},
            "line_items": [{
                "product_id": sealant.id,
                "name": "Roof Sealant 5L",
                "unit_amount": 2450,
                "quantity": 2,
                "image_url": null
            }],
            "subscription": null,
        }),
    );
    let response = app.deliver_webhook(&event).await;
    assert_eq!(response.status(), 200);

    // The work gets done.
    let response = app
        .post_as(tp.id, &format!("/jobs/{}/complete", job.id))
        .send()
        .await
        .expect("complete request");
    assert_eq!(response.status(), 200);

    let order = app
        .order_by_checkout("cs_journey")
        .await
        .expect("order materialized");
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.total.minor_units(), 2 * 2450 + 300);

    let job = app.job(job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());

    assert_eq!(
        app.notification_kinds().await,
        vec![
            "quote_received",
            "quote_accepted",
            "job_assigned",
            "order_confirmed",
            "job_completed",
        ]
    );
}

#[tokio::test]
async fn test_accepted_quote_records_acceptance_time() {
    let app = TestApp::spawn().await;
    let customer = app
        .seed_account("homeowner@example.com", AccountRole::Customer)
        .await;
    let tp = app
        .seed_account("tiler@example.com", AccountRole::Tradesperson)
        .await;
    let job = app.seed_job(&customer, "Regrout the bathroom").await;

    let response = app
        .post_as(tp.id, &format!("/jobs/{}/quotes", job.id))
        .json(&json!({"price": "150.00"}))
        .send()
        .await
        .expect("submit request");
    let body: serde_json::Value = response.json().await.expect("submit body");
    assert!(body["quote"]["accepted_at"].is_null());
    let quote_id = body["quote"]["id"].as_str().expect("quote id").to_owned();

    let response = app
        .post_as(customer.id, &format!("/quotes/{quote_id}/accept"))
        .send()
        .await
        .expect("accept request");
    let body: serde_json::Value = response.json().await.expect("accept body");
    assert_eq!(body["quote"]["status"], "accepted");
    assert!(body["quote"]["accepted_at"].is_string());
}

// =============================================================================
// Mid-Month Upgrade
// =============================================================================

#[tokio::test]
async fn test_upgrade_lifts_the_quote_allowance() {
    let app = TestApp::spawn().await;
    let customer = app
        .seed_account("homeowner@example.com", AccountRole::Customer)
        .await;
    let mut tp = Account::new(
        Email::parse("prolific@example.com").expect("valid email"),
        "Prolific Plumber",
        AccountRole::Tradesperson,
    );
    tp.quota.used = 5;
    app.store.insert_account(&tp).await.expect("insert account");
    let job = app.seed_job(&customer, "Fit an outside tap").await;

    // On the entry tier the sixth quote of the month is refused.
    let response = app
        .post_as(tp.id, &format!("/jobs/{}/quotes", job.id))
        .json(&json!({"price": "70.00"}))
        .send()
        .await
        .expect("refused request");
    assert_eq!(response.status(), 403);

    // The upgrade lands through the provider.
    let event = envelope(
        "evt_upgrade_1",
        "customer.subscription.created",
        json!({
            "id": "sub_upgrade",
            "customer": "cus_upgrade",
            "status": "active",
            "metadata": {"account_id": tp.id, "tier": "pro"},
            "items": {"data": []},
        }),
    );
    let response = app.deliver_webhook(&event).await;
    assert_eq!(response.status(), 200);

    // The same submission now goes through, with no cap reported.
    let response = app
        .post_as(tp.id, &format!("/jobs/{}/quotes", job.id))
        .json(&json!({"price": "70.00"}))
        .send()
        .await
        .expect("allowed request");
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.expect("body");
    assert_eq!(body["quote"]["status"], "pending");
    assert_eq!(body["quota"]["used"], 6);
    assert!(body["quota"]["limit"].is_null());
}

// =============================================================================
// Billing Lapse
// =============================================================================

#[tokio::test]
async fn test_billing_lapse_keeps_the_plan_until_cancellation() {
    let app = TestApp::spawn().await;
    let customer = app
        .seed_account("homeowner@example.com", AccountRole::Customer)
        .await;
    let tp = app
        .seed_tradesperson_on("sparky@example.com", Tier::Pro)
        .await;
    let job = app.seed_job(&customer, "Rewire the garage").await;

    // A failed renewal marks the account past due but leaves the tier.
    let event = envelope(
        "evt_lapse_1",
        "invoice.payment_failed",
        json!({
            "id": "in_lapse",
            "customer": null,
            "subscription": null,
            "metadata": {"account_id": tp.id},
        }),
    );
    let response = app.deliver_webhook(&event).await;
    assert_eq!(response.status(), 200);

    let account = app.account(tp.id).await;
    assert_eq!(account.subscription.status, SubscriptionStatus::PastDue);
    assert_eq!(account.subscription.tier, Tier::Pro);

    // Until the provider cancels, the paid allowance still applies.
    let response = app
        .post_as(tp.id, &format!("/jobs/{}/quotes", job.id))
        .json(&json!({"price": "320.00"}))
        .send()
        .await
        .expect("submit request");
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.expect("body");
    assert!(body["quota"]["limit"].is_null());
    let quote_id = body["quote"]["id"].as_str().expect("quote id").to_owned();

    // The provider gives up on collection and cancels the plan.
    let event = envelope(
        "evt_lapse_2",
        "customer.subscription.deleted",
        json!({
            "id": "sub_lapse",
            "customer": "cus_lapse",
            "status": "canceled",
            "metadata": {"account_id": tp.id},
            "items": {"data": []},
        }),
    );
    let response = app.deliver_webhook(&event).await;
    assert_eq!(response.status(), 200);

    let account = app.account(tp.id).await;
    assert_eq!(account.subscription.tier, Tier::Basic);
    assert_eq!(account.subscription.status, SubscriptionStatus::Canceled);

    // The entry-tier cap is back, but work in flight is untouched.
    let response = app
        .get_as(tp.id, "/accounts/me/quota")
        .send()
        .await
        .expect("quota request");
    let body: serde_json::Value = response.json().await.expect("quota body");
    assert_eq!(body["limit"], 5);

    let quote = app
        .store
        .get_quote(quote_id.parse().expect("quote id parses"))
        .await
        .expect("store read")
        .expect("quote still present");
    assert_eq!(quote.status, QuoteStatus::Pending);

    assert_eq!(
        app.notification_kinds().await,
        vec!["subscription_payment_failed", "quote_received"]
    );
}
