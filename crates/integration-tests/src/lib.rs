//! Integration test harness for the Toolbelt payments service.
//!
//! Each test spawns the real application on an ephemeral port over an
//! in-memory store, then drives it with `reqwest` the same way the gateway
//! and the payment provider do in production: marketplace calls carry the
//! `X-Account-Id` header the gateway forwards, and webhook deliveries are
//! signed with the provider's signature scheme.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p toolbelt-integration-tests
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::Mutex;

use toolbelt_core::{
    AccountId, AccountRole, CheckoutSessionRef, CurrencyCode, Email, JobId, Money,
    PaymentIntentRef, PriceRef, Tier,
};
use toolbelt_payments::alerts::NoopAlerts;
use toolbelt_payments::build_app;
use toolbelt_payments::config::{PaymentsConfig, PriceTierConfig};
use toolbelt_payments::models::{Account, Job, Order, Product};
use toolbelt_payments::provider::{CheckoutLookup, CheckoutSession, ProviderError, sign};
use toolbelt_payments::services::notify::{Notifier, NotifyError, Outbound};
use toolbelt_payments::state::AppState;
use toolbelt_payments::store::Store;
use toolbelt_payments::store::memory::MemoryStore;

/// Header carrying the provider's delivery signature.
pub const SIGNATURE_HEADER: &str = "Toolbelt-Signature";

/// Header carrying the acting account, set by the gateway.
pub const ACCOUNT_HEADER: &str = "X-Account-Id";

/// Captures every notification the services dispatch.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Outbound>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, outbound: &Outbound) -> Result<(), NotifyError> {
        self.sent.lock().await.push(outbound.clone());
        Ok(())
    }
}

/// Serves canned checkout sessions the way the provider REST API would.
#[derive(Default)]
pub struct StubCheckoutLookup {
    sessions: Vec<CheckoutSession>,
}

impl StubCheckoutLookup {
    #[must_use]
    pub fn new(sessions: Vec<CheckoutSession>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl CheckoutLookup for StubCheckoutLookup {
    async fn checkout_by_ref(
        &self,
        checkout: &CheckoutSessionRef,
    ) -> Result<Option<CheckoutSession>, ProviderError> {
        Ok(self
            .sessions
            .iter()
            .find(|session| session.id == *checkout)
            .cloned())
    }

    async fn checkout_by_intent(
        &self,
        intent: &PaymentIntentRef,
    ) -> Result<Option<CheckoutSession>, ProviderError> {
        Ok(self
            .sessions
            .iter()
            .find(|session| session.payment_intent.as_ref() == Some(intent))
            .cloned())
    }
}

/// A running payments service plus handles into its in-memory collaborators.
pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub webhook_secret: SecretString,
}

impl TestApp {
    /// Spawn the service without a provider REST client, as deployed when
    /// no API credentials are configured.
    pub async fn spawn() -> Self {
        Self::start(None).await
    }

    /// Spawn with a stub provider API serving `sessions`.
    pub async fn spawn_with_sessions(sessions: Vec<CheckoutSession>) -> Self {
        Self::start(Some(Arc::new(StubCheckoutLookup::new(sessions)))).await
    }

    async fn start(lookup: Option<Arc<dyn CheckoutLookup>>) -> Self {
        let config = test_config();
        let webhook_secret = config.webhook_secret.clone();
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let state = AppState::new(
            config,
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::new(NoopAlerts),
            lookup,
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("listener address");
        tokio::spawn(async move {
            axum::serve(listener, build_app(state))
                .await
                .expect("test server");
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            store,
            notifier,
            webhook_secret,
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// POST a correctly signed webhook delivery.
    pub async fn deliver_webhook(&self, event: &serde_json::Value) -> reqwest::Response {
        let body = event.to_string();
        let header = sign(&self.webhook_secret, unix_now(), body.as_bytes());
        self.deliver_webhook_raw(&header, body).await
    }

    /// POST a webhook delivery with a caller-supplied signature header.
    pub async fn deliver_webhook_raw(&self, header: &str, body: String) -> reqwest::Response {
        self.client
            .post(self.url("/webhooks/payments"))
            .header(SIGNATURE_HEADER, header)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .expect("webhook request")
    }

    /// POST acting as `account`, the way the gateway forwards requests.
    pub fn post_as(&self, account: AccountId, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header(ACCOUNT_HEADER, account.to_string())
    }

    /// GET acting as `account`.
    pub fn get_as(&self, account: AccountId, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header(ACCOUNT_HEADER, account.to_string())
    }

    pub async fn seed_account(&self, email: &str, role: AccountRole) -> Account {
        let account = Account::new(Email::parse(email).expect("valid email"), "Seeded", role);
        self.store
            .insert_account(&account)
            .await
            .expect("insert account");
        account
    }

    pub async fn seed_tradesperson_on(&self, email: &str, tier: Tier) -> Account {
        let mut account = Account::new(
            Email::parse(email).expect("valid email"),
            "Seeded",
            AccountRole::Tradesperson,
        );
        account.subscription.tier = tier;
        self.store
            .insert_account(&account)
            .await
            .expect("insert account");
        account
    }

    pub async fn seed_job(&self, customer: &Account, title: &str) -> Job {
        let job = Job::new(customer.id, title);
        self.store.insert_job(&job).await.expect("insert job");
        job
    }

    pub async fn seed_product(&self, name: &str, price_minor: i64) -> Product {
        let product = Product::new(name, Money::from_minor(price_minor), CurrencyCode::GBP);
        self.store
            .upsert_product(&product)
            .await
            .expect("insert product");
        product
    }

    /// Notification kinds recorded so far, in dispatch order.
    pub async fn notification_kinds(&self) -> Vec<&'static str> {
        self.notifier
            .sent
            .lock()
            .await
            .iter()
            .map(|outbound| outbound.kind.as_str())
            .collect()
    }

    /// Reload an account from the store.
    pub async fn account(&self, id: AccountId) -> Account {
        self.store
            .get_account(id)
            .await
            .expect("account lookup")
            .expect("account exists")
    }

    /// Reload a job from the store.
    pub async fn job(&self, id: JobId) -> Job {
        self.store
            .get_job(id)
            .await
            .expect("job lookup")
            .expect("job exists")
    }

    /// Find the order materialized for a checkout reference, if any.
    pub async fn order_by_checkout(&self, checkout: &str) -> Option<Order> {
        let mut tx = self.store.begin().await.expect("begin transaction");
        tx.find_order_by_checkout(&CheckoutSessionRef::new(checkout))
            .await
            .expect("order lookup")
    }
}

/// Wrap an event object in the provider's delivery envelope.
#[must_use]
pub fn envelope(event_id: &str, kind: &str, object: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "id": event_id,
        "type": kind,
        "data": { "object": object }
    })
}

/// Unix seconds, for signing deliveries at the current time.
#[must_use]
pub fn unix_now() -> i64 {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before unix epoch")
        .as_secs();
    i64::try_from(secs).expect("timestamp fits in i64")
}

fn test_config() -> PaymentsConfig {
    PaymentsConfig {
        database_url: SecretString::from("postgres://localhost/unused"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        webhook_secret: SecretString::from("whsec_integration_k4VqX92LmJ7w"),
        provider_api: None,
        email: None,
        notify_hub_url: None,
        alert_webhook_url: None,
        price_ids: PriceTierConfig {
            pro: PriceRef::from("price_pro"),
            business: PriceRef::from("price_business"),
        },
        sentry_dsn: None,
    }
}
