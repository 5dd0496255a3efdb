//! REST client for the payment provider.
//!
//! Webhook deliveries do not always embed line items, and a
//! `payment_intent.succeeded` event carries no session at all. The
//! [`CheckoutLookup`] seam lets the webhook handlers re-fetch the full
//! checkout session; tests substitute a stub.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use toolbelt_core::{CheckoutSessionRef, PaymentIntentRef};

use super::events::CheckoutSession;

/// Provider API failures.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid provider URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Read access to checkout sessions.
#[async_trait]
pub trait CheckoutLookup: Send + Sync {
    /// Fetch a checkout session by its reference, with line items expanded.
    async fn checkout_by_ref(
        &self,
        checkout: &CheckoutSessionRef,
    ) -> Result<Option<CheckoutSession>, ProviderError>;

    /// Find the checkout session that produced a payment intent.
    async fn checkout_by_intent(
        &self,
        intent: &PaymentIntentRef,
    ) -> Result<Option<CheckoutSession>, ProviderError>;
}

/// [`CheckoutLookup`] over the provider's REST API.
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
}

impl HttpProviderClient {
    /// Build a client against `base_url` (e.g. `https://api.provider.com/v1/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(base_url: Url, api_key: SecretString) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<Option<T>, ProviderError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        Ok(Some(response.json().await?))
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ListResponse<T> {
    #[serde(default)]
    data: Vec<T>,
}

#[async_trait]
impl CheckoutLookup for HttpProviderClient {
    async fn checkout_by_ref(
        &self,
        checkout: &CheckoutSessionRef,
    ) -> Result<Option<CheckoutSession>, ProviderError> {
        let mut url = self
            .base_url
            .join(&format!("checkout/sessions/{checkout}"))?;
        url.query_pairs_mut().append_pair("expand[]", "line_items");

        debug!(checkout = %checkout, "fetching checkout session");
        self.get_json(url).await
    }

    async fn checkout_by_intent(
        &self,
        intent: &PaymentIntentRef,
    ) -> Result<Option<CheckoutSession>, ProviderError> {
        let mut url = self.base_url.join("checkout/sessions")?;
        url.query_pairs_mut()
            .append_pair("payment_intent", intent.as_str())
            .append_pair("expand[]", "data.line_items");

        debug!(intent = %intent, "looking up checkout session by payment intent");
        let list: Option<ListResponse<CheckoutSession>> = self.get_json(url).await?;
        Ok(list.and_then(|list| list.data.into_iter().next()))
    }
}
