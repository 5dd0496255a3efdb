//! Application state shared across handlers.

use std::sync::Arc;

use crate::alerts::AlertSink;
use crate::config::PaymentsConfig;
use crate::profiles::ProfileCache;
use crate::provider::CheckoutLookup;
use crate::services::notify::Notifier;
use crate::services::orders::OrderService;
use crate::services::quotes::QuoteService;
use crate::services::subscriptions::SubscriptionService;
use crate::store::Store;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the store, the domain services, and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: PaymentsConfig,
    store: Arc<dyn Store>,
    orders: OrderService,
    quotes: QuoteService,
    subscriptions: SubscriptionService,
    checkout_lookup: Option<Arc<dyn CheckoutLookup>>,
}

impl AppState {
    /// Wire the domain services over a store and outbound channels.
    ///
    /// `checkout_lookup` is `None` when no provider API credentials are
    /// configured; webhook handling then relies on payloads carrying their
    /// own line items.
    #[must_use]
    pub fn new(
        config: PaymentsConfig,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        alerts: Arc<dyn AlertSink>,
        checkout_lookup: Option<Arc<dyn CheckoutLookup>>,
    ) -> Self {
        // Services share one cache so an invalidation in either is seen
        // by both.
        let profiles = ProfileCache::new(Arc::clone(&store));
        let orders = OrderService::new(Arc::clone(&store), Arc::clone(&notifier));
        let quotes = QuoteService::new(
            Arc::clone(&store),
            Arc::clone(&notifier),
            profiles.clone(),
        );
        let subscriptions = SubscriptionService::new(
            Arc::clone(&store),
            notifier,
            profiles,
            alerts,
            config.price_ids.table(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                orders,
                quotes,
                subscriptions,
                checkout_lookup,
            }),
        }
    }

    /// Get a reference to the service configuration.
    #[must_use]
    pub fn config(&self) -> &PaymentsConfig {
        &self.inner.config
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// Get a reference to the order materialization service.
    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    /// Get a reference to the quote lifecycle service.
    #[must_use]
    pub fn quotes(&self) -> &QuoteService {
        &self.inner.quotes
    }

    /// Get a reference to the subscription synchronizer.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionService {
        &self.inner.subscriptions
    }

    /// Get the provider REST client, if one is configured.
    #[must_use]
    pub fn checkout_lookup(&self) -> Option<&dyn CheckoutLookup> {
        self.inner.checkout_lookup.as_deref()
    }
}
