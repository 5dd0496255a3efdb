//! Subscription state synchronization.
//!
//! Provider subscription events mutate exactly one account's embedded
//! subscription state, inside one transaction together with the event
//! ledger row. The webhook acknowledges regardless of local storage
//! health: writes run under a bounded retry, and an exhausted retry is
//! alerted and abandoned rather than bounced back to the provider.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use toolbelt_core::{
    AccountId, AccountRole, CustomerRef, EventId, PriceRef, SubscriptionRef, SubscriptionStatus,
    Tier,
};

use crate::alerts::AlertSink;
use crate::models::{Account, DomainRef, ProcessedEvent};
use crate::profiles::ProfileCache;
use crate::provider::{CheckoutSession, EventMetadata, InvoiceEvent, SubscriptionEvent};
use crate::retry::{RetryPolicy, retry_with_policy};
use crate::store::{Store, StoreError, StoreTx};

use super::notify::{NotificationKind, Notifier, Outbound, dispatch_all};

/// A provider-reported change to one subscription.
#[derive(Debug, Clone)]
pub enum SubscriptionChange {
    /// The subscription exists and reports this state.
    Upsert {
        subscription: SubscriptionRef,
        customer: Option<CustomerRef>,
        status: SubscriptionStatus,
        metadata: EventMetadata,
        price: Option<PriceRef>,
    },
    /// The subscription ended; the account falls back to the entry tier.
    Delete {
        subscription: SubscriptionRef,
        customer: Option<CustomerRef>,
        status: SubscriptionStatus,
        metadata: EventMetadata,
    },
    /// A renewal invoice failed to collect.
    PaymentFailed {
        customer: Option<CustomerRef>,
        subscription: Option<SubscriptionRef>,
        metadata: EventMetadata,
    },
}

impl SubscriptionChange {
    /// Change carried by `customer.subscription.created` / `.updated`.
    #[must_use]
    pub fn upsert(event: SubscriptionEvent) -> Self {
        let price = event.price().cloned();
        Self::Upsert {
            subscription: event.id,
            customer: event.customer,
            status: event.status,
            metadata: event.metadata,
            price,
        }
    }

    /// Change carried by `customer.subscription.deleted`.
    #[must_use]
    pub fn delete(event: SubscriptionEvent) -> Self {
        Self::Delete {
            subscription: event.id,
            customer: event.customer,
            status: event.status,
            metadata: event.metadata,
        }
    }

    /// Change carried by `invoice.payment_failed`.
    #[must_use]
    pub fn payment_failed(event: InvoiceEvent) -> Self {
        Self::PaymentFailed {
            customer: event.customer,
            subscription: event.subscription,
            metadata: event.metadata,
        }
    }

    /// Change carried by a subscription-mode checkout completion.
    ///
    /// `None` when the session carries no subscription reference yet; the
    /// provider's own `subscription.created` event follows with the full
    /// state.
    #[must_use]
    pub fn subscription_checkout(session: &CheckoutSession) -> Option<Self> {
        let subscription = session.subscription.clone()?;
        Some(Self::Upsert {
            subscription,
            customer: session.customer.clone(),
            status: SubscriptionStatus::Active,
            metadata: session.metadata.clone(),
            price: None,
        })
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Upsert { .. } => "upsert",
            Self::Delete { .. } => "delete",
            Self::PaymentFailed { .. } => "payment_failed",
        }
    }

    const fn resolution_keys(&self) -> (&EventMetadata, Option<&CustomerRef>) {
        match self {
            Self::Upsert {
                metadata, customer, ..
            }
            | Self::Delete {
                metadata, customer, ..
            }
            | Self::PaymentFailed {
                metadata, customer, ..
            } => (metadata, customer.as_ref()),
        }
    }
}

/// What applying a change did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The account now reflects the event.
    Applied { account_id: AccountId },
    /// The event id was already in the ledger; nothing changed.
    Duplicate,
    /// No account matched the event; nothing was written.
    NoAccount,
    /// Storage kept failing; the event was alerted and dropped.
    Abandoned,
}

/// Subscription synchronization service.
pub struct SubscriptionService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    profiles: ProfileCache,
    alerts: Arc<dyn AlertSink>,
    price_tiers: HashMap<PriceRef, Tier>,
    retry: RetryPolicy,
}

impl SubscriptionService {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        profiles: ProfileCache,
        alerts: Arc<dyn AlertSink>,
        price_tiers: HashMap<PriceRef, Tier>,
    ) -> Self {
        Self {
            store,
            notifier,
            profiles,
            alerts,
            price_tiers,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the write retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Apply a subscription change, exactly once per event id.
    ///
    /// Never returns an error: a storage fault that survives the
    /// retries is logged, alerted, and reported as
    /// [`SyncOutcome::Abandoned`] so the webhook can still acknowledge.
    pub async fn apply(&self, event_id: EventId, change: SubscriptionChange) -> SyncOutcome {
        let attempt = retry_with_policy(
            &self.retry,
            "subscription-sync",
            StoreError::is_retryable,
            || self.apply_once(&event_id, &change),
        )
        .await;

        match attempt {
            Ok((outcome, notifications)) => {
                if let SyncOutcome::Applied { account_id } = outcome {
                    self.profiles.invalidate(account_id).await;
                }
                dispatch_all(self.notifier.as_ref(), notifications).await;
                outcome
            }
            Err(err) => {
                error!(
                    %event_id,
                    kind = change.kind(),
                    error = %err,
                    "subscription sync abandoned after retries"
                );
                self.alerts
                    .fire(
                        "subscription sync abandoned",
                        &format!("event {event_id} ({}) was not applied: {err}", change.kind()),
                    )
                    .await;
                SyncOutcome::Abandoned
            }
        }
    }

    async fn apply_once(
        &self,
        event_id: &EventId,
        change: &SubscriptionChange,
    ) -> Result<(SyncOutcome, Vec<Outbound>), StoreError> {
        let mut tx = self.store.begin().await?;

        if tx.find_processed_event(event_id).await?.is_some() {
            debug!(%event_id, "subscription event already processed");
            return Ok((SyncOutcome::Duplicate, Vec::new()));
        }

        let Some(mut account) = self.resolve_account(tx.as_mut(), change).await? else {
            warn!(%event_id, kind = change.kind(), "no account matches subscription event");
            return Ok((SyncOutcome::NoAccount, Vec::new()));
        };

        let mut notifications = Vec::new();
        match change {
            SubscriptionChange::Upsert {
                subscription,
                customer,
                status,
                metadata,
                price,
            } => {
                account.subscription.status = *status;
                account.subscription.subscription_ref = Some(subscription.clone());
                if let Some(customer) = customer {
                    account.subscription.customer_ref = Some(customer.clone());
                }
                match self.tier_for(metadata, price.as_ref()) {
                    Some(tier) => apply_tier(&mut account, tier),
                    None => warn!(
                        account_id = %account.id,
                        "event names no known tier, keeping the current one"
                    ),
                }
            }
            SubscriptionChange::Delete { status, .. } => {
                // Provider references are kept for the audit trail.
                account.subscription.status = *status;
                apply_tier(&mut account, Tier::Basic);
            }
            SubscriptionChange::PaymentFailed { subscription, .. } => {
                account.subscription.status = SubscriptionStatus::PastDue;
                notifications.push(Outbound::to_account(
                    &account,
                    NotificationKind::SubscriptionPaymentFailed,
                    serde_json::json!({
                        "subscription_ref": subscription,
                        "status": SubscriptionStatus::PastDue,
                    }),
                ));
            }
        }

        account.updated_at = Utc::now();
        tx.update_account(&account).await?;
        tx.insert_processed_event(&ProcessedEvent::new(
            event_id.clone(),
            Some(DomainRef::Account(account.id)),
        ))
        .await?;
        tx.commit().await?;

        info!(
            %event_id,
            account_id = %account.id,
            kind = change.kind(),
            tier = %account.subscription.tier,
            status = %account.subscription.status,
            role = %account.role,
            "subscription state applied"
        );

        Ok((
            SyncOutcome::Applied {
                account_id: account.id,
            },
            notifications,
        ))
    }

    /// Resolve the event to an account: checkout metadata first, then the
    /// provider customer reference. The first hit wins.
    async fn resolve_account(
        &self,
        tx: &mut dyn StoreTx,
        change: &SubscriptionChange,
    ) -> Result<Option<Account>, StoreError> {
        let (metadata, customer) = change.resolution_keys();

        if let Some(raw) = metadata.account_id.as_deref() {
            match raw.parse::<AccountId>() {
                Ok(id) => {
                    if let Some(account) = tx.get_account_for_update(id).await? {
                        info!(account_id = %account.id, strategy = "metadata", "account resolved");
                        return Ok(Some(account));
                    }
                    warn!(account_id = %id, "event metadata names a missing account");
                }
                Err(err) => {
                    warn!(metadata_account_id = raw, error = %err, "unparseable account id in event metadata");
                }
            }
        }

        if let Some(customer) = customer {
            if let Some(account) = tx.find_account_by_customer_ref(customer).await? {
                // Metadata should have carried the account id; falling back
                // to the customer reference points at a checkout-creation gap.
                warn!(
                    account_id = %account.id,
                    customer_ref = %customer,
                    strategy = "customer_ref",
                    "account resolved by customer reference only"
                );
                return Ok(Some(account));
            }
        }

        Ok(None)
    }

    fn tier_for(&self, metadata: &EventMetadata, price: Option<&PriceRef>) -> Option<Tier> {
        if let Some(raw) = metadata.tier.as_deref() {
            match raw.parse::<Tier>() {
                Ok(tier) => return Some(tier),
                Err(err) => warn!(metadata_tier = raw, error = %err, "unparseable tier in event metadata"),
            }
        }
        price.and_then(|price| self.price_tiers.get(price).copied())
    }
}

/// Move the account to `tier` and keep the role coupled to it.
///
/// The top tier grants the business-owner role and records the grant in
/// `role_promoted`; leaving the top tier reverts the role only when that
/// flag is set, so a manually assigned role survives downgrades.
fn apply_tier(account: &mut Account, tier: Tier) {
    account.subscription.tier = tier;
    if tier.is_top() {
        if account.role != AccountRole::BusinessOwner {
            account.role = AccountRole::BusinessOwner;
            account.role_promoted = true;
            info!(account_id = %account.id, "role promoted to business owner");
        }
    } else if account.role_promoted {
        account.role = AccountRole::Tradesperson;
        account.role_promoted = false;
        info!(account_id = %account.id, "promoted role reverted to tradesperson");
    }
}
