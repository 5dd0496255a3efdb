//! Quote lifecycle: submission under quota, exclusive acceptance, and job
//! completion.
//!
//! Every transition runs in one store transaction over locked rows, so two
//! concurrent submissions cannot both slip past the monthly limit and two
//! concurrent acceptances cannot both win a job. Quota check-and-increment
//! happens in the same transaction as the quote insert; the counter moves
//! only when a quote was actually persisted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use toolbelt_core::{AccountId, AccountRole, JobId, JobStatus, Money, QuoteId, QuoteStatus};

use crate::models::{Job, Quote};
use crate::profiles::ProfileCache;
use crate::store::{Store, StoreError};

use super::DomainError;
use super::notify::{NotificationKind, Notifier, Outbound, dispatch_all};

/// Allowance snapshot, as rendered to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    /// Quotes submitted in the current window.
    pub used: u32,
    /// Monthly cap; `None` means unlimited.
    pub limit: Option<u32>,
    /// First instant of the next window.
    pub resets_at: DateTime<Utc>,
}

/// A persisted quote plus the submitter's allowance after it.
#[derive(Debug, Clone)]
pub struct QuoteSubmission {
    pub quote: Quote,
    pub usage: QuotaUsage,
}

/// The winning quote and the job it was accepted onto.
#[derive(Debug, Clone)]
pub struct QuoteAcceptance {
    pub job: Job,
    pub quote: Quote,
}

/// Quote lifecycle service.
pub struct QuoteService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    profiles: ProfileCache,
}

impl QuoteService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, profiles: ProfileCache) -> Self {
        Self {
            store,
            notifier,
            profiles,
        }
    }

    /// Submit a quote on an open job, enforcing the submitter's monthly
    /// allowance.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::QuotaExceeded`] with the current usage when
    /// the entry-tier cap is reached, and precondition errors when the
    /// actor, job, or amounts do not qualify.
    pub async fn submit_quote(
        &self,
        tradesperson_id: AccountId,
        job_id: JobId,
        price: Money,
        deposit: Option<Money>,
    ) -> Result<QuoteSubmission, DomainError> {
        if price <= Money::ZERO {
            return Err(DomainError::NonPositiveAmount);
        }
        if let Some(deposit) = deposit {
            if deposit.is_negative() {
                return Err(DomainError::NonPositiveAmount);
            }
            if deposit > price {
                return Err(DomainError::DepositExceedsPrice);
            }
        }

        let mut tx = self.store.begin().await?;

        let mut account = tx
            .get_account_for_update(tradesperson_id)
            .await?
            .ok_or(DomainError::UnknownAccount)?;
        if account.role == AccountRole::Customer {
            return Err(DomainError::NotTradesperson);
        }

        let mut job = tx
            .get_job_for_update(job_id)
            .await?
            .ok_or(DomainError::UnknownJob)?;
        if !job.status.accepts_quotes() {
            return Err(DomainError::JobNotOpen { status: job.status });
        }

        let now = Utc::now();
        if account.quota.roll_if_elapsed(now) {
            info!(
                account_id = %account.id,
                resets_at = %account.quota.resets_at,
                "quote allowance window rolled"
            );
        }
        let limit = account.subscription.tier.monthly_quote_limit();
        if let Some(limit) = limit {
            if account.quota.used >= limit {
                return Err(DomainError::QuotaExceeded {
                    used: account.quota.used,
                    limit,
                });
            }
        }

        // The counter tracks usage on every tier, capped or not.
        account.quota.record_use();
        account.updated_at = now;
        tx.update_account(&account).await?;

        let quote = Quote::new(job_id, tradesperson_id, price, deposit);
        tx.insert_quote(&quote).await?;

        job.quote_count = job.quote_count.saturating_add(1);
        if job.status == JobStatus::Open {
            job.status = JobStatus::Quoted;
        }
        job.updated_at = now;
        tx.update_job(&job).await?;

        tx.commit().await?;
        self.profiles.invalidate(account.id).await;

        info!(
            quote_id = %quote.id,
            job_id = %job.id,
            tradesperson_id = %tradesperson_id,
            price = %quote.price,
            used = account.quota.used,
            "quote submitted"
        );

        let notifications = self
            .notification_for(
                job.customer_id,
                NotificationKind::QuoteReceived,
                serde_json::json!({
                    "job_id": job.id,
                    "quote_id": quote.id,
                    "price": quote.price.to_string(),
                }),
            )
            .await
            .into_iter()
            .collect();
        dispatch_all(self.notifier.as_ref(), notifications).await;

        Ok(QuoteSubmission {
            quote,
            usage: QuotaUsage {
                used: account.quota.used,
                limit,
                resets_at: account.quota.resets_at,
            },
        })
    }

    /// Accept a quote on behalf of the job's customer.
    ///
    /// The first acceptance to commit wins; any later attempt fails its
    /// precondition because the job has left `open`/`quoted`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotJobCustomer`] for any other actor,
    /// [`DomainError::JobNotOpen`] once the job is assigned, and
    /// [`DomainError::QuoteNotPending`] when the quote itself has moved on.
    pub async fn accept_quote(
        &self,
        actor: AccountId,
        quote_id: QuoteId,
    ) -> Result<QuoteAcceptance, DomainError> {
        let mut tx = self.store.begin().await?;

        let mut quote = tx
            .get_quote_for_update(quote_id)
            .await?
            .ok_or(DomainError::UnknownQuote)?;
        let mut job = tx.get_job_for_update(quote.job_id).await?.ok_or_else(|| {
            DomainError::Store(StoreError::DataCorruption(format!(
                "quote {} references missing job {}",
                quote.id, quote.job_id
            )))
        })?;

        if actor != job.customer_id {
            return Err(DomainError::NotJobCustomer);
        }
        if !job.status.accepts_quotes() {
            return Err(DomainError::JobNotOpen { status: job.status });
        }
        if !quote.status.is_pending() {
            return Err(DomainError::QuoteNotPending {
                status: quote.status,
            });
        }

        let now = Utc::now();
        job.status = JobStatus::Assigned;
        job.tradesperson_id = Some(quote.tradesperson_id);
        job.updated_at = now;
        quote.status = QuoteStatus::Accepted;
        quote.accepted_at = Some(now);

        tx.update_job(&job).await?;
        tx.update_quote(&quote).await?;
        tx.commit().await?;

        info!(
            quote_id = %quote.id,
            job_id = %job.id,
            tradesperson_id = %quote.tradesperson_id,
            "quote accepted, job assigned"
        );

        let payload = serde_json::json!({
            "job_id": job.id,
            "quote_id": quote.id,
            "price": quote.price.to_string(),
        });
        let mut notifications = Vec::new();
        notifications.extend(
            self.notification_for(
                quote.tradesperson_id,
                NotificationKind::QuoteAccepted,
                payload.clone(),
            )
            .await,
        );
        notifications.extend(
            self.notification_for(job.customer_id, NotificationKind::JobAssigned, payload)
                .await,
        );
        dispatch_all(self.notifier.as_ref(), notifications).await;

        Ok(QuoteAcceptance { job, quote })
    }

    /// Mark an assigned job as completed, on behalf of its tradesperson.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::JobNotAssigned`] unless the job is assigned,
    /// and [`DomainError::NotAssignedTradesperson`] for any other actor.
    pub async fn complete_job(&self, actor: AccountId, job_id: JobId) -> Result<Job, DomainError> {
        let mut tx = self.store.begin().await?;

        let mut job = tx
            .get_job_for_update(job_id)
            .await?
            .ok_or(DomainError::UnknownJob)?;

        if job.status != JobStatus::Assigned {
            return Err(DomainError::JobNotAssigned { status: job.status });
        }
        let assigned = job.tradesperson_id.ok_or_else(|| {
            DomainError::Store(StoreError::DataCorruption(format!(
                "assigned job {} has no tradesperson",
                job.id
            )))
        })?;
        if actor != assigned {
            return Err(DomainError::NotAssignedTradesperson);
        }

        let now = Utc::now();
        job.status = JobStatus::Completed;
        job.completed_at = Some(now);
        job.updated_at = now;
        tx.update_job(&job).await?;
        tx.commit().await?;

        info!(job_id = %job.id, tradesperson_id = %assigned, "job completed");

        let notifications = self
            .notification_for(
                job.customer_id,
                NotificationKind::JobCompleted,
                serde_json::json!({ "job_id": job.id }),
            )
            .await
            .into_iter()
            .collect();
        dispatch_all(self.notifier.as_ref(), notifications).await;

        Ok(job)
    }

    /// Current allowance for an account, with an elapsed window shown as
    /// already reset. Read-only; the stored counter moves on submission.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownAccount`] if the account is missing.
    pub async fn quota_status(&self, account_id: AccountId) -> Result<QuotaUsage, DomainError> {
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or(DomainError::UnknownAccount)?;

        let mut quota = account.quota;
        quota.roll_if_elapsed(Utc::now());

        Ok(QuotaUsage {
            used: quota.used,
            limit: account.subscription.tier.monthly_quote_limit(),
            resets_at: quota.resets_at,
        })
    }

    async fn notification_for(
        &self,
        account_id: AccountId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Option<Outbound> {
        match self.profiles.get(account_id).await {
            Ok(Some(profile)) => Some(Outbound::to_profile(&profile, kind, payload)),
            Ok(None) => {
                warn!(%account_id, "notification target account missing");
                None
            }
            Err(err) => {
                warn!(%account_id, error = %err, "could not load notification target");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use toolbelt_core::{Email, Tier};

    use crate::models::Account;
    use crate::services::notify::testing::RecordingNotifier;
    use crate::store::memory::MemoryStore;

    use super::*;

    struct Fixture {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        service: QuoteService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let profiles = ProfileCache::new(store.clone());
        let service = QuoteService::new(store.clone(), notifier.clone(), profiles);
        Fixture {
            store,
            notifier,
            service,
        }
    }

    fn money(s: &str) -> Money {
        Money::from_decimal_str(s).unwrap()
    }

    async fn seed_account(store: &MemoryStore, email: &str, role: AccountRole) -> Account {
        let account = Account::new(Email::parse(email).unwrap(), "Seeded", role);
        store.insert_account(&account).await.unwrap();
        account
    }

    async fn seed_job(store: &MemoryStore, customer: &Account) -> Job {
        let job = Job::new(customer.id, "Fit a new boiler");
        store.insert_job(&job).await.unwrap();
        job
    }

    async fn submit(
        fx: &Fixture,
        tradesperson: &Account,
        job: &Job,
        price: &str,
    ) -> Result<QuoteSubmission, DomainError> {
        fx.service
            .submit_quote(tradesperson.id, job.id, money(price), None)
            .await
    }

    #[tokio::test]
    async fn submission_persists_quote_and_counts_usage() {
        let fx = fixture();
        let customer = seed_account(&fx.store, "customer@example.com", AccountRole::Customer).await;
        let tp = seed_account(&fx.store, "tp@example.com", AccountRole::Tradesperson).await;
        let job = seed_job(&fx.store, &customer).await;

        let submission = submit(&fx, &tp, &job, "120.00").await.unwrap();

        assert_eq!(submission.usage.used, 1);
        assert_eq!(submission.usage.limit, Some(5));
        assert_eq!(submission.quote.status, QuoteStatus::Pending);

        let job = fx.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Quoted);
        assert_eq!(job.quote_count, 1);

        let sent = fx.notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::QuoteReceived);
        assert_eq!(sent[0].account_id, Some(customer.id));
    }

    #[tokio::test]
    async fn sixth_quote_on_entry_tier_is_rejected_with_usage() {
        let fx = fixture();
        let customer = seed_account(&fx.store, "customer@example.com", AccountRole::Customer).await;
        let mut tp = Account::new(
            Email::parse("tp@example.com").unwrap(),
            "Busy Plumber",
            AccountRole::Tradesperson,
        );
        tp.quota.used = 5;
        fx.store.insert_account(&tp).await.unwrap();
        let job = seed_job(&fx.store, &customer).await;

        let err = submit(&fx, &tp, &job, "120.00").await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::QuotaExceeded { used: 5, limit: 5 }
        ));

        // Nothing was written and nobody was notified.
        let job = fx.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.quote_count, 0);
        assert_eq!(job.status, JobStatus::Open);
        let account = fx.store.get_account(tp.id).await.unwrap().unwrap();
        assert_eq!(account.quota.used, 5);
        assert!(fx.notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn elapsed_window_resets_before_the_limit_check() {
        let fx = fixture();
        let customer = seed_account(&fx.store, "customer@example.com", AccountRole::Customer).await;
        let mut tp = Account::new(
            Email::parse("tp@example.com").unwrap(),
            "Returning Plumber",
            AccountRole::Tradesperson,
        );
        tp.quota.used = 5;
        tp.quota.resets_at = Utc::now() - Duration::days(1);
        fx.store.insert_account(&tp).await.unwrap();
        let job = seed_job(&fx.store, &customer).await;

        let submission = submit(&fx, &tp, &job, "120.00").await.unwrap();

        assert_eq!(submission.usage.used, 1);
        assert!(submission.usage.resets_at > Utc::now());
    }

    #[tokio::test]
    async fn paid_tiers_are_uncapped_but_still_counted() {
        let fx = fixture();
        let customer = seed_account(&fx.store, "customer@example.com", AccountRole::Customer).await;
        let mut tp = Account::new(
            Email::parse("tp@example.com").unwrap(),
            "Pro Plumber",
            AccountRole::Tradesperson,
        );
        tp.subscription.tier = Tier::Pro;
        tp.quota.used = 7;
        fx.store.insert_account(&tp).await.unwrap();
        let job = seed_job(&fx.store, &customer).await;

        let submission = submit(&fx, &tp, &job, "120.00").await.unwrap();

        assert_eq!(submission.usage.used, 8);
        assert_eq!(submission.usage.limit, None);
    }

    #[tokio::test]
    async fn customers_cannot_submit_quotes() {
        let fx = fixture();
        let customer = seed_account(&fx.store, "customer@example.com", AccountRole::Customer).await;
        let poser = seed_account(&fx.store, "poser@example.com", AccountRole::Customer).await;
        let job = seed_job(&fx.store, &customer).await;

        let err = submit(&fx, &poser, &job, "120.00").await.unwrap_err();
        assert!(matches!(err, DomainError::NotTradesperson));
    }

    #[tokio::test]
    async fn amounts_are_validated_before_any_read() {
        let fx = fixture();
        let tp_id = AccountId::generate();
        let job_id = JobId::generate();

        let err = fx
            .service
            .submit_quote(tp_id, job_id, Money::ZERO, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NonPositiveAmount));

        let err = fx
            .service
            .submit_quote(tp_id, job_id, money("100.00"), Some(money("150.00")))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DepositExceedsPrice));

        let err = fx
            .service
            .submit_quote(tp_id, job_id, money("100.00"), Some(Money::from_minor(-1)))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NonPositiveAmount));
    }

    #[tokio::test]
    async fn acceptance_assigns_job_and_leaves_siblings_pending() {
        let fx = fixture();
        let customer = seed_account(&fx.store, "customer@example.com", AccountRole::Customer).await;
        let alice = seed_account(&fx.store, "alice@example.com", AccountRole::Tradesperson).await;
        let bob = seed_account(&fx.store, "bob@example.com", AccountRole::Tradesperson).await;
        let job = seed_job(&fx.store, &customer).await;

        let quote_a = submit(&fx, &alice, &job, "100.00").await.unwrap().quote;
        let quote_b = submit(&fx, &bob, &job, "90.00").await.unwrap().quote;

        let accepted = fx
            .service
            .accept_quote(customer.id, quote_a.id)
            .await
            .unwrap();
        assert_eq!(accepted.quote.status, QuoteStatus::Accepted);
        assert!(accepted.quote.accepted_at.is_some());
        assert_eq!(accepted.job.status, JobStatus::Assigned);

        let job = fx.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Assigned);
        assert_eq!(job.tradesperson_id, Some(alice.id));

        // The losing quote stays pending, but can no longer be accepted.
        let sibling = fx.store.get_quote(quote_b.id).await.unwrap().unwrap();
        assert_eq!(sibling.status, QuoteStatus::Pending);
        let err = fx
            .service
            .accept_quote(customer.id, quote_b.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::JobNotOpen {
                status: JobStatus::Assigned
            }
        ));
    }

    #[tokio::test]
    async fn concurrent_acceptances_produce_exactly_one_winner() {
        let fx = fixture();
        let customer = seed_account(&fx.store, "customer@example.com", AccountRole::Customer).await;
        let alice = seed_account(&fx.store, "alice@example.com", AccountRole::Tradesperson).await;
        let bob = seed_account(&fx.store, "bob@example.com", AccountRole::Tradesperson).await;
        let job = seed_job(&fx.store, &customer).await;

        let quote_a = submit(&fx, &alice, &job, "100.00").await.unwrap().quote;
        let quote_b = submit(&fx, &bob, &job, "90.00").await.unwrap().quote;

        let (first, second) = tokio::join!(
            fx.service.accept_quote(customer.id, quote_a.id),
            fx.service.accept_quote(customer.id, quote_b.id),
        );

        let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(loser, Err(DomainError::JobNotOpen { .. })));

        let job = fx.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Assigned);
        assert!(job.tradesperson_id == Some(alice.id) || job.tradesperson_id == Some(bob.id));
    }

    #[tokio::test]
    async fn only_the_jobs_customer_can_accept() {
        let fx = fixture();
        let customer = seed_account(&fx.store, "customer@example.com", AccountRole::Customer).await;
        let stranger = seed_account(&fx.store, "stranger@example.com", AccountRole::Customer).await;
        let tp = seed_account(&fx.store, "tp@example.com", AccountRole::Tradesperson).await;
        let job = seed_job(&fx.store, &customer).await;
        let quote = submit(&fx, &tp, &job, "100.00").await.unwrap().quote;

        let err = fx
            .service
            .accept_quote(stranger.id, quote.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotJobCustomer));
    }

    #[tokio::test]
    async fn non_pending_quotes_cannot_be_accepted() {
        let fx = fixture();
        let customer = seed_account(&fx.store, "customer@example.com", AccountRole::Customer).await;
        let tp = seed_account(&fx.store, "tp@example.com", AccountRole::Tradesperson).await;
        let job = seed_job(&fx.store, &customer).await;

        let mut expired = Quote::new(job.id, tp.id, money("80.00"), None);
        expired.status = QuoteStatus::Expired;
        let mut tx = fx.store.begin().await.unwrap();
        tx.insert_quote(&expired).await.unwrap();
        tx.commit().await.unwrap();

        let err = fx
            .service
            .accept_quote(customer.id, expired.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::QuoteNotPending {
                status: QuoteStatus::Expired
            }
        ));
    }

    #[tokio::test]
    async fn completion_requires_the_assigned_tradesperson() {
        let fx = fixture();
        let customer = seed_account(&fx.store, "customer@example.com", AccountRole::Customer).await;
        let tp = seed_account(&fx.store, "tp@example.com", AccountRole::Tradesperson).await;
        let rival = seed_account(&fx.store, "rival@example.com", AccountRole::Tradesperson).await;
        let job = seed_job(&fx.store, &customer).await;
        let quote = submit(&fx, &tp, &job, "100.00").await.unwrap().quote;
        fx.service
            .accept_quote(customer.id, quote.id)
            .await
            .unwrap();

        let err = fx
            .service
            .complete_job(rival.id, job.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotAssignedTradesperson));

        let done = fx.service.complete_job(tp.id, job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn open_jobs_cannot_be_completed() {
        let fx = fixture();
        let customer = seed_account(&fx.store, "customer@example.com", AccountRole::Customer).await;
        let tp = seed_account(&fx.store, "tp@example.com", AccountRole::Tradesperson).await;
        let job = seed_job(&fx.store, &customer).await;

        let err = fx
            .service
            .complete_job(tp.id, job.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::JobNotAssigned {
                status: JobStatus::Open
            }
        ));
    }

    #[tokio::test]
    async fn quota_status_previews_an_elapsed_window_as_reset() {
        let fx = fixture();
        let mut tp = Account::new(
            Email::parse("tp@example.com").unwrap(),
            "Plumber",
            AccountRole::Tradesperson,
        );
        tp.quota.used = 4;
        tp.quota.resets_at = Utc::now() - Duration::hours(2);
        fx.store.insert_account(&tp).await.unwrap();

        let usage = fx.service.quota_status(tp.id).await.unwrap();
        assert_eq!(usage.used, 0);
        assert_eq!(usage.limit, Some(5));

        // Preview only: the stored counter is untouched.
        let stored = fx.store.get_account(tp.id).await.unwrap().unwrap();
        assert_eq!(stored.quota.used, 4);
    }

    #[tokio::test]
    async fn full_lifecycle_scenario() {
        let fx = fixture();
        let customer = seed_account(&fx.store, "customer@example.com", AccountRole::Customer).await;
        let alice = seed_account(&fx.store, "alice@example.com", AccountRole::Tradesperson).await;
        let bob = seed_account(&fx.store, "bob@example.com", AccountRole::Tradesperson).await;
        let job = seed_job(&fx.store, &customer).await;

        // Alice quotes from a fresh entry-tier allowance.
        let submission = submit(&fx, &alice, &job, "250.00").await.unwrap();
        assert_eq!(submission.usage.used, 1);
        let quote_a = submission.quote;
        let quote_b = submit(&fx, &bob, &job, "240.00").await.unwrap().quote;

        // Customer accepts Alice; Bob's quote is stranded pending.
        fx.service
            .accept_quote(customer.id, quote_a.id)
            .await
            .unwrap();
        let job_after = fx.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job_after.status, JobStatus::Assigned);
        assert_eq!(job_after.tradesperson_id, Some(alice.id));
        assert!(matches!(
            fx.service.accept_quote(customer.id, quote_b.id).await,
            Err(DomainError::JobNotOpen { .. })
        ));

        // Alice finishes the work.
        let done = fx.service.complete_job(alice.id, job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);

        // Customer heard about the quotes, the assignment, and completion;
        // Alice heard about the acceptance.
        let sent = fx.notifier.sent.lock().await;
        let kinds: Vec<_> = sent.iter().map(|o| o.kind).collect();
        assert!(kinds.contains(&NotificationKind::QuoteReceived));
        assert!(kinds.contains(&NotificationKind::QuoteAccepted));
        assert!(kinds.contains(&NotificationKind::JobAssigned));
        assert!(kinds.contains(&NotificationKind::JobCompleted));
    }
}
