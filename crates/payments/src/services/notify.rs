//! Notification dispatch.
//!
//! Services collect [`Outbound`] notifications while a transaction is open
//! and hand them to [`dispatch_all`] only after the commit succeeds, so a
//! rollback never produces email. Delivery failures are logged and dropped;
//! notifications are not part of any financial invariant.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use toolbelt_core::{AccountId, Email};

use crate::config::EmailConfig;
use crate::models::Account;

/// What happened, from the recipient's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    QuoteReceived,
    QuoteAccepted,
    JobAssigned,
    JobCompleted,
    OrderConfirmed,
    SubscriptionPaymentFailed,
}

impl NotificationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QuoteReceived => "quote_received",
            Self::QuoteAccepted => "quote_accepted",
            Self::JobAssigned => "job_assigned",
            Self::JobCompleted => "job_completed",
            Self::OrderConfirmed => "order_confirmed",
            Self::SubscriptionPaymentFailed => "subscription_payment_failed",
        }
    }

    const fn subject(self) -> &'static str {
        match self {
            Self::QuoteReceived => "You have a new quote",
            Self::QuoteAccepted => "Your quote was accepted",
            Self::JobAssigned => "Your job has been assigned",
            Self::JobCompleted => "Your job is complete",
            Self::OrderConfirmed => "Your Toolbelt order is confirmed",
            Self::SubscriptionPaymentFailed => "Action needed: subscription payment failed",
        }
    }

    const fn body(self) -> &'static str {
        match self {
            Self::QuoteReceived => {
                "A tradesperson has quoted on your job. Sign in to review it."
            }
            Self::QuoteAccepted => {
                "The customer accepted your quote. The job is now yours."
            }
            Self::JobAssigned => {
                "You accepted a quote and the job is assigned. The tradesperson has been notified."
            }
            Self::JobCompleted => {
                "Your tradesperson marked the job as complete. Sign in to review the work."
            }
            Self::OrderConfirmed => {
                "Thanks for your order. We have received your payment and will be in touch when it ships."
            }
            Self::SubscriptionPaymentFailed => {
                "We could not collect your latest subscription payment. Please update your payment details to keep your plan."
            }
        }
    }
}

/// One notification waiting to be delivered after commit.
#[derive(Debug, Clone, Serialize)]
pub struct Outbound {
    pub account_id: Option<AccountId>,
    pub email: Option<Email>,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

impl Outbound {
    /// Notification for an account holder.
    #[must_use]
    pub fn to_account(account: &Account, kind: NotificationKind, payload: serde_json::Value) -> Self {
        Self {
            account_id: Some(account.id),
            email: Some(account.email.clone()),
            kind,
            payload,
        }
    }

    /// Notification for a cached profile.
    #[must_use]
    pub fn to_profile(
        profile: &crate::profiles::Profile,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            account_id: Some(profile.account_id),
            email: Some(profile.email.clone()),
            kind,
            payload,
        }
    }

}

/// Delivery failures.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Notification hub request failed: {0}")]
    Hub(#[from] reqwest::Error),

    #[error("Notification hub returned {0}")]
    HubStatus(reqwest::StatusCode),
}

/// Delivery seam; tests substitute a recording implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, outbound: &Outbound) -> Result<(), NotifyError>;
}

/// Deliver a post-commit batch, logging failures instead of propagating
/// them.
pub async fn dispatch_all(notifier: &dyn Notifier, batch: Vec<Outbound>) {
    for outbound in batch {
        if let Err(err) = notifier.deliver(&outbound).await {
            warn!(
                kind = outbound.kind.as_str(),
                account_id = ?outbound.account_id,
                error = %err,
                "notification delivery failed"
            );
        }
    }
}

/// Production notifier: SMTP email plus an optional in-app notification hub.
///
/// Either channel can be absent; with both unconfigured every delivery is a
/// logged no-op.
pub struct CompositeNotifier {
    email: Option<EmailChannel>,
    hub: Option<HubChannel>,
}

struct EmailChannel {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

struct HubChannel {
    http: reqwest::Client,
    url: Url,
}

impl CompositeNotifier {
    /// Build from optional channel configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay or HTTP client cannot be constructed.
    pub fn new(email: Option<&EmailConfig>, hub_url: Option<Url>) -> Result<Self, NotifyError> {
        let email = match email {
            Some(config) => {
                let credentials = Credentials::new(
                    config.smtp_username.clone(),
                    config.smtp_password.expose_secret().to_string(),
                );
                let mailer =
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
                        .port(config.smtp_port)
                        .credentials(credentials)
                        .build();
                Some(EmailChannel {
                    mailer,
                    from_address: config.from_address.clone(),
                })
            }
            None => None,
        };

        let hub = match hub_url {
            Some(url) => Some(HubChannel {
                http: reqwest::Client::builder()
                    .timeout(std::time::Duration::from_secs(10))
                    .build()?,
                url,
            }),
            None => None,
        };

        Ok(Self { email, hub })
    }

    /// A notifier with no channels configured.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            email: None,
            hub: None,
        }
    }
}

impl EmailChannel {
    async fn send(&self, to: &Email, kind: NotificationKind) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| NotifyError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .as_str()
                .parse()
                .map_err(|_| NotifyError::InvalidAddress(to.to_string()))?)
            .subject(kind.subject())
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(kind.body().to_owned()),
            )?;

        self.mailer.send(message).await?;
        info!(to = %to, kind = kind.as_str(), "notification email sent");
        Ok(())
    }
}

impl HubChannel {
    async fn send(&self, outbound: &Outbound) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(self.url.clone())
            .json(outbound)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::HubStatus(response.status()));
        }
        Ok(())
    }
}


#[async_trait]
impl Notifier for CompositeNotifier {
    async fn deliver(&self, outbound: &Outbound) -> Result<(), NotifyError> {
        if self.email.is_none() && self.hub.is_none() {
            debug!(kind = outbound.kind.as_str(), "notification channels disabled, dropping");
            return Ok(());
        }

        // Attempt both channels before reporting the first failure.
        let mut first_error = None;

        if let (Some(channel), Some(to)) = (&self.email, &outbound.email) {
            if let Err(err) = channel.send(to, outbound.kind).await {
                first_error = Some(err);
            }
        }

        if let Some(hub) = &self.hub {
            if let Err(err) = hub.send(outbound).await {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
