//! Payments service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PAYMENTS_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`)
//! - `PAYMENTS_WEBHOOK_SECRET` - Shared secret for webhook signature
//!   verification (placeholder and entropy checked)
//!
//! ## Optional
//! - `PAYMENTS_HOST` - Bind address (default: 127.0.0.1)
//! - `PAYMENTS_PORT` - Listen port (default: 3002)
//! - `PROVIDER_API_URL` / `PROVIDER_API_KEY` - Provider REST API for checkout
//!   snapshot lookups; set both or neither
//! - `SMTP_HOST` / `SMTP_PORT` / `SMTP_USERNAME` / `SMTP_PASSWORD` /
//!   `SMTP_FROM` - Email notifications; all required once any is set
//!   (`SMTP_PORT` defaults to 587)
//! - `NOTIFY_HUB_URL` - In-app notification hub endpoint
//! - `ALERT_WEBHOOK_URL` - Incoming webhook for operational alerts
//! - `PRICE_ID_PRO` / `PRICE_ID_BUSINESS` - Provider price ids mapped to
//!   subscription tiers (defaults: `price_pro`, `price_business`)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use toolbelt_core::{PriceRef, Tier};

/// Entropy floor for signing secrets, in Shannon bits per character. A
/// randomly generated 32-character key clears this comfortably; dictionary
/// words and repeated characters do not.
const MIN_SECRET_ENTROPY: f64 = 3.3;

/// Substrings that mark a secret as an unfilled template value.
const PLACEHOLDER_MARKERS: &[&str] = &[
    "your-", "changeme", "replace", "placeholder", "example", "secret", "password", "xxx", "todo",
    "fixme", "insert", "enter-", "put-your", "add-your",
];

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingEnvVar(String),
    #[error("invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Payments service configuration.
#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    /// `PostgreSQL` connection URL (contains credentials)
    pub database_url: SecretString,
    /// Address the server binds to
    pub host: IpAddr,
    /// Port the server listens on
    pub port: u16,
    /// Webhook signature shared secret
    pub webhook_secret: SecretString,
    /// Provider REST API access, when checkout snapshot lookups are enabled
    pub provider_api: Option<ProviderApiConfig>,
    /// SMTP email delivery, when configured
    pub email: Option<EmailConfig>,
    /// In-app notification hub endpoint, when configured
    pub notify_hub_url: Option<Url>,
    /// Operational alert webhook, when configured
    pub alert_webhook_url: Option<Url>,
    /// Provider price ids mapped to tiers
    pub price_ids: PriceTierConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl PaymentsConfig {
    /// Load configuration from the environment, reading `.env` first when
    /// one is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or
    /// unparseable, or when a secret looks like a placeholder or has too
    /// little entropy.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: database_url_from_env("PAYMENTS_DATABASE_URL")?,
            host: parsed_var_or("PAYMENTS_HOST", "127.0.0.1")?,
            port: parsed_var_or("PAYMENTS_PORT", "3002")?,
            webhook_secret: vetted_secret("PAYMENTS_WEBHOOK_SECRET")?,
            provider_api: ProviderApiConfig::from_env()?,
            email: EmailConfig::from_env()?,
            notify_hub_url: optional_url("NOTIFY_HUB_URL")?,
            alert_webhook_url: optional_url("ALERT_WEBHOOK_URL")?,
            price_ids: PriceTierConfig::from_env(),
            sentry_dsn: optional_var("SENTRY_DSN"),
        })
    }

    /// The socket address the server binds to.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Provider REST API access configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct ProviderApiConfig {
    /// Base URL of the provider REST API
    pub base_url: Url,
    /// Server-side API key
    pub api_key: SecretString,
}

impl std::fmt::Debug for ProviderApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl ProviderApiConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        match (optional_var("PROVIDER_API_URL"), optional_var("PROVIDER_API_KEY")) {
            (Some(url), Some(key)) => {
                vet_secret(&key, "PROVIDER_API_KEY")?;
                let base_url = url.parse::<Url>().map_err(|e| {
                    ConfigError::InvalidEnvVar("PROVIDER_API_URL".to_string(), e.to_string())
                })?;
                Ok(Some(Self {
                    base_url,
                    api_key: SecretString::from(key),
                }))
            }
            (None, None) => Ok(None),
            // One without the other is a deployment mistake, not a disabled
            // feature.
            (Some(_), None) => Err(ConfigError::MissingEnvVar("PROVIDER_API_KEY".to_string())),
            (None, Some(_)) => Err(ConfigError::MissingEnvVar("PROVIDER_API_URL".to_string())),
        }
    }
}

/// SMTP email delivery configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP relay hostname
    pub smtp_host: String,
    /// SMTP relay port (STARTTLS)
    pub smtp_port: u16,
    /// SMTP username
    pub smtp_username: String,
    /// SMTP password
    pub smtp_password: SecretString,
    /// From address for outgoing mail
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        if std::env::var("SMTP_HOST").is_err() {
            // Catch half-set SMTP configuration instead of silently
            // disabling email.
            for key in ["SMTP_PORT", "SMTP_USERNAME", "SMTP_PASSWORD", "SMTP_FROM"] {
                if std::env::var(key).is_ok() {
                    return Err(ConfigError::MissingEnvVar("SMTP_HOST".to_string()));
                }
            }
            return Ok(None);
        }

        Ok(Some(Self {
            smtp_host: required_var("SMTP_HOST")?,
            smtp_port: parsed_var_or("SMTP_PORT", "587")?,
            smtp_username: required_var("SMTP_USERNAME")?,
            smtp_password: required_var("SMTP_PASSWORD").map(SecretString::from)?,
            from_address: required_var("SMTP_FROM")?,
        }))
    }
}

/// Provider price ids mapped to subscription tiers.
#[derive(Debug, Clone)]
pub struct PriceTierConfig {
    /// Price id sold for the pro tier
    pub pro: PriceRef,
    /// Price id sold for the business tier
    pub business: PriceRef,
}

impl PriceTierConfig {
    fn from_env() -> Self {
        Self {
            pro: PriceRef::from(var_or("PRICE_ID_PRO", "price_pro")),
            business: PriceRef::from(var_or("PRICE_ID_BUSINESS", "price_business")),
        }
    }

    /// Lookup table used when an event carries a price id but no tier.
    #[must_use]
    pub fn table(&self) -> HashMap<PriceRef, Tier> {
        HashMap::from([
            (self.pro.clone(), Tier::Pro),
            (self.business.clone(), Tier::Business),
        ])
    }
}

fn required_var(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_var_or<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var_or(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn optional_url(key: &str) -> Result<Option<Url>, ConfigError> {
    optional_var(key)
        .map(|raw| {
            raw.parse::<Url>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
        .transpose()
}

/// The service-specific variable wins; `DATABASE_URL` is what a managed
/// postgres attach exports.
fn database_url_from_env(primary_key: &str) -> Result<SecretString, ConfigError> {
    std::env::var(primary_key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Shannon entropy of `s`, in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    let mut counts: HashMap<char, f64> = HashMap::new();
    let mut len = 0.0_f64;
    for c in s.chars() {
        *counts.entry(c).or_insert(0.0) += 1.0;
        len += 1.0;
    }
    if len == 0.0 {
        return 0.0;
    }

    counts
        .into_values()
        .map(|count| {
            let p = count / len;
            -p * p.log2()
        })
        .sum()
}

/// Reject secrets that are template placeholders or too uniform to have
/// been randomly generated.
fn vet_secret(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();
    if let Some(marker) = PLACEHOLDER_MARKERS.iter().find(|m| lower.contains(**m)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("looks like a placeholder (contains {marker:?})"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_SECRET_ENTROPY {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_SECRET_ENTROPY:.1}); use a randomly generated value"
            ),
        ));
    }

    Ok(())
}

fn vetted_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = required_var(key)?;
    vet_secret(&value, key)?;
    Ok(SecretString::from(value))
}
