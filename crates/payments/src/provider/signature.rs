//! Webhook signature verification.
//!
//! The provider signs each delivery with a `Toolbelt-Signature` header of
//! the form `t=<unix seconds>,v1=<hex hmac-sha256>`, where the MAC covers
//! `<t>.<raw body>`. Verification rejects stale timestamps before comparing
//! digests so a captured delivery cannot be replayed later.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

/// Maximum accepted clock skew between the provider and us, in seconds.
const TOLERANCE_SECS: i64 = 300;

/// Signature verification failures. All of them map to a 400 response; the
/// variants exist so logs and tests can tell them apart.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// Header is missing pieces or the timestamp is not a number.
    #[error("malformed signature header: {0}")]
    Malformed(String),

    /// Timestamp is outside the replay tolerance window.
    #[error("signature timestamp outside tolerance window")]
    Stale,

    /// No candidate digest matched the payload.
    #[error("signature mismatch")]
    Mismatch,
}

/// Verify a webhook delivery against the shared signing secret.
///
/// # Errors
///
/// Returns [`SignatureError`] if the header is malformed, the timestamp is
/// outside the tolerance window, or no digest matches.
pub fn verify(secret: &SecretString, header: &str, body: &[u8]) -> Result<(), SignatureError> {
    let now = unix_now()?;
    verify_at(secret, header, body, now)
}

fn verify_at(
    secret: &SecretString,
    header: &str,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let (timestamp, candidates) = parse_header(header)?;

    if (now - timestamp).abs() > TOLERANCE_SECS {
        return Err(SignatureError::Stale);
    }

    let expected = compute_digest(secret, timestamp, body)
        .map_err(|err| SignatureError::Malformed(err.to_string()))?;

    // Constant-time comparison, every candidate checked.
    let mut matched = false;
    for candidate in candidates {
        matched |= constant_time_compare(&expected, candidate);
    }
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Produce a `Toolbelt-Signature` header value for `body` at `timestamp`.
///
/// Used by outbound test fixtures and the seed tooling; the service itself
/// only ever verifies.
#[must_use]
pub fn sign(secret: &SecretString, timestamp: i64, body: &[u8]) -> String {
    match compute_digest(secret, timestamp, body) {
        Ok(digest) => format!("t={timestamp},v1={digest}"),
        // Hmac-SHA256 accepts keys of any length; this arm is unreachable.
        Err(_) => String::new(),
    }
}

fn compute_digest(
    secret: &SecretString,
    timestamp: i64,
    body: &[u8],
) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn parse_header(header: &str) -> Result<(i64, Vec<&str>), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    SignatureError::Malformed(format!("bad timestamp {value:?}"))
                })?);
            }
            Some(("v1", value)) => candidates.push(value),
            // Unknown scheme prefixes are skipped for forward compatibility.
            Some(_) => {}
            None => {
                return Err(SignatureError::Malformed(format!(
                    "element {part:?} is not key=value"
                )));
            }
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| SignatureError::Malformed("missing t element".to_owned()))?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed("missing v1 element".to_owned()));
    }
    Ok((timestamp, candidates))
}

fn unix_now() -> Result<i64, SignatureError> {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|err| SignatureError::Malformed(err.to_string()))?
        .as_secs();
    i64::try_from(secs).map_err(|_| SignatureError::Malformed("system time overflow".to_owned()))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}
