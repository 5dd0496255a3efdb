//! Validated email address newtype.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Why a string was rejected as an email address.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email address is blank")]
    Blank,
    #[error("email address is {actual} characters, limit is {}", Email::MAX_LEN)]
    Overlong { actual: usize },
    #[error("email address has no @ sign")]
    NoAtSign,
    #[error("email address has nothing before the @")]
    BlankLocal,
    #[error("email address has nothing after the @")]
    BlankDomain,
}

/// A structurally valid email address.
///
/// Validation is deliberately shallow (length plus a non-empty local part
/// and domain around an `@`); deliverability is the SMTP relay's problem.
/// Deserialization goes through [`Email::parse`], so a stored or wire value
/// can never smuggle in an unvalidated address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// RFC 5321 length ceiling.
    pub const MAX_LEN: usize = 254;

    /// Validate `s` as an email address.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found.
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        if s.is_empty() {
            return Err(EmailError::Blank);
        }
        if s.len() > Self::MAX_LEN {
            return Err(EmailError::Overlong { actual: s.len() });
        }

        let (local, domain) = s.split_once('@').ok_or(EmailError::NoAtSign)?;
        if local.is_empty() {
            return Err(EmailError::BlankLocal);
        }
        if domain.is_empty() {
            return Err(EmailError::BlankDomain);
        }

        Ok(Self(s.to_owned()))
    }

    /// The address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// The domain part (after the last @).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.rsplit('@').next().unwrap_or("")
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Email {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Email {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(raw.parse()?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Email {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
