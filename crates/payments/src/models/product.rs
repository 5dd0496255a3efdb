//! Product catalog domain type.

use chrono::{DateTime, Utc};

use toolbelt_core::{CurrencyCode, Money, ProductId};

/// A catalog product.
///
/// The order materializer reads products at transaction time and snapshots
/// price/name/image into the order, so edits here never touch past orders.
#[derive(Debug, Clone)]
pub struct Product {
    /// Unique product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price in minor units.
    pub price: Money,
    /// Currency the price is denominated in.
    pub currency: CurrencyCode,
    /// Primary image URL.
    pub image_url: Option<String>,
    /// Inactive products are treated as missing by the materializer.
    pub active: bool,
    /// When the product was created.
    pub created_at: DateTime<Utc>,
    /// When the product was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Create an active product.
    #[must_use]
    pub fn new(name: impl Into<String>, price: Money, currency: CurrencyCode) -> Self {
        let now = Utc::now();
        Self {
            id: ProductId::generate(),
            name: name.into(),
            price,
            currency,
            image_url: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
