//! Domain models for the payments core.
//!
//! These are validated domain objects, separate from database row types.
//! All mutation happens inside store transactions; the structs themselves
//! carry no persistence logic.

pub mod account;
pub mod event;
pub mod job;
pub mod order;
pub mod product;

pub use account::{Account, QuotaCounter, SubscriptionState};
pub use event::{DomainRef, ProcessedEvent};
pub use job::{Job, Quote};
pub use order::{Order, OrderItem};
pub use product::Product;
