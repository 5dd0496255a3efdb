//! Seed the payments database with demo data.
//!
//! Inserts a small tool catalog, a customer, two tradespeople, and a pair
//! of open jobs so the webhook and quote flows can be exercised locally.
//! Intended for a freshly migrated database; re-running fails on unique
//! constraints.
//!
//! # Environment Variables
//!
//! - `PAYMENTS_DATABASE_URL` - `PostgreSQL` connection string for payments
//!   (falls back to `DATABASE_URL`)

use secrecy::SecretString;
use tracing::info;

use toolbelt_core::{AccountRole, CurrencyCode, Email, Money, Tier};
use toolbelt_payments::models::{Account, Job, Product};
use toolbelt_payments::store::postgres::PostgresStore;
use toolbelt_payments::store::{Store, create_pool};

/// Seed demo catalog, accounts, and jobs.
///
/// # Errors
///
/// Returns an error if the database URL is missing or any insert fails.
pub async fn demo() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("PAYMENTS_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| "PAYMENTS_DATABASE_URL not set")?;

    let pool = create_pool(&database_url).await?;
    let store = PostgresStore::new(pool);
    info!("Connected to database");

    let drill = Product::new("Cordless Drill", Money::from_minor(7999), CurrencyCode::GBP);
    let ladder = Product::new(
        "Extension Ladder",
        Money::from_minor(12950),
        CurrencyCode::GBP,
    );
    let sealant = Product::new("Roof Sealant 5L", Money::from_minor(2450), CurrencyCode::GBP);
    for product in [&drill, &ladder, &sealant] {
        store.upsert_product(product).await?;
        info!(product_id = %product.id, name = %product.name, "Seeded product");
    }

    let customer = Account::new(
        Email::parse("customer@example.com")?,
        "Demo Customer",
        AccountRole::Customer,
    );
    let basic = Account::new(
        Email::parse("basic-trades@example.com")?,
        "Basic Tradesperson",
        AccountRole::Tradesperson,
    );
    let mut pro = Account::new(
        Email::parse("pro-trades@example.com")?,
        "Pro Tradesperson",
        AccountRole::Tradesperson,
    );
    pro.subscription.tier = Tier::Pro;

    for account in [&customer, &basic, &pro] {
        store.insert_account(account).await?;
        info!(
            account_id = %account.id,
            email = %account.email,
            role = %account.role,
            tier = %account.subscription.tier,
            "Seeded account"
        );
    }

    let fence = Job::new(customer.id, "Replace garden fence");
    let boiler = Job::new(customer.id, "Annual boiler service");
    for job in [&fence, &boiler] {
        store.insert_job(job).await?;
        info!(job_id = %job.id, title = %job.title, "Seeded job");
    }

    info!("Demo data seeded");
    Ok(())
}
