//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! tb-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `PAYMENTS_DATABASE_URL` - `PostgreSQL` connection string for payments
//!   (falls back to `DATABASE_URL`)

use sqlx::PgPool;
use thiserror::Error;

use toolbelt_payments::store::postgres::MIGRATOR;

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution error.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run payments database migrations.
///
/// # Errors
///
/// Returns [`MigrationError`] if the database URL is missing, the
/// connection fails, or a migration fails to apply.
pub async fn payments() -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("PAYMENTS_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| MigrationError::MissingEnvVar("PAYMENTS_DATABASE_URL"))?;

    tracing::info!("Connecting to payments database...");
    let pool = PgPool::connect(&database_url).await?;

    tracing::info!("Running payments migrations...");
    MIGRATOR.run(&pool).await?;

    tracing::info!("Payments migrations complete!");
    Ok(())
}
