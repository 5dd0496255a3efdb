//! Toolbelt CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run payments database migrations
//! tb-cli migrate
//!
//! # Seed the payments database with demo data
//! tb-cli seed
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Seed demo catalog, accounts, and jobs

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "tb-cli")]
#[command(author, version, about = "Toolbelt CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run payments database migrations
    Migrate,
    /// Seed the payments database with demo data
    Seed,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::payments().await?,
        Commands::Seed => commands::seed::demo().await?,
    }
    Ok(())
}
