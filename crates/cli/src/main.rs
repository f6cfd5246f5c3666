//! Kivu CLI - database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! kivu-cli migrate
//!
//! # List retryable failed registrations
//! kivu-cli failed list
//! kivu-cli failed list --order 42
//!
//! # Dispatch retries for failed registrations (asks for confirmation)
//! kivu-cli failed retry --all
//! kivu-cli failed retry --order 42 --yes
//! ```
//!
//! # Commands
//!
//! - `migrate` - run database migrations
//! - `failed list` - list retryable failed registrations
//! - `failed retry` - retry failed registrations, gated by confirmation

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "kivu-cli")]
#[command(author, version, about = "Kivu Domains CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Inspect and retry failed domain registrations
    Failed {
        #[command(subcommand)]
        action: FailedAction,
    },
}

#[derive(Subcommand)]
enum FailedAction {
    /// List retryable failed registrations
    List {
        /// Filter by a specific order ID
        #[arg(short, long)]
        order: Option<i32>,
    },
    /// Retry failed registrations (human-confirmed)
    Retry {
        /// Filter by a specific order ID
        #[arg(short, long)]
        order: Option<i32>,

        /// Retry all pending/retrying failed registrations
        #[arg(long)]
        all: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
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
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Failed { action } => match action {
            FailedAction::List { order } => commands::failed::list(order).await?,
            FailedAction::Retry { order, all, yes } => {
                commands::failed::retry(order, all, yes).await?;
            }
        },
    }
    Ok(())
}
