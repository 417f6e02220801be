//! Agora CLI - operator tools that talk to the managed backend directly.
//!
//! # Usage
//!
//! ```bash
//! # Give an account the admin role
//! agora-cli admin promote --username ada
//!
//! # Create stores and products for an owner from YAML
//! agora-cli seed catalog --file catalog.yaml
//!
//! # Price a cart's shipping offline
//! agora-cli shipping quote --file quote.yaml
//! ```
//!
//! # Commands
//!
//! - `admin promote` - Change an account's role (service key)
//! - `seed catalog` - Seed stores and products
//! - `shipping quote` - Offline shipping quote with the configured rates

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "agora-cli")]
#[command(author, version, about = "Agora operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage account roles
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Seed the backend with data
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Shipping tools
    Shipping {
        #[command(subcommand)]
        action: ShippingAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Set an account's role (admin by default)
    Promote {
        /// Username, with or without the leading @
        #[arg(short, long)]
        username: String,

        /// Role to grant (`member`, `seller`, `admin`)
        #[arg(short, long, default_value = "admin")]
        role: String,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Create stores and products from a YAML file
    Catalog {
        /// Path to the catalog YAML file
        #[arg(short, long)]
        file: String,
    },
}

#[derive(Subcommand)]
enum ShippingAction {
    /// Quote shipping for stores and items described in a YAML file
    Quote {
        /// Path to the quote YAML file
        #[arg(short, long)]
        file: String,
    },
}

#[tokio::main]
async fn main() {
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
        Commands::Admin { action } => match action {
            AdminAction::Promote { username, role } => {
                commands::admin::promote(&username, &role).await?;
            }
        },
        Commands::Seed { target } => match target {
            SeedTarget::Catalog { file } => commands::seed::catalog(&file).await?,
        },
        Commands::Shipping { action } => match action {
            ShippingAction::Quote { file } => commands::shipping::quote(&file).await?,
        },
    }
    Ok(())
}
