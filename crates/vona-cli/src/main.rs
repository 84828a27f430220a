//! Vona CLI - Command-line interface
//!
//! Usage:
//!   vona index [--products <file>] [--orders <file>]
//!   vona ask --user <id> <question>
//!   vona history --user <id>
//!   vona forget --user <id>

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vona_api::Services;
use vona_core::AppConfig;

#[derive(Parser)]
#[command(name = "vona")]
#[command(about = "Vona shopping assistant CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables take precedence
    #[arg(long, global = true, env = "VONA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the semantic index from the product catalog
    Index {
        /// Products JSON file
        #[arg(long)]
        products: Option<PathBuf>,
        /// Order line items JSON file
        #[arg(long)]
        orders: Option<PathBuf>,
    },
    /// Ask the assistant a question
    Ask {
        /// Shopper id
        #[arg(long)]
        user: String,
        /// Question to ask
        question: String,
    },
    /// Print a shopper's conversation
    History {
        #[arg(long)]
        user: String,
    },
    /// Delete a shopper's conversation
    Forget {
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "warn,vona_api=info,vona_vector=info,vona_rag=info".into()
        }))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Index { products, orders } => {
            if products.is_some() {
                config.catalog.products_path = products;
            }
            if orders.is_some() {
                config.catalog.orders_path = orders;
            }

            let services = Services::from_config(&config).await?;
            match services.bootstrap().await? {
                Some(indexed) => println!("Indexed {indexed} documents"),
                None => println!("No product source configured; index left unchanged"),
            }
        }
        Commands::Ask { user, question } => {
            let services = Services::from_config(&config).await?;
            if services.chat.index().is_empty().await? {
                services.bootstrap().await?;
            }

            let response = services.chat.handle_query(&user, &question).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::History { user } => {
            let services = Services::from_config(&config).await?;
            match services.chat.conversations().get(&user).await? {
                Some(conversation) => {
                    println!("{}", serde_json::to_string_pretty(&conversation)?)
                }
                None => println!("No conversation for {user}"),
            }
        }
        Commands::Forget { user } => {
            let services = Services::from_config(&config).await?;
            if services.chat.conversations().delete(&user).await? {
                println!("Conversation deleted successfully");
            } else {
                println!("No conversation found to delete");
            }
        }
    }

    Ok(())
}
