mod api;
mod cli;
mod config;
mod error;
mod llm;
mod models;
mod services;
mod store;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::ConfigStore;

#[derive(Parser)]
#[command(name = "bracketgpt")]
#[command(about = "Grounded tournament bracket assistant with validated seed narratives")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Ask a question grounded in the loaded data
    Ask { query: String },
    /// Show the context that would be sent for a question
    Preview { query: String },
    /// Run the validated seed bucket analysis
    Buckets {
        #[arg(default_value = "Give a seed-by-seed breakdown of the field.")]
        request: String,
    },
    /// Validate a narrative markdown file against the current buckets
    Validate {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Look up a team profile
    Team {
        #[arg(short, long)]
        name: String,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Arc::new(ConfigStore::load()?);

    match cli.command {
        Some(Commands::Serve { port }) => {
            let port = match port {
                Some(port) => port,
                None => config.current().await.server.port,
            };
            tracing::info!("Starting BracketGPT API server on port {}", port);
            api::serve(config, port).await?;
        }
        Some(Commands::Ask { query }) => cli::ask(&config, &query).await?,
        Some(Commands::Preview { query }) => cli::preview(&config, &query).await?,
        Some(Commands::Buckets { request }) => cli::seed_buckets(&config, &request).await?,
        Some(Commands::Validate { file }) => cli::validate_file(&config, &file).await?,
        Some(Commands::Team { name }) => {
            tracing::info!("Querying team: {}", name);
            cli::query_team(&config, &name).await?;
        }
        Some(Commands::Config) => cli::show_config(&config).await?,
        None => {
            // Default to serving
            let port = config.current().await.server.port;
            tracing::info!("Starting BracketGPT API server on port {}", port);
            api::serve(config, port).await?;
        }
    }

    Ok(())
}
