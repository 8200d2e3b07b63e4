#![forbid(unsafe_code)]
//! IdeaVault API server

use clap::Parser;
use colored::*;
use ideavault::config::{load_config_from, DEFAULT_CONFIG_PATH};
use ideavault::server::Server;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ideavault-server")]
#[command(about = "IdeaVault API - timestamped idea registration on Algorand", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Address to listen on, e.g. 0.0.0.0:3001
    #[arg(short, long)]
    listen: Option<String>,

    /// SQLite database path
    #[arg(short, long, value_name = "FILE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let mut config = load_config_from(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    if let Some(database) = cli.database {
        config.database.path = database.to_string_lossy().into_owned();
    }
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("{}", "IdeaVault API".bright_cyan().bold());
    println!("  {} {}", "listen:".bright_white(), config.server.listen);
    println!("  {} {}", "network:".bright_white(), config.ledger.network);
    println!("  {} {}", "app id:".bright_white(), config.ledger.app_id);
    println!("  {} {}", "database:".bright_white(), config.database.path);
    println!();

    let server = Server::init(config)?;
    server.start().await
}
