#![forbid(unsafe_code)]
//! Service-account and registry-application utilities for IdeaVault

use clap::{Parser, Subcommand};
use colored::*;
use ideavault::config::{load_config_from, DEFAULT_CONFIG_PATH};
use ideavault::crypto::{self, Account};
use ideavault::ledger::{AlgodClient, Ledger, VerificationStatus};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ideavault-account")]
#[command(about = "Manage the IdeaVault service account and inspect the registry app", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a fresh account and print its address and 25-word mnemonic
    Generate,

    /// Show the address behind a mnemonic
    Inspect {
        #[arg(long, env = "ALGORAND_DEPLOYER_MNEMONIC", hide_env_values = true)]
        mnemonic: String,
    },

    /// Check an address for well-formedness
    Check { address: String },

    /// Node connectivity and the number of ideas registered on chain
    Stats,

    /// Ask the registry app whether an idea hash is registered
    Verify {
        /// Hex SHA-256 idea hash
        hash: String,
    },

    /// Look up a transaction on the indexer
    Txn { id: String },
}

fn print_account(account: &Account) {
    println!("{} {}", "Address: ".bright_green().bold(), account.address().bright_white());
    println!("{}", "Mnemonic:".bright_green().bold());
    let mnemonic = account.to_mnemonic();
    let words: Vec<&str> = mnemonic.split(' ').collect();
    for (i, chunk) in words.chunks(5).enumerate() {
        println!("  {:>2}. {}", i * 5 + 1, chunk.join(" "));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Diagnostics go to stderr so `txn` output stays pipeable JSON.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Generate => {
            let account = Account::generate();
            print_account(&account);
            println!();
            println!(
                "{}",
                "Store the mnemonic as ALGORAND_DEPLOYER_MNEMONIC and fund the address before use."
                    .yellow()
            );
        }
        Commands::Inspect { mnemonic } => {
            let account = Account::from_mnemonic(&mnemonic)?;
            println!("{} {}", "Address:".bright_green().bold(), account.address().bright_white());
        }
        Commands::Check { address } => {
            if crypto::is_valid_address(&address) {
                println!("{} {}", "✓ valid".green().bold(), address);
            } else {
                println!("{} {}", "✗ invalid".red().bold(), address);
                std::process::exit(1);
            }
        }
        Commands::Stats => {
            let config = load_config_from(&cli.config)?;
            let client = AlgodClient::new(config.ledger.to_algod_config())?;

            println!("{} {}", "Network:".bright_white(), config.ledger.network);
            println!("{} {}", "App id: ".bright_white(), client.app_id());
            match client.health().await {
                Ok(()) => println!("{} {}", "Node:   ".bright_white(), "reachable".green()),
                Err(e) => println!("{} {}", "Node:   ".bright_white(), e.to_string().red()),
            }
            println!(
                "{} {}",
                "Ideas registered on chain:".bright_white(),
                client.total_registered().await.to_string().bright_cyan().bold()
            );
        }
        Commands::Verify { hash } => {
            let config = load_config_from(&cli.config)?;
            let client = AlgodClient::new(config.ledger.to_algod_config())?;
            let hash_bytes = crypto::hash_bytes_from_hex(&hash)?;

            match client.verification_status(&hash_bytes).await {
                VerificationStatus::Verified => {
                    println!("{}", "✓ registered".green().bold());
                    if let Some(record) = client.get_record(&hash_bytes).await {
                        println!("  founder:   {}", record.founder_address);
                        println!("  timestamp: {}", record.timestamp);
                        println!("  ipfs cid:  {}", record.ipfs_cid);
                    }
                }
                VerificationStatus::NotFound => println!("{}", "✗ not registered".red().bold()),
                VerificationStatus::QueryFailed => {
                    println!("{}", "? query failed, see logs with RUST_LOG=debug".yellow());
                }
            }
        }
        Commands::Txn { id } => {
            let config = load_config_from(&cli.config)?;
            let client = AlgodClient::new(config.ledger.to_algod_config())?;
            let details = client.transaction_details(&id).await?;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
    }

    Ok(())
}
