//! pmem CLI
//!
//! Inspect and benchmark persistent memory databases.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pmem_core::MemoryConfig;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "pmem")]
#[command(author, version, about = "Persistent memory - inspect and benchmark key-value stores", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (toml, yaml or json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overrides the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value stored under a key
    Get {
        key: String,
    },

    /// Store a value under a key (JSON, or a plain string)
    Set {
        key: String,
        value: String,
    },

    /// Delete a key
    Delete {
        key: String,
    },

    /// Measure write, flush, read and delete throughput
    Bench {
        /// Number of keys to write
        #[arg(short = 'n', long, default_value_t = 1000)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose {
            "pmem_cli=debug,pmem_core=debug"
        } else {
            "pmem_cli=info"
        })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config =
        MemoryConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    info!("Using database {}", config.database_path.display());

    match cli.command {
        Commands::Get { key } => commands::kv::get(config, &key).await,
        Commands::Set { key, value } => commands::kv::set(config, &key, &value).await,
        Commands::Delete { key } => commands::kv::delete(config, &key).await,
        Commands::Bench { count } => commands::bench::run(config, count).await,
    }
}
