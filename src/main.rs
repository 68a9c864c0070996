//! Locus CLI
//!
//! # Commands
//!
//! - `serve`: run the HTTP server over an in-memory or persisted store
//! - `compact`: rewrite a store's append-only file offline
//! - `stats`: print record count and log size

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use locus::commands;
use locus::server::{self, AppState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

/// Locus - location registry with radius queries
#[derive(Parser)]
#[command(name = "locus")]
#[command(version)]
#[command(about = "Location registry with great-circle radius queries")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: String,
        /// Append-only file; without it the store lives in memory
        #[arg(long)]
        data: Option<PathBuf>,
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Rewrite the append-only file so it holds only live records
    Compact {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print record count and log size
    Stats {
        #[arg(long)]
        data: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { bind, data, config } => serve(&bind, data, config.as_deref()).await,
        Commands::Compact { data, config } => compact(&data, config.as_deref()),
        Commands::Stats { data } => stats(&data),
    }
}

async fn serve(bind: &str, data: Option<PathBuf>, config: Option<&Path>) -> Result<()> {
    let config = commands::load_config(config).context("failed to load config")?;
    let default_radius_km = config.default_radius_km;

    let db = commands::open_store(data.as_deref(), config).context("failed to open store")?;

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;

    let state = AppState::new(Arc::new(db.clone())).with_default_radius_km(default_radius_km);
    server::serve(listener, state).await?;

    db.close().context("failed to close store")?;
    Ok(())
}

fn compact(data: &Path, config: Option<&Path>) -> Result<()> {
    let config = commands::load_config(config).context("failed to load config")?;
    let report = commands::compact(data, config)
        .with_context(|| format!("failed to compact {}", data.display()))?;
    println!("{}: {}", data.display(), report);
    Ok(())
}

fn stats(data: &Path) -> Result<()> {
    let stats = commands::stats(data)
        .with_context(|| format!("failed to read {}", data.display()))?;
    println!("{}", commands::format_stats(&stats));
    Ok(())
}
