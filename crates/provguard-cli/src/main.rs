//! Provguard CLI — entry point.
//!
//! # Commands
//!
//! - `provguard status` — show the effective configuration
//! - `provguard config [--path P] [--force]` — write a default config file
//! - `provguard simulate [...]` — drive the health engine with a scenario and
//!   print warnings, blacklist, and the audit trail

mod config_cmd;
mod helpers;
mod scenario;
mod simulate;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use provguard_core::config::load_config;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Provguard — provider health and auto-mitigation engine
#[derive(Parser)]
#[command(name = "provguard", version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.provguard/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective configuration
    Status,

    /// Write a default configuration file
    Config {
        /// Destination path (defaults to ~/.provguard/config.json)
        #[arg(long)]
        path: Option<String>,

        /// Overwrite an existing file
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Run a provider-health scenario through the engine
    Simulate(simulate::SimulateArgs),
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status => status::run(cli.config.as_deref()),
        Commands::Config { path, force } => config_cmd::run(path.as_deref(), force),
        Commands::Simulate(args) => {
            init_logging(args.logs);
            let config = load_config(cli.config.as_deref());
            simulate::run(config, args).await
        }
    }
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("provguard=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
