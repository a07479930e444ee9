//! claimgate - OAuth claims-resolving API server and desktop login
//!
//! Main entry point for the claimgate CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{login, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// claimgate - OAuth claims-resolving API server and desktop login
#[derive(Parser)]
#[command(name = "claimgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to load instead of the discovered ones
    #[arg(long, global = true, env = "CLAIMGATE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the claims-resolving API server
    Serve(serve::ServeArgs),

    /// Sign in through the system browser
    Login(login::LoginArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) plus a rotating JSON file
    let filter = if cli.verbose {
        "claimgate=debug,claimgate_server=debug,claimgate_oauth=debug,claimgate_cache=debug,claimgate_config=debug,tower_http=debug,info"
    } else {
        "claimgate=info,claimgate_server=info,claimgate_oauth=info,warn"
    };

    let log_dir = claimgate_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "claimgate.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "claimgate=trace,claimgate_server=trace,claimgate_oauth=trace,claimgate_cache=trace,claimgate_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        config_path: cli.config,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Login(args) => login::run(args, &ctx).await,
    }
}
