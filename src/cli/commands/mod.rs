//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod init;
mod receipts;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "receiptd")]
#[command(about = "Receipt OCR and expense analysis server")]
#[command(version)]
pub struct Cli {
    /// Target data directory (overrides config file).
    #[arg(long, short = 't', global = true)]
    target: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Start the HTTP server
    Serve {
        /// Address to bind: port, host, or host:port (default from config, else 127.0.0.1:5000)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Print stored receipts as JSON
    Receipts {
        /// Only show receipts uploaded by this user
        #[arg(short, long)]
        owner: Option<String>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        target: cli.target,
    };
    let (settings, config) = load_settings_with_options(options).await;

    if let Some(ref path) = config.source_path {
        tracing::info!("Loaded config from {}", path.display());
    }

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.bind.clone());
            serve::cmd_serve(&settings, &bind).await
        }
        Commands::Receipts { owner } => receipts::cmd_receipts(&settings, owner.as_deref()).await,
    }
}
