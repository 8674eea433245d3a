use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use duet::models::{DuetConfig, Framework};
use duet::server::{self, AppState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config/duet.toml";

#[derive(Parser, Debug)]
#[command(name = "duet", about = "Shared memory for an agent framework and a trading engine")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: String,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the REST facade and the background cleanup task
    Serve,
    /// Print store statistics
    Stats,
    /// Delete old market data and processed events
    Cleanup {
        /// Override the configured retention
        #[arg(long)]
        days: Option<u32>,
    },
    /// List events for a framework (broadcast queue when no target)
    Events {
        #[arg(long)]
        target: Option<Framework>,
        /// Read the durable unprocessed relay instead of the cache queue
        #[arg(long)]
        pending: bool,
    },
    /// Delete everything in both stores
    Purge {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &str) -> Result<DuetConfig> {
    if path == DEFAULT_CONFIG && !Path::new(path).exists() {
        warn!(path, "Config file not found, using defaults");
        let config = DuetConfig::default();
        config.validate().context("Invalid default config")?;
        return Ok(config);
    }
    duet::load_config(path)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = load_config(&cli.config)?;
    let memory = duet::init_shared(&config).context("Failed to open shared memory")?;

    match cli.command {
        Command::Serve => {
            memory.start().context("Failed to start unified memory")?;
            let state = AppState::new(memory.clone());
            let result = server::serve(&config.server, state, shutdown_signal()).await;
            memory.stop().await;
            result.context("REST facade failed")?;
        }
        Command::Stats => {
            print_json(&memory.stats()?)?;
        }
        Command::Cleanup { days } => {
            let report = match days {
                Some(days) => memory.run_cleanup_with(days)?,
                None => memory.run_cleanup()?,
            };
            print_json(&report)?;
        }
        Command::Events { target, pending } => {
            let events = if pending {
                memory.get_unprocessed_events(target)?
            } else {
                memory.get_events(target)?
            };
            print_json(&events)?;
        }
        Command::Purge { yes } => {
            if !yes {
                bail!("Refusing to purge without --yes");
            }
            print_json(&memory.clear_all()?)?;
        }
    }

    Ok(())
}
