use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(
    name = "publoader",
    version,
    about = "Schedules publisher extensions and reconciles their chapters for upload",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hourly tick loop until Ctrl-C
    Run,

    /// Evaluate a single tick and run every due extension
    Tick {
        /// Tick instant (RFC 3339); defaults to the current hour
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Run this extension regardless of its schedule
        #[arg(long)]
        force: Option<String>,

        /// With --force, run a full reconciliation
        #[arg(long, requires = "force")]
        full: bool,
    },

    /// Print scheduler decisions for a tick without running anything
    Plan {
        /// Tick instant (RFC 3339); defaults to the current hour
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Validate configuration, extensions and the schedule file
    Check,

    /// Print the persisted state of an extension
    State {
        /// Extension name
        name: String,
    },

    /// Copy extension directories into the extensions location
    Sync {
        /// Directory containing extension directories
        #[arg(long)]
        source: PathBuf,

        /// Destination; defaults to the configured extensions directory
        #[arg(long)]
        target: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    // Initialize tracing/logging
    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "publoader starting");

    match cli.command {
        Commands::Run => commands::run_loop(&config).await?,
        Commands::Tick { at, force, full } => commands::tick(&config, at, force, full).await?,
        Commands::Plan { at } => commands::plan(&config, at)?,
        Commands::Check => commands::check(&config)?,
        Commands::State { name } => commands::state(&config, &name)?,
        Commands::Sync { source, target } => {
            let target = target.unwrap_or_else(|| config.orchestrator.extensions_dir.clone());
            commands::sync(&source, &target)?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let default_filter = if verbose {
        "publoader=debug,info".to_string()
    } else {
        format!("publoader={level},warn")
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
