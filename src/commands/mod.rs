pub mod inspect;
pub mod run;
pub mod sync;

// Re-export command functions for convenience
pub use inspect::{check, plan, state};
pub use run::{run_loop, tick};
pub use sync::sync;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use publoader::config::Config;
use publoader::extension::ExtensionRegistry;
use publoader::runner::{ExtensionRunner, Orchestrator, TickReport};
use publoader::scheduler::Scheduler;
use publoader::storage::create_sqlite_store;
use publoader::upload::{LoggingSink, SharedUploadSink, WebhookConfig, WebhookSink};

/// Load configuration from a file, or from the environment when none is given
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Assemble registry, state store, upload sink and scheduler from configuration
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let settings = &config.orchestrator;

    let (registry, errors) = ExtensionRegistry::load_dir(&settings.extensions_dir);
    for error in &errors {
        tracing::error!(error = %error, "Skipping extension");
    }
    tracing::info!(
        extensions = registry.len(),
        dir = %settings.extensions_dir.display(),
        "Extensions loaded"
    );

    if let Some(parent) = config.storage.state_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create state directory: {}", parent.display())
            })?;
        }
    }
    let store = create_sqlite_store(&config.storage.state_path)?;

    let sink: SharedUploadSink = match &config.upload.webhook_url {
        Some(url) => {
            let mut webhook = WebhookConfig::new(url.clone());
            if let Some(token) = &config.upload.auth_token {
                webhook = webhook.with_auth_token(token.clone());
            }
            Arc::new(WebhookSink::new(webhook)?)
        }
        None => {
            tracing::warn!("No upload webhook configured; decisions are only logged");
            Arc::new(LoggingSink)
        }
    };

    let runner = ExtensionRunner::new(store, sink).with_fetch_timeout(config.fetch_timeout());
    let scheduler = Scheduler::new(settings.daily_sweep_hour)?;

    Ok(Orchestrator::new(registry, runner)
        .with_scheduler(scheduler)
        .with_schedule_path(&settings.schedule_path)
        .with_max_concurrent(settings.max_concurrent_extensions))
}

/// Print the outcome of every run in a tick
pub fn print_tick_report(report: &TickReport) {
    println!("\nTick {}", report.at.to_rfc3339());
    println!("{:-<60}", "");

    if report.is_empty() {
        println!("No extension ran.");
        return;
    }

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(summary) => println!(
                "{:<24} {:<11} ok    uploaded={} skipped={} deleted={} rejected={} ({:.1}s)",
                outcome.extension,
                outcome.mode,
                summary.uploaded,
                summary.skipped,
                summary.deleted,
                summary.rejected,
                outcome.duration.as_secs_f64()
            ),
            Err(e) => println!(
                "{:<24} {:<11} {:<5} {}",
                outcome.extension,
                outcome.mode,
                "FAIL",
                e
            ),
        }
    }

    println!(
        "\nSucceeded: {}  Failed: {}",
        report.succeeded().count(),
        report.failed().count()
    );
}
