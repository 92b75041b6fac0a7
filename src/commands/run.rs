//! Tick loop and single-tick commands

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use publoader::config::Config;
use publoader::metrics;
use publoader::models::RunMode;
use publoader::scheduler::{tick_instant, TickEvent, TickLoop};

use super::{build_orchestrator, print_tick_report};

/// Run the hourly tick loop until Ctrl-C
pub async fn run_loop(config: &Config) -> Result<()> {
    println!("Starting publoader");
    println!("==================");

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics unavailable");
    }
    let orchestrator = Arc::new(build_orchestrator(config)?);
    let tick_loop = Arc::new(TickLoop::new(orchestrator));

    println!("Extensions dir: {}", config.orchestrator.extensions_dir.display());
    println!("Schedule file: {}", config.orchestrator.schedule_path.display());
    println!("State database: {}", config.storage.state_path.display());
    println!("Max concurrent: {}", config.orchestrator.max_concurrent_extensions);
    println!();
    print!("{}", tick_loop.status().await.display());
    println!("\nPress Ctrl+C to stop.\n");

    let mut events = tick_loop.subscribe();
    let event_logger = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                TickEvent::TickFinished {
                    tick_id,
                    at,
                    succeeded,
                    failed,
                } => {
                    tracing::debug!(
                        %tick_id,
                        at = %at.to_rfc3339(),
                        succeeded,
                        failed,
                        "Tick event"
                    );
                }
                TickEvent::Stopped => break,
            }
        }
    });

    let runner = {
        let tick_loop = Arc::clone(&tick_loop);
        tokio::spawn(async move { tick_loop.start().await })
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            println!("\nShutdown signal received, finishing in-flight runs...");
        }
        Err(e) => {
            tracing::error!("Failed to wait for Ctrl+C: {}", e);
        }
    }

    tick_loop.stop().await;
    if let Err(e) = runner.await {
        tracing::error!(error = %e, "Tick loop task failed");
    }
    event_logger.abort();

    let stats = tick_loop.orchestrator().stats();
    println!("\nSession Summary");
    println!("===============");
    println!("Ticks: {}", stats.ticks);
    println!("Runs succeeded: {}", stats.runs_succeeded);
    println!("Runs failed: {}", stats.runs_failed);
    println!("Chapters uploaded: {}", stats.chapters_uploaded);
    println!("Chapters deleted: {}", stats.chapters_deleted);
    if metrics::metrics_initialized() {
        match metrics::encode_metrics() {
            Ok(text) => tracing::debug!(metrics = %text, "Final metrics"),
            Err(e) => tracing::warn!(error = %e, "Failed to encode metrics"),
        }
    }
    println!("publoader stopped.");
    Ok(())
}

/// Evaluate one tick, or force a single extension
pub async fn tick(
    config: &Config,
    at: Option<DateTime<Utc>>,
    force: Option<String>,
    full: bool,
) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let now = at.unwrap_or_else(|| tick_instant(Utc::now()));

    let report = match force {
        Some(name) => {
            let mode = if full { RunMode::Full } else { RunMode::Incremental };
            println!("Forcing {mode} run of {name}");
            match orchestrator.run_forced(&name, mode, now).await {
                Some(report) => report,
                None => bail!("Unknown extension: {name}"),
            }
        }
        None => orchestrator.run_tick(now).await,
    };

    print_tick_report(&report);

    let failed = report.failed().count();
    if failed > 0 {
        bail!("{failed} run(s) failed");
    }
    Ok(())
}
