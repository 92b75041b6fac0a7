//! Read-only commands: plan, check, state

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use publoader::config::Config;
use publoader::error::{Error, PubloaderErrorTrait};
use publoader::extension::ExtensionRegistry;
use publoader::scheduler::{tick_instant, ScheduleFile};
use publoader::storage::create_sqlite_store;

use super::build_orchestrator;

/// Print what the scheduler would do at a tick, without running anything
pub fn plan(config: &Config, at: Option<DateTime<Utc>>) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let now = at.unwrap_or_else(|| tick_instant(Utc::now()));

    println!("Plan for {}", now.to_rfc3339());
    println!("{:-<60}", "");

    let planned = orchestrator.plan_tick(now);
    if planned.is_empty() {
        println!("No extensions registered.");
        return Ok(());
    }

    for run in &planned {
        let decision = &run.decision;
        match decision.reason {
            Some(reason) if decision.should_run => println!(
                "{:<24} RUN   {:<11} ({})",
                run.extension,
                decision.mode,
                reason.as_str()
            ),
            _ => println!("{:<24} idle", run.extension),
        }
    }

    let due = planned.iter().filter(|p| p.decision.should_run).count();
    println!("\n{due} of {} extension(s) due", planned.len());
    Ok(())
}

/// Validate configuration, every extension and the schedule file
pub fn check(config: &Config) -> Result<()> {
    println!("Checking publoader setup");
    println!("========================");

    let mut problems: Vec<Error> = Vec::new();

    if let Err(e) = config.validate() {
        problems.push(e.into());
    }

    let (registry, errors) = ExtensionRegistry::load_dir(&config.orchestrator.extensions_dir);
    problems.extend(errors.into_iter().map(Error::from));

    for handle in registry.iter() {
        match handle.try_acquire() {
            Some(extension) => {
                if let Err(e) = extension.load_override_options() {
                    problems.push(e.into());
                }
            }
            None => tracing::debug!(extension = handle.name(), "Extension busy, skipping"),
        }

        if let Some(run_at) = handle.descriptor().run_at {
            if !run_at.is_reachable() {
                println!(
                    "warning: {} has a run_at that never lands on an hourly tick",
                    handle.name()
                );
            }
        }
    }
    println!("Extensions: {}", registry.len());

    match ScheduleFile::load(&config.orchestrator.schedule_path) {
        Ok(schedule) => {
            println!("Schedule overrides: {}", schedule.len());
            for name in schedule.names() {
                if registry.get(name).is_none() {
                    println!("warning: schedule entry for unknown extension {name}");
                }
            }
        }
        Err(e) => problems.push(e.into()),
    }

    if problems.is_empty() {
        println!("\nAll checks passed.");
        return Ok(());
    }

    println!("\nProblems");
    println!("--------");
    for problem in &problems {
        println!("[{}] {}", problem.category(), problem);
    }
    bail!("{} problem(s) found", problems.len())
}

/// Print the persisted state of one extension as JSON
pub fn state(config: &Config, name: &str) -> Result<()> {
    let store = create_sqlite_store(&config.storage.state_path)?;

    let known = store.extensions()?;
    if !known.iter().any(|ext| ext == name) {
        println!("No state recorded for {name}.");
        if !known.is_empty() {
            println!("Known extensions: {}", known.join(", "));
        }
        return Ok(());
    }

    let state = store.load_state(name)?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
