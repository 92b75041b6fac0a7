//! Tick evaluation and concurrent dispatch of extension runs

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use super::{ExtensionRunner, RunError, RunOutcome, RunStats, StatsSnapshot};
use crate::extension::{ExtensionHandle, ExtensionRegistry};
use crate::metrics;
use crate::models::RunMode;
use crate::scheduler::{RunDecision, ScheduleFile, Scheduler, TriggerReason};

/// Default number of extensions running at the same time
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Scheduler decision for one extension
#[derive(Debug, Clone, Serialize)]
pub struct PlannedRun {
    pub extension: String,
    pub decision: RunDecision,
}

/// Everything that happened on one tick
#[derive(Debug)]
pub struct TickReport {
    pub tick_id: Uuid,
    pub at: DateTime<Utc>,
    pub outcomes: Vec<RunOutcome>,
}

impl TickReport {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            tick_id: Uuid::new_v4(),
            at,
            outcomes: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn outcome(&self, extension: &str) -> Option<&RunOutcome> {
        self.outcomes.iter().find(|o| o.extension == extension)
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Owns the registry and drives runs for ticks
pub struct Orchestrator {
    registry: ExtensionRegistry,
    scheduler: Scheduler,
    runner: ExtensionRunner,
    schedule_path: Option<PathBuf>,
    concurrency: Arc<Semaphore>,
    stats: Arc<RunStats>,
}

impl Orchestrator {
    pub fn new(registry: ExtensionRegistry, runner: ExtensionRunner) -> Self {
        Self {
            registry,
            scheduler: Scheduler::default(),
            runner,
            schedule_path: None,
            concurrency: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT)),
            stats: RunStats::new(),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// `schedule.json` to re-read on every tick
    pub fn with_schedule_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schedule_path = Some(path.into());
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.concurrency = Arc::new(Semaphore::new(max_concurrent.max(1)));
        self
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Current schedule overrides
    ///
    /// A broken file is logged and ignored for this tick; manifests still
    /// provide their own `run_at`.
    pub fn load_schedule(&self) -> ScheduleFile {
        let Some(path) = &self.schedule_path else {
            return ScheduleFile::default();
        };

        ScheduleFile::load(path).unwrap_or_else(|e| {
            tracing::error!(path = %path.display(), error = %e, "Ignoring schedule file");
            ScheduleFile::default()
        })
    }

    /// Scheduler decisions for every registered extension, without side effects
    pub fn plan_tick(&self, now: DateTime<Utc>) -> Vec<PlannedRun> {
        self.decisions(now)
            .into_iter()
            .map(|(handle, decision)| PlannedRun {
                extension: handle.name().to_string(),
                decision,
            })
            .collect()
    }

    fn decisions(&self, now: DateTime<Utc>) -> Vec<(ExtensionHandle, RunDecision)> {
        let schedule = self.load_schedule();
        self.registry
            .iter()
            .map(|handle| {
                let entry = handle
                    .descriptor()
                    .schedule_entry(schedule.get(handle.name()));
                (handle.clone(), self.scheduler.decide(&entry, now))
            })
            .collect()
    }

    /// Evaluate the scheduler at `now` and run every due extension
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let due: Vec<_> = self
            .decisions(now)
            .into_iter()
            .filter_map(|(handle, decision)| match decision.reason {
                Some(reason) if decision.should_run => Some((handle, decision.mode, reason)),
                _ => None,
            })
            .collect();

        self.dispatch(due, now).await
    }

    /// Run one extension now regardless of its schedule
    ///
    /// Returns `None` for an unknown extension name.
    pub async fn run_forced(
        &self,
        name: &str,
        mode: RunMode,
        now: DateTime<Utc>,
    ) -> Option<TickReport> {
        let handle = self.registry.get(name)?.clone();
        Some(
            self.dispatch(vec![(handle, mode, TriggerReason::Forced)], now)
                .await,
        )
    }

    /// Run the given extensions concurrently and wait for all of them
    async fn dispatch(
        &self,
        runs: Vec<(ExtensionHandle, RunMode, TriggerReason)>,
        now: DateTime<Utc>,
    ) -> TickReport {
        let mut report = TickReport::new(now);
        let tick_span =
            tracing::info_span!("tick", tick_id = %report.tick_id, at = %now.to_rfc3339());
        let _timer = metrics::start_tick_timer();
        self.stats.record_tick();
        metrics::record_tick(runs.len());

        if runs.is_empty() {
            tracing::debug!(parent: &tick_span, "No extension due");
            return report;
        }

        tracing::info!(parent: &tick_span, due = runs.len(), "Dispatching extension runs");

        let mut tasks = JoinSet::new();
        for (handle, mode, reason) in runs {
            let name = handle.name().to_string();

            // Previous tick still running this extension
            let Some(mut guard) = handle.try_acquire() else {
                let outcome = RunOutcome {
                    extension: name.clone(),
                    mode,
                    reason,
                    duration: std::time::Duration::ZERO,
                    result: Err(RunError::AlreadyRunning(name)),
                };
                self.finish(&tick_span, &outcome);
                report.outcomes.push(outcome);
                continue;
            };

            let runner = self.runner.clone();
            let concurrency = Arc::clone(&self.concurrency);
            let run_span = tracing::info_span!(
                parent: &tick_span,
                "run",
                extension = %name,
                mode = %mode,
                reason = reason.as_str()
            );

            tasks.spawn(
                async move {
                    let started = Instant::now();
                    let result = match concurrency.acquire_owned().await {
                        Ok(_permit) => {
                            tracing::debug!("Run started");
                            AssertUnwindSafe(runner.run(&mut **guard, mode, now))
                                .catch_unwind()
                                .await
                                .unwrap_or_else(|panic| {
                                    Err(RunError::Panicked(panic_message(&*panic)))
                                })
                        }
                        Err(_) => Err(RunError::FetchFailure("concurrency limiter closed".into())),
                    };
                    drop(guard);

                    RunOutcome {
                        extension: name,
                        mode,
                        reason,
                        duration: started.elapsed(),
                        result,
                    }
                }
                .instrument(run_span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    self.finish(&tick_span, &outcome);
                    report.outcomes.push(outcome);
                }
                Err(e) => {
                    tracing::error!(parent: &tick_span, error = %e, "Run task aborted");
                }
            }
        }

        report.outcomes.sort_by(|a, b| a.extension.cmp(&b.extension));
        tracing::info!(
            parent: &tick_span,
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            "Tick finished"
        );
        report
    }

    /// Log, count and export one outcome
    fn finish(&self, tick_span: &tracing::Span, outcome: &RunOutcome) {
        self.stats.record_outcome(outcome);
        metrics::record_run(
            &outcome.extension,
            outcome.label(),
            outcome.duration.as_secs_f64(),
        );

        match &outcome.result {
            Ok(summary) => {
                metrics::record_chapters(
                    &summary.extension,
                    summary.uploaded,
                    summary.skipped,
                    summary.deleted,
                    summary.rejected,
                );
                tracing::info!(
                    parent: tick_span,
                    extension = %outcome.extension,
                    mode = %outcome.mode,
                    uploaded = summary.uploaded,
                    skipped = summary.skipped,
                    deleted = summary.deleted,
                    rejected = summary.rejected,
                    suppressed = summary.suppressed,
                    new_manga = summary.new_tracked_manga,
                    elapsed_ms = outcome.duration.as_millis() as u64,
                    "Run completed"
                );
            }
            // Already logged at error level by the runner
            Err(e) if e.risks_reupload() => {}
            Err(e) => {
                tracing::warn!(
                    parent: tick_span,
                    extension = %outcome.extension,
                    mode = %outcome.mode,
                    kind = %e.kind(),
                    error = %e,
                    "Run skipped"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("extensions", &self.registry.len())
            .field("scheduler", &self.scheduler)
            .field("runner", &self.runner)
            .field("schedule_path", &self.schedule_path)
            .finish()
    }
}
