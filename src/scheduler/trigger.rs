//! Hourly tick loop
//!
//! Sleeps until the next top of the hour (UTC), runs one tick through the
//! [`Orchestrator`] and repeats until stopped. A stop request never cancels a
//! tick in progress; the loop exits after the running tick finished.
//!
//! Ticks are not queued. A tick that runs past the next top of the hour
//! skips the hours it overran, which is logged and counted in the status.

use chrono::{DateTime, Duration, Timelike, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::runner::{Orchestrator, TickReport};

// ============================================================================
// Tick Events
// ============================================================================

/// Events emitted by the tick loop
#[derive(Debug, Clone)]
pub enum TickEvent {
    /// A tick was evaluated and every due run finished
    TickFinished {
        tick_id: Uuid,
        at: DateTime<Utc>,
        succeeded: usize,
        failed: usize,
    },

    /// The loop exited
    Stopped,
}

// ============================================================================
// Tick Loop
// ============================================================================

/// Drives an orchestrator once per hour
pub struct TickLoop {
    orchestrator: Arc<Orchestrator>,
    event_sender: broadcast::Sender<TickEvent>,
    is_running: Arc<RwLock<bool>>,
    missed_ticks: AtomicU64,
}

impl TickLoop {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let (event_sender, _) = broadcast::channel(100);

        Self {
            orchestrator,
            event_sender,
            is_running: Arc::new(RwLock::new(false)),
            missed_ticks: AtomicU64::new(0),
        }
    }

    /// Subscribe to tick events
    pub fn subscribe(&self) -> broadcast::Receiver<TickEvent> {
        self.event_sender.subscribe()
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Start the loop (runs until stopped)
    pub async fn start(&self) {
        *self.is_running.write().await = true;
        tracing::info!(
            extensions = self.orchestrator.registry().len(),
            "Tick loop started"
        );

        while *self.is_running.read().await {
            let sleep_duration = duration_until_next_hour(Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(60));

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    let at = tick_instant(Utc::now());
                    self.tick(at).await;
                    self.record_overrun(at, Utc::now());
                }
                _ = self.wait_for_stop() => {
                    break;
                }
            }
        }

        let _ = self.event_sender.send(TickEvent::Stopped);
        tracing::info!("Tick loop stopped");
    }

    /// Stop the loop after the current tick
    pub async fn stop(&self) {
        *self.is_running.write().await = false;
    }

    /// Check if the loop is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Run a single tick at `at` and publish its event
    pub async fn tick(&self, at: DateTime<Utc>) -> TickReport {
        let report = self.orchestrator.run_tick(at).await;

        let _ = self.event_sender.send(TickEvent::TickFinished {
            tick_id: report.tick_id,
            at: report.at,
            succeeded: report.succeeded().count(),
            failed: report.failed().count(),
        });

        report
    }

    /// Count the hourly ticks skipped because the tick at `at` ran until `finished`
    pub fn record_overrun(&self, at: DateTime<Utc>, finished: DateTime<Utc>) -> u64 {
        let missed = u64::try_from((finished - at).num_hours()).unwrap_or(0);
        if missed > 0 {
            self.missed_ticks.fetch_add(missed, Ordering::Relaxed);
            tracing::warn!(
                at = %at.to_rfc3339(),
                finished = %finished.to_rfc3339(),
                missed,
                "Tick overran the next hour, skipped ticks will not run"
            );
        }
        missed
    }

    // Internal: Wait for stop signal
    async fn wait_for_stop(&self) {
        loop {
            if !*self.is_running.read().await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    /// Get loop status
    pub async fn status(&self) -> TickLoopStatus {
        let stats = self.orchestrator.stats();

        TickLoopStatus {
            is_running: *self.is_running.read().await,
            extensions: self.orchestrator.registry().len(),
            sweep_hour: self.orchestrator.scheduler().sweep_hour(),
            seconds_until_next_tick: duration_until_next_hour(Utc::now()).num_seconds(),
            ticks: stats.ticks,
            missed_ticks: self.missed_ticks.load(Ordering::Relaxed),
            success_rate: stats.success_rate(),
        }
    }
}

/// Duration until the next top of the hour
pub fn duration_until_next_hour(now: DateTime<Utc>) -> Duration {
    let into_hour = Duration::seconds(i64::from(now.minute() * 60 + now.second()))
        + Duration::nanoseconds(i64::from(now.nanosecond().min(999_999_999)));
    Duration::hours(1) - into_hour
}

/// Tick instant for a wake-up time, rounded to the nearest full hour
///
/// Timers may fire slightly early or late; rounding keeps the scheduler's
/// minute checks stable.
pub fn tick_instant(now: DateTime<Utc>) -> DateTime<Utc> {
    let shifted = now + Duration::minutes(30);
    shifted - (Duration::hours(1) - duration_until_next_hour(shifted))
}

/// Tick loop status information
#[derive(Debug, Clone)]
pub struct TickLoopStatus {
    pub is_running: bool,
    pub extensions: usize,
    pub sweep_hour: u32,
    pub seconds_until_next_tick: i64,
    pub ticks: u64,
    pub missed_ticks: u64,
    pub success_rate: f64,
}

impl TickLoopStatus {
    /// Format as display string
    pub fn display(&self) -> String {
        let mut output = String::from("Tick Loop Status\n");
        output.push_str(&format!("{:-<40}\n", ""));
        output.push_str(&format!("Running: {}\n", self.is_running));
        output.push_str(&format!("Extensions: {}\n", self.extensions));
        output.push_str(&format!("Daily Sweep: {:02}:00 UTC\n", self.sweep_hour));

        let mins = self.seconds_until_next_tick / 60;
        let secs = self.seconds_until_next_tick % 60;
        output.push_str(&format!("Until Next Tick: {mins}m {secs}s\n"));
        output.push_str(&format!("Ticks: {}\n", self.ticks));
        if self.missed_ticks > 0 {
            output.push_str(&format!("Missed Ticks: {}\n", self.missed_ticks));
        }
        output.push_str(&format!("Run Success Rate: {:.1}%\n", self.success_rate));

        output
    }
}

// ============================================================================
// Tests
// ============================================================================
