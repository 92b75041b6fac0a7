//! Process-wide run counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{RunOutcome, RunSummary};

/// Counters accumulated over the lifetime of an orchestrator
#[derive(Debug, Default)]
pub struct RunStats {
    pub ticks: AtomicU64,
    pub runs_succeeded: AtomicU64,
    pub runs_failed: AtomicU64,
    /// Runs skipped because the previous run was still in flight
    pub runs_overlapped: AtomicU64,
    pub chapters_uploaded: AtomicU64,
    pub chapters_skipped: AtomicU64,
    pub chapters_deleted: AtomicU64,
    pub chapters_rejected: AtomicU64,
}

impl RunStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one finished run
    pub fn record_outcome(&self, outcome: &RunOutcome) {
        match &outcome.result {
            Ok(summary) => {
                self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
                self.record_chapters(summary);
            }
            Err(e) if e.kind() == super::RunErrorKind::AlreadyRunning => {
                self.runs_overlapped.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.runs_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_chapters(&self, summary: &RunSummary) {
        self.chapters_uploaded
            .fetch_add(summary.uploaded as u64, Ordering::Relaxed);
        self.chapters_skipped
            .fetch_add(summary.skipped as u64, Ordering::Relaxed);
        self.chapters_deleted
            .fetch_add(summary.deleted as u64, Ordering::Relaxed);
        self.chapters_rejected
            .fetch_add(summary.rejected as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_overlapped: self.runs_overlapped.load(Ordering::Relaxed),
            chapters_uploaded: self.chapters_uploaded.load(Ordering::Relaxed),
            chapters_skipped: self.chapters_skipped.load(Ordering::Relaxed),
            chapters_deleted: self.chapters_deleted.load(Ordering::Relaxed),
            chapters_rejected: self.chapters_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of run statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub runs_overlapped: u64,
    pub chapters_uploaded: u64,
    pub chapters_skipped: u64,
    pub chapters_deleted: u64,
    pub chapters_rejected: u64,
}

impl StatsSnapshot {
    /// Share of attempted runs that completed, in percent
    pub fn success_rate(&self) -> f64 {
        let attempted = self.runs_succeeded + self.runs_failed;
        if attempted == 0 {
            0.0
        } else {
            (self.runs_succeeded as f64 / attempted as f64) * 100.0
        }
    }
}
