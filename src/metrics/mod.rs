//! Prometheus metrics for the publoader orchestrator
//!
//! This module provides metrics tracking for:
//! - Ticks: number of ticks, due extensions per tick, tick duration
//! - Runs: outcome per extension and error kind, run duration
//! - Chapters: uploaded, skipped, deleted and rejected per extension
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec,
    Counter, CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for tick metrics
struct TickMetrics {
    ticks: Counter,
    due_runs: Counter,
    tick_duration: Histogram,
}

/// Container for per-extension metrics
struct RunMetrics {
    runs: CounterVec,
    run_duration: HistogramVec,
    chapters_uploaded: CounterVec,
    chapters_skipped: CounterVec,
    chapters_deleted: CounterVec,
    chapters_rejected: CounterVec,
}

static TICK_METRICS: OnceLock<TickMetrics> = OnceLock::new();

static RUN_METRICS: OnceLock<RunMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = publoader::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let ticks = TickMetrics {
        ticks: register_counter!("publoader_ticks_total", "Total scheduler ticks evaluated")?,
        due_runs: register_counter!(
            "publoader_due_runs_total",
            "Total extension runs found due on a tick"
        )?,
        tick_duration: register_histogram!(
            "publoader_tick_duration_seconds",
            "Time from tick start until every run of the tick finished",
            vec![0.1, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]
        )?,
    };

    let runs = RunMetrics {
        runs: register_counter_vec!(
            "publoader_runs_total",
            "Extension runs by outcome (success or error kind)",
            &["extension", "outcome"]
        )?,
        run_duration: register_histogram_vec!(
            "publoader_run_duration_seconds",
            "Duration of a single extension run in seconds",
            &["extension"],
            vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]
        )?,
        chapters_uploaded: register_counter_vec!(
            "publoader_chapters_uploaded_total",
            "Chapters acknowledged by the upload sink",
            &["extension"]
        )?,
        chapters_skipped: register_counter_vec!(
            "publoader_chapters_skipped_total",
            "Fetched chapters that were already posted",
            &["extension"]
        )?,
        chapters_deleted: register_counter_vec!(
            "publoader_chapters_deleted_total",
            "Posted chapters removed after a full reconciliation",
            &["extension"]
        )?,
        chapters_rejected: register_counter_vec!(
            "publoader_chapters_rejected_total",
            "Chapters dropped by title, number or expiry checks",
            &["extension"]
        )?,
    };

    TICK_METRICS.set(ticks).map_err(|_| "Tick metrics already initialized")?;
    RUN_METRICS.set(runs).map_err(|_| "Run metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    TICK_METRICS.get().is_some() && RUN_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a tick and how many runs it dispatched
pub fn record_tick(due: usize) {
    let Some(m) = TICK_METRICS.get() else {
        return;
    };

    m.ticks.inc();
    if due > 0 {
        m.due_runs.inc_by(due as f64);
    }
}

/// Record the outcome of one extension run
pub fn record_run(extension: &str, outcome: &str, duration_secs: f64) {
    let Some(m) = RUN_METRICS.get() else {
        return;
    };

    m.runs.with_label_values(&[extension, outcome]).inc();
    m.run_duration
        .with_label_values(&[extension])
        .observe(duration_secs);
}

/// Record chapter counts of a completed run
pub fn record_chapters(
    extension: &str,
    uploaded: usize,
    skipped: usize,
    deleted: usize,
    rejected: usize,
) {
    let Some(m) = RUN_METRICS.get() else {
        return;
    };

    for (counter, count) in [
        (&m.chapters_uploaded, uploaded),
        (&m.chapters_skipped, skipped),
        (&m.chapters_deleted, deleted),
        (&m.chapters_rejected, rejected),
    ] {
        if count > 0 {
            counter.with_label_values(&[extension]).inc_by(count as f64);
        }
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a tick timer (records when dropped)
pub fn start_tick_timer() -> MetricsTimer {
    match TICK_METRICS.get() {
        Some(m) => MetricsTimer::new(m.tick_duration.start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
