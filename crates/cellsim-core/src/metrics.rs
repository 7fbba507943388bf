//! ---
//! sim_section: "05-telemetry-scheduling"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Telemetry scheduling, aggregation, and dispatch."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::sync::Arc;

use prometheus::{self, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

/// Metrics published by the telemetry scheduler and report aggregator.
#[derive(Clone)]
pub struct TelemetryMetrics {
    events_dispatched: IntCounterVec,
    snapshots_buffered: IntCounterVec,
    reports: IntCounterVec,
    report_duration: HistogramVec,
    active_schedules: IntGauge,
    registry: Arc<Registry>,
}

impl TelemetryMetrics {
    pub fn new(registry: Arc<Registry>) -> prometheus::Result<Self> {
        let events_dispatched = IntCounterVec::new(
            Opts::new(
                "cellsim_events_dispatched_total",
                "Measurement documents sent straight to the collector",
            ),
            &["cell_id", "outcome"],
        )?;
        registry.register(Box::new(events_dispatched.clone()))?;

        let snapshots_buffered = IntCounterVec::new(
            Opts::new(
                "cellsim_snapshots_buffered_total",
                "Measurement documents captured for bulk reporting",
            ),
            &["cell_id", "outcome"],
        )?;
        registry.register(Box::new(snapshots_buffered.clone()))?;

        let reports = IntCounterVec::new(
            Opts::new(
                "cellsim_reports_total",
                "Bulk reports compiled and shipped by the aggregator",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(reports.clone()))?;

        let histogram_opts = HistogramOpts::new(
            "cellsim_report_ship_duration_seconds",
            "Time spent compiling, compressing and uploading one bulk report",
        )
        .buckets(prometheus::exponential_buckets(0.005, 2.0, 12)?);
        let report_duration = HistogramVec::new(histogram_opts, &["outcome"])?;
        registry.register(Box::new(report_duration.clone()))?;

        let active_schedules = IntGauge::new(
            "cellsim_active_schedules",
            "Cells with a running telemetry task",
        )?;
        registry.register(Box::new(active_schedules.clone()))?;

        Ok(Self {
            events_dispatched,
            snapshots_buffered,
            reports,
            report_duration,
            active_schedules,
            registry,
        })
    }

    pub fn record_dispatch(&self, cell_id: &str, ok: bool) {
        self.events_dispatched
            .with_label_values(&[cell_id, outcome(ok)])
            .inc();
    }

    pub fn record_buffered(&self, cell_id: &str, ok: bool) {
        self.snapshots_buffered
            .with_label_values(&[cell_id, outcome(ok)])
            .inc();
    }

    pub fn record_report(&self, ok: bool, seconds: f64) {
        let label = outcome(ok);
        self.reports.with_label_values(&[label]).inc();
        self.report_duration
            .with_label_values(&[label])
            .observe(seconds);
    }

    pub fn set_active_schedules(&self, count: usize) {
        self.active_schedules.set(count as i64);
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }
}

impl std::fmt::Debug for TelemetryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryMetrics").finish_non_exhaustive()
    }
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "failed"
    }
}
