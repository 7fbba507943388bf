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
use std::time::{Duration, Instant};

use cellsim_report::{BufferedSnapshot, BulkReportCompiler, ReadyReport, ReportError, SnapshotBuffer, TransferPipeline};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::dispatch::EventDispatcher;
use crate::metrics::TelemetryMetrics;

/// Turns buffered snapshots into shipped bulk reports and report-ready notifications.
pub struct ReportAggregator {
    buffer: Arc<SnapshotBuffer>,
    compiler: Arc<Mutex<BulkReportCompiler>>,
    pipeline: Arc<TransferPipeline>,
    dispatcher: Arc<dyn EventDispatcher>,
    per_cell: bool,
    metrics: Option<TelemetryMetrics>,
}

impl std::fmt::Debug for ReportAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportAggregator")
            .field("per_cell", &self.per_cell)
            .field("buffered", &self.buffer.total())
            .finish_non_exhaustive()
    }
}

impl ReportAggregator {
    pub fn new(
        buffer: Arc<SnapshotBuffer>,
        compiler: BulkReportCompiler,
        pipeline: TransferPipeline,
        dispatcher: Arc<dyn EventDispatcher>,
        per_cell: bool,
    ) -> Self {
        Self {
            buffer,
            compiler: Arc::new(Mutex::new(compiler)),
            pipeline: Arc::new(pipeline),
            dispatcher,
            per_cell,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: TelemetryMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn buffer(&self) -> Arc<SnapshotBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Drain everything buffered and ship it, one report per cell or a single
    /// combined report. Returns how many notifications reached the collector.
    pub async fn run_once(&self) -> usize {
        let batches: Vec<Vec<BufferedSnapshot>> = if self.per_cell {
            self.buffer
                .drain_per_cell()
                .into_iter()
                .map(|(_, batch)| batch)
                .collect()
        } else {
            let all = self.buffer.drain_all();
            if all.is_empty() {
                Vec::new()
            } else {
                vec![all]
            }
        };

        let mut delivered = 0;
        for batch in batches {
            if self.ship_batch(batch).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Ship whatever `cell_id` has buffered right now.
    pub async fn flush_cell(&self, cell_id: &str) -> bool {
        let batch = self.buffer.drain_cell(cell_id);
        if batch.is_empty() {
            return false;
        }
        debug!(cell_id, snapshots = batch.len(), "flushing buffered snapshots");
        self.ship_batch(batch).await
    }

    async fn ship_batch(&self, batch: Vec<BufferedSnapshot>) -> bool {
        let started = Instant::now();
        let snapshots = batch.len();
        let compiler = Arc::clone(&self.compiler);
        let pipeline = Arc::clone(&self.pipeline);

        let shipped = tokio::task::spawn_blocking(
            move || -> Result<Option<ReadyReport>, ReportError> {
                let mut batch = batch;
                let compiled = compiler.lock().compile(&mut batch)?;
                compiled.map(|report| pipeline.ship(report)).transpose()
            },
        )
        .await;

        let ready = match shipped {
            Ok(Ok(Some(ready))) => ready,
            Ok(Ok(None)) => return false,
            Ok(Err(err)) => {
                warn!(snapshots, error = %err, "bulk report was not shipped");
                self.record(false, started);
                return false;
            }
            Err(err) => {
                error!(snapshots, error = %err, "bulk report worker did not finish");
                self.record(false, started);
                return false;
            }
        };

        let delivered = match self.dispatcher.dispatch(&ready.notification).await {
            Ok(()) => {
                info!(file = %ready.archive_name, snapshots, "report-ready notification sent");
                true
            }
            Err(err) => {
                warn!(file = %ready.archive_name, error = %err, "report-ready notification failed");
                false
            }
        };
        ready.complete();
        self.record(delivered, started);
        delivered
    }

    fn record(&self, ok: bool, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_report(ok, started.elapsed().as_secs_f64());
        }
    }
}

/// Body of the shared aggregation task: one pass per reporting period, first pass after one period.
///
/// `retire` is only observed between passes, so a report that is being shipped is
/// always completed and announced.
pub(crate) async fn run_periodically(
    aggregator: Arc<ReportAggregator>,
    period: Duration,
    mut retire: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            changed = retire.changed() => {
                if changed.is_err() || *retire.borrow() {
                    debug!("report aggregator retiring");
                    break;
                }
            }
            _ = ticker.tick() => {
                let delivered = aggregator.run_once().await;
                debug!(delivered, "aggregation pass finished");
            }
        }
    }
}
