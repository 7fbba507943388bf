//! ---
//! sim_section: "05-telemetry-scheduling"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Telemetry scheduling, aggregation, and dispatch."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cellsim_cell::FailureWatcher;
use cellsim_common::config::{ReportingMode, TelemetryConfig};
use cellsim_report::{BufferedSnapshot, SnapshotBuffer};
use cellsim_ves::{EventCustomizer, TerminalLookup, VesEvent};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::{run_periodically, ReportAggregator};
use crate::dispatch::EventDispatcher;
use crate::error::{Result, SchedulerError};
use crate::metrics::TelemetryMetrics;
use crate::templates::TemplateStore;

/// Optional overrides for a regular telemetry start; unset fields take the store defaults.
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub template: Option<VesEvent>,
    pub interval: Option<Duration>,
    pub mode: Option<ReportingMode>,
}

/// What a running schedule was started with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledView {
    pub cell_id: String,
    pub job_id: String,
    pub template: VesEvent,
    #[serde(rename = "intervalSecs", serialize_with = "as_seconds")]
    pub interval: Duration,
    pub mode: ReportingMode,
    pub failure: bool,
    pub started_at: DateTime<Utc>,
}

fn as_seconds<S: Serializer>(interval: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(interval.as_secs_f64())
}

struct ScheduledTelemetry {
    view: ScheduledView,
    task: JoinHandle<()>,
}

/// The shared aggregation task and its kill switch.
struct AggregatorRuntime {
    retire_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AggregatorRuntime {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub reporting_period: Duration,
    pub traffic_marker: String,
    pub failure_traffic_marker: String,
}

impl SchedulerSettings {
    pub fn from_config(telemetry: &TelemetryConfig, reporting_period: Duration) -> Self {
        Self {
            reporting_period,
            traffic_marker: telemetry.traffic_marker.clone(),
            failure_traffic_marker: telemetry.failure_traffic_marker.clone(),
        }
    }
}

/// Collaborators shared by every telemetry task.
#[derive(Clone)]
pub struct SchedulerParts {
    pub templates: Arc<TemplateStore>,
    pub dispatcher: Arc<dyn EventDispatcher>,
    pub terminals: Arc<dyn TerminalLookup>,
    pub watcher: Arc<FailureWatcher>,
    pub aggregator: Arc<ReportAggregator>,
    pub metrics: Option<TelemetryMetrics>,
}

/// Owns at most one periodic telemetry task per cell plus the shared report aggregator.
///
/// Lock order: schedule map, then aggregator slot.
pub struct TelemetryScheduler {
    settings: SchedulerSettings,
    parts: SchedulerParts,
    buffer: Arc<SnapshotBuffer>,
    schedules: Mutex<HashMap<String, ScheduledTelemetry>>,
    aggregator: Mutex<Option<AggregatorRuntime>>,
    aggregator_launches: AtomicUsize,
    runtime: Handle,
}

impl std::fmt::Debug for TelemetryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryScheduler")
            .field("settings", &self.settings)
            .field("active", &self.active_identifiers())
            .finish_non_exhaustive()
    }
}

impl TelemetryScheduler {
    /// Must be called from within a tokio runtime; tasks are spawned onto it.
    pub fn new(settings: SchedulerSettings, parts: SchedulerParts) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        let buffer = parts.aggregator.buffer();
        Ok(Self {
            settings,
            parts,
            buffer,
            schedules: Mutex::new(HashMap::new()),
            aggregator: Mutex::new(None),
            aggregator_launches: AtomicUsize::new(0),
            runtime,
        })
    }

    pub fn templates(&self) -> Arc<TemplateStore> {
        Arc::clone(&self.parts.templates)
    }

    /// Start regular telemetry for `cell_id`, replacing any running schedule.
    pub fn start(&self, cell_id: &str, request: StartRequest) -> Result<ScheduledView> {
        let templates = &self.parts.templates;
        let template = request
            .template
            .unwrap_or_else(|| templates.default_template());
        let interval = request
            .interval
            .unwrap_or_else(|| templates.default_interval());
        let mode = request.mode.unwrap_or_else(|| templates.default_mode());
        self.install(
            cell_id,
            template,
            interval,
            mode,
            false,
            &self.settings.traffic_marker,
        )
    }

    /// Start failure telemetry for `cell_id` with the failure template and interval.
    pub fn start_failure_telemetry(
        &self,
        cell_id: &str,
        mode: Option<ReportingMode>,
    ) -> Result<ScheduledView> {
        let templates = &self.parts.templates;
        let mode = mode.unwrap_or_else(|| templates.default_mode());
        self.install(
            cell_id,
            templates.failure_template(),
            templates.failure_interval(),
            mode,
            true,
            &self.settings.failure_traffic_marker,
        )
    }

    /// Cancel the schedule for `cell_id`, flush its buffered snapshots, and retire
    /// the aggregator once nothing is scheduled anywhere.
    pub async fn stop(&self, cell_id: &str) -> Result<ScheduledView> {
        let removed = {
            let mut schedules = self.schedules.lock();
            let removed = schedules
                .remove(cell_id)
                .ok_or_else(|| SchedulerError::NotFound(cell_id.to_owned()))?;
            removed.task.abort();
            self.record_active(schedules.len());
            removed
        };
        let ScheduledTelemetry { view, task } = removed;
        // Wait out a tick that was mid-flight so nothing lands in the buffer after the flush.
        if let Err(err) = task.await {
            if !err.is_cancelled() {
                warn!(cell_id, error = %err, "telemetry task ended abnormally");
            }
        }

        if view.mode.is_buffered() {
            self.parts.aggregator.flush_cell(cell_id).await;
        }
        self.retire_aggregator_if_idle().await;
        info!(cell_id, job_id = %view.job_id, "telemetry stopped");
        Ok(view)
    }

    /// Stop every running schedule.
    pub async fn shutdown(&self) {
        for cell_id in self.active_identifiers() {
            if let Err(err) = self.stop(&cell_id).await {
                debug!(cell_id = %cell_id, error = %err, "schedule already gone during shutdown");
            }
        }
        self.retire_aggregator_if_idle().await;
    }

    pub fn is_active(&self, cell_id: &str) -> bool {
        self.schedules.lock().contains_key(cell_id)
    }

    pub fn active_identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.schedules.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn scheduled(&self, cell_id: &str) -> Result<ScheduledView> {
        self.schedules
            .lock()
            .get(cell_id)
            .map(|scheduled| scheduled.view.clone())
            .ok_or_else(|| SchedulerError::NotFound(cell_id.to_owned()))
    }

    pub fn is_aggregator_running(&self) -> bool {
        self.aggregator
            .lock()
            .as_ref()
            .is_some_and(AggregatorRuntime::is_running)
    }

    /// How many times the shared aggregator has been launched.
    pub fn aggregator_launches(&self) -> usize {
        self.aggregator_launches.load(Ordering::SeqCst)
    }

    fn install(
        &self,
        cell_id: &str,
        mut template: VesEvent,
        interval: Duration,
        mode: ReportingMode,
        failure: bool,
        traffic_marker: &str,
    ) -> Result<ScheduledView> {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval(cell_id.to_owned()));
        }
        template.set_cell_identifier(cell_id)?;
        let customizer = EventCustomizer::new(
            &template,
            Arc::clone(&self.parts.terminals),
            traffic_marker,
        )?;

        let view = ScheduledView {
            cell_id: cell_id.to_owned(),
            job_id: format!("{}-{}", Uuid::new_v4(), cell_id),
            template,
            interval,
            mode,
            failure,
            started_at: Utc::now(),
        };
        let task = CellTask {
            cell_id: view.cell_id.clone(),
            job_id: view.job_id.clone(),
            template: view.template.clone(),
            customizer,
            interval,
            mode,
            watcher: failure.then(|| Arc::clone(&self.parts.watcher)),
            dispatcher: Arc::clone(&self.parts.dispatcher),
            buffer: Arc::clone(&self.buffer),
            metrics: self.parts.metrics.clone(),
        };

        let mut schedules = self.schedules.lock();
        if let Some(previous) = schedules.remove(cell_id) {
            previous.task.abort();
            debug!(cell_id, job_id = %previous.view.job_id, "replaced running telemetry");
        }
        let handle = self.runtime.spawn(task.run());
        schedules.insert(
            cell_id.to_owned(),
            ScheduledTelemetry {
                view: view.clone(),
                task: handle,
            },
        );
        if mode.is_buffered() {
            self.ensure_aggregator();
        }
        self.record_active(schedules.len());
        drop(schedules);

        info!(
            cell_id,
            job_id = %view.job_id,
            interval_secs = interval.as_secs_f64(),
            mode = %mode,
            failure,
            "telemetry started"
        );
        Ok(view)
    }

    // Caller holds the schedule map lock.
    fn ensure_aggregator(&self) {
        let mut slot = self.aggregator.lock();
        if slot.as_ref().is_some_and(AggregatorRuntime::is_running) {
            return;
        }
        let (retire_tx, retire_rx) = watch::channel(false);
        let task = self.runtime.spawn(run_periodically(
            Arc::clone(&self.parts.aggregator),
            self.settings.reporting_period,
            retire_rx,
        ));
        *slot = Some(AggregatorRuntime { retire_tx, task });
        self.aggregator_launches.fetch_add(1, Ordering::SeqCst);
        info!(
            period_secs = self.settings.reporting_period.as_secs(),
            "report aggregator started"
        );
    }

    /// Signal the aggregator to retire once nothing is scheduled, then wait for its
    /// current pass to finish.
    async fn retire_aggregator_if_idle(&self) {
        let Some(retiring) = self.take_idle_aggregator() else {
            return;
        };
        if let Err(err) = retiring.task.await {
            if !err.is_cancelled() {
                warn!(error = %err, "report aggregator ended abnormally");
            }
        }
        info!("no cells scheduled; report aggregator stopped");
    }

    fn take_idle_aggregator(&self) -> Option<AggregatorRuntime> {
        let schedules = self.schedules.lock();
        if !schedules.is_empty() {
            return None;
        }
        let retiring = self.aggregator.lock().take()?;
        // The receiver is gone only if the task already ended.
        let _ = retiring.retire_tx.send(true);
        Some(retiring)
    }

    fn record_active(&self, count: usize) {
        if let Some(metrics) = &self.parts.metrics {
            metrics.set_active_schedules(count);
        }
    }
}

impl Drop for TelemetryScheduler {
    fn drop(&mut self) {
        for (_, scheduled) in self.schedules.get_mut().drain() {
            scheduled.task.abort();
        }
        if let Some(aggregator) = self.aggregator.get_mut().take() {
            aggregator.task.abort();
        }
    }
}

/// State owned by one cell's periodic task.
struct CellTask {
    cell_id: String,
    job_id: String,
    template: VesEvent,
    customizer: EventCustomizer,
    interval: Duration,
    mode: ReportingMode,
    watcher: Option<Arc<FailureWatcher>>,
    dispatcher: Arc<dyn EventDispatcher>,
    buffer: Arc<SnapshotBuffer>,
    metrics: Option<TelemetryMetrics>,
}

impl CellTask {
    async fn run(mut self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&mut self) {
        let event = match self.customizer.apply(&self.template) {
            Ok(event) => event,
            Err(err) => {
                warn!(cell_id = %self.cell_id, error = %err, "unable to customize telemetry document");
                return;
            }
        };
        if let Some(watcher) = &self.watcher {
            let outcome = watcher.inspect(&event);
            debug!(cell_id = %self.cell_id, ?outcome, "failure watcher inspected document");
        }

        match self.mode {
            ReportingMode::Direct => {
                let result = self.dispatcher.dispatch(&event).await;
                if let Err(err) = &result {
                    warn!(cell_id = %self.cell_id, error = %err, "telemetry dispatch failed");
                }
                if let Some(metrics) = &self.metrics {
                    metrics.record_dispatch(&self.cell_id, result.is_ok());
                }
            }
            ReportingMode::Buffered => {
                let result = self.buffer_event(event);
                if let Err(err) = &result {
                    warn!(cell_id = %self.cell_id, error = %err, "telemetry snapshot dropped");
                }
                if let Some(metrics) = &self.metrics {
                    metrics.record_buffered(&self.cell_id, result.is_ok());
                }
            }
        }
    }

    fn buffer_event(&self, event: VesEvent) -> Result<usize> {
        let buffered = self.buffer.append(BufferedSnapshot {
            cell_id: self.cell_id.clone(),
            job_id: self.job_id.clone(),
            granularity_period: self.interval,
            captured_at: Utc::now(),
            event,
        })?;
        Ok(buffered)
    }
}
