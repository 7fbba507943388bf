//! ---
//! sim_section: "05-telemetry-scheduling"
//! sim_subsection: "tests"
//! sim_type: "source"
//! sim_scope: "test"
//! sim_description: "Shared wiring for scheduler and controller integration tests."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cellsim_cell::{
    Cell, CellDirectory, FailureModeRegistry, FailureWatcher, RecordingNotifier,
    StaticTerminalDirectory,
};
use cellsim_common::config::{FailureConfig, FileReadyConfig, ReportConfig, ReportingMode};
use cellsim_core::{
    CellTelemetryController, RecordingDispatcher, ReportAggregator, SchedulerParts,
    SchedulerSettings, TelemetryScheduler, TemplateStore,
};
use cellsim_report::{
    BulkReportCompiler, CompilerSettings, FileReadyBuilder, GzipCompressor, LocalMountCopier,
    SnapshotBuffer, TransferPipeline,
};
use cellsim_ves::{bundled_failure_template, bundled_measurement_template};
use tempfile::TempDir;

pub struct Options {
    pub interval: Duration,
    pub reporting_period: Duration,
    pub debounce: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(20),
            reporting_period: Duration::from_secs(3600),
            debounce: Duration::from_secs(30),
        }
    }
}

pub struct Harness {
    pub temp: TempDir,
    pub work: PathBuf,
    pub mount: PathBuf,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub directory: Arc<CellDirectory>,
    pub failure_modes: Arc<FailureModeRegistry>,
    pub buffer: Arc<SnapshotBuffer>,
    pub settings: SchedulerSettings,
    pub parts: SchedulerParts,
}

impl Harness {
    pub fn new(options: Options) -> Self {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        let mount = temp.path().join("mount");
        std::fs::create_dir_all(&work).unwrap();

        let mut terminals = StaticTerminalDirectory::default();
        terminals.attach("ue-1", Some("Cell1".to_owned()));
        terminals.attach("ue-2", Some("Cell1".to_owned()));
        let terminals = Arc::new(terminals);

        let notifier = Arc::new(RecordingNotifier::new());
        let directory = Arc::new(CellDirectory::new(terminals.clone(), notifier.clone()));
        directory.insert(Cell::new("Cell1", 52.52, 13.40));
        directory.insert(Cell::new("Cell2", 48.13, 11.58));

        let failure_modes = Arc::new(FailureModeRegistry::new());
        let watcher = Arc::new(FailureWatcher::new(
            directory.clone(),
            failure_modes.clone(),
            &FailureConfig {
                throughput_low: 10,
                latency_high: 150,
                debounce: options.debounce,
            },
        ));

        let templates = Arc::new(TemplateStore::new(
            bundled_measurement_template().unwrap(),
            bundled_failure_template().unwrap(),
            options.interval,
            options.interval,
            ReportingMode::Buffered,
        ));

        let report = ReportConfig {
            temp_dir: work.clone(),
            ..ReportConfig::default()
        };
        let pipeline = TransferPipeline::new(
            Arc::new(GzipCompressor::default()),
            Arc::new(LocalMountCopier::new(mount.clone())),
            FileReadyBuilder::new(FileReadyConfig::default(), "file:///mount/"),
        );
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let buffer = Arc::new(SnapshotBuffer::new());
        let aggregator = Arc::new(ReportAggregator::new(
            buffer.clone(),
            BulkReportCompiler::new(CompilerSettings::from(&report)),
            pipeline,
            dispatcher.clone(),
            true,
        ));

        let parts = SchedulerParts {
            templates,
            dispatcher: dispatcher.clone(),
            terminals,
            watcher,
            aggregator,
            metrics: None,
        };
        let settings = SchedulerSettings {
            reporting_period: options.reporting_period,
            traffic_marker: "[[20-50]]".to_owned(),
            failure_traffic_marker: "[[50->10]]".to_owned(),
        };

        Self {
            temp,
            work,
            mount,
            dispatcher,
            notifier,
            directory,
            failure_modes,
            buffer,
            settings,
            parts,
        }
    }

    /// Requires a running runtime.
    pub fn scheduler(&self) -> Arc<TelemetryScheduler> {
        Arc::new(TelemetryScheduler::new(self.settings.clone(), self.parts.clone()).unwrap())
    }

    pub fn controller(&self) -> CellTelemetryController {
        CellTelemetryController::new(
            self.directory.clone(),
            self.failure_modes.clone(),
            self.scheduler(),
        )
    }

    pub fn notifications(&self) -> usize {
        self.dispatcher
            .events()
            .iter()
            .filter(|event| event.notification_fields.is_some())
            .count()
    }

    pub fn archives(&self) -> usize {
        std::fs::read_dir(&self.mount)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
