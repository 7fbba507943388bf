//! ---
//! sim_section: "06-daemon"
//! sim_subsection: "binary"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Binary entrypoint for the cell simulator daemon."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use cellsim_cell::{
    BroadcastNotifier, CellDirectory, FailureModeRegistry, FailureWatcher,
    StaticTerminalDirectory,
};
use cellsim_common::config::{AppConfig, ReportingMode};
use cellsim_common::logging::init_tracing;
use cellsim_core::{
    CellTelemetryController, ControlOutcome, EventDispatcher, HttpCollectorDispatcher,
    ReportAggregator, SchedulerParts, SchedulerSettings, StartRequest, TelemetryMetrics,
    TelemetryScheduler, TemplateStore,
};
use cellsim_report::{
    uploader_from_config, BulkReportCompiler, CompilerSettings, FileReadyBuilder,
    GzipCompressor, SnapshotBuffer, TransferPipeline,
};
use clap::{Parser, Subcommand, ValueEnum};
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "Cell telemetry simulator daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Start telemetry and run until Ctrl-C")]
    Run {
        #[arg(long, value_delimiter = ',', help = "Cells to start (default: every configured cell)")]
        cells: Vec<String>,
        #[arg(long, value_enum, help = "Override the reporting mode")]
        mode: Option<CliMode>,
        #[arg(long, value_delimiter = ',', help = "Cells to switch to failure telemetry after start")]
        fail: Vec<String>,
    },
    #[command(about = "Validate configuration and print the effective settings")]
    CheckConfig,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Direct,
    Buffered,
}

impl From<CliMode> for ReportingMode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Direct => ReportingMode::Direct,
            CliMode::Buffered => ReportingMode::Buffered,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/cellsim.toml"));
    candidates.push(PathBuf::from("configs/example.toml"));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;
    let load_duration = load_started.elapsed();

    match cli.command.unwrap_or(Commands::Run {
        cells: Vec::new(),
        mode: None,
        fail: Vec::new(),
    }) {
        Commands::CheckConfig => {
            let rendered =
                toml::to_string_pretty(&config).context("unable to render configuration")?;
            println!("# loaded from {}\n{}", loaded.source.display(), rendered);
        }
        Commands::Run { cells, mode, fail } => {
            init_tracing("cellsimd", &config.logging)?;
            info!(
                config_path = %loaded.source.display(),
                load_ms = load_duration.as_millis() as u64,
                "configuration loaded"
            );
            run_daemon(config, cells, mode.map(ReportingMode::from), fail).await?;
        }
    }

    Ok(())
}

struct Daemon {
    controller: CellTelemetryController,
    scheduler: Arc<TelemetryScheduler>,
    notifier: Arc<BroadcastNotifier>,
    registry: Option<Arc<Registry>>,
}

fn build_daemon(config: &AppConfig) -> Result<Daemon> {
    let registry = Arc::new(Registry::new());
    let metrics = if config.metrics.enabled {
        Some(TelemetryMetrics::new(registry.clone()).context("unable to register metrics")?)
    } else {
        info!("metrics disabled by configuration");
        None
    };

    let terminals = Arc::new(StaticTerminalDirectory::from_topology(&config.topology));
    let notifier = Arc::new(BroadcastNotifier::default());
    let directory = Arc::new(CellDirectory::from_topology(
        &config.topology,
        terminals.clone(),
        notifier.clone(),
    ));
    let failure_modes = Arc::new(FailureModeRegistry::new());
    let watcher = Arc::new(FailureWatcher::new(
        directory.clone(),
        failure_modes.clone(),
        &config.failure,
    ));

    let templates = Arc::new(TemplateStore::from_config(&config.telemetry)?);
    let dispatcher: Arc<dyn EventDispatcher> = Arc::new(HttpCollectorDispatcher::new(
        &config.collector,
        &config.vnf,
    )?);

    let pipeline = TransferPipeline::new(
        Arc::new(GzipCompressor::default()),
        uploader_from_config(&config.transfer),
        FileReadyBuilder::new(
            config.file_ready.clone(),
            config.transfer.published_location(),
        ),
    );
    let mut aggregator = ReportAggregator::new(
        Arc::new(SnapshotBuffer::new()),
        BulkReportCompiler::new(CompilerSettings::from(&config.report)),
        pipeline,
        dispatcher.clone(),
        config.report.per_cell,
    );
    if let Some(metrics) = &metrics {
        aggregator = aggregator.with_metrics(metrics.clone());
    }

    let scheduler = Arc::new(TelemetryScheduler::new(
        SchedulerSettings::from_config(&config.telemetry, config.report.reporting_period),
        SchedulerParts {
            templates,
            dispatcher,
            terminals,
            watcher,
            aggregator: Arc::new(aggregator),
            metrics: metrics.clone(),
        },
    )?);
    let controller =
        CellTelemetryController::new(directory, failure_modes, scheduler.clone());

    Ok(Daemon {
        controller,
        scheduler,
        notifier,
        registry: metrics.map(|metrics| metrics.registry()),
    })
}

async fn run_daemon(
    config: AppConfig,
    cells: Vec<String>,
    mode: Option<ReportingMode>,
    fail: Vec<String>,
) -> Result<()> {
    let daemon = build_daemon(&config)?;
    let status_log = spawn_status_log(&daemon.notifier);

    let selected = if cells.is_empty() {
        config
            .topology
            .cells
            .iter()
            .map(|cell| cell.id.clone())
            .collect()
    } else {
        cells
    };
    if selected.is_empty() {
        warn!("no cells configured; nothing to simulate");
    }

    for cell_id in &selected {
        let request = StartRequest {
            mode,
            ..StartRequest::default()
        };
        match daemon.controller.start_reports(cell_id, request) {
            Ok(outcome) => log_outcome(cell_id, "start", &outcome),
            Err(err) => warn!(cell_id = %cell_id, error = %err, "telemetry did not start"),
        }
    }
    for cell_id in &fail {
        match daemon.controller.start_failure(cell_id, mode) {
            Ok(outcome) => log_outcome(cell_id, "start-failure", &outcome),
            Err(err) => warn!(cell_id = %cell_id, error = %err, "failure telemetry did not start"),
        }
    }

    info!(
        active = daemon.scheduler.active_identifiers().len(),
        "daemon running; waiting for termination signal"
    );
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    daemon.scheduler.shutdown().await;
    status_log.abort();

    if let Some(registry) = &daemon.registry {
        log_metrics(registry);
    }
    Ok(())
}

fn log_outcome(cell_id: &str, request: &str, outcome: &ControlOutcome) {
    match outcome {
        ControlOutcome::Accepted => info!(cell_id, request, "request accepted"),
        ControlOutcome::Conflict { state, .. } => {
            warn!(cell_id, request, state = %state, "request conflicts with cell state")
        }
        ControlOutcome::NotFound => warn!(cell_id, request, "cell not in topology"),
    }
}

fn spawn_status_log(notifier: &BroadcastNotifier) -> tokio::task::JoinHandle<()> {
    let mut receiver = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(message) => {
                    info!(topic = %message.topic, payload = %message.payload, "cell status changed")
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "status log fell behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_metrics(registry: &Registry) {
    let mut buffer = Vec::new();
    if let Err(err) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        warn!(error = %err, "unable to encode metrics");
        return;
    }
    match String::from_utf8(buffer) {
        Ok(text) => debug!(metrics = %text, "final metrics"),
        Err(err) => warn!(error = %err, "metrics were not valid utf-8"),
    }
}
