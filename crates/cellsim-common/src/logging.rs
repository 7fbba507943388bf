//! ---
//! sim_section: "01-core-functionality"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Shared primitives and utilities for the simulator runtime."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::io;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "CELLSIM_LOG";
const FALLBACK_DIRECTIVE: &str = "info";

type Filtered = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Filtered> + Send + Sync>;

/// Keeps the non-blocking writers flushing for the life of the process.
struct WriterGuards {
    _stdout: WorkerGuard,
    _file: WorkerGuard,
}

static GUARDS: OnceCell<WriterGuards> = OnceCell::new();

/// Stdout rendering. The rolling file is JSON regardless.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    #[serde(alias = "json")]
    StructuredJson,
    Pretty,
}

/// Pick the filter directive: `CELLSIM_LOG` wins over `RUST_LOG`.
fn filter_directive(cellsim_log: Option<String>, rust_log: Option<String>) -> String {
    cellsim_log
        .or(rust_log)
        .filter(|directive| !directive.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_DIRECTIVE.to_owned())
}

fn build_filter() -> EnvFilter {
    let directive = filter_directive(std::env::var(LOG_ENV).ok(), std::env::var("RUST_LOG").ok());
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("ignoring log filter {directive:?} ({err}); using {FALLBACK_DIRECTIVE}");
        EnvFilter::new(FALLBACK_DIRECTIVE)
    })
}

fn stdout_layer(format: LogFormat, writer: NonBlocking) -> BoxedLayer {
    let layer = fmt::layer().with_timer(UtcTime::rfc_3339()).with_writer(writer);
    match format {
        LogFormat::StructuredJson => layer.with_target(false).json().boxed(),
        LogFormat::Pretty => layer.boxed(),
    }
}

fn file_layer(writer: NonBlocking) -> BoxedLayer {
    fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .json()
        .with_current_span(false)
        .with_writer(writer)
        .boxed()
}

/// Install the global subscriber. Later calls keep the first subscriber.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("cannot create log directory {}", config.directory.display())
    })?;
    let file_name = format!(
        "{}.log",
        config.file_prefix.as_deref().unwrap_or(service_name)
    );

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(io::stdout());
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, file_name));

    let installed = tracing_subscriber::registry()
        .with(build_filter())
        .with(vec![
            stdout_layer(config.format, stdout_writer),
            file_layer(file_writer),
        ])
        .try_init()
        .is_ok();
    if installed {
        let _ = GUARDS.set(WriterGuards {
            _stdout: stdout_guard,
            _file: file_guard,
        });
        info!(
            service = service_name,
            log_dir = %config.directory.display(),
            format = ?config.format,
            "logging ready"
        );
    }
    Ok(())
}
