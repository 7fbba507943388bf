//! ---
//! sim_section: "01-core-functionality"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Shared primitives and utilities for the simulator runtime."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
//! Shared primitives for the cell simulator workspace.
//! This crate exposes configuration loading, tracing setup, and the
//! timestamp helpers consumed by the telemetry and report crates.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, CellEntry, CollectorConfig, FailureConfig, FileReadyConfig, LoadedAppConfig,
    LoggingConfig, MetricsConfig, ReportConfig, ReportingMode, TelemetryConfig, TerminalEntry,
    TopologyConfig, TransferConfig, VnfConfig,
};
pub use logging::{init_tracing, LogFormat};
