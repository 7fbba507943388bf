//! ---
//! sim_section: "05-telemetry-scheduling"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Telemetry scheduling, aggregation, and dispatch."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
//! Per-cell telemetry scheduling, bulk report aggregation, collector dispatch,
//! and the lifecycle control facade.

pub mod aggregator;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod templates;

pub use aggregator::ReportAggregator;
pub use controller::{CellTelemetryController, ControlOutcome};
pub use dispatch::{EventDispatcher, HttpCollectorDispatcher, RecordingDispatcher};
pub use error::{DispatchError, Result, SchedulerError};
pub use metrics::TelemetryMetrics;
pub use scheduler::{
    ScheduledView, SchedulerParts, SchedulerSettings, StartRequest, TelemetryScheduler,
};
pub use templates::TemplateStore;
