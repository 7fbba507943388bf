//! ---
//! sim_section: "05-telemetry-scheduling"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Telemetry scheduling, aggregation, and dispatch."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use cellsim_report::ReportError;
use cellsim_ves::VesError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("collector transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("collector answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("dispatcher rejected event: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no telemetry scheduled for cell {0}")]
    NotFound(String),
    #[error("failed to buffer snapshot: {0}")]
    Buffering(#[from] ReportError),
    #[error("telemetry template error: {0}")]
    Template(#[from] VesError),
    #[error("telemetry interval for cell {0} must be greater than zero")]
    InvalidInterval(String),
    #[error("scheduler requires a running tokio runtime")]
    NoRuntime,
}
