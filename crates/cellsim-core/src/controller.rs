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

use cellsim_cell::{CellDirectory, CellError, CellState, FailureModeRegistry, Transition};
use cellsim_common::config::ReportingMode;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, SchedulerError};
use crate::scheduler::{StartRequest, TelemetryScheduler};

/// Answer to a control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ControlOutcome {
    Accepted,
    /// The cell's current state does not allow the request.
    Conflict {
        state: CellState,
        required: &'static [CellState],
    },
    NotFound,
}

/// Pairs every lifecycle move with the matching telemetry schedule change.
#[derive(Debug)]
pub struct CellTelemetryController {
    directory: Arc<CellDirectory>,
    failure_modes: Arc<FailureModeRegistry>,
    scheduler: Arc<TelemetryScheduler>,
}

impl CellTelemetryController {
    pub fn new(
        directory: Arc<CellDirectory>,
        failure_modes: Arc<FailureModeRegistry>,
        scheduler: Arc<TelemetryScheduler>,
    ) -> Self {
        Self {
            directory,
            failure_modes,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> Arc<TelemetryScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// DORMANT -> ACTIVE, then regular telemetry.
    pub fn start_reports(&self, cell_id: &str, request: StartRequest) -> Result<ControlOutcome> {
        if let Err(outcome) = gate(self.directory.activate(cell_id)) {
            return Ok(outcome);
        }
        if let Err(err) = self.scheduler.start(cell_id, request) {
            self.roll_back(cell_id, &err);
            return Err(err);
        }
        Ok(ControlOutcome::Accepted)
    }

    /// ACTIVE -> DRAINING, mark the cell as failing, then failure telemetry.
    pub fn start_failure(
        &self,
        cell_id: &str,
        mode: Option<ReportingMode>,
    ) -> Result<ControlOutcome> {
        if let Err(outcome) = gate(self.directory.mark_degraded(cell_id)) {
            return Ok(outcome);
        }
        self.failure_modes.mark(cell_id);
        if let Err(err) = self.scheduler.start_failure_telemetry(cell_id, mode) {
            self.failure_modes.unmark(cell_id);
            self.roll_back(cell_id, &err);
            return Err(err);
        }
        Ok(ControlOutcome::Accepted)
    }

    /// Step the lifecycle back and stop telemetry.
    ///
    /// The lifecycle still steps back when no telemetry was running; the
    /// answer is then `NotFound`.
    pub async fn stop_reports(&self, cell_id: &str) -> ControlOutcome {
        if let Err(outcome) = gate(self.directory.retreat(cell_id)) {
            return outcome;
        }
        self.halt(cell_id).await
    }

    /// Step the lifecycle back, clear the failure latch, and stop telemetry.
    pub async fn stop_failure(&self, cell_id: &str) -> ControlOutcome {
        if let Err(outcome) = gate(self.directory.retreat(cell_id)) {
            return outcome;
        }
        self.failure_modes.unmark(cell_id);
        self.halt(cell_id).await
    }

    async fn halt(&self, cell_id: &str) -> ControlOutcome {
        match self.scheduler.stop(cell_id).await {
            Ok(_) => ControlOutcome::Accepted,
            Err(SchedulerError::NotFound(_)) => {
                info!(cell_id, "no telemetry was running");
                ControlOutcome::NotFound
            }
            Err(err) => {
                warn!(cell_id, error = %err, "unable to stop telemetry");
                ControlOutcome::Accepted
            }
        }
    }

    fn roll_back(&self, cell_id: &str, cause: &SchedulerError) {
        warn!(cell_id, error = %cause, "telemetry did not start; reverting lifecycle");
        if let Err(err) = self.directory.retreat(cell_id) {
            warn!(cell_id, error = %err, "lifecycle revert failed");
        }
    }
}

fn gate(result: std::result::Result<Transition, CellError>) -> std::result::Result<(), ControlOutcome> {
    match result {
        Ok(Transition::Changed { .. }) => Ok(()),
        Ok(Transition::Rejected {
            state, required, ..
        }) => Err(ControlOutcome::Conflict { state, required }),
        Err(CellError::NotFound(_)) => Err(ControlOutcome::NotFound),
    }
}
