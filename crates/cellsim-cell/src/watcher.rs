//! ---
//! sim_section: "03-cell-lifecycle"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Cell lifecycle, directories, and automatic failure transitions."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::sync::Arc;

use cellsim_common::config::FailureConfig;
use cellsim_common::time::duration_to_micros;
use cellsim_ves::{VesEvent, LATENCY_GROUP, THROUGHPUT_GROUP};
use tracing::{debug, info, warn};

use crate::directory::CellDirectory;
use crate::failure_mode::{BreachRecord, FailureModeRegistry};
use crate::lifecycle::CellState;

/// What a single inspection did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Document lacks the identifier, throughput or latency fields.
    Incomplete,
    WithinThresholds,
    /// Breach seen but the cell is not draining or not in failure mode.
    Ignored,
    LatchArmed,
    Debouncing,
    Advanced,
}

/// Drives a draining cell to sleep once failure telemetry breaches for long enough.
#[derive(Debug)]
pub struct FailureWatcher {
    directory: Arc<CellDirectory>,
    registry: Arc<FailureModeRegistry>,
    throughput_low: i64,
    latency_high: i64,
    debounce_micros: i64,
}

impl FailureWatcher {
    pub fn new(
        directory: Arc<CellDirectory>,
        registry: Arc<FailureModeRegistry>,
        config: &FailureConfig,
    ) -> Self {
        Self {
            directory,
            registry,
            throughput_low: config.throughput_low,
            latency_high: config.latency_high,
            debounce_micros: duration_to_micros(config.debounce),
        }
    }

    pub fn inspect(&self, event: &VesEvent) -> WatchOutcome {
        let (Some(cell_id), Some(throughput), Some(latency)) = (
            event.cell_identifier(),
            numeric(event, THROUGHPUT_GROUP),
            numeric(event, LATENCY_GROUP),
        ) else {
            return WatchOutcome::Incomplete;
        };

        if throughput > self.throughput_low || latency < self.latency_high {
            return WatchOutcome::WithinThresholds;
        }
        info!(cell_id, throughput, latency, "failure thresholds breached");

        match self.directory.state(cell_id) {
            Ok(CellState::Draining) => {}
            Ok(_) => return WatchOutcome::Ignored,
            Err(err) => {
                warn!(cell_id, error = %err, "breach reported for unknown cell");
                return WatchOutcome::Ignored;
            }
        }

        let Some(observed) = event.common_event_header.last_epoch_microsec else {
            return WatchOutcome::Incomplete;
        };

        match self.registry.record_breach(cell_id, observed) {
            BreachRecord::Unmarked => WatchOutcome::Ignored,
            BreachRecord::Armed(_) => {
                debug!(cell_id, first_breach = observed, "failure latch armed");
                WatchOutcome::LatchArmed
            }
            BreachRecord::Latched(first) if observed >= first.saturating_add(self.debounce_micros) => {
                match self.directory.advance_automatically(cell_id) {
                    Ok(transition) if transition.is_changed() => {
                        info!(cell_id, "cell went to sleep after sustained failure");
                        WatchOutcome::Advanced
                    }
                    Ok(_) => WatchOutcome::Ignored,
                    Err(err) => {
                        warn!(cell_id, error = %err, "unable to advance cell");
                        WatchOutcome::Ignored
                    }
                }
            }
            BreachRecord::Latched(_) => WatchOutcome::Debouncing,
        }
    }
}

fn numeric(event: &VesEvent, group: &str) -> Option<i64> {
    event.group_value(group).and_then(|raw| raw.trim().parse().ok())
}
