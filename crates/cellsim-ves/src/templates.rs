//! ---
//! sim_section: "02-telemetry-documents"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Measurement document model and synthetic value evolution."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, VesError};
use crate::evolver::ValueSeries;
use crate::model::VesEvent;

const MEASUREMENT_TEMPLATE: &str = include_str!("../templates/measurement.json");
const FAILURE_TEMPLATE: &str = include_str!("../templates/failure.json");

/// Regular telemetry template shipped with the crate.
pub fn bundled_measurement_template() -> Result<VesEvent> {
    parse_template(MEASUREMENT_TEMPLATE, "bundled measurement template")
}

/// Failure telemetry template shipped with the crate.
pub fn bundled_failure_template() -> Result<VesEvent> {
    parse_template(FAILURE_TEMPLATE, "bundled failure template")
}

/// Load a template stored in envelope form, rejecting malformed markers up front.
pub fn load_template(path: impl AsRef<Path>) -> Result<VesEvent> {
    let path = path.as_ref();
    debug!(template_path = %path.display(), "loading telemetry template");
    let raw = fs::read_to_string(path).map_err(|source| VesError::TemplateIo {
        path: path.to_path_buf(),
        source,
    })?;
    parse_template(&raw, &path.display().to_string())
}

fn parse_template(raw: &str, origin: &str) -> Result<VesEvent> {
    let event = VesEvent::from_envelope_json(raw)?;
    if event.measurement_fields.is_none() {
        return Err(VesError::MissingMeasurements);
    }
    for group in event.measurements() {
        for value in group.hash_map.values() {
            if ValueSeries::is_marker(value) {
                ValueSeries::parse(value)?;
            }
        }
    }
    debug!(origin, groups = event.measurements().len(), "template parsed");
    Ok(event)
}
