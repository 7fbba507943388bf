//! ---
//! sim_section: "02-telemetry-documents"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Measurement document model and synthetic value evolution."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VesError>;

#[derive(Debug, Error)]
pub enum VesError {
    #[error("invalid range marker '{marker}': {reason}")]
    InvalidMarker { marker: String, reason: &'static str },
    #[error("document carries no measurement fields")]
    MissingMeasurements,
    #[error("unable to read template {path}: {source}")]
    TemplateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
