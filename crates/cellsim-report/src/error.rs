//! ---
//! sim_section: "04-bulk-reporting"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Bulk report buffering, compilation, and shipping."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("snapshot buffer for cell {cell_id} is full ({capacity} entries)")]
    BufferFull { cell_id: String, capacity: usize },
    #[error("xml writer error: {0}")]
    Xml(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("compression of {path} failed: {source}")]
    Compression {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload of {file_name} failed: {reason}")]
    Upload { file_name: String, reason: String },
}

impl ReportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReportError::Io {
            path: path.into(),
            source,
        }
    }
}
