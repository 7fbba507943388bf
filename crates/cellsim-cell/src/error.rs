//! ---
//! sim_section: "03-cell-lifecycle"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Cell lifecycle, directories, and automatic failure transitions."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CellError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CellError {
    #[error("cell {0} not found")]
    NotFound(String),
}
