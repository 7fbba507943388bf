//! ---
//! sim_section: "04-bulk-reporting"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Bulk report buffering, compilation, and shipping."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
//! Buffered telemetry snapshots become measCollec XML reports that are
//! compressed, transferred, and announced with a report-ready notification.

pub mod buffer;
pub mod compiler;
pub mod error;
pub mod file_ready;
pub mod transfer;

pub use buffer::{BufferedSnapshot, SnapshotBuffer};
pub use compiler::{file_base_name, BulkReportCompiler, CompiledReport, CompilerSettings};
pub use error::{ReportError, Result};
pub use file_ready::FileReadyBuilder;
pub use transfer::{
    uploader_from_config, Compressor, GzipCompressor, LocalMountCopier, ReadyReport,
    ReportUploader, SftpUploader, TempArtifact, TransferPipeline,
};
