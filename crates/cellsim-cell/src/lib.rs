//! ---
//! sim_section: "03-cell-lifecycle"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Cell lifecycle, directories, and automatic failure transitions."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
//! Simulated cells: lifecycle state machine, directories, status
//! notification, and the watcher that puts failing cells to sleep.

pub mod directory;
pub mod error;
pub mod failure_mode;
pub mod lifecycle;
pub mod notify;
pub mod watcher;

pub use directory::{Cell, CellDirectory, CellSnapshot, StaticTerminalDirectory};
pub use error::{CellError, Result};
pub use failure_mode::{BreachRecord, FailureModeRegistry};
pub use lifecycle::{transition, CellLifecycle, CellState, LifecycleAction, Transition};
pub use notify::{
    BroadcastNotifier, RecordingNotifier, StatusMessage, StatusNotifier, CELL_STATUS_TOPIC,
};
pub use watcher::{FailureWatcher, WatchOutcome};
