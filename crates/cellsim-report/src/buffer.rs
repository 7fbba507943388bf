//! ---
//! sim_section: "04-bulk-reporting"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Bulk report buffering, compilation, and shipping."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::time::Duration;

use cellsim_ves::VesEvent;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{ReportError, Result};

pub const DEFAULT_CELL_CAPACITY: usize = 10_000;

/// One customized document captured for later bulk compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedSnapshot {
    pub cell_id: String,
    pub job_id: String,
    pub granularity_period: Duration,
    pub captured_at: DateTime<Utc>,
    pub event: VesEvent,
}

/// Per-cell ordered snapshot collections shared by ticking tasks and the aggregator.
#[derive(Debug)]
pub struct SnapshotBuffer {
    cells: Mutex<IndexMap<String, Vec<BufferedSnapshot>>>,
    capacity_per_cell: usize,
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CELL_CAPACITY)
    }
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity_per_cell: usize) -> Self {
        Self {
            cells: Mutex::new(IndexMap::new()),
            capacity_per_cell,
        }
    }

    /// Append a snapshot, returning the cell's new buffered count.
    pub fn append(&self, snapshot: BufferedSnapshot) -> Result<usize> {
        let mut cells = self.cells.lock();
        let entries = cells.entry(snapshot.cell_id.clone()).or_default();
        if entries.len() >= self.capacity_per_cell {
            return Err(ReportError::BufferFull {
                cell_id: snapshot.cell_id,
                capacity: self.capacity_per_cell,
            });
        }
        trace!(cell_id = %snapshot.cell_id, job_id = %snapshot.job_id, sequence = entries.len() + 1, "snapshot buffered");
        entries.push(snapshot);
        Ok(entries.len())
    }

    pub fn len(&self, cell_id: &str) -> usize {
        self.cells.lock().get(cell_id).map(Vec::len).unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.cells.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Take every snapshot buffered for `cell_id`.
    pub fn drain_cell(&self, cell_id: &str) -> Vec<BufferedSnapshot> {
        self.cells.lock().shift_remove(cell_id).unwrap_or_default()
    }

    /// Take every buffered snapshot, grouped by cell in insertion order.
    pub fn drain_per_cell(&self) -> Vec<(String, Vec<BufferedSnapshot>)> {
        std::mem::take(&mut *self.cells.lock())
            .into_iter()
            .filter(|(_, snapshots)| !snapshots.is_empty())
            .collect()
    }

    /// Take every buffered snapshot as one batch.
    pub fn drain_all(&self) -> Vec<BufferedSnapshot> {
        self.drain_per_cell()
            .into_iter()
            .flat_map(|(_, snapshots)| snapshots)
            .collect()
    }
}
