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

use cellsim_common::config::TopologyConfig;
use cellsim_ves::TerminalLookup;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{CellError, Result};
use crate::lifecycle::{CellLifecycle, CellState, LifecycleAction, Transition};
use crate::notify::{StatusNotifier, CELL_STATUS_TOPIC};

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    lifecycle: CellLifecycle,
}

impl Cell {
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
            lifecycle: CellLifecycle::default(),
        }
    }

    pub fn lifecycle(&self) -> CellLifecycle {
        self.lifecycle
    }
}

/// Read view of a cell with its attached terminals resolved at read time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellSnapshot {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub state: CellState,
    pub terminals: Vec<String>,
}

/// Terminal-to-cell association fixed at startup.
#[derive(Debug, Default, Clone)]
pub struct StaticTerminalDirectory {
    assignments: IndexMap<String, Option<String>>,
}

impl StaticTerminalDirectory {
    pub fn from_topology(topology: &TopologyConfig) -> Self {
        let assignments = topology
            .terminals
            .iter()
            .map(|terminal| (terminal.id.clone(), terminal.cell.clone()))
            .collect();
        Self { assignments }
    }

    pub fn attach(&mut self, terminal_id: impl Into<String>, cell_id: Option<String>) {
        self.assignments.insert(terminal_id.into(), cell_id);
    }
}

impl TerminalLookup for StaticTerminalDirectory {
    fn terminals_for_cell(&self, cell_id: &str) -> Vec<String> {
        self.assignments
            .iter()
            .filter(|(_, cell)| cell.as_deref() == Some(cell_id))
            .map(|(terminal, _)| terminal.clone())
            .collect()
    }
}

/// Cells keyed by identifier, each owning its lifecycle value.
pub struct CellDirectory {
    cells: RwLock<IndexMap<String, Cell>>,
    terminals: Arc<dyn TerminalLookup>,
    notifier: Arc<dyn StatusNotifier>,
}

impl std::fmt::Debug for CellDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellDirectory")
            .field("cells", &self.cells.read().len())
            .finish()
    }
}

impl CellDirectory {
    pub fn new(terminals: Arc<dyn TerminalLookup>, notifier: Arc<dyn StatusNotifier>) -> Self {
        Self {
            cells: RwLock::new(IndexMap::new()),
            terminals,
            notifier,
        }
    }

    pub fn from_topology(
        topology: &TopologyConfig,
        terminals: Arc<dyn TerminalLookup>,
        notifier: Arc<dyn StatusNotifier>,
    ) -> Self {
        let directory = Self::new(terminals, notifier);
        for entry in &topology.cells {
            directory.insert(Cell::new(entry.id.clone(), entry.latitude, entry.longitude));
        }
        directory
    }

    pub fn insert(&self, cell: Cell) {
        self.cells.write().insert(cell.id.clone(), cell);
    }

    pub fn contains(&self, cell_id: &str) -> bool {
        self.cells.read().contains_key(cell_id)
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.cells.read().keys().cloned().collect()
    }

    pub fn terminals(&self) -> Arc<dyn TerminalLookup> {
        Arc::clone(&self.terminals)
    }

    pub fn state(&self, cell_id: &str) -> Result<CellState> {
        self.cells
            .read()
            .get(cell_id)
            .map(|cell| cell.lifecycle.state())
            .ok_or_else(|| CellError::NotFound(cell_id.to_owned()))
    }

    pub fn snapshot(&self, cell_id: &str) -> Result<CellSnapshot> {
        let cells = self.cells.read();
        let cell = cells
            .get(cell_id)
            .ok_or_else(|| CellError::NotFound(cell_id.to_owned()))?;
        Ok(self.snapshot_of(cell))
    }

    fn snapshot_of(&self, cell: &Cell) -> CellSnapshot {
        CellSnapshot {
            id: cell.id.clone(),
            latitude: cell.latitude,
            longitude: cell.longitude,
            state: cell.lifecycle.state(),
            terminals: self.terminals.terminals_for_cell(&cell.id),
        }
    }

    pub fn activate(&self, cell_id: &str) -> Result<Transition> {
        self.transition(cell_id, LifecycleAction::Activate)
    }

    pub fn mark_degraded(&self, cell_id: &str) -> Result<Transition> {
        self.transition(cell_id, LifecycleAction::MarkDegraded)
    }

    pub fn retreat(&self, cell_id: &str) -> Result<Transition> {
        self.transition(cell_id, LifecycleAction::Retreat)
    }

    pub fn advance_automatically(&self, cell_id: &str) -> Result<Transition> {
        self.transition(cell_id, LifecycleAction::AdvanceAutomatically)
    }

    fn transition(&self, cell_id: &str, action: LifecycleAction) -> Result<Transition> {
        let (outcome, snapshot) = {
            let mut cells = self.cells.write();
            let Some(cell) = cells.get_mut(cell_id) else {
                warn!(cell_id, ?action, "lifecycle action for unknown cell");
                return Err(CellError::NotFound(cell_id.to_owned()));
            };
            let outcome = cell.lifecycle.apply(action);
            match outcome {
                Transition::Changed { to, .. } => {
                    cell.lifecycle = to;
                    (outcome, Some(self.snapshot_of(cell)))
                }
                Transition::Rejected { .. } => (outcome, None),
            }
        };

        match (&outcome, snapshot) {
            (Transition::Changed { from, to }, Some(snapshot)) => {
                info!(cell_id, ?action, from = %from, to = %to.state(), "cell state changed");
                match serde_json::to_value(&snapshot) {
                    Ok(payload) => self.notifier.notify(CELL_STATUS_TOPIC, payload),
                    Err(err) => warn!(cell_id, error = %err, "unable to encode cell status"),
                }
            }
            (Transition::Rejected { state, required, .. }, _) => {
                info!(cell_id, ?action, state = %state, ?required, "transition rejected");
            }
            _ => {}
        }
        Ok(outcome)
    }
}
