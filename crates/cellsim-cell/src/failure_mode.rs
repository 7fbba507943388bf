//! ---
//! sim_section: "03-cell-lifecycle"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Cell lifecycle, directories, and automatic failure transitions."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::collections::HashMap;

use parking_lot::Mutex;

/// Outcome of recording a threshold breach.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BreachRecord {
    /// Cell is not in failure mode; nothing stored.
    Unmarked,
    /// First breach for this failure run; latch set to the given timestamp.
    Armed(i64),
    /// Latch was already set at the given timestamp.
    Latched(i64),
}

/// Cells currently running failure telemetry, with their first-breach latch.
#[derive(Debug, Default)]
pub struct FailureModeRegistry {
    entries: Mutex<HashMap<String, Option<i64>>>,
}

impl FailureModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `cell_id` as failing. A fresh mark starts with an empty latch.
    pub fn mark(&self, cell_id: &str) {
        self.entries.lock().insert(cell_id.to_owned(), None);
    }

    pub fn unmark(&self, cell_id: &str) -> bool {
        self.entries.lock().remove(cell_id).is_some()
    }

    pub fn is_marked(&self, cell_id: &str) -> bool {
        self.entries.lock().contains_key(cell_id)
    }

    pub fn first_breach(&self, cell_id: &str) -> Option<i64> {
        self.entries.lock().get(cell_id).copied().flatten()
    }

    /// Set the latch on first sight; later breaches never move it.
    pub fn record_breach(&self, cell_id: &str, observed_micros: i64) -> BreachRecord {
        let mut entries = self.entries.lock();
        match entries.get_mut(cell_id) {
            None => BreachRecord::Unmarked,
            Some(slot) => match *slot {
                Some(first) => BreachRecord::Latched(first),
                None => {
                    *slot = Some(observed_micros);
                    BreachRecord::Armed(observed_micros)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_is_monotonic_until_unmarked() {
        let registry = FailureModeRegistry::new();
        assert_eq!(registry.record_breach("Cell1", 5), BreachRecord::Unmarked);

        registry.mark("Cell1");
        assert_eq!(registry.record_breach("Cell1", 10), BreachRecord::Armed(10));
        assert_eq!(registry.record_breach("Cell1", 20), BreachRecord::Latched(10));
        assert_eq!(registry.first_breach("Cell1"), Some(10));

        assert!(registry.unmark("Cell1"));
        assert!(!registry.is_marked("Cell1"));
        registry.mark("Cell1");
        assert_eq!(registry.first_breach("Cell1"), None);
    }
}
