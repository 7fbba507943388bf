//! ---
//! sim_section: "03-cell-lifecycle"
//! sim_subsection: "tests"
//! sim_type: "source"
//! sim_scope: "test"
//! sim_description: "Lifecycle transitions observed through the broadcast status port."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::sync::Arc;

use cellsim_cell::{
    BroadcastNotifier, CellDirectory, CellError, CellState, StaticTerminalDirectory,
    CELL_STATUS_TOPIC,
};
use cellsim_common::config::{CellEntry, TerminalEntry, TopologyConfig};

fn topology() -> TopologyConfig {
    TopologyConfig {
        cells: vec![CellEntry {
            id: "Cell1".into(),
            latitude: 50.06,
            longitude: 19.94,
        }],
        terminals: vec![
            TerminalEntry {
                id: "ue-1".into(),
                cell: Some("Cell1".into()),
            },
            TerminalEntry {
                id: "ue-2".into(),
                cell: None,
            },
        ],
    }
}

#[tokio::test]
async fn subscribers_see_every_accepted_transition() {
    let topology = topology();
    let notifier = Arc::new(BroadcastNotifier::new(16));
    let mut status = notifier.subscribe();
    let directory = CellDirectory::from_topology(
        &topology,
        Arc::new(StaticTerminalDirectory::from_topology(&topology)),
        notifier.clone(),
    );

    assert!(directory.activate("Cell1").unwrap().is_changed());
    assert!(!directory.activate("Cell1").unwrap().is_changed());
    assert!(directory.mark_degraded("Cell1").unwrap().is_changed());
    assert!(directory.advance_automatically("Cell1").unwrap().is_changed());
    assert!(directory.retreat("Cell1").unwrap().is_changed());

    let mut states = Vec::new();
    while let Ok(message) = status.try_recv() {
        assert_eq!(message.topic, CELL_STATUS_TOPIC);
        assert_eq!(message.payload["terminals"], serde_json::json!(["ue-1"]));
        states.push(message.payload["state"].as_str().unwrap().to_owned());
    }
    assert_eq!(states, vec!["ACTIVE", "DRAINING", "ASLEEP", "DRAINING"]);
    assert_eq!(directory.state("Cell1").unwrap(), CellState::Draining);
}

#[tokio::test]
async fn unknown_cells_are_lookup_failures() {
    let topology = topology();
    let directory = CellDirectory::from_topology(
        &topology,
        Arc::new(StaticTerminalDirectory::from_topology(&topology)),
        Arc::new(BroadcastNotifier::default()),
    );
    assert_eq!(
        directory.activate("Cell7").unwrap_err(),
        CellError::NotFound("Cell7".into())
    );
    assert!(directory.snapshot("Cell7").is_err());
}
