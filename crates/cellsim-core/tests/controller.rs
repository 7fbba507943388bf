//! ---
//! sim_section: "05-telemetry-scheduling"
//! sim_subsection: "tests"
//! sim_type: "source"
//! sim_scope: "test"
//! sim_description: "Integration tests for lifecycle-gated telemetry control."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
mod support;

use std::time::Duration;

use cellsim_cell::{CellState, CELL_STATUS_TOPIC};
use cellsim_common::config::ReportingMode;
use cellsim_core::{ControlOutcome, SchedulerError, StartRequest};
use cellsim_ves::{bundled_measurement_template, THROUGHPUT_GROUP, VALUE_FIELD};
use support::{eventually, Harness, Options};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_reports_is_gated_by_lifecycle() {
    let harness = Harness::new(Options::default());
    let controller = harness.controller();

    let outcome = controller
        .start_reports("Cell1", StartRequest::default())
        .unwrap();
    assert_eq!(outcome, ControlOutcome::Accepted);
    assert_eq!(harness.directory.state("Cell1").unwrap(), CellState::Active);
    assert!(controller.scheduler().is_active("Cell1"));

    let again = controller
        .start_reports("Cell1", StartRequest::default())
        .unwrap();
    assert_eq!(
        again,
        ControlOutcome::Conflict {
            state: CellState::Active,
            required: &[CellState::Dormant],
        }
    );

    let messages = harness.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].topic, CELL_STATUS_TOPIC);
    assert_eq!(messages[0].payload["state"], "ACTIVE");

    assert_eq!(controller.stop_reports("Cell1").await, ControlOutcome::Accepted);
    assert_eq!(harness.directory.state("Cell1").unwrap(), CellState::Dormant);
    assert!(!controller.scheduler().is_active("Cell1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_cells_are_not_found() {
    let harness = Harness::new(Options::default());
    let controller = harness.controller();
    assert_eq!(
        controller
            .start_reports("Cell9", StartRequest::default())
            .unwrap(),
        ControlOutcome::NotFound
    );
    assert_eq!(controller.start_failure("Cell9", None).unwrap(), ControlOutcome::NotFound);
    assert_eq!(controller.stop_reports("Cell9").await, ControlOutcome::NotFound);
    assert_eq!(controller.stop_failure("Cell9").await, ControlOutcome::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failure_requires_an_active_cell() {
    let harness = Harness::new(Options::default());
    let controller = harness.controller();

    let outcome = controller.start_failure("Cell1", None).unwrap();
    assert!(matches!(
        outcome,
        ControlOutcome::Conflict {
            state: CellState::Dormant,
            ..
        }
    ));
    assert!(!harness.failure_modes.is_marked("Cell1"));
    assert_eq!(
        controller.stop_reports("Cell1").await,
        ControlOutcome::Conflict {
            state: CellState::Dormant,
            required: &[CellState::Active, CellState::Draining, CellState::Asleep],
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sustained_failure_puts_the_cell_to_sleep() {
    let harness = Harness::new(Options {
        debounce: Duration::ZERO,
        ..Options::default()
    });
    let controller = harness.controller();

    controller
        .start_reports("Cell1", StartRequest::default())
        .unwrap();
    let outcome = controller
        .start_failure("Cell1", Some(ReportingMode::Direct))
        .unwrap();
    assert_eq!(outcome, ControlOutcome::Accepted);
    assert_eq!(harness.directory.state("Cell1").unwrap(), CellState::Draining);
    assert!(harness.failure_modes.is_marked("Cell1"));
    assert!(controller.scheduler().scheduled("Cell1").unwrap().failure);

    let directory = harness.directory.clone();
    assert!(
        eventually(WAIT, || directory.state("Cell1").unwrap() == CellState::Asleep).await
    );
    assert!(harness.failure_modes.first_breach("Cell1").is_some());

    // Stop-failure from ASLEEP steps back once and clears the latch.
    assert_eq!(controller.stop_failure("Cell1").await, ControlOutcome::Accepted);
    assert_eq!(harness.directory.state("Cell1").unwrap(), CellState::Draining);
    assert!(!harness.failure_modes.is_marked("Cell1"));
    assert!(!controller.scheduler().is_active("Cell1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failure_telemetry_replaces_regular_telemetry() {
    let harness = Harness::new(Options::default());
    let controller = harness.controller();
    let scheduler = controller.scheduler();

    controller
        .start_reports("Cell1", StartRequest::default())
        .unwrap();
    let regular = scheduler.scheduled("Cell1").unwrap();
    controller.start_failure("Cell1", None).unwrap();
    let failure = scheduler.scheduled("Cell1").unwrap();

    assert_ne!(regular.job_id, failure.job_id);
    assert!(failure.failure);
    assert_eq!(scheduler.active_identifiers().len(), 1);
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_template_reverts_the_lifecycle() {
    let harness = Harness::new(Options::default());
    let controller = harness.controller();

    let mut template = bundled_measurement_template().unwrap();
    let groups = template.measurements_mut().unwrap();
    let throughput = groups
        .iter_mut()
        .find(|group| group.name == THROUGHPUT_GROUP)
        .unwrap();
    throughput
        .hash_map
        .insert(VALUE_FIELD.to_owned(), "[[5->5]]".to_owned());

    let result = controller.start_reports(
        "Cell1",
        StartRequest {
            template: Some(template),
            ..StartRequest::default()
        },
    );
    assert!(matches!(result, Err(SchedulerError::Template(_))));
    assert_eq!(harness.directory.state("Cell1").unwrap(), CellState::Dormant);
    assert!(!controller.scheduler().is_active("Cell1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopping_without_running_telemetry_is_not_found() {
    let harness = Harness::new(Options::default());
    let controller = harness.controller();
    harness.directory.activate("Cell1").unwrap();
    assert!(!controller.scheduler().is_active("Cell1"));

    assert_eq!(controller.stop_reports("Cell1").await, ControlOutcome::NotFound);
    // The lifecycle still stepped back.
    assert_eq!(harness.directory.state("Cell1").unwrap(), CellState::Dormant);

    harness.directory.activate("Cell2").unwrap();
    harness.directory.mark_degraded("Cell2").unwrap();
    harness.failure_modes.mark("Cell2");
    assert_eq!(controller.stop_failure("Cell2").await, ControlOutcome::NotFound);
    assert_eq!(harness.directory.state("Cell2").unwrap(), CellState::Active);
    assert!(!harness.failure_modes.is_marked("Cell2"));
}
