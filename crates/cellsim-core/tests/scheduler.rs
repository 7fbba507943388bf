//! ---
//! sim_section: "05-telemetry-scheduling"
//! sim_subsection: "tests"
//! sim_type: "source"
//! sim_scope: "test"
//! sim_description: "Integration tests for per-cell scheduling and report aggregation."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
mod support;

use std::sync::Arc;
use std::time::Duration;

use cellsim_common::config::ReportingMode;
use cellsim_core::{SchedulerError, StartRequest, TelemetryScheduler};
use cellsim_ves::{THROUGHPUT_GROUP, TRAFFIC_MODEL_GROUP};
use support::{eventually, Harness, Options};

const WAIT: Duration = Duration::from_secs(5);

fn direct() -> StartRequest {
    StartRequest {
        mode: Some(ReportingMode::Direct),
        ..StartRequest::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn direct_mode_dispatches_customized_documents() {
    let harness = Harness::new(Options::default());
    let scheduler = harness.scheduler();
    scheduler.start("Cell1", direct()).unwrap();

    assert!(eventually(WAIT, || harness.dispatcher.count() >= 3).await);
    scheduler.stop("Cell1").await.unwrap();

    for event in harness.dispatcher.events() {
        assert_eq!(event.cell_identifier(), Some("Cell1"));
        let throughput: i64 = event.group_value(THROUGHPUT_GROUP).unwrap().parse().unwrap();
        assert!((40..100).contains(&throughput));
        let traffic = event.group(TRAFFIC_MODEL_GROUP).unwrap();
        assert_eq!(traffic.hash_map.len(), 2);
        assert!(event.common_event_header.last_epoch_microsec.is_some());
    }
    assert!(harness.buffer.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_starts_leave_a_single_schedule() {
    let harness = Harness::new(Options::default());
    let scheduler = harness.scheduler();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move {
            scheduler.start("Cell1", direct()).unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(scheduler.active_identifiers(), vec!["Cell1".to_owned()]);

    scheduler.stop("Cell1").await.unwrap();
    assert!(!scheduler.is_active("Cell1"));

    // Replaced tasks were aborted too; nothing keeps ticking.
    tokio::time::sleep(Duration::from_millis(60)).await;
    let settled = harness.dispatcher.count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.dispatcher.count(), settled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_replaces_the_running_schedule() {
    let harness = Harness::new(Options::default());
    let scheduler = harness.scheduler();

    let first = scheduler.start("Cell1", direct()).unwrap();
    let second = scheduler
        .start(
            "Cell1",
            StartRequest {
                interval: Some(Duration::from_millis(40)),
                mode: Some(ReportingMode::Direct),
                ..StartRequest::default()
            },
        )
        .unwrap();

    assert_ne!(first.job_id, second.job_id);
    let view = scheduler.scheduled("Cell1").unwrap();
    assert_eq!(view.job_id, second.job_id);
    assert_eq!(view.interval, Duration::from_millis(40));
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduled_view_reports_enriched_template() {
    let harness = Harness::new(Options::default());
    let scheduler = harness.scheduler();
    scheduler.start("Cell2", StartRequest::default()).unwrap();

    let view = scheduler.scheduled("Cell2").unwrap();
    assert_eq!(view.template.cell_identifier(), Some("Cell2"));
    assert_eq!(view.mode, ReportingMode::Buffered);
    assert!(view.job_id.ends_with("-Cell2"));
    assert!(!view.failure);

    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["intervalSecs"].as_f64(), Some(0.02));
    assert_eq!(json["mode"], "buffered");

    assert!(matches!(
        scheduler.scheduled("Cell1"),
        Err(SchedulerError::NotFound(_))
    ));
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopping_an_idle_cell_is_not_found() {
    let harness = Harness::new(Options::default());
    let scheduler = harness.scheduler();
    assert!(matches!(
        scheduler.stop("Cell1").await,
        Err(SchedulerError::NotFound(id)) if id == "Cell1"
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_interval_is_rejected() {
    let harness = Harness::new(Options::default());
    let scheduler = harness.scheduler();
    let result = scheduler.start(
        "Cell1",
        StartRequest {
            interval: Some(Duration::ZERO),
            ..StartRequest::default()
        },
    );
    assert!(matches!(result, Err(SchedulerError::InvalidInterval(_))));
    assert!(!scheduler.is_active("Cell1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopping_a_buffered_cell_flushes_its_snapshots() {
    let harness = Harness::new(Options::default());
    let scheduler = harness.scheduler();
    scheduler.start("Cell1", StartRequest::default()).unwrap();

    assert!(eventually(WAIT, || harness.buffer.len("Cell1") >= 2).await);
    scheduler.stop("Cell1").await.unwrap();

    assert!(harness.buffer.is_empty());
    assert_eq!(harness.notifications(), 1);
    assert_eq!(harness.archives(), 1);
    assert_eq!(std::fs::read_dir(&harness.work).unwrap().count(), 0);

    let notification = &harness.dispatcher.events()[0];
    let fields = notification.notification_fields.as_ref().unwrap();
    let entry = &fields.array_of_named_hash_map[0];
    assert!(entry.name.ends_with(".xml.gz"));
    assert_eq!(entry.hash_map["location"], format!("file:///mount/{}", entry.name));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn aggregator_runs_only_while_buffered_cells_exist() {
    let harness = Harness::new(Options::default());
    let scheduler = harness.scheduler();
    assert!(!scheduler.is_aggregator_running());

    scheduler.start("Cell2", direct()).unwrap();
    assert!(!scheduler.is_aggregator_running());

    scheduler.start("Cell1", StartRequest::default()).unwrap();
    assert!(scheduler.is_aggregator_running());

    scheduler.stop("Cell1").await.unwrap();
    assert!(scheduler.is_aggregator_running());

    scheduler.stop("Cell2").await.unwrap();
    assert!(!scheduler.is_aggregator_running());

    scheduler.start("Cell1", StartRequest::default()).unwrap();
    assert!(scheduler.is_aggregator_running());
    scheduler.shutdown().await;
    assert!(!scheduler.is_aggregator_running());
    assert!(scheduler.active_identifiers().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn aggregator_ships_reports_every_period() {
    let harness = Harness::new(Options {
        reporting_period: Duration::from_millis(100),
        ..Options::default()
    });
    let scheduler = harness.scheduler();
    scheduler.start("Cell1", StartRequest::default()).unwrap();
    scheduler.start("Cell2", StartRequest::default()).unwrap();

    assert!(eventually(WAIT, || harness.notifications() >= 2).await);
    scheduler.shutdown().await;
    assert!(harness.archives() >= 2);
}

#[test]
fn scheduler_needs_a_runtime() {
    let harness = Harness::new(Options::default());
    let result = TelemetryScheduler::new(harness.settings.clone(), harness.parts.clone());
    assert!(matches!(result, Err(SchedulerError::NoRuntime)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopping_the_last_cell_lets_an_in_flight_report_finish() {
    let harness = Harness::new(Options {
        reporting_period: Duration::from_millis(150),
        ..Options::default()
    });
    harness
        .dispatcher
        .set_notification_delay(Duration::from_millis(400));
    let scheduler = harness.scheduler();
    scheduler.start("Cell1", direct()).unwrap();
    scheduler.start("Cell2", StartRequest::default()).unwrap();

    // The first pass drains Cell2 at 150ms and is still dispatching at 250ms.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let (cell2, cell1) = tokio::join!(scheduler.stop("Cell2"), scheduler.stop("Cell1"));
    cell2.unwrap();
    cell1.unwrap();

    assert!(!scheduler.is_aggregator_running());
    assert!(harness.archives() >= 1);
    assert_eq!(harness.notifications(), harness.archives());
    assert!(harness.buffer.is_empty());
    assert_eq!(std::fs::read_dir(&harness.work).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_start_stop_and_restart_keep_one_schedule() {
    let harness = Harness::new(Options::default());
    let scheduler = harness.scheduler();

    let mut handles = Vec::new();
    for round in 0..24u64 {
        let scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move {
            match round % 3 {
                0 => {
                    scheduler.start("Cell1", direct()).unwrap();
                }
                1 => {
                    // Losing the race to another stop is fine.
                    let _ = scheduler.stop("Cell1").await;
                }
                _ => {
                    scheduler
                        .start(
                            "Cell1",
                            StartRequest {
                                interval: Some(Duration::from_millis(10 + round)),
                                mode: Some(ReportingMode::Direct),
                                ..StartRequest::default()
                            },
                        )
                        .unwrap();
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let active = scheduler.active_identifiers();
    assert!(active.len() <= 1);
    assert_eq!(active.is_empty(), !scheduler.is_active("Cell1"));
    if !active.is_empty() {
        scheduler.stop("Cell1").await.unwrap();
    }
    assert!(scheduler.active_identifiers().is_empty());

    tokio::time::sleep(Duration::from_millis(60)).await;
    let settled = harness.dispatcher.count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.dispatcher.count(), settled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_buffered_starts_share_one_aggregator() {
    let harness = Harness::new(Options::default());
    let scheduler = harness.scheduler();

    let mut handles = Vec::new();
    for index in 0..8 {
        let scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move {
            scheduler
                .start(&format!("Cell{index}"), StartRequest::default())
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(scheduler.active_identifiers().len(), 8);
    assert!(scheduler.is_aggregator_running());
    assert_eq!(scheduler.aggregator_launches(), 1);

    scheduler.shutdown().await;
    assert!(!scheduler.is_aggregator_running());
    assert_eq!(scheduler.aggregator_launches(), 1);
}
