// tests/progress_events.rs

use std::sync::{Arc, Mutex};

use assetrun::dag::Scheduler;
use assetrun::engine::{CheckTally, ProgressEvent, ProgressReporter, RunRequest, execute_run};
use assetrun::types::{InstanceStatus, InstanceType};
use assetrun_test_utils::builders::{AssetBuilder, PipelineBuilder};
use assetrun_test_utils::fake_operator::{RecordingOperator, registry_for};
use assetrun_test_utils::{init_tracing, params, with_timeout};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct CollectingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingReporter {
    fn events_for(&self, human_id: &str) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.human_id == human_id)
            .cloned()
            .collect()
    }
}

impl ProgressReporter for CollectingReporter {
    fn report(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[tokio::test]
async fn reports_running_then_terminal_status_with_check_tally() {
    init_tracing();
    let pipeline = PipelineBuilder::new("p")
        .with_asset(
            AssetBuilder::new("a")
                .column_check("id", "not_null", true)
                .column_check("id", "positive", false)
                .build(),
        )
        .with_asset(AssetBuilder::new("b").depends("a").build())
        .build();
    let reporter = Arc::new(CollectingReporter::default());
    let scheduler = Arc::new(Scheduler::new(&pipeline, "run").with_reporter(reporter.clone()));
    let operator = Arc::new(RecordingOperator::new().failing("a:id:positive"));

    with_timeout(execute_run(RunRequest {
        scheduler,
        registry: Arc::new(registry_for(operator)),
        params: Arc::new(params(1)),
        store: None,
        reporter: Some(reporter.clone()),
        cancel: CancellationToken::new(),
    }))
    .await
    .unwrap();

    let main_events = reporter.events_for("a");
    let statuses: Vec<InstanceStatus> = main_events.iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![InstanceStatus::Running, InstanceStatus::Succeeded]);
    assert_eq!(main_events[1].instance_type, InstanceType::Main);
    assert!(main_events[1].duration.is_some());

    let failed = reporter.events_for("a:id:positive");
    let last = failed.last().unwrap();
    assert_eq!(last.status, InstanceStatus::Failed);
    assert!(last.error.as_deref().unwrap().contains("failed on purpose"));

    // With one worker, the tally on the last check event covers both checks.
    let tallies: Vec<CheckTally> = ["a:id:not_null", "a:id:positive"]
        .iter()
        .filter_map(|id| reporter.events_for(id).last().and_then(|e| e.checks))
        .collect();
    assert!(tallies.contains(&CheckTally {
        passed: 1,
        failed: 1,
        total: 2
    }));
}

#[tokio::test]
async fn cascaded_dependents_are_reported_as_upstream_failed() {
    init_tracing();
    let pipeline = PipelineBuilder::new("p")
        .with_asset(AssetBuilder::new("a").build())
        .with_asset(AssetBuilder::new("b").depends("a").build())
        .build();
    let reporter = Arc::new(CollectingReporter::default());
    let scheduler = Arc::new(Scheduler::new(&pipeline, "run").with_reporter(reporter.clone()));

    with_timeout(execute_run(RunRequest {
        scheduler,
        registry: Arc::new(registry_for(Arc::new(RecordingOperator::new().failing("a")))),
        params: Arc::new(params(1)),
        store: None,
        reporter: None,
        cancel: CancellationToken::new(),
    }))
    .await
    .unwrap();

    let b = reporter.events_for("b");
    assert_eq!(b.len(), 1);
    assert_eq!(b[0].status, InstanceStatus::UpstreamFailed);
    assert!(b[0].duration.is_none());
}
