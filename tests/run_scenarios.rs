// tests/run_scenarios.rs
//
// End-to-end runs through the worker pool with fake operators.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use assetrun::config::Pipeline;
use assetrun::engine::RunOutcome;
use assetrun::types::InstanceStatus;
use assetrun_test_utils::builders::{AssetBuilder, PipelineBuilder, chain_pipeline};
use assetrun_test_utils::fake_operator::{RecordingOperator, registry_for};
use assetrun_test_utils::{init_tracing, run_to_completion, scheduler_for};

fn statuses(outcome: &RunOutcome) -> HashMap<String, InstanceStatus> {
    outcome
        .state
        .state
        .iter()
        .map(|s| (s.name.clone(), s.status))
        .collect()
}

fn position(order: &[String], human_id: &str) -> usize {
    order
        .iter()
        .position(|h| h == human_id)
        .unwrap_or_else(|| panic!("{human_id} never ran"))
}

async fn run(pipeline: &Pipeline, operator: Arc<RecordingOperator>, workers: usize) -> RunOutcome {
    run_to_completion(scheduler_for(pipeline), registry_for(operator), workers).await
}

fn diamond() -> Pipeline {
    PipelineBuilder::new("diamond")
        .with_asset(AssetBuilder::new("a").build())
        .with_asset(AssetBuilder::new("b").depends("a").build())
        .with_asset(AssetBuilder::new("c").depends("a").build())
        .with_asset(AssetBuilder::new("d").depends("b").depends("c").build())
        .build()
}

#[tokio::test]
async fn linear_chain_runs_in_dependency_order() {
    init_tracing();
    let operator = Arc::new(RecordingOperator::new());

    let outcome = run(&chain_pipeline(), Arc::clone(&operator), 4).await;

    let order: Vec<String> = outcome
        .results
        .iter()
        .map(|r| r.instance.human_id.clone())
        .collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert!(outcome.results.iter().all(|r| r.is_success()));
    assert_eq!(operator.executed(), vec!["a", "b", "c"]);
    assert!(statuses(&outcome).values().all(|s| *s == InstanceStatus::Succeeded));
    assert!(!outcome.has_blocking_failures);
}

#[tokio::test]
async fn diamond_with_failing_branch() {
    init_tracing();
    let operator = Arc::new(RecordingOperator::new().failing("b"));

    let outcome = run(&diamond(), Arc::clone(&operator), 4).await;
    let statuses = statuses(&outcome);

    assert_eq!(statuses["a"], InstanceStatus::Succeeded);
    assert_eq!(statuses["b"], InstanceStatus::Failed);
    assert_eq!(statuses["c"], InstanceStatus::Succeeded);
    assert_eq!(statuses["d"], InstanceStatus::UpstreamFailed);
    assert!(!operator.executed().contains(&"d".to_string()));
    assert!(outcome.has_blocking_failures);
}

#[tokio::test]
async fn failing_blocking_column_check_stops_dependents() {
    init_tracing();
    let pipeline = PipelineBuilder::new("p")
        .with_asset(AssetBuilder::new("x").column_check("col", "not_null", true).build())
        .with_asset(AssetBuilder::new("z").depends("x").build())
        .build();
    let operator = Arc::new(RecordingOperator::new().failing("x:col:not_null"));

    let outcome = run(&pipeline, operator, 2).await;
    let statuses = statuses(&outcome);

    assert_eq!(statuses["x"], InstanceStatus::Succeeded);
    assert_eq!(statuses["x:col:not_null"], InstanceStatus::Failed);
    assert_eq!(statuses["z"], InstanceStatus::UpstreamFailed);
    assert!(outcome.has_blocking_failures);
}

#[tokio::test]
async fn failing_non_blocking_custom_check_does_not_stop_dependents() {
    init_tracing();
    let pipeline = PipelineBuilder::new("p")
        .with_asset(AssetBuilder::new("y").custom_check("freshness", false).build())
        .with_asset(AssetBuilder::new("w").depends("y").build())
        .build();
    let operator = Arc::new(RecordingOperator::new().failing("y:custom-check:freshness"));

    let outcome = run(&pipeline, Arc::clone(&operator), 2).await;
    let statuses = statuses(&outcome);

    assert_eq!(statuses["y"], InstanceStatus::Succeeded);
    assert_eq!(statuses["y:custom-check:freshness"], InstanceStatus::Failed);
    assert_eq!(statuses["w"], InstanceStatus::Succeeded);
    assert!(operator.executed().contains(&"w".to_string()));
    assert!(!outcome.has_blocking_failures);
}

#[tokio::test]
async fn independent_chains_complete_with_a_single_worker() {
    init_tracing();
    let pipeline = PipelineBuilder::new("p")
        .with_asset(AssetBuilder::new("a").build())
        .with_asset(AssetBuilder::new("b").depends("a").build())
        .with_asset(AssetBuilder::new("c").build())
        .with_asset(AssetBuilder::new("d").depends("c").build())
        .build();
    let operator = Arc::new(RecordingOperator::new().with_delay(Duration::from_millis(5)));

    let outcome = run(&pipeline, Arc::clone(&operator), 1).await;
    let order = operator.executed();

    assert_eq!(order.len(), 4);
    assert!(position(&order, "a") < position(&order, "b"));
    assert!(position(&order, "c") < position(&order, "d"));
    assert_eq!(operator.max_in_flight(), 1);
    assert!(statuses(&outcome).values().all(|s| *s == InstanceStatus::Succeeded));
}

#[tokio::test]
async fn resumed_chain_only_runs_reset_instances() {
    init_tracing();
    let pipeline = chain_pipeline();
    let scheduler = scheduler_for(&pipeline);
    scheduler.mark_all(InstanceStatus::Succeeded);
    scheduler.mark_asset("b", InstanceStatus::Pending, true).unwrap();
    let operator = Arc::new(RecordingOperator::new());

    let outcome = run_to_completion(scheduler, registry_for(operator.clone()), 2).await;

    assert_eq!(operator.executed(), vec!["b", "c"]);
    let statuses = statuses(&outcome);
    for name in ["a", "b", "c"] {
        assert_eq!(statuses[name], InstanceStatus::Succeeded, "{name}");
    }
}

#[tokio::test]
async fn every_instance_is_dispatched_exactly_once() {
    init_tracing();
    let pipeline = PipelineBuilder::new("wide")
        .with_metadata_push(true)
        .with_asset(
            AssetBuilder::new("src")
                .column_check("id", "not_null", true)
                .column_check("id", "unique", false)
                .custom_check("rows", true)
                .build(),
        )
        .with_asset(AssetBuilder::new("m1").depends("src").build())
        .with_asset(AssetBuilder::new("m2").depends("src").build())
        .with_asset(AssetBuilder::new("m3").depends("m1").depends("m2").build())
        .build();
    let scheduler = scheduler_for(&pipeline);
    let total = scheduler.instance_count();
    let operator = Arc::new(RecordingOperator::new().with_delay(Duration::from_millis(2)));

    let outcome = run_to_completion(Arc::clone(&scheduler), registry_for(operator.clone()), 3).await;

    assert_eq!(scheduler.dispatched_count(), total);
    assert_eq!(outcome.results.len(), total);

    let mut executed = operator.executed();
    executed.sort();
    executed.dedup();
    assert_eq!(executed.len(), total);
}

#[tokio::test]
async fn worker_count_bounds_concurrency() {
    init_tracing();
    let mut builder = PipelineBuilder::new("flat");
    for i in 0..8 {
        builder = builder.with_asset(AssetBuilder::new(&format!("asset_{i}")).build());
    }
    let operator = Arc::new(RecordingOperator::new().with_delay(Duration::from_millis(20)));

    run(&builder.build(), Arc::clone(&operator), 3).await;

    assert_eq!(operator.executed().len(), 8);
    assert!(operator.max_in_flight() <= 3);
    assert!(operator.max_in_flight() >= 2);
}

#[tokio::test]
async fn nothing_pending_returns_immediately() {
    init_tracing();
    let scheduler = scheduler_for(&chain_pipeline());
    scheduler.mark_all(InstanceStatus::Skipped);
    let operator = Arc::new(RecordingOperator::new());

    let outcome = run_to_completion(scheduler, registry_for(operator.clone()), 2).await;

    assert!(outcome.results.is_empty());
    assert!(operator.executed().is_empty());
    assert_eq!(outcome.count(InstanceStatus::Skipped), 3);
}
