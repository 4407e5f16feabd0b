// tests/run_state.rs

use std::path::Path;
use std::sync::Arc;

use assetrun::config::Pipeline;
use assetrun::dag::Scheduler;
use assetrun::errors::PipelineError;
use assetrun::fs::mock::MockFileSystem;
use assetrun::state::{
    InstanceState, PipelineState, RunConfig, StateStore, aggregate_status, compatibility_hash,
};
use assetrun::types::{InstanceStatus, OnlyFilter};
use assetrun_test_utils::builders::{AssetBuilder, PipelineBuilder, chain_pipeline};
use assetrun_test_utils::fake_operator::{RecordingOperator, registry_for};
use assetrun_test_utils::{init_tracing, run_to_completion};

fn snapshot_with(scheduler: &Scheduler, overrides: &[(&str, InstanceStatus)]) -> PipelineState {
    let mut state = scheduler.snapshot(&RunConfig::default());
    for entry in &mut state.state {
        entry.status = InstanceStatus::Succeeded;
        if let Some((_, status)) = overrides.iter().find(|(name, _)| *name == entry.name) {
            entry.status = *status;
        }
    }
    state
}

fn checked_chain() -> Pipeline {
    PipelineBuilder::new("p")
        .with_asset(AssetBuilder::new("a").column_check("id", "not_null", true).build())
        .with_asset(AssetBuilder::new("b").depends("a").build())
        .with_asset(AssetBuilder::new("c").depends("b").build())
        .with_asset(AssetBuilder::new("d").build())
        .build()
}

#[test]
fn snapshot_round_trips_through_the_store() {
    let fs = MockFileSystem::new();
    let store = StateStore::new(Arc::new(fs.clone()), "logs/runs/p");
    let scheduler = Scheduler::new(&chain_pipeline(), "2024_03_01_10_00_00");
    let params = RunConfig {
        environment: "prod".to_string(),
        only: vec![OnlyFilter::Main],
        ..RunConfig::default()
    };

    let state = scheduler.snapshot(&params);
    let path = store.save(&state).unwrap();

    assert_eq!(path, Path::new("logs/runs/p/2024_03_01_10_00_00.json"));
    let read = store.read(&path).unwrap();
    assert_eq!(read, state);
    assert_eq!(read.version, "1.0.0");
    assert_eq!(read.parameters.environment, "prod");
    assert_eq!(read.state[1].upstream, vec!["a"]);
}

#[test]
fn snapshot_json_uses_snake_case_statuses_and_camel_case_parameters() {
    let scheduler = Scheduler::new(&chain_pipeline(), "run");
    scheduler.mark_instance("a", InstanceStatus::UpstreamFailed, false).unwrap();

    let json = serde_json::to_value(scheduler.snapshot(&RunConfig::default())).unwrap();

    assert_eq!(json["state"][0]["status"], "upstream_failed");
    assert_eq!(json["state"][0]["pipeline"], "chain");
    assert!(json["parameters"].get("startDate").is_some());
    assert!(json["parameters"].get("fullRefresh").is_some());
    assert_eq!(json["parameters"]["continueRun"], false);
    assert!(json.get("compatibility_hash").is_some());
}

#[test]
fn latest_snapshot_is_the_greatest_run_id() {
    let fs = MockFileSystem::new();
    let store = StateStore::new(Arc::new(fs.clone()), "state");
    let pipeline = chain_pipeline();

    for run_id in ["2024_01_02_00_00_00", "2024_01_10_00_00_00", "2024_01_03_00_00_00"] {
        store.save(&Scheduler::new(&pipeline, run_id).snapshot(&RunConfig::default())).unwrap();
    }
    fs.add_file("state/notes.txt", "ignored");

    let latest = store.read_latest().unwrap();
    assert_eq!(latest.run_id, "2024_01_10_00_00_00");
}

#[test]
fn missing_state_directory_is_a_state_error() {
    let store = StateStore::new(Arc::new(MockFileSystem::new()), "nowhere");

    assert!(store.latest_path().unwrap().is_none());
    match store.read_latest() {
        Err(PipelineError::StateError(msg)) => assert!(msg.contains("nowhere")),
        other => panic!("expected StateError, got {other:?}"),
    }
}

#[test]
fn restore_resets_failed_instances_and_their_dependents() {
    let pipeline = checked_chain();
    let previous_run = Scheduler::new(&pipeline, "previous");
    let previous = snapshot_with(
        &previous_run,
        &[("b", InstanceStatus::Failed), ("c", InstanceStatus::UpstreamFailed)],
    );

    let scheduler = Scheduler::new(&pipeline, "next");
    scheduler.restore_state(&previous).unwrap();

    assert_eq!(scheduler.status_of("a"), Some(InstanceStatus::Succeeded));
    assert_eq!(scheduler.status_of("a:id:not_null"), Some(InstanceStatus::Succeeded));
    assert_eq!(scheduler.status_of("b"), Some(InstanceStatus::Pending));
    assert_eq!(scheduler.status_of("c"), Some(InstanceStatus::Pending));
    assert_eq!(scheduler.status_of("d"), Some(InstanceStatus::Succeeded));
}

#[test]
fn restore_keeps_skipped_instances_skipped() {
    let pipeline = checked_chain();
    let previous = snapshot_with(
        &Scheduler::new(&pipeline, "previous"),
        &[
            ("a:id:not_null", InstanceStatus::Queued),
            ("c", InstanceStatus::Skipped),
        ],
    );

    let scheduler = Scheduler::new(&pipeline, "next");
    scheduler.restore_state(&previous).unwrap();

    // The reset walks down from the check but stops at the skipped `c`.
    assert_eq!(scheduler.status_of("a"), Some(InstanceStatus::Succeeded));
    assert_eq!(scheduler.status_of("a:id:not_null"), Some(InstanceStatus::Pending));
    assert_eq!(scheduler.status_of("b"), Some(InstanceStatus::Pending));
    assert_eq!(scheduler.status_of("c"), Some(InstanceStatus::Skipped));
}

#[test]
fn restore_treats_unrecorded_instances_as_pending() {
    let pipeline = chain_pipeline();
    let mut previous = snapshot_with(&Scheduler::new(&pipeline, "previous"), &[]);
    previous.state.retain(|s: &InstanceState| s.name != "b");

    let scheduler = Scheduler::new(&pipeline, "next");
    scheduler.restore_state(&previous).unwrap();

    assert_eq!(scheduler.status_of("a"), Some(InstanceStatus::Succeeded));
    assert_eq!(scheduler.status_of("b"), Some(InstanceStatus::Pending));
    assert_eq!(scheduler.status_of("c"), Some(InstanceStatus::Pending));
}

#[test]
fn restore_rejects_a_snapshot_from_a_different_pipeline_shape() {
    let previous = snapshot_with(&Scheduler::new(&chain_pipeline(), "previous"), &[]);
    let changed = PipelineBuilder::new("chain")
        .with_asset(AssetBuilder::new("a").build())
        .with_asset(AssetBuilder::new("b").depends("a").build())
        .build();

    let scheduler = Scheduler::new(&changed, "next");
    match scheduler.restore_state(&previous) {
        Err(PipelineError::IncompatibleState { expected, found }) => {
            assert_eq!(expected, compatibility_hash(&changed));
            assert_eq!(found, previous.compatibility_hash);
        }
        other => panic!("expected IncompatibleState, got {other:?}"),
    }
    assert_eq!(scheduler.instance_count_by_status(InstanceStatus::Pending), 2);
}

#[test]
fn compatibility_hash_ignores_checks_but_not_dependencies() {
    let base = chain_pipeline();
    let with_checks = PipelineBuilder::new("chain")
        .with_asset(AssetBuilder::new("a").column_check("id", "not_null", true).build())
        .with_asset(AssetBuilder::new("b").depends("a").build())
        .with_asset(AssetBuilder::new("c").depends("b").build())
        .build();
    let rewired = PipelineBuilder::new("chain")
        .with_asset(AssetBuilder::new("a").build())
        .with_asset(AssetBuilder::new("b").depends("a").build())
        .with_asset(AssetBuilder::new("c").depends("a").build())
        .build();

    assert_eq!(compatibility_hash(&base), compatibility_hash(&with_checks));
    assert_ne!(compatibility_hash(&base), compatibility_hash(&rewired));
}

#[test]
fn aggregate_status_collapses_instance_statuses() {
    use InstanceStatus::*;

    assert_eq!(aggregate_status(&[Succeeded, Failed]), Failed);
    assert_eq!(aggregate_status(&[Succeeded, UpstreamFailed]), Failed);
    assert_eq!(aggregate_status(&[Skipped, Skipped]), Skipped);
    assert_eq!(aggregate_status(&[Succeeded, Skipped]), Succeeded);
    assert_eq!(aggregate_status(&[Succeeded, Running]), Pending);
    assert_eq!(aggregate_status(&[Pending, Queued]), Pending);
    assert_eq!(aggregate_status(&[]), Pending);
}

#[test]
fn asset_statuses_group_by_asset_in_order() {
    let pipeline = checked_chain();
    let state = snapshot_with(
        &Scheduler::new(&pipeline, "previous"),
        &[("a:id:not_null", InstanceStatus::Failed), ("d", InstanceStatus::Skipped)],
    );

    assert_eq!(
        state.asset_statuses(),
        vec![
            ("a".to_string(), InstanceStatus::Failed),
            ("b".to_string(), InstanceStatus::Succeeded),
            ("c".to_string(), InstanceStatus::Succeeded),
            ("d".to_string(), InstanceStatus::Skipped),
        ]
    );
}

#[tokio::test]
async fn resumed_run_reruns_only_what_did_not_succeed() {
    init_tracing();
    let pipeline = checked_chain();
    let first = Arc::new(Scheduler::new(&pipeline, "first"));
    let failing = Arc::new(RecordingOperator::new().failing("b"));
    let first_outcome = run_to_completion(first, registry_for(failing), 2).await;
    assert_eq!(first_outcome.count(InstanceStatus::UpstreamFailed), 1);

    let second = Arc::new(Scheduler::new(&pipeline, "second"));
    second.restore_state(&first_outcome.state).unwrap();
    let operator = Arc::new(RecordingOperator::new());
    let outcome = run_to_completion(second, registry_for(operator.clone()), 2).await;

    assert_eq!(operator.executed(), vec!["b", "c"]);
    assert_eq!(outcome.count(InstanceStatus::Succeeded), 5);
}
