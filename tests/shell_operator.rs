// tests/shell_operator.rs
#![cfg(unix)]

use std::fs;

use assetrun::exec::default_registry;
use assetrun::types::InstanceStatus;
use assetrun_test_utils::builders::{AssetBuilder, PipelineBuilder};
use assetrun_test_utils::{init_tracing, run_to_completion, scheduler_for};
use tempfile::tempdir;

#[tokio::test]
async fn runs_commands_in_the_pipeline_directory_with_run_variables() {
    init_tracing();
    let dir = tempdir().unwrap();
    let pipeline = PipelineBuilder::new("shell_pipeline")
        .with_asset(
            AssetBuilder::new("first")
                .asset_type("shell")
                .run("echo \"$ASSETRUN_ASSET:$ASSETRUN_PIPELINE:$ASSETRUN_RUN_ID\" > first.txt")
                .build(),
        )
        .with_asset(
            AssetBuilder::new("second")
                .asset_type("shell")
                .run("cat first.txt > second.txt")
                .depends("first")
                .build(),
        )
        .build();

    let outcome = run_to_completion(scheduler_for(&pipeline), default_registry(dir.path()), 2).await;

    assert_eq!(outcome.count(InstanceStatus::Succeeded), 2);
    let written = fs::read_to_string(dir.path().join("second.txt")).unwrap();
    assert_eq!(written.trim(), "first:shell_pipeline:2024_01_01_00_00_00");
}

#[tokio::test]
async fn non_zero_exit_fails_the_instance() {
    init_tracing();
    let dir = tempdir().unwrap();
    let pipeline = PipelineBuilder::new("p")
        .with_asset(AssetBuilder::new("broken").asset_type("shell").run("exit 3").build())
        .with_asset(
            AssetBuilder::new("after")
                .asset_type("shell")
                .run("true")
                .depends("broken")
                .build(),
        )
        .build();

    let outcome = run_to_completion(scheduler_for(&pipeline), default_registry(dir.path()), 1).await;

    let broken = outcome
        .results
        .iter()
        .find(|r| r.instance.human_id == "broken")
        .unwrap();
    let message = broken.error.as_ref().unwrap().to_string();
    assert!(message.contains("exited with code 3"), "{message}");
    assert_eq!(outcome.count(InstanceStatus::UpstreamFailed), 1);
    assert!(outcome.has_blocking_failures);
}

#[tokio::test]
async fn custom_check_query_decides_the_check() {
    init_tracing();
    let dir = tempdir().unwrap();
    let pipeline = PipelineBuilder::new("p")
        .with_asset(
            AssetBuilder::new("table")
                .asset_type("shell")
                .run("echo row > table.csv")
                .custom_check_query("has rows", "test -s table.csv", true)
                .custom_check_query("is empty", "test ! -s table.csv", false)
                .build(),
        )
        .build();

    let scheduler = scheduler_for(&pipeline);
    let outcome = run_to_completion(scheduler.clone(), default_registry(dir.path()), 2).await;

    assert_eq!(
        scheduler.status_of("table:custom-check:has_rows"),
        Some(InstanceStatus::Succeeded)
    );
    assert_eq!(
        scheduler.status_of("table:custom-check:is_empty"),
        Some(InstanceStatus::Failed)
    );
    // Only a non-blocking check failed.
    assert!(!outcome.has_blocking_failures);
}

#[tokio::test]
async fn main_instance_without_a_command_fails() {
    init_tracing();
    let dir = tempdir().unwrap();
    let pipeline = PipelineBuilder::new("p")
        .with_asset(AssetBuilder::new("nothing").asset_type("shell").build())
        .build();

    let outcome = run_to_completion(scheduler_for(&pipeline), default_registry(dir.path()), 1).await;

    let message = outcome.results[0].error.as_ref().unwrap().to_string();
    assert!(message.contains("no `run` command"), "{message}");
}
