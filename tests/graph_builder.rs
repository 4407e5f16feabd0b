// tests/graph_builder.rs

use assetrun::config::{MetadataPush, Pipeline};
use assetrun::dag::TaskGraph;
use assetrun::types::{InstanceStatus, InstanceType};
use assetrun_test_utils::builders::{AssetBuilder, PipelineBuilder};

fn human_ids(graph: &TaskGraph) -> Vec<String> {
    graph.iter().map(|i| i.human_id.clone()).collect()
}

fn upstream_of(graph: &TaskGraph, human_id: &str) -> Vec<String> {
    let id = graph.find_by_human_id(human_id).expect("instance exists");
    let mut ups: Vec<String> = graph
        .get(id)
        .unwrap()
        .upstream
        .iter()
        .map(|u| graph.get(*u).unwrap().human_id.clone())
        .collect();
    ups.sort();
    ups
}

fn checked_pipeline() -> Pipeline {
    PipelineBuilder::new("checked")
        .with_asset(
            AssetBuilder::new("orders")
                .column_check("id", "not_null", true)
                .column_check("id", "unique", false)
                .custom_check("Row Count Positive", true)
                .build(),
        )
        .with_asset(AssetBuilder::new("report").depends("orders").build())
        .build()
}

#[test]
fn builds_one_instance_per_main_check_and_custom_check_in_arena_order() {
    let graph = TaskGraph::build(&checked_pipeline());

    assert_eq!(
        human_ids(&graph),
        vec![
            "orders",
            "orders:id:not_null",
            "orders:id:unique",
            "orders:custom-check:row_count_positive",
            "report",
        ]
    );
    assert!(graph.iter().all(|i| i.status() == InstanceStatus::Pending));
}

#[test]
fn checks_hang_off_their_main_instance() {
    let graph = TaskGraph::build(&checked_pipeline());

    assert_eq!(upstream_of(&graph, "orders:id:not_null"), vec!["orders"]);
    assert_eq!(upstream_of(&graph, "orders:id:unique"), vec!["orders"]);
    assert_eq!(
        upstream_of(&graph, "orders:custom-check:row_count_positive"),
        vec!["orders"]
    );
}

#[test]
fn downstream_main_waits_for_blocking_instances_only() {
    let graph = TaskGraph::build(&checked_pipeline());

    // The non-blocking `unique` check is not an upstream of `report`.
    assert_eq!(
        upstream_of(&graph, "report"),
        vec![
            "orders",
            "orders:custom-check:row_count_positive",
            "orders:id:not_null",
        ]
    );
}

#[test]
fn blocking_flags_follow_instance_kind() {
    let pipeline = PipelineBuilder::new("p")
        .with_metadata_push(true)
        .with_asset(AssetBuilder::new("a").column_check("c", "soft", false).build())
        .build();
    let graph = TaskGraph::build(&pipeline);

    let blocking = |hid: &str| graph.get(graph.find_by_human_id(hid).unwrap()).unwrap().is_blocking();
    assert!(blocking("a"));
    assert!(!blocking("a:c:soft"));
    assert!(!blocking("a:metadata-push"));
}

#[test]
fn metadata_push_instances_only_when_enabled() {
    let disabled = TaskGraph::build(&checked_pipeline());
    assert!(
        disabled
            .iter()
            .all(|i| i.instance_type() != InstanceType::MetadataPush)
    );

    let mut pipeline = checked_pipeline();
    pipeline.metadata_push = MetadataPush {
        global: true,
        catalog: false,
    };
    let enabled = TaskGraph::build(&pipeline);

    assert_eq!(upstream_of(&enabled, "orders:metadata-push"), vec!["orders"]);
    assert_eq!(upstream_of(&enabled, "report:metadata-push"), vec!["report"]);
    // Metadata push never blocks the downstream asset.
    assert!(!upstream_of(&enabled, "report").contains(&"orders:metadata-push".to_string()));
}

#[test]
fn symbolic_dependencies_do_not_create_edges() {
    let pipeline = PipelineBuilder::new("p")
        .with_asset(AssetBuilder::new("a").build())
        .with_asset(AssetBuilder::new("b").depends_symbolic("a").build())
        .build();
    let graph = TaskGraph::build(&pipeline);

    assert!(upstream_of(&graph, "b").is_empty());
}

/// Unknown upstream names are dropped during graph construction rather than
/// failing it. This documents current behaviour: `b` becomes a root.
#[test]
fn unknown_upstream_is_silently_skipped() {
    let pipeline = PipelineBuilder::new("p")
        .with_asset(AssetBuilder::new("a").build())
        .with_asset(AssetBuilder::new("b").depends("a").depends("not_declared").build())
        .build();
    let graph = TaskGraph::build(&pipeline);

    assert_eq!(graph.len(), 2);
    assert_eq!(upstream_of(&graph, "b"), vec!["a"]);
}

#[test]
fn index_groups_instances_by_type() {
    let graph = TaskGraph::build(&checked_pipeline());
    let by_type = graph.instances_of_asset("orders").expect("indexed");

    assert_eq!(by_type.get(&InstanceType::Main).map(Vec::len), Some(1));
    assert_eq!(by_type.get(&InstanceType::ColumnCheck).map(Vec::len), Some(2));
    assert_eq!(by_type.get(&InstanceType::CustomCheck).map(Vec::len), Some(1));
    assert!(graph.instances_of_asset("missing").is_none());
}

#[test]
fn duplicate_upstream_reference_creates_a_single_edge() {
    let pipeline = PipelineBuilder::new("p")
        .with_asset(AssetBuilder::new("a").build())
        .with_asset(AssetBuilder::new("b").depends("a").depends("a").build())
        .build();
    let graph = TaskGraph::build(&pipeline);

    assert_eq!(upstream_of(&graph, "b"), vec!["a"]);
}

#[test]
fn two_graphs_from_different_pipelines_are_independent() {
    let first = TaskGraph::build(&checked_pipeline());
    let second = TaskGraph::build(
        &PipelineBuilder::new("other")
            .with_asset(AssetBuilder::new("orders").build())
            .build(),
    );

    assert_eq!(first.len(), 5);
    assert_eq!(second.len(), 1);
    assert_eq!(second.asset_instance_ids("orders").len(), 1);
}
