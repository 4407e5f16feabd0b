// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod state;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::Pipeline;
use crate::dag::Scheduler;
use crate::engine::{LogReporter, ProgressReporter, RunOutcome, RunRequest, execute_run};
use crate::errors::PipelineError;
use crate::exec::registry::{OperatorRegistry, default_registry};
use crate::fs::RealFileSystem;
use crate::state::{RunConfig, StateStore, generate_run_id};
use crate::types::{InstanceStatus, InstanceType};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline loading
/// - scheduler construction and status pre-seeding (filters, `--continue`)
/// - the worker pool and the scheduler loop
/// - Ctrl-C handling
/// - snapshot persistence and the final summary
///
/// Returns `Ok(false)` when a blocking instance failed or the run was
/// cancelled.
pub async fn run(args: CliArgs) -> Result<bool> {
    let mut pipeline = load_and_validate(&args.pipeline)?;
    pipeline.metadata_push.global = args.push_metadata;

    let params = args.run_config();
    let reporter: Arc<dyn ProgressReporter> = Arc::new(LogReporter);
    let scheduler = Scheduler::new(&pipeline, generate_run_id()).with_reporter(Arc::clone(&reporter));

    let store = if args.no_state {
        None
    } else {
        let dir = args
            .state_dir
            .clone()
            .unwrap_or_else(|| default_state_dir(&args.pipeline, &pipeline.name));
        Some(StateStore::new(Arc::new(RealFileSystem), dir))
    };

    if args.continue_run {
        let store = store
            .as_ref()
            .ok_or_else(|| PipelineError::StateError("--continue needs a state directory".to_string()))?;
        let previous = store.read_latest()?;
        scheduler.restore_state(&previous)?;
    }
    apply_filters(&scheduler, &params)?;

    let registry = Arc::new(default_registry(pipeline_root_dir(&args.pipeline)));
    ensure_operators(&scheduler, &pipeline, &registry)?;

    if args.dry_run {
        print_dry_run(&scheduler);
        return Ok(true);
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("Ctrl-C received; cancelling the run");
            cancel.cancel();
        });
    }

    let outcome = execute_run(RunRequest {
        scheduler: Arc::new(scheduler),
        registry,
        params: Arc::new(params),
        store,
        reporter: Some(reporter),
        cancel,
    })
    .await?;

    print_summary(&outcome);
    Ok(!outcome.has_blocking_failures && !outcome.cancelled)
}

/// Pre-seed statuses from the run parameters.
///
/// - `asset`: everything else is skipped; with `downstream`, dependents run
///   too.
/// - `tag`: only instances of tagged assets (and their dependents) run.
/// - `exclude_tag`: instances of tagged assets are skipped.
/// - `only`: pending instances of other types are skipped.
pub fn apply_filters(scheduler: &Scheduler, params: &RunConfig) -> Result<()> {
    if let Some(asset) = &params.asset {
        scheduler.mark_all(InstanceStatus::Skipped);
        scheduler.mark_asset(asset, InstanceStatus::Pending, params.downstream)?;
    }

    if let Some(tag) = &params.tag {
        scheduler.mark_all(InstanceStatus::Skipped);
        if scheduler.mark_by_tag(tag, InstanceStatus::Pending, true) == 0 {
            bail!("no assets found with tag '{tag}'");
        }
    }

    if let Some(tag) = &params.exclude_tag {
        let excluded = scheduler.mark_by_tag(tag, InstanceStatus::Skipped, false);
        debug!(tag = %tag, excluded, "excluded instances by tag");
    }

    if !params.only.is_empty() {
        for instance_type in InstanceType::ALL {
            if !params.only.iter().any(|f| f.includes(instance_type)) {
                scheduler.mark_pending_instances_by_type(instance_type, InstanceStatus::Skipped);
            }
        }
    }

    Ok(())
}

/// Fail before starting when an asset that will run has a type with no
/// registered operator.
fn ensure_operators(scheduler: &Scheduler, pipeline: &Pipeline, registry: &OperatorRegistry) -> Result<()> {
    for asset_type in pipeline.asset_types() {
        if scheduler.will_run_asset_type(&asset_type) && !registry.supports(&asset_type) {
            return Err(PipelineError::ConfigError(format!(
                "no operator registered for asset type '{asset_type}'"
            ))
            .into());
        }
    }
    Ok(())
}

/// The directory of the pipeline file, or "." for a bare file name.
fn pipeline_root_dir(pipeline_path: &Path) -> PathBuf {
    match pipeline_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `<pipeline dir>/logs/runs/<pipeline name>`.
pub fn default_state_dir(pipeline_path: &Path, pipeline_name: &str) -> PathBuf {
    pipeline_root_dir(pipeline_path)
        .join("logs")
        .join("runs")
        .join(pipeline_name)
}

fn print_dry_run(scheduler: &Scheduler) {
    println!("assetrun dry-run: pipeline '{}'", scheduler.pipeline_name());
    println!();

    let instances = scheduler.instances();
    let pending: Vec<_> = instances
        .iter()
        .filter(|i| i.status == InstanceStatus::Pending)
        .collect();

    println!("instances to run ({} of {}):", pending.len(), instances.len());
    for instance in pending {
        println!("  - {} [{}]", instance.human_id, instance.instance_type);
        println!("      {}", instance.description);
        if !instance.upstream.is_empty() {
            println!("      after: {:?}", instance.upstream);
        }
        if !instance.blocking {
            println!("      blocking: false");
        }
    }

    debug!("dry-run complete (no execution)");
}

fn print_summary(outcome: &RunOutcome) {
    let succeeded = outcome.count(InstanceStatus::Succeeded);
    let failed = outcome.count(InstanceStatus::Failed);
    let upstream_failed = outcome.count(InstanceStatus::UpstreamFailed);
    let skipped = outcome.count(InstanceStatus::Skipped);

    println!();
    println!(
        "run {}: {} succeeded, {} failed, {} upstream failed, {} skipped",
        outcome.state.run_id, succeeded, failed, upstream_failed, skipped
    );

    for result in outcome.results.iter().filter(|r| !r.is_success()) {
        if let Some(err) = &result.error {
            println!("  failed: {} ({err:#})", result.instance.human_id);
        }
    }

    if outcome.cancelled {
        println!("run was cancelled; resume it with --continue");
    }
    if let Some(path) = &outcome.state_path {
        info!(path = %path.display(), "run state written");
    }
}
