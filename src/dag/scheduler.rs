// src/dag/scheduler.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::model::{AssetType, Pipeline};
use crate::dag::graph::TaskGraph;
use crate::dag::instance::{InstanceId, ScheduledInstance, TaskInstance};
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::engine::progress::{CheckTally, ProgressEvent, ProgressReporter};
use crate::engine::TaskExecutionResult;
use crate::errors::{PipelineError, Result};
use crate::state::snapshot::{
    InstanceState, Metadata, PipelineState, RunConfig, STATE_FORMAT_VERSION, compatibility_hash,
};
use crate::types::{InstanceStatus, InstanceType};

/// Receiving side of the work queue, shared by all workers.
pub type WorkQueue = Arc<tokio::sync::Mutex<mpsc::Receiver<ScheduledInstance>>>;

/// Read-only view of one instance, for reporting and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceView {
    pub id: InstanceId,
    pub human_id: String,
    pub asset: String,
    pub instance_type: InstanceType,
    pub description: String,
    pub status: InstanceStatus,
    pub blocking: bool,
    pub upstream: Vec<String>,
    pub downstream: Vec<String>,
}

#[derive(Debug)]
struct SchedulerState {
    graph: TaskGraph,
    /// Dropped when the run finishes or is cancelled, which closes the queue.
    work_tx: Option<mpsc::Sender<ScheduledInstance>>,
    dispatched: usize,
}

/// Scheduler owns the instance graph and the two queues of a run.
///
/// It is responsible for:
/// - pre-seeding statuses (`mark_*`, `restore_state`)
/// - deciding which instances are runnable and putting them on the work queue
/// - cascading failures to blocking dependents
/// - deciding when the run is finished
///
/// Every status change happens under one lock, so a tick never observes a
/// half-applied cascade.
#[derive(Debug)]
pub struct Scheduler {
    pipeline_name: String,
    run_id: String,
    compatibility_hash: String,
    state: Mutex<SchedulerState>,
    work_rx: WorkQueue,
    results_tx: mpsc::Sender<TaskExecutionResult>,
    results_rx: tokio::sync::Mutex<mpsc::Receiver<TaskExecutionResult>>,
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl Scheduler {
    /// Build the instance graph for `pipeline`. All instances start `Pending`.
    pub fn new(pipeline: &Pipeline, run_id: impl Into<String>) -> Self {
        let graph = TaskGraph::build(pipeline);

        // Each instance is enqueued at most once, so sends from a tick never
        // find the queue full.
        let capacity = graph.len() + 1;
        let (work_tx, work_rx) = mpsc::channel(capacity);
        let (results_tx, results_rx) = mpsc::channel(capacity);

        Self {
            pipeline_name: pipeline.name.clone(),
            run_id: run_id.into(),
            compatibility_hash: compatibility_hash(pipeline),
            state: Mutex::new(SchedulerState {
                graph,
                work_tx: Some(work_tx),
                dispatched: 0,
            }),
            work_rx: Arc::new(tokio::sync::Mutex::new(work_rx)),
            results_tx,
            results_rx: tokio::sync::Mutex::new(results_rx),
            reporter: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn compatibility_hash(&self) -> &str {
        &self.compatibility_hash
    }

    /// Queue the workers receive runnable instances from.
    pub fn work_queue(&self) -> WorkQueue {
        Arc::clone(&self.work_rx)
    }

    /// Sender the workers report results on.
    pub fn results_sender(&self) -> mpsc::Sender<TaskExecutionResult> {
        self.results_tx.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---------------------------------------------------------------------
    // Pre-run marking
    // ---------------------------------------------------------------------

    pub fn mark_all(&self, status: InstanceStatus) {
        let mut state = self.lock();
        let ids: Vec<InstanceId> = state.graph.iter().map(|i| i.id).collect();
        let mut manager = StateManager::new(&mut state.graph);
        for id in ids {
            manager.mark_instance(id, status, false);
        }
        debug!(%status, "marked all instances");
    }

    /// Mark every instance of `asset`, optionally with everything downstream.
    pub fn mark_asset(&self, asset: &str, status: InstanceStatus, downstream: bool) -> Result<()> {
        let mut state = self.lock();
        let ids = state.graph.asset_instance_ids(asset);
        if ids.is_empty() {
            return Err(PipelineError::AssetNotFound(asset.to_string()));
        }

        let mut manager = StateManager::new(&mut state.graph);
        for id in ids {
            manager.mark_instance(id, status, downstream);
        }
        debug!(asset, %status, downstream, "marked asset instances");
        Ok(())
    }

    /// Mark every instance whose asset carries `tag`. Returns how many
    /// instances matched directly.
    pub fn mark_by_tag(&self, tag: &str, status: InstanceStatus, downstream: bool) -> usize {
        let mut state = self.lock();
        let ids: Vec<InstanceId> = state
            .graph
            .iter()
            .filter(|i| i.asset.has_tag(tag))
            .map(|i| i.id)
            .collect();

        let mut manager = StateManager::new(&mut state.graph);
        for id in &ids {
            manager.mark_instance(*id, status, downstream);
        }
        debug!(tag, %status, downstream, matched = ids.len(), "marked instances by tag");
        ids.len()
    }

    /// Re-mark only the `Pending` instances of one type.
    pub fn mark_pending_instances_by_type(&self, instance_type: InstanceType, status: InstanceStatus) {
        let mut state = self.lock();
        let ids: Vec<InstanceId> = state
            .graph
            .iter()
            .filter(|i| i.status() == InstanceStatus::Pending && i.instance_type() == instance_type)
            .map(|i| i.id)
            .collect();

        let mut manager = StateManager::new(&mut state.graph);
        for id in ids {
            manager.mark_instance(id, status, false);
        }
    }

    /// Mark a single instance by its human id.
    pub fn mark_instance(&self, human_id: &str, status: InstanceStatus, downstream: bool) -> Result<()> {
        let mut state = self.lock();
        let id = state
            .graph
            .find_by_human_id(human_id)
            .ok_or_else(|| PipelineError::AssetNotFound(human_id.to_string()))?;
        StateManager::new(&mut state.graph).mark_instance(id, status, downstream);
        Ok(())
    }

    /// Seed statuses from a previous run's snapshot.
    ///
    /// Everything starts `Succeeded`; instances the snapshot recorded as
    /// `skipped` stay skipped; every other recorded status (and any instance
    /// the snapshot does not know) goes back to `Pending` together with its
    /// dependents.
    pub fn restore_state(&self, previous: &PipelineState) -> Result<()> {
        if previous.compatibility_hash != self.compatibility_hash {
            return Err(PipelineError::IncompatibleState {
                expected: self.compatibility_hash.clone(),
                found: previous.compatibility_hash.clone(),
            });
        }

        let recorded: HashMap<&str, InstanceStatus> = previous
            .state
            .iter()
            .map(|s| (s.name.as_str(), s.status))
            .collect();

        let mut state = self.lock();
        let mut skipped = Vec::new();
        let mut reset = Vec::new();
        for instance in state.graph.iter() {
            match recorded.get(instance.human_id.as_str()) {
                Some(InstanceStatus::Succeeded) => {}
                Some(InstanceStatus::Skipped) => skipped.push(instance.id),
                _ => reset.push(instance.id),
            }
        }
        let all: Vec<InstanceId> = state.graph.iter().map(|i| i.id).collect();

        let mut manager = StateManager::new(&mut state.graph);
        for id in all {
            manager.mark_instance(id, InstanceStatus::Succeeded, false);
        }
        for id in skipped {
            manager.mark_instance(id, InstanceStatus::Skipped, false);
        }
        for id in &reset {
            manager.mark_if_not_skipped(*id, InstanceStatus::Pending, true);
        }

        info!(
            previous_run = %previous.run_id,
            reset = reset.len(),
            "restored state from previous run"
        );
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Ticking
    // ---------------------------------------------------------------------

    /// Apply one result and return whether the run has finished.
    pub fn tick(&self, result: &TaskExecutionResult) -> bool {
        self.step(result).run_just_finished
    }

    /// Feed a synthetic, already-succeeded "start" instance through a tick,
    /// which queues every instance without pending upstreams.
    pub fn kickstart(&self) -> bool {
        let start = ScheduledInstance::kickstart(&self.pipeline_name, &self.run_id);
        self.tick(&TaskExecutionResult::success(start, Duration::ZERO))
    }

    /// Manual-step variant of [`tick`](Self::tick) that reports what changed.
    pub fn step(&self, result: &TaskExecutionResult) -> SchedulerStep {
        let mut events = Vec::new();
        let step = {
            let mut guard = self.lock();
            let state = &mut *guard;
            self.step_locked(state, result, &mut events)
        };

        if let Some(reporter) = &self.reporter {
            for event in &events {
                reporter.report(event);
            }
        }

        step
    }

    fn step_locked(
        &self,
        state: &mut SchedulerState,
        result: &TaskExecutionResult,
        events: &mut Vec<ProgressEvent>,
    ) -> SchedulerStep {
        let id = result.instance.id;
        let known = state.graph.get(id).map(|i| i.status());

        let mut newly_failed_ids = Vec::new();
        {
            let mut manager = StateManager::new(&mut state.graph);

            if known.is_some_and(|s| s != InstanceStatus::Skipped) {
                manager.mark_instance(id, InstanceStatus::Succeeded, false);
            }

            if result.error.is_some() && known.is_some() {
                newly_failed_ids = manager.mark_failed_with_downstream(id);
            }
        }

        if let Some(instance) = state.graph.get(id) {
            events.push(progress_event(
                &state.graph,
                instance,
                Some(result.duration),
                result.error.as_ref().map(|e| format!("{e:#}")),
            ));
        }
        for dep in newly_failed_ids.iter().filter(|d| **d != id) {
            if let Some(instance) = state.graph.get(*dep) {
                events.push(progress_event(&state.graph, instance, None, None));
            }
        }

        let newly_failed: Vec<String> = newly_failed_ids
            .iter()
            .filter_map(|d| state.graph.get(*d).map(|i| i.human_id.clone()))
            .collect();

        if StateManager::new(&mut state.graph).all_completed() {
            if state.work_tx.take().is_some() {
                info!(
                    pipeline = %self.pipeline_name,
                    run_id = %self.run_id,
                    "all instances completed; closing the work queue"
                );
            }
            return SchedulerStep {
                newly_queued: Vec::new(),
                newly_failed,
                run_just_finished: true,
            };
        }

        let runnable = StateManager::new(&mut state.graph).collect_runnable();
        let mut newly_queued = Vec::with_capacity(runnable.len());
        for rid in runnable {
            let Some(instance) = state.graph.get(rid) else {
                continue;
            };
            let scheduled = ScheduledInstance::from_instance(instance, &self.pipeline_name, &self.run_id);
            newly_queued.push(scheduled.clone());

            let Some(tx) = state.work_tx.as_ref() else {
                warn!(instance = %instance.human_id, "work queue already closed; not dispatching");
                continue;
            };
            match tx.try_send(scheduled) {
                Ok(()) => state.dispatched += 1,
                Err(TrySendError::Closed(_)) => {
                    warn!(instance = %instance.human_id, "no workers listening; not dispatching");
                }
                Err(TrySendError::Full(_)) => {
                    warn!(instance = %instance.human_id, "work queue full; not dispatching");
                }
            }
        }

        SchedulerStep {
            newly_queued,
            newly_failed,
            run_just_finished: false,
        }
    }

    fn close_work_queue(&self) {
        self.lock().work_tx = None;
    }

    /// Drain every instance currently waiting on the work queue without
    /// blocking. Meant for driving the scheduler by hand.
    pub fn drain_queued(&self) -> Vec<ScheduledInstance> {
        let mut drained = Vec::new();
        if let Ok(mut rx) = self.work_rx.try_lock() {
            while let Ok(instance) = rx.try_recv() {
                drained.push(instance);
            }
        }
        drained
    }

    // ---------------------------------------------------------------------
    // Running
    // ---------------------------------------------------------------------

    /// Receive results and tick until every instance is completed or
    /// `cancel` fires. Returns the results received, in arrival order.
    ///
    /// Workers must already be listening on [`work_queue`](Self::work_queue).
    pub async fn run(&self, cancel: CancellationToken) -> Vec<TaskExecutionResult> {
        let mut results = Vec::new();

        if self.instance_count_by_status(InstanceStatus::Pending) == 0 {
            debug!("no pending instances; finishing the scheduler loop");
            self.close_work_queue();
            return results;
        }

        let mut results_rx = self.results_rx.lock().await;

        if self.kickstart() {
            return results;
        }

        debug!(run_id = %self.run_id, "started the scheduler loop");
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!(run_id = %self.run_id, "run cancelled; closing the work queue");
                    self.close_work_queue();
                    return results;
                }

                received = results_rx.recv() => {
                    let Some(result) = received else {
                        warn!("results channel closed before the run finished");
                        self.close_work_queue();
                        return results;
                    };

                    debug!(instance = %result.instance.human_id, "received instance result");
                    let finished = self.tick(&result);
                    results.push(result);

                    if finished {
                        debug!("pipeline has completed; finishing the scheduler loop");
                        return results;
                    }
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn instance_count(&self) -> usize {
        self.lock().graph.len()
    }

    pub fn instance_count_by_status(&self, status: InstanceStatus) -> usize {
        self.lock()
            .graph
            .iter()
            .filter(|i| i.status() == status)
            .count()
    }

    /// Number of instances put on the work queue so far.
    pub fn dispatched_count(&self) -> usize {
        self.lock().dispatched
    }

    pub fn status_of(&self, human_id: &str) -> Option<InstanceStatus> {
        let state = self.lock();
        let id = state.graph.find_by_human_id(human_id)?;
        state.graph.get(id).map(|i| i.status())
    }

    pub fn instances(&self) -> Vec<InstanceView> {
        let state = self.lock();
        state
            .graph
            .iter()
            .map(|instance| InstanceView {
                id: instance.id,
                human_id: instance.human_id.clone(),
                asset: instance.asset.name.clone(),
                instance_type: instance.instance_type(),
                description: instance.description(),
                status: instance.status(),
                blocking: instance.is_blocking(),
                upstream: human_ids(&state.graph, &instance.upstream),
                downstream: human_ids(&state.graph, &instance.downstream),
            })
            .collect()
    }

    /// Assets that still have at least one `Pending` instance, in declaration order.
    pub fn assets_with_pending_instances(&self) -> Vec<String> {
        let state = self.lock();
        let mut assets: Vec<String> = Vec::new();
        for instance in state.graph.iter() {
            if instance.status() == InstanceStatus::Pending
                && !assets.iter().any(|a| *a == instance.asset.name)
            {
                assets.push(instance.asset.name.clone());
            }
        }
        assets
    }

    /// Whether any `Pending` instance belongs to an asset of `asset_type`.
    pub fn will_run_asset_type(&self, asset_type: &AssetType) -> bool {
        self.lock().graph.iter().any(|i| {
            i.status() == InstanceStatus::Pending && i.asset.asset_type == *asset_type
        })
    }

    /// Snapshot of every instance's current status.
    pub fn snapshot(&self, parameters: &RunConfig) -> PipelineState {
        let state = self.lock();
        let instances = state
            .graph
            .iter()
            .map(|instance| InstanceState {
                name: instance.human_id.clone(),
                asset: instance.asset.name.clone(),
                pipeline: self.pipeline_name.clone(),
                status: instance.status(),
                upstream: human_ids(&state.graph, &instance.upstream),
            })
            .collect();

        PipelineState {
            parameters: parameters.clone(),
            metadata: Metadata::current(),
            state: instances,
            version: STATE_FORMAT_VERSION.to_string(),
            timestamp: Utc::now(),
            run_id: self.run_id.clone(),
            compatibility_hash: self.compatibility_hash.clone(),
        }
    }
}

fn human_ids(graph: &TaskGraph, ids: &[InstanceId]) -> Vec<String> {
    ids.iter()
        .filter_map(|id| graph.get(*id).map(|i| i.human_id.clone()))
        .collect()
}

fn check_tally(graph: &TaskGraph, asset: &str) -> CheckTally {
    let mut tally = CheckTally::default();
    for id in graph.asset_instance_ids(asset) {
        let Some(instance) = graph.get(id) else {
            continue;
        };
        if !instance.instance_type().is_check() {
            continue;
        }
        tally.total += 1;
        match instance.status() {
            InstanceStatus::Succeeded => tally.passed += 1,
            InstanceStatus::Failed | InstanceStatus::UpstreamFailed => tally.failed += 1,
            _ => {}
        }
    }
    tally
}

fn progress_event(
    graph: &TaskGraph,
    instance: &TaskInstance,
    duration: Option<Duration>,
    error: Option<String>,
) -> ProgressEvent {
    ProgressEvent {
        asset: instance.asset.name.clone(),
        human_id: instance.human_id.clone(),
        instance_type: instance.instance_type(),
        status: instance.status(),
        duration,
        error,
        checks: Some(check_tally(graph, &instance.asset.name)),
    }
}
