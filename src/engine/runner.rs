// src/engine/runner.rs

//! One complete run: start the worker pool, drive the scheduler until it
//! finishes or is cancelled, persist the snapshot, then wind the workers down.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::Scheduler;
use crate::engine::TaskExecutionResult;
use crate::engine::progress::ProgressReporter;
use crate::errors::Result;
use crate::exec::registry::OperatorRegistry;
use crate::exec::worker::ConcurrentExecutor;
use crate::state::{PipelineState, RunConfig, StateStore};
use crate::types::InstanceStatus;

/// How long workers get to wind down after the scheduler loop returns.
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct RunRequest {
    pub scheduler: Arc<Scheduler>,
    pub registry: Arc<OperatorRegistry>,
    pub params: Arc<RunConfig>,
    /// Where to persist the snapshot; `None` skips persisting.
    pub store: Option<StateStore>,
    pub reporter: Option<Arc<dyn ProgressReporter>>,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub results: Vec<TaskExecutionResult>,
    pub state: PipelineState,
    pub state_path: Option<PathBuf>,
    pub cancelled: bool,
    /// Some blocking instance ended `Failed` or `UpstreamFailed`.
    pub has_blocking_failures: bool,
}

impl RunOutcome {
    pub fn count(&self, status: InstanceStatus) -> usize {
        self.state.state.iter().filter(|s| s.status == status).count()
    }
}

pub async fn execute_run(request: RunRequest) -> Result<RunOutcome> {
    let RunRequest {
        scheduler,
        registry,
        params,
        store,
        reporter,
        cancel,
    } = request;

    let mut executor = ConcurrentExecutor::new(registry, params.workers, Arc::clone(&params))?;
    if let Some(reporter) = reporter {
        executor = executor.with_reporter(reporter);
    }

    let workers_cancel = cancel.child_token();
    let handles = executor.start(
        scheduler.work_queue(),
        scheduler.results_sender(),
        workers_cancel.clone(),
    );

    info!(
        pipeline = %scheduler.pipeline_name(),
        run_id = %scheduler.run_id(),
        instances = scheduler.instance_count(),
        workers = params.workers,
        resumed = params.continue_run,
        "starting run"
    );

    let results = scheduler.run(cancel.clone()).await;
    let cancelled = cancel.is_cancelled();
    if cancelled {
        warn!(received = results.len(), "run cancelled before completion");
    }

    // Statuses are final once the scheduler loop returns, so the snapshot
    // does not wait on operators that are still running.
    let state = scheduler.snapshot(&params);
    let saved = match &store {
        Some(store) => store.save(&state).map(Some),
        None => Ok(None),
    };

    join_workers(handles, &workers_cancel).await;
    let state_path = saved?;

    let blocking_failed = scheduler
        .instances()
        .iter()
        .any(|i| i.blocking && i.status.is_failure());

    Ok(RunOutcome {
        results,
        state,
        state_path,
        cancelled,
        has_blocking_failures: blocking_failed,
    })
}

async fn join_workers(handles: Vec<JoinHandle<()>>, cancel: &CancellationToken) {
    let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

    let joined = tokio::time::timeout(WORKER_SHUTDOWN_GRACE, async {
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "worker task ended abnormally");
            }
        }
    })
    .await;

    if joined.is_err() {
        warn!("workers did not stop in time; aborting them");
        cancel.cancel();
        for abort in aborts {
            abort.abort();
        }
    } else {
        debug!("all workers stopped");
    }
}
