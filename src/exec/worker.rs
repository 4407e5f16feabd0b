// src/exec/worker.rs

//! Fixed-size worker pool.
//!
//! Every worker pulls from the shared work queue, resolves the operator for
//! `(asset type, instance type)`, runs it in its own Tokio task and sends a
//! [`TaskExecutionResult`] back to the scheduler. An operator that errors or
//! panics produces a failed result; the worker itself keeps going.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::{ScheduledInstance, WorkQueue};
use crate::engine::TaskExecutionResult;
use crate::engine::progress::{ProgressEvent, ProgressReporter};
use crate::errors::{PipelineError, Result};
use crate::exec::operator::OperatorContext;
use crate::exec::registry::OperatorRegistry;
use crate::state::RunConfig;
use crate::types::InstanceStatus;

#[derive(Debug)]
pub struct ConcurrentExecutor {
    registry: Arc<OperatorRegistry>,
    worker_count: usize,
    params: Arc<RunConfig>,
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl ConcurrentExecutor {
    pub fn new(registry: Arc<OperatorRegistry>, worker_count: usize, params: Arc<RunConfig>) -> Result<Self> {
        if worker_count == 0 {
            return Err(PipelineError::ConfigError(
                "worker count must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            registry,
            worker_count,
            params,
            reporter: None,
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Spawn the workers. Each one exits when the work queue is closed and
    /// drained, or when `cancel` fires.
    pub fn start(
        &self,
        queue: WorkQueue,
        results: mpsc::Sender<TaskExecutionResult>,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        info!(workers = self.worker_count, "starting worker pool");

        (0..self.worker_count)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    registry: Arc::clone(&self.registry),
                    params: Arc::clone(&self.params),
                    reporter: self.reporter.clone(),
                    queue: Arc::clone(&queue),
                    results: results.clone(),
                    cancel: cancel.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect()
    }
}

struct Worker {
    id: usize,
    registry: Arc<OperatorRegistry>,
    params: Arc<RunConfig>,
    reporter: Option<Arc<dyn ProgressReporter>>,
    queue: WorkQueue,
    results: mpsc::Sender<TaskExecutionResult>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "worker started");

        loop {
            let next = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => None,
                next = async { self.queue.lock().await.recv().await } => next,
            };

            let Some(instance) = next else {
                break;
            };

            let result = self.execute(instance).await;
            if self.results.send(result).await.is_err() {
                debug!(worker = self.id, "results channel closed; stopping");
                break;
            }
        }

        debug!(worker = self.id, "worker finished");
    }

    async fn execute(&self, instance: ScheduledInstance) -> TaskExecutionResult {
        self.report_running(&instance);
        let started = Instant::now();

        let operator = match self
            .registry
            .resolve(&instance.asset.asset_type, instance.instance_type())
        {
            Ok(operator) => operator,
            Err(err) => {
                warn!(instance = %instance.human_id, error = %err, "no operator for instance");
                return TaskExecutionResult::failure(instance, err.into(), started.elapsed());
            }
        };

        let ctx = OperatorContext {
            worker_id: self.id,
            params: Arc::clone(&self.params),
            cancel: self.cancel.clone(),
        };

        // Run in a separate task so a panicking operator surfaces as a
        // JoinError instead of taking the worker down. The set is owned by
        // this future: aborting the worker aborts the operator with it.
        let task_instance = instance.clone();
        let mut operator_task = JoinSet::new();
        operator_task.spawn(async move { operator.run(&ctx, &task_instance).await });

        let outcome = match operator_task.join_next().await {
            Some(Ok(res)) => res,
            Some(Err(join_err)) if join_err.is_panic() => Err(anyhow!(
                "operator panicked: {}",
                panic_message(join_err.into_panic())
            )),
            Some(Err(join_err)) => Err(anyhow!("operator task aborted: {join_err}")),
            None => Err(anyhow!("operator task was not spawned")),
        };

        let duration = started.elapsed();
        match outcome {
            Ok(()) => TaskExecutionResult::success(instance, duration),
            Err(err) => TaskExecutionResult::failure(instance, err, duration),
        }
    }

    fn report_running(&self, instance: &ScheduledInstance) {
        if let Some(reporter) = &self.reporter {
            reporter.report(&ProgressEvent {
                asset: instance.asset.name.clone(),
                human_id: instance.human_id.clone(),
                instance_type: instance.instance_type(),
                status: InstanceStatus::Running,
                duration: None,
                error: None,
                checks: None,
            });
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
