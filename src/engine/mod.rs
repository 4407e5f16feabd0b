// src/engine/mod.rs

//! Run orchestration.
//!
//! - [`progress`] is the live progress side channel.
//! - [`runner`] wires scheduler, worker pool and snapshot store together for
//!   a single run.

use std::time::Duration;

use crate::dag::ScheduledInstance;

/// Outcome of running one instance, sent from a worker to the scheduler.
#[derive(Debug)]
pub struct TaskExecutionResult {
    pub instance: ScheduledInstance,
    pub error: Option<anyhow::Error>,
    pub duration: Duration,
}

impl TaskExecutionResult {
    pub fn success(instance: ScheduledInstance, duration: Duration) -> Self {
        Self {
            instance,
            error: None,
            duration,
        }
    }

    pub fn failure(instance: ScheduledInstance, error: anyhow::Error, duration: Duration) -> Self {
        Self {
            instance,
            error: Some(error),
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub mod progress;
pub mod runner;

pub use progress::{CheckTally, LogReporter, ProgressEvent, ProgressReporter};
pub use runner::{RunOutcome, RunRequest, execute_run};
