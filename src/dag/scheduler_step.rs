// src/dag/scheduler_step.rs

//! Step-by-step result type for the scheduler.

use crate::dag::instance::ScheduledInstance;

/// Structured result of a single scheduler tick.
///
/// Useful for tests that drive the graph by hand.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Instances that became runnable and were put on the work queue.
    pub newly_queued: Vec<ScheduledInstance>,
    /// Human ids of instances newly marked failed in this step: the failing
    /// instance first, then dependents marked `upstream_failed`.
    pub newly_failed: Vec<String>,
    /// Whether every instance is now completed.
    pub run_just_finished: bool,
}
