// src/dag/mod.rs

//! Instance graph and scheduling.
//!
//! - [`instance`] defines the graph nodes and the instances handed to workers.
//! - [`graph`] builds the instance arena and its edges from a pipeline.
//! - [`state_manager`] applies status transitions and cascades.
//! - [`scheduler`] owns a run: marking, ticking, queues, snapshots.
//! - [`scheduler_step`] defines the result type for manual steps.

pub mod graph;
pub mod instance;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;

pub use graph::{InstancesByType, TaskGraph};
pub use instance::{InstanceId, InstanceKind, ScheduledInstance, TaskInstance};
pub use scheduler::{InstanceView, Scheduler, WorkQueue};
pub use scheduler_step::SchedulerStep;
