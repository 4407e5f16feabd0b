// src/engine/progress.rs

//! Live progress side channel.
//!
//! The scheduler and the workers describe status transitions as
//! [`ProgressEvent`]s; a [`ProgressReporter`] decides how to render them.
//! Nothing in the run depends on a reporter being present.

use std::fmt::Debug;
use std::time::Duration;

use tracing::{info, warn};

use crate::types::{InstanceStatus, InstanceType};

/// Pass/fail counts for the checks of one asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckTally {
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub asset: String,
    pub human_id: String,
    pub instance_type: InstanceType,
    pub status: InstanceStatus,
    pub duration: Option<Duration>,
    pub error: Option<String>,
    pub checks: Option<CheckTally>,
}

pub trait ProgressReporter: Send + Sync + Debug {
    fn report(&self, event: &ProgressEvent);
}

/// Writes progress through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, event: &ProgressEvent) {
        let duration_ms = event.duration.map(|d| d.as_millis() as u64);

        match event.status {
            InstanceStatus::Failed => warn!(
                instance = %event.human_id,
                duration_ms,
                error = event.error.as_deref().unwrap_or(""),
                "failed"
            ),
            InstanceStatus::UpstreamFailed => warn!(
                instance = %event.human_id,
                "skipped: upstream failed"
            ),
            status => {
                if let Some(tally) = event.checks.filter(|t| t.total > 0) {
                    info!(
                        instance = %event.human_id,
                        %status,
                        duration_ms,
                        checks_passed = tally.passed,
                        checks_failed = tally.failed,
                        checks_total = tally.total,
                        "{}",
                        status_label(status)
                    );
                } else {
                    info!(
                        instance = %event.human_id,
                        %status,
                        duration_ms,
                        "{}",
                        status_label(status)
                    );
                }
            }
        }
    }
}

fn status_label(status: InstanceStatus) -> &'static str {
    match status {
        InstanceStatus::Running => "running",
        InstanceStatus::Succeeded => "finished",
        InstanceStatus::Skipped => "skipped",
        InstanceStatus::Queued => "queued",
        InstanceStatus::Pending => "pending",
        InstanceStatus::Failed => "failed",
        InstanceStatus::UpstreamFailed => "upstream failed",
    }
}
