// src/types.rs

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Status of a single task instance within a run.
///
/// `Pending -> Queued -> Running -> {Succeeded | Failed}`; blocking failures
/// push `UpstreamFailed` onto dependents, and `Skipped` is reachable directly
/// from `Pending` (filters, resumed runs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Pending,
    Queued,
    Running,
    Failed,
    UpstreamFailed,
    Succeeded,
    Skipped,
}

impl InstanceStatus {
    pub const ALL: [InstanceStatus; 7] = [
        InstanceStatus::Pending,
        InstanceStatus::Queued,
        InstanceStatus::Running,
        InstanceStatus::Failed,
        InstanceStatus::UpstreamFailed,
        InstanceStatus::Succeeded,
        InstanceStatus::Skipped,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::Queued => "queued",
            InstanceStatus::Running => "running",
            InstanceStatus::Failed => "failed",
            InstanceStatus::UpstreamFailed => "upstream_failed",
            InstanceStatus::Succeeded => "succeeded",
            InstanceStatus::Skipped => "skipped",
        }
    }

    /// Terminal statuses: the instance will not be touched by the run again.
    pub fn is_completed(self) -> bool {
        matches!(
            self,
            InstanceStatus::Succeeded
                | InstanceStatus::Failed
                | InstanceStatus::UpstreamFailed
                | InstanceStatus::Skipped
        )
    }

    /// Statuses that keep downstream instances waiting.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            InstanceStatus::Pending | InstanceStatus::Queued | InstanceStatus::Running
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(self, InstanceStatus::Failed | InstanceStatus::UpstreamFailed)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstanceStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| format!("invalid instance status: {s}"))
    }
}

/// Which kind of work a task instance represents.
///
/// Together with the asset type this is the key used to look up an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceType {
    Main,
    ColumnCheck,
    CustomCheck,
    MetadataPush,
}

impl InstanceType {
    pub const ALL: [InstanceType; 4] = [
        InstanceType::Main,
        InstanceType::ColumnCheck,
        InstanceType::CustomCheck,
        InstanceType::MetadataPush,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceType::Main => "main",
            InstanceType::ColumnCheck => "column_check",
            InstanceType::CustomCheck => "custom_check",
            InstanceType::MetadataPush => "metadata_push",
        }
    }

    pub fn is_check(self) -> bool {
        matches!(self, InstanceType::ColumnCheck | InstanceType::CustomCheck)
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `--only` selector: which instance types take part in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OnlyFilter {
    Main,
    Checks,
    ColumnChecks,
    CustomChecks,
    PushMetadata,
}

impl OnlyFilter {
    pub fn includes(self, instance_type: InstanceType) -> bool {
        match self {
            OnlyFilter::Main => instance_type == InstanceType::Main,
            OnlyFilter::Checks => instance_type.is_check(),
            OnlyFilter::ColumnChecks => instance_type == InstanceType::ColumnCheck,
            OnlyFilter::CustomChecks => instance_type == InstanceType::CustomCheck,
            OnlyFilter::PushMetadata => instance_type == InstanceType::MetadataPush,
        }
    }
}
