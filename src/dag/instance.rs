// src/dag/instance.rs

//! Task instances: the nodes of the execution graph.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::model::{
    Asset, ColumnCheck, CustomCheck, column_check_id, custom_check_id, metadata_push_id,
};
use crate::types::{InstanceStatus, InstanceType};

/// Index of an instance in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub usize);

impl InstanceId {
    /// Id carried by the synthetic instance fed through `Scheduler::kickstart`.
    /// It never refers to a node in the graph.
    pub const KICKSTART: InstanceId = InstanceId(usize::MAX);
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an instance does, with the declaration it was built from.
#[derive(Debug, Clone)]
pub enum InstanceKind {
    Main,
    ColumnCheck { column: String, check: ColumnCheck },
    CustomCheck { check: CustomCheck },
    MetadataPush,
}

impl InstanceKind {
    pub fn instance_type(&self) -> InstanceType {
        match self {
            InstanceKind::Main => InstanceType::Main,
            InstanceKind::ColumnCheck { .. } => InstanceType::ColumnCheck,
            InstanceKind::CustomCheck { .. } => InstanceType::CustomCheck,
            InstanceKind::MetadataPush => InstanceType::MetadataPush,
        }
    }

    /// Whether a failure of this instance stops its dependents.
    pub fn is_blocking(&self) -> bool {
        match self {
            InstanceKind::Main => true,
            InstanceKind::ColumnCheck { check, .. } => check.blocking,
            InstanceKind::CustomCheck { check } => check.blocking,
            InstanceKind::MetadataPush => false,
        }
    }

    /// Human-readable id for an instance of this kind on `asset`.
    pub fn human_id(&self, asset: &str) -> String {
        match self {
            InstanceKind::Main => asset.to_string(),
            InstanceKind::ColumnCheck { column, check } => {
                column_check_id(asset, column, &check.name)
            }
            InstanceKind::CustomCheck { check } => custom_check_id(asset, &check.name),
            InstanceKind::MetadataPush => metadata_push_id(asset),
        }
    }
}

/// A node in the execution graph.
///
/// Everything but `status` is fixed once the graph is built; status changes
/// go through the scheduler.
#[derive(Debug, Clone)]
pub struct TaskInstance {
    pub id: InstanceId,
    pub uid: Uuid,
    pub human_id: String,
    pub asset: Arc<Asset>,
    pub kind: InstanceKind,
    pub(crate) status: InstanceStatus,
    pub upstream: Vec<InstanceId>,
    pub downstream: Vec<InstanceId>,
}

impl TaskInstance {
    pub fn new(id: InstanceId, asset: Arc<Asset>, kind: InstanceKind) -> Self {
        Self {
            id,
            uid: Uuid::new_v4(),
            human_id: kind.human_id(&asset.name),
            asset,
            kind,
            status: InstanceStatus::Pending,
            upstream: Vec::new(),
            downstream: Vec::new(),
        }
    }

    pub fn status(&self) -> InstanceStatus {
        self.status
    }

    pub fn instance_type(&self) -> InstanceType {
        self.kind.instance_type()
    }

    pub fn is_blocking(&self) -> bool {
        self.kind.is_blocking()
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    pub(crate) fn mark_as(&mut self, status: InstanceStatus) {
        self.status = status;
    }

    pub fn description(&self) -> String {
        match &self.kind {
            InstanceKind::Main => format!("Run asset '{}'", self.asset.name),
            InstanceKind::ColumnCheck { column, check } => format!(
                "Run check '{}' on column '{}' of '{}'",
                check.name, column, self.asset.name
            ),
            InstanceKind::CustomCheck { check } => format!(
                "Run custom check '{}' on '{}'",
                check.name, self.asset.name
            ),
            InstanceKind::MetadataPush => {
                format!("Push metadata for '{}'", self.asset.name)
            }
        }
    }
}

/// Description of an instance the scheduler wants a worker to run now.
#[derive(Debug, Clone)]
pub struct ScheduledInstance {
    pub id: InstanceId,
    pub uid: Uuid,
    pub human_id: String,
    pub asset: Arc<Asset>,
    pub kind: InstanceKind,
    pub pipeline: String,
    pub run_id: String,
}

impl ScheduledInstance {
    pub fn from_instance(instance: &TaskInstance, pipeline: &str, run_id: &str) -> Self {
        Self {
            id: instance.id,
            uid: instance.uid,
            human_id: instance.human_id.clone(),
            asset: Arc::clone(&instance.asset),
            kind: instance.kind.clone(),
            pipeline: pipeline.to_string(),
            run_id: run_id.to_string(),
        }
    }

    /// The synthetic "start" instance used to seed the first wave of work.
    pub fn kickstart(pipeline: &str, run_id: &str) -> Self {
        let asset = Asset {
            name: "start".to_string(),
            asset_type: "kickstart".into(),
            run: None,
            description: None,
            upstreams: Vec::new(),
            tags: Vec::new(),
            columns: Vec::new(),
            custom_checks: Vec::new(),
        };

        Self {
            id: InstanceId::KICKSTART,
            uid: Uuid::nil(),
            human_id: "start".to_string(),
            asset: Arc::new(asset),
            kind: InstanceKind::Main,
            pipeline: pipeline.to_string(),
            run_id: run_id.to_string(),
        }
    }

    pub fn instance_type(&self) -> InstanceType {
        self.kind.instance_type()
    }

    pub fn is_blocking(&self) -> bool {
        self.kind.is_blocking()
    }
}
