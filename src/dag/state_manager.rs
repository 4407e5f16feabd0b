// src/dag/state_manager.rs

//! Status transitions over the instance graph.

use std::collections::HashSet;

use tracing::{debug, trace, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::instance::InstanceId;
use crate::types::InstanceStatus;

/// Applies status changes to a borrowed graph.
///
/// Callers hold the scheduler lock for as long as a `StateManager` lives.
pub struct StateManager<'a> {
    graph: &'a mut TaskGraph,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a mut TaskGraph) -> Self {
        Self { graph }
    }

    /// Set `status` on an instance and, if `downstream`, on everything
    /// reachable from it.
    pub fn mark_instance(&mut self, root: InstanceId, status: InstanceStatus, downstream: bool) {
        let mut stack = vec![root];
        let mut visited: HashSet<InstanceId> = HashSet::new();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }

            let Some(instance) = self.graph.get_mut(id) else {
                warn!(instance = %id, "instance not present in graph; ignoring");
                continue;
            };

            instance.mark_as(status);
            trace!(instance = %instance.human_id, %status, "marked instance");

            if downstream {
                stack.extend(instance.downstream.iter().copied());
            }
        }
    }

    /// Like [`mark_instance`](Self::mark_instance), but `Skipped` instances are
    /// left alone and the walk does not continue past them.
    ///
    /// Returns the instances whose status was set.
    pub fn mark_if_not_skipped(
        &mut self,
        root: InstanceId,
        status: InstanceStatus,
        downstream: bool,
    ) -> Vec<InstanceId> {
        let mut stack = vec![root];
        let mut visited: HashSet<InstanceId> = HashSet::new();
        let mut marked = Vec::new();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }

            let Some(instance) = self.graph.get_mut(id) else {
                continue;
            };

            if instance.status() == InstanceStatus::Skipped {
                continue;
            }

            instance.mark_as(status);
            marked.push(id);

            if downstream {
                stack.extend(instance.downstream.iter().copied());
            }
        }

        marked
    }

    /// Cascade a failure: everything downstream becomes `UpstreamFailed`,
    /// then the instance itself becomes `Failed`.
    ///
    /// The order matters: the first pass also labels the root, and the
    /// second pass overwrites only the root.
    ///
    /// Returns the root followed by the dependents that were marked.
    pub fn mark_failed_with_downstream(&mut self, id: InstanceId) -> Vec<InstanceId> {
        let cascaded = self.mark_if_not_skipped(id, InstanceStatus::UpstreamFailed, true);
        let own = self.mark_if_not_skipped(id, InstanceStatus::Failed, false);

        if let Some(instance) = self.graph.get(id) {
            debug!(
                instance = %instance.human_id,
                dependents = cascaded.len().saturating_sub(1),
                "instance failed; dependents marked upstream_failed"
            );
        }

        own.into_iter()
            .chain(cascaded.into_iter().filter(|d| *d != id))
            .collect()
    }

    /// Pending instances whose upstreams have all left
    /// {Pending, Queued, Running}, in arena order. Each is marked `Queued`.
    pub fn collect_runnable(&mut self) -> Vec<InstanceId> {
        // Decide first, then mutate.
        let runnable: Vec<InstanceId> = self
            .graph
            .iter()
            .filter(|instance| instance.status() == InstanceStatus::Pending)
            .filter(|instance| {
                instance.upstream.iter().all(|up| {
                    self.graph
                        .get(*up)
                        .is_some_and(|u| !u.status().is_in_flight())
                })
            })
            .map(|instance| instance.id)
            .collect();

        for id in &runnable {
            if let Some(instance) = self.graph.get_mut(*id) {
                instance.mark_as(InstanceStatus::Queued);
                debug!(instance = %instance.human_id, "dependencies resolved; marking queued");
            }
        }

        runnable
    }

    /// Whether every instance is in a terminal status.
    pub fn all_completed(&self) -> bool {
        self.graph.iter().all(|instance| instance.is_completed())
    }
}
