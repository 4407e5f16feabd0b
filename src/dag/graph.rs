// src/dag/graph.rs

//! The instance graph built from a validated pipeline.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::config::model::{Asset, Pipeline};
use crate::dag::instance::{InstanceId, InstanceKind, TaskInstance};
use crate::types::InstanceType;

/// Instances of one asset grouped by type, in arena order within each type.
pub type InstancesByType = BTreeMap<InstanceType, Vec<InstanceId>>;

/// Arena of task instances plus the asset-name index used for edge
/// construction and targeted marking.
///
/// Arena order: assets in declaration order; per asset the main instance,
/// then column checks, custom checks and the metadata push.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    instances: Vec<TaskInstance>,
    by_asset: HashMap<String, InstancesByType>,
}

impl TaskGraph {
    pub fn build(pipeline: &Pipeline) -> Self {
        let mut graph = TaskGraph::default();
        let push_metadata = pipeline.metadata_push.has_any_enabled();

        for asset in &pipeline.assets {
            graph.add_instance(Arc::clone(asset), InstanceKind::Main);

            for column in &asset.columns {
                for check in &column.checks {
                    graph.add_instance(
                        Arc::clone(asset),
                        InstanceKind::ColumnCheck {
                            column: column.name.clone(),
                            check: check.clone(),
                        },
                    );
                }
            }

            for check in &asset.custom_checks {
                graph.add_instance(
                    Arc::clone(asset),
                    InstanceKind::CustomCheck {
                        check: check.clone(),
                    },
                );
            }

            if push_metadata {
                graph.add_instance(Arc::clone(asset), InstanceKind::MetadataPush);
            }
        }

        graph.construct_relationships(pipeline);

        debug!(
            pipeline = %pipeline.name,
            instances = graph.instances.len(),
            "built task instance graph"
        );

        graph
    }

    fn add_instance(&mut self, asset: Arc<Asset>, kind: InstanceKind) -> InstanceId {
        let id = InstanceId(self.instances.len());
        let instance_type = kind.instance_type();
        self.by_asset
            .entry(asset.name.clone())
            .or_default()
            .entry(instance_type)
            .or_default()
            .push(id);
        self.instances.push(TaskInstance::new(id, asset, kind));
        id
    }

    fn construct_relationships(&mut self, pipeline: &Pipeline) {
        for asset in &pipeline.assets {
            let Some(main) = self.main_instance_of(&asset.name) else {
                continue;
            };

            // The main instance gates every other instance of its own asset.
            let own: Vec<InstanceId> = self
                .by_asset
                .get(&asset.name)
                .into_iter()
                .flat_map(|by_type| by_type.iter())
                .filter(|(ty, _)| **ty != InstanceType::Main)
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect();
            for id in own {
                self.add_edge(main, id);
            }

            for upstream_name in asset.asset_upstream_names() {
                // Unknown names are skipped, not rejected.
                let Some(upstream_instances) = self.by_asset.get(upstream_name) else {
                    continue;
                };

                let blocking: Vec<InstanceId> = upstream_instances
                    .values()
                    .flatten()
                    .copied()
                    .filter(|id| self.instances[id.0].is_blocking())
                    .collect();

                for upstream in blocking {
                    self.add_edge(upstream, main);
                }
            }
        }
    }

    fn add_edge(&mut self, from: InstanceId, to: InstanceId) {
        if self.instances[from.0].downstream.contains(&to) {
            return;
        }
        self.instances[from.0].downstream.push(to);
        self.instances[to.0].upstream.push(from);
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, id: InstanceId) -> Option<&TaskInstance> {
        self.instances.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: InstanceId) -> Option<&mut TaskInstance> {
        self.instances.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskInstance> {
        self.instances.iter()
    }

    pub fn instances_of_asset(&self, asset: &str) -> Option<&InstancesByType> {
        self.by_asset.get(asset)
    }

    /// All instance ids of an asset, in arena order.
    pub fn asset_instance_ids(&self, asset: &str) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self
            .by_asset
            .get(asset)
            .into_iter()
            .flat_map(|by_type| by_type.values().flatten().copied())
            .collect();
        ids.sort();
        ids
    }

    pub fn main_instance_of(&self, asset: &str) -> Option<InstanceId> {
        self.by_asset
            .get(asset)?
            .get(&InstanceType::Main)?
            .first()
            .copied()
    }

    pub fn find_by_human_id(&self, human_id: &str) -> Option<InstanceId> {
        self.instances
            .iter()
            .find(|i| i.human_id == human_id)
            .map(|i| i.id)
    }
}
