// src/exec/registry.rs

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::model::AssetType;
use crate::errors::{PipelineError, Result};
use crate::exec::operator::{NoOpOperator, Operator};
use crate::exec::shell::ShellOperator;
use crate::types::InstanceType;

/// Lookup table from `(asset type, instance type)` to an operator.
#[derive(Debug, Clone, Default)]
pub struct OperatorRegistry {
    operators: HashMap<AssetType, HashMap<InstanceType, Arc<dyn Operator>>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        asset_type: impl Into<AssetType>,
        instance_type: InstanceType,
        operator: Arc<dyn Operator>,
    ) -> &mut Self {
        self.operators
            .entry(asset_type.into())
            .or_default()
            .insert(instance_type, operator);
        self
    }

    /// Register one operator for every instance type of an asset type.
    pub fn register_all(&mut self, asset_type: impl Into<AssetType>, operator: Arc<dyn Operator>) -> &mut Self {
        let asset_type = asset_type.into();
        for instance_type in InstanceType::ALL {
            self.register(asset_type.clone(), instance_type, Arc::clone(&operator));
        }
        self
    }

    pub fn resolve(&self, asset_type: &AssetType, instance_type: InstanceType) -> Result<Arc<dyn Operator>> {
        self.operators
            .get(asset_type)
            .and_then(|by_type| by_type.get(&instance_type))
            .cloned()
            .ok_or_else(|| PipelineError::OperatorNotFound {
                asset_type: asset_type.to_string(),
                instance_type,
            })
    }

    pub fn supports(&self, asset_type: &AssetType) -> bool {
        self.operators.contains_key(asset_type)
    }
}

/// Built-in operators.
///
/// - `empty`: no-op for every instance type.
/// - `shell`: runs `run` for the main instance and `query` for custom
///   checks inside `workdir`; metadata push is a no-op. Column checks have
///   no shell implementation and fail with a missing-operator error.
pub fn default_registry(workdir: impl Into<PathBuf>) -> OperatorRegistry {
    let shell: Arc<dyn Operator> = Arc::new(ShellOperator::new(workdir));
    let noop: Arc<dyn Operator> = Arc::new(NoOpOperator);

    let mut registry = OperatorRegistry::new();
    registry
        .register_all("empty", Arc::clone(&noop))
        .register("shell", InstanceType::Main, Arc::clone(&shell))
        .register("shell", InstanceType::CustomCheck, shell)
        .register("shell", InstanceType::MetadataPush, noop);
    registry
}
