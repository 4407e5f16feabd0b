// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::InstanceType;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Cycle detected in asset graph: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Run state error: {0}")]
    StateError(String),

    #[error(
        "the pipeline has changed since the last run (hash {expected} vs {found}); \
         --continue cannot be used"
    )]
    IncompatibleState { expected: String, found: String },

    #[error("no operator registered for asset type '{asset_type}' and instance type '{instance_type}'")]
    OperatorNotFound {
        asset_type: String,
        instance_type: InstanceType,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipelineError>;
