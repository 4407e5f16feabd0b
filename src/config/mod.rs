// src/config/mod.rs

//! Pipeline definition loading and validation.
//!
//! - `model.rs`: the TOML-backed data model and the validated [`Pipeline`].
//! - `loader.rs`: reading a pipeline file from disk.
//! - `validate.rs`: names, dependencies and cycle detection.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_pipeline_path, load_and_validate, load_from_path};
pub use model::{
    Asset, AssetConfig, AssetType, Column, ColumnCheck, CustomCheck, DefaultSection,
    MetadataPush, Pipeline, PipelineSection, RawPipelineFile, Upstream, UpstreamMode,
};
