// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{Pipeline, RawPipelineFile};
use crate::errors::Result;

/// Load a pipeline file from a given path and return the raw `RawPipelineFile`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for the
/// semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPipelineFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let raw: RawPipelineFile = toml::from_str(&contents)?;

    Ok(raw)
}

/// Load a pipeline file and validate it.
///
/// - Reads TOML.
/// - Applies defaults (`serde` defaults, `[default].type`).
/// - Checks asset names, check names, self-dependencies and cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Pipeline> {
    let raw = load_from_path(&path)?;
    let pipeline = Pipeline::try_from(raw)?;
    Ok(pipeline)
}

/// Default pipeline file looked up in the current directory.
pub fn default_pipeline_path() -> PathBuf {
    PathBuf::from("pipeline.toml")
}
