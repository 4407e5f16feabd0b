// src/state/store.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{PipelineError, Result};
use crate::fs::FileSystem;
use crate::state::snapshot::PipelineState;

/// Reads and writes run snapshots under one pipeline-scoped directory.
///
/// Files are named `<run_id>.json`.
#[derive(Debug, Clone)]
pub struct StateStore {
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
}

impl StateStore {
    pub fn new(fs: Arc<dyn FileSystem>, dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    pub fn save(&self, state: &PipelineState) -> Result<PathBuf> {
        let path = self.path_for(&state.run_id);
        let json = serde_json::to_vec_pretty(state)?;
        self.fs.write(&path, &json)?;
        info!(path = %path.display(), run_id = %state.run_id, "saved run state");
        Ok(path)
    }

    pub fn read(&self, path: &Path) -> Result<PipelineState> {
        let contents = self.fs.read_to_string(path)?;
        let state: PipelineState = serde_json::from_str(&contents)?;
        Ok(state)
    }

    /// Path of the most recent snapshot, if any.
    pub fn latest_path(&self) -> Result<Option<PathBuf>> {
        if !self.fs.is_dir(&self.dir) {
            return Ok(None);
        }

        let latest = self
            .fs
            .read_dir(&self.dir)?
            .into_iter()
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter(|p| self.fs.is_file(p))
            .max_by(|a, b| a.file_name().cmp(&b.file_name()));

        Ok(latest)
    }

    /// Load the most recent snapshot; missing state is an error.
    pub fn read_latest(&self) -> Result<PipelineState> {
        let path = self.latest_path()?.ok_or_else(|| {
            PipelineError::StateError(format!(
                "no previous run state found in {}",
                self.dir.display()
            ))
        })?;
        debug!(path = %path.display(), "reading latest run state");
        self.read(&path)
    }
}
