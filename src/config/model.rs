// src/config/model.rs

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

/// Pipeline definition as read from a TOML file.
///
/// ```toml
/// [pipeline]
/// name = "analytics"
/// metadata_push = false
///
/// [default]
/// type = "shell"
///
/// [[asset]]
/// name = "raw.orders"
/// run = "./ingest_orders.sh"
///
/// [[asset]]
/// name = "mart.daily_orders"
/// depends = ["raw.orders"]
/// tags = ["daily"]
///
/// [[asset.columns]]
/// name = "order_id"
/// checks = [{ name = "not_null" }, { name = "unique", blocking = false }]
/// ```
///
/// The raw form is only deserialized; turning it into a [`Pipeline`] goes
/// through validation (see `validate.rs`).
#[derive(Debug, Clone, Deserialize)]
pub struct RawPipelineFile {
    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub default: DefaultSection,

    /// All assets from `[[asset]]`, in declaration order.
    #[serde(default)]
    pub asset: Vec<AssetConfig>,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    /// Push catalog metadata for every asset after its main run.
    #[serde(default)]
    pub metadata_push: bool,
}

fn default_pipeline_name() -> String {
    "pipeline".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            metadata_push: false,
        }
    }
}

/// `[default]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    /// Asset type used when an asset does not set `type`.
    #[serde(default, rename = "type")]
    pub asset_type: Option<String>,
}

/// `[[asset]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    pub name: String,

    /// Falls back to `[default].type`.
    #[serde(default, rename = "type")]
    pub asset_type: Option<String>,

    /// Command or script executed for the main instance (backend specific).
    #[serde(default)]
    pub run: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub depends: Vec<Upstream>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub columns: Vec<Column>,

    #[serde(default)]
    pub custom_checks: Vec<CustomCheck>,
}

/// An upstream reference, either a bare asset name or a table:
///
/// ```toml
/// depends = ["a", { value = "b", mode = "symbolic" }, { value = "s3://x", type = "uri" }]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Upstream {
    Name(String),
    Detailed {
        value: String,
        #[serde(default = "default_upstream_type", rename = "type")]
        kind: String,
        #[serde(default)]
        mode: UpstreamMode,
    },
}

fn default_upstream_type() -> String {
    "asset".to_string()
}

impl Upstream {
    pub fn value(&self) -> &str {
        match self {
            Upstream::Name(name) => name,
            Upstream::Detailed { value, .. } => value,
        }
    }

    pub fn mode(&self) -> UpstreamMode {
        match self {
            Upstream::Name(_) => UpstreamMode::Full,
            Upstream::Detailed { mode, .. } => *mode,
        }
    }

    /// Only `asset` references in `full` mode become graph edges.
    pub fn is_asset_dependency(&self) -> bool {
        match self {
            Upstream::Name(_) => true,
            Upstream::Detailed { kind, mode, .. } => {
                kind == "asset" && *mode == UpstreamMode::Full
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamMode {
    #[default]
    Full,
    /// Lineage only; does not affect execution order.
    Symbolic,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub checks: Vec<ColumnCheck>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnCheck {
    pub name: String,
    #[serde(default = "default_blocking")]
    pub blocking: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomCheck {
    pub name: String,
    /// For `shell` assets, a command whose exit status decides the check.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_blocking")]
    pub blocking: bool,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_blocking() -> bool {
    true
}

/// Asset type tag, compared against the operator registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetType(String);

impl AssetType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AssetType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Validated, immutable asset.
#[derive(Debug, Clone)]
pub struct Asset {
    pub name: String,
    pub asset_type: AssetType,
    pub run: Option<String>,
    pub description: Option<String>,
    pub upstreams: Vec<Upstream>,
    pub tags: Vec<String>,
    pub columns: Vec<Column>,
    pub custom_checks: Vec<CustomCheck>,
}

impl Asset {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Names of upstream assets that take part in execution ordering.
    pub fn asset_upstream_names(&self) -> impl Iterator<Item = &str> {
        self.upstreams
            .iter()
            .filter(|u| u.is_asset_dependency())
            .map(Upstream::value)
    }
}

/// Human id of a column check instance.
pub fn column_check_id(asset: &str, column: &str, check: &str) -> String {
    format!("{asset}:{column}:{check}")
}

/// Human id of a custom check instance. The check name is lowercased and
/// spaces become underscores.
pub fn custom_check_id(asset: &str, check: &str) -> String {
    format!("{asset}:custom-check:{}", check.to_lowercase().replace(' ', "_"))
}

pub fn metadata_push_id(asset: &str) -> String {
    format!("{asset}:metadata-push")
}

/// Where metadata push was enabled from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataPush {
    /// `--push-metadata` on the command line.
    pub global: bool,
    /// `metadata_push = true` in the pipeline file.
    pub catalog: bool,
}

impl MetadataPush {
    pub fn has_any_enabled(&self) -> bool {
        self.global || self.catalog
    }
}

/// Validated pipeline. Construct through `Pipeline::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,
    pub metadata_push: MetadataPush,
    pub assets: Vec<Arc<Asset>>,
}

impl Pipeline {
    /// Build a pipeline without validation.
    ///
    /// Callers are responsible for acyclicity; the graph builder does not
    /// re-check it.
    pub fn new_unchecked(name: impl Into<String>, metadata_push: MetadataPush, assets: Vec<Asset>) -> Self {
        Self {
            name: name.into(),
            metadata_push,
            assets: assets.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn asset(&self, name: &str) -> Option<&Arc<Asset>> {
        self.assets.iter().find(|a| a.name == name)
    }

    /// Distinct asset types, in first-seen order.
    pub fn asset_types(&self) -> Vec<AssetType> {
        let mut types: Vec<AssetType> = Vec::new();
        for asset in &self.assets {
            if !types.contains(&asset.asset_type) {
                types.push(asset.asset_type.clone());
            }
        }
        types
    }
}
