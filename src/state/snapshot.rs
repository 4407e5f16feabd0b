// src/state/snapshot.rs

//! Serialized run state, written after every run and read back by
//! `--continue`.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::model::Pipeline;
use crate::types::{InstanceStatus, OnlyFilter};

pub const STATE_FORMAT_VERSION: &str = "1.0.0";

/// Format of run ids; lexicographic order matches chronological order.
pub const RUN_ID_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Parameters the run was started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub downstream: bool,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub workers: usize,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub full_refresh: bool,
    #[serde(default)]
    pub push_metadata: bool,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub exclude_tag: Option<String>,
    #[serde(default)]
    pub only: Vec<OnlyFilter>,
    /// The run resumed a previous snapshot (`--continue`).
    #[serde(default)]
    pub continue_run: bool,
}

impl Default for RunConfig {
    /// Yesterday's full day, eight workers.
    fn default() -> Self {
        let today = Local::now().date_naive();
        let yesterday = today.pred_opt().unwrap_or(today);
        Self {
            asset: None,
            downstream: false,
            start_date: start_of_day(yesterday),
            end_date: start_of_day(today),
            workers: 8,
            environment: String::new(),
            full_refresh: false,
            push_metadata: false,
            tag: None,
            exclude_tag: None,
            only: Vec::new(),
            continue_run: false,
        }
    }
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub version: String,
    pub os: String,
}

impl Metadata {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
        }
    }
}

/// Final status of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    /// Human id of the instance.
    pub name: String,
    pub asset: String,
    pub pipeline: String,
    pub status: InstanceStatus,
    #[serde(default)]
    pub upstream: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub parameters: RunConfig,
    pub metadata: Metadata,
    pub state: Vec<InstanceState>,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub compatibility_hash: String,
}

impl PipelineState {
    /// Statuses of all recorded instances that belong to `asset`.
    pub fn statuses_for_asset(&self, asset: &str) -> Vec<InstanceStatus> {
        self.state
            .iter()
            .filter(|s| s.asset == asset)
            .map(|s| s.status)
            .collect()
    }

    /// One aggregated status per asset, in first-seen order.
    pub fn asset_statuses(&self) -> Vec<(String, InstanceStatus)> {
        let mut assets: Vec<&str> = Vec::new();
        for s in &self.state {
            if !assets.contains(&s.asset.as_str()) {
                assets.push(&s.asset);
            }
        }
        assets
            .into_iter()
            .map(|a| (a.to_string(), aggregate_status(&self.statuses_for_asset(a))))
            .collect()
    }
}

/// Collapse the statuses of an asset's instances into one.
///
/// Any failure wins; an asset whose instances were all skipped is skipped;
/// succeeded work with nothing still running is succeeded; everything else
/// is pending.
pub fn aggregate_status(statuses: &[InstanceStatus]) -> InstanceStatus {
    let has = |s: InstanceStatus| statuses.contains(&s);

    if has(InstanceStatus::Failed) || has(InstanceStatus::UpstreamFailed) {
        return InstanceStatus::Failed;
    }

    if !statuses.is_empty() && statuses.iter().all(|s| *s == InstanceStatus::Skipped) {
        return InstanceStatus::Skipped;
    }

    if has(InstanceStatus::Succeeded) && !has(InstanceStatus::Running) {
        return InstanceStatus::Succeeded;
    }

    InstanceStatus::Pending
}

/// Fingerprint of the pipeline's shape: its name, asset names and types, and
/// upstream references. A snapshot can only be resumed against the same shape.
pub fn compatibility_hash(pipeline: &Pipeline) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(pipeline.name.as_bytes());

    for asset in &pipeline.assets {
        hasher.update(format!(":{}:{}{{", asset.name, asset.asset_type).as_bytes());
        for upstream in &asset.upstreams {
            let kind = if upstream.is_asset_dependency() { "asset" } else { "other" };
            hasher.update(format!(":{}:{}:", upstream.value(), kind).as_bytes());
        }
        hasher.update(b"}");
    }
    hasher.update(b":");

    hasher.finalize().to_hex().to_string()
}

/// New run id from the local clock.
pub fn generate_run_id() -> String {
    Local::now().format(RUN_ID_FORMAT).to_string()
}
