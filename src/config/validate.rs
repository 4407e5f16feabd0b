// src/config/validate.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;
use tracing::warn;

use crate::config::model::{
    Asset, AssetType, MetadataPush, Pipeline, RawPipelineFile, column_check_id, custom_check_id,
    metadata_push_id,
};
use crate::errors::{PipelineError, Result};

const ASSET_NAME_PATTERN: &str = r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$";

impl TryFrom<RawPipelineFile> for Pipeline {
    type Error = crate::errors::PipelineError;

    fn try_from(raw: RawPipelineFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_pipeline(&raw)?;

        let default_type = raw.default.asset_type.clone();
        let mut assets = Vec::with_capacity(raw.asset.len());
        for cfg in raw.asset {
            let asset_type = cfg
                .asset_type
                .or_else(|| default_type.clone())
                .ok_or_else(|| {
                    PipelineError::ConfigError(format!(
                        "asset '{}' has no `type` and [default].type is not set",
                        cfg.name
                    ))
                })?;

            assets.push(Asset {
                name: cfg.name,
                asset_type: AssetType::new(asset_type),
                run: cfg.run,
                description: cfg.description,
                upstreams: cfg.depends,
                tags: cfg.tags,
                columns: cfg.columns,
                custom_checks: cfg.custom_checks,
            });
        }

        let metadata_push = MetadataPush {
            global: false,
            catalog: raw.pipeline.metadata_push,
        };

        Ok(Pipeline::new_unchecked(raw.pipeline.name, metadata_push, assets))
    }
}

fn validate_raw_pipeline(cfg: &RawPipelineFile) -> Result<()> {
    ensure_has_assets(cfg)?;
    validate_pipeline_section(cfg)?;
    validate_asset_names(cfg)?;
    validate_checks(cfg)?;
    validate_asset_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_assets(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.asset.is_empty() {
        return Err(PipelineError::ConfigError(
            "pipeline must contain at least one [[asset]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_pipeline_section(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.pipeline.name.trim().is_empty() {
        return Err(PipelineError::ConfigError(
            "[pipeline].name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_asset_names(cfg: &RawPipelineFile) -> Result<()> {
    let pattern = Regex::new(ASSET_NAME_PATTERN).map_err(anyhow::Error::from)?;
    let mut seen = HashSet::new();
    for asset in &cfg.asset {
        if !pattern.is_match(&asset.name) {
            return Err(PipelineError::ConfigError(format!(
                "invalid asset name '{}': use letters, digits, '_', '.', '-'",
                asset.name
            )));
        }
        if !seen.insert(asset.name.as_str()) {
            return Err(PipelineError::ConfigError(format!(
                "duplicate asset name '{}'",
                asset.name
            )));
        }
    }
    Ok(())
}

/// Check names become part of instance ids, so every id an asset expands to
/// must be distinct. A column named `custom-check` can otherwise shadow a
/// custom check.
fn validate_checks(cfg: &RawPipelineFile) -> Result<()> {
    for asset in &cfg.asset {
        let mut seen: HashMap<String, String> = HashMap::new();
        seen.insert(metadata_push_id(&asset.name), "the metadata push".to_string());

        for column in &asset.columns {
            for check in &column.checks {
                let id = column_check_id(&asset.name, &column.name, &check.name);
                let label = format!("check '{}' on column '{}'", check.name, column.name);
                claim_instance_id(&mut seen, &asset.name, id, label)?;
            }
        }

        for check in &asset.custom_checks {
            if check.name.trim().is_empty() {
                return Err(PipelineError::ConfigError(format!(
                    "asset '{}' has a custom check without a name",
                    asset.name
                )));
            }
            let id = custom_check_id(&asset.name, &check.name);
            let label = format!("custom check '{}'", check.name);
            claim_instance_id(&mut seen, &asset.name, id, label)?;
        }
    }
    Ok(())
}

fn claim_instance_id(
    seen: &mut HashMap<String, String>,
    asset: &str,
    id: String,
    label: String,
) -> Result<()> {
    if let Some(previous) = seen.get(&id) {
        return Err(PipelineError::ConfigError(format!(
            "asset '{asset}' declares two instances with id '{id}': {previous} and {label}"
        )));
    }
    seen.insert(id, label);
    Ok(())
}

fn validate_asset_dependencies(cfg: &RawPipelineFile) -> Result<()> {
    let names: HashSet<&str> = cfg.asset.iter().map(|a| a.name.as_str()).collect();

    for asset in &cfg.asset {
        for upstream in asset.depends.iter().filter(|u| u.is_asset_dependency()) {
            let dep = upstream.value();
            if dep == asset.name {
                return Err(PipelineError::ConfigError(format!(
                    "asset '{}' cannot depend on itself",
                    asset.name
                )));
            }
            if !names.contains(dep) {
                // Left in place: the graph builder skips references it cannot resolve.
                warn!(
                    asset = %asset.name,
                    upstream = %dep,
                    "upstream does not match any asset in this pipeline; it will be ignored"
                );
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawPipelineFile) -> Result<()> {
    // Edge direction: upstream -> asset.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for asset in &cfg.asset {
        graph.add_node(asset.name.as_str());
    }

    for asset in &cfg.asset {
        for upstream in asset.depends.iter().filter(|u| u.is_asset_dependency()) {
            if graph.contains_node(upstream.value()) {
                graph.add_edge(upstream.value(), asset.name.as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(PipelineError::DagCycle(format!(
                "cycle detected in asset graph involving asset '{}'",
                node
            )))
        }
    }
}
