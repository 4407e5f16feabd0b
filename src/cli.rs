// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, ValueEnum};

use crate::config::default_pipeline_path;
use crate::state::RunConfig;
use crate::types::OnlyFilter;

/// Command-line arguments for `assetrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "assetrun",
    version,
    about = "Run a pipeline of data assets and their quality checks in dependency order.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_pipeline_path())]
    pub pipeline: PathBuf,

    /// Run a single asset instead of the whole pipeline.
    #[arg(long, value_name = "NAME")]
    pub asset: Option<String>,

    /// With `--asset`, also run everything downstream of it.
    #[arg(long, requires = "asset")]
    pub downstream: bool,

    /// Number of concurrent workers.
    #[arg(long, short = 'w', default_value_t = 8)]
    pub workers: usize,

    /// Start of the data interval (`YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`).
    /// Defaults to the start of yesterday.
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    pub start_date: Option<NaiveDateTime>,

    /// End of the data interval. Defaults to the start of today.
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    pub end_date: Option<NaiveDateTime>,

    /// Target environment, passed through to operators.
    #[arg(long, short = 'e', default_value = "")]
    pub environment: String,

    /// Ask operators to rebuild from scratch.
    #[arg(long)]
    pub full_refresh: bool,

    /// Resume the latest run: skip what succeeded, re-run everything else.
    #[arg(long = "continue", conflicts_with_all = ["asset", "tag"])]
    pub continue_run: bool,

    /// Only run assets carrying this tag.
    #[arg(long, value_name = "TAG", conflicts_with = "asset")]
    pub tag: Option<String>,

    /// Skip assets carrying this tag.
    #[arg(long, value_name = "TAG")]
    pub exclude_tag: Option<String>,

    /// Restrict the run to some instance types (comma separated).
    #[arg(long, value_enum, value_delimiter = ',')]
    pub only: Vec<OnlyFilter>,

    /// Push catalog metadata for every asset.
    #[arg(long)]
    pub push_metadata: bool,

    /// Directory for run snapshots. Defaults to `logs/runs/<pipeline>` next
    /// to the pipeline file.
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Do not write a run snapshot.
    #[arg(long, conflicts_with = "continue_run")]
    pub no_state: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ASSETRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate and print the instances that would run, without running them.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Run parameters recorded in the snapshot and handed to operators.
    pub fn run_config(&self) -> RunConfig {
        let defaults = RunConfig::default();
        RunConfig {
            asset: self.asset.clone(),
            downstream: self.downstream,
            start_date: self.start_date.unwrap_or(defaults.start_date),
            end_date: self.end_date.unwrap_or(defaults.end_date),
            workers: self.workers,
            environment: self.environment.clone(),
            full_refresh: self.full_refresh,
            push_metadata: self.push_metadata,
            tag: self.tag.clone(),
            exclude_tag: self.exclude_tag.clone(),
            only: self.only.clone(),
            continue_run: self.continue_run,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_date(value: &str) -> Result<NaiveDateTime, String> {
    let value = value.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .map_err(|_| format!("invalid date '{value}', expected YYYY-MM-DD[ HH:MM:SS]"))
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
