// src/exec/shell.rs

//! Operator that runs shell commands.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result, anyhow, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::dag::{InstanceKind, ScheduledInstance};
use crate::exec::operator::{Operator, OperatorContext, OperatorFuture};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Runs an asset's `run` command (main instance) or a custom check's
/// `query` (custom check instance) through the platform shell.
///
/// A non-zero exit status fails the instance. On cancellation the child is
/// killed.
#[derive(Debug, Clone)]
pub struct ShellOperator {
    workdir: PathBuf,
}

impl ShellOperator {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    fn command_for(instance: &ScheduledInstance) -> Result<&str> {
        match &instance.kind {
            InstanceKind::Main => instance
                .asset
                .run
                .as_deref()
                .ok_or_else(|| anyhow!("asset '{}' has no `run` command", instance.asset.name)),
            InstanceKind::CustomCheck { check } => check.query.as_deref().ok_or_else(|| {
                anyhow!(
                    "custom check '{}' on '{}' has no `query`",
                    check.name,
                    instance.asset.name
                )
            }),
            other => bail!(
                "shell operator cannot run {} instances",
                other.instance_type()
            ),
        }
    }

    async fn run_command(&self, ctx: &OperatorContext, instance: &ScheduledInstance) -> Result<()> {
        let script = Self::command_for(instance)?;

        info!(
            instance = %instance.human_id,
            worker = ctx.worker_id,
            cmd = %script,
            "starting process"
        );

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(script);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(script);
            c
        };

        let params = &ctx.params;
        cmd.current_dir(&self.workdir)
            .env("ASSETRUN_ASSET", &instance.asset.name)
            .env("ASSETRUN_INSTANCE", &instance.human_id)
            .env("ASSETRUN_PIPELINE", &instance.pipeline)
            .env("ASSETRUN_RUN_ID", &instance.run_id)
            .env("ASSETRUN_START_DATE", params.start_date.format(DATE_FORMAT).to_string())
            .env("ASSETRUN_END_DATE", params.end_date.format(DATE_FORMAT).to_string())
            .env("ASSETRUN_ENVIRONMENT", &params.environment)
            .env("ASSETRUN_FULL_REFRESH", if params.full_refresh { "1" } else { "" })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for '{}'", instance.human_id))?;

        if let Some(stdout) = child.stdout.take() {
            let human_id = instance.human_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(instance = %human_id, "{}", line);
                }
            });
        }

        // Always consume stderr so buffers don't fill.
        if let Some(stderr) = child.stderr.take() {
            let human_id = instance.human_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(instance = %human_id, "stderr: {}", line);
                }
            });
        }

        tokio::select! {
            status_res = child.wait() => {
                let status = status_res.with_context(|| {
                    format!("waiting for process of '{}'", instance.human_id)
                })?;
                let code = status.code().unwrap_or(-1);

                info!(
                    instance = %instance.human_id,
                    exit_code = code,
                    success = status.success(),
                    "process exited"
                );

                if !status.success() {
                    bail!("'{}' exited with code {}", instance.human_id, code);
                }
                Ok(())
            }

            _ = ctx.cancel.cancelled() => {
                info!(instance = %instance.human_id, "run cancelled; killing process");
                if let Err(e) = child.kill().await {
                    warn!(
                        instance = %instance.human_id,
                        error = %e,
                        "failed to kill child process on cancellation"
                    );
                }
                bail!("'{}' was cancelled", instance.human_id)
            }
        }
    }
}

impl Operator for ShellOperator {
    fn run<'a>(
        &'a self,
        ctx: &'a OperatorContext,
        instance: &'a ScheduledInstance,
    ) -> OperatorFuture<'a> {
        Box::pin(self.run_command(ctx, instance))
    }
}
