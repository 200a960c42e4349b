//! Executor abstraction for agent invocation.
//!
//! The [`Executor`] trait decouples the agents from the concrete agent CLI
//! (`codex exec` by default). Tests use scripted executors that write
//! predetermined answers without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::AgentConfig;
use crate::io::process::{CommandLimits, run_command};

/// Parameters for an executor invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Prompt text fed to the agent on stdin.
    pub prompt: String,
    /// JSON Schema constraining the final answer; free text when `None`.
    pub output_schema_path: Option<PathBuf>,
    /// Where the agent writes its final answer.
    pub output_path: PathBuf,
    /// Where stdout/stderr of the agent process are logged.
    pub log_path: PathBuf,
    pub limits: CommandLimits,
}

/// Abstraction over agent execution backends.
pub trait Executor {
    /// Run the agent. Must write the final answer to `request.output_path`.
    fn exec(&self, request: &ExecRequest) -> Result<()>;
}

impl<T: Executor + ?Sized> Executor for &T {
    fn exec(&self, request: &ExecRequest) -> Result<()> {
        (**self).exec(request)
    }
}

/// Executor that spawns the configured agent CLI (`codex exec ...`).
#[derive(Debug, Clone)]
pub struct CodexExecutor {
    command: Vec<String>,
    model: Option<String>,
}

impl CodexExecutor {
    pub fn new(command: Vec<String>, model: Option<String>) -> Self {
        Self { command, model }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.command.clone(), config.model.clone())
    }

    fn build_command(&self, request: &ExecRequest) -> Result<Command> {
        let (program, leading) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agent command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(leading);
        if let Some(model) = &self.model {
            cmd.arg("-m").arg(model);
        }
        if let Some(schema) = &request.output_schema_path {
            cmd.arg("--output-schema").arg(schema);
        }
        cmd.arg("--output-last-message")
            .arg(&request.output_path)
            .arg("-")
            .current_dir(&request.workdir);
        Ok(cmd)
    }
}

impl Executor for CodexExecutor {
    #[instrument(skip_all, fields(timeout_secs = request.limits.timeout.as_secs()))]
    fn exec(&self, request: &ExecRequest) -> Result<()> {
        info!(workdir = %request.workdir.display(), "starting agent");

        if let Some(schema) = &request.output_schema_path {
            if !schema.exists() {
                return Err(anyhow!("missing output schema {}", schema.display()));
            }
        }
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }

        let cmd = self.build_command(request)?;
        let output = run_command(cmd, Some(request.prompt.as_bytes()), request.limits)
            .context("run agent")?;

        write_text(&request.log_path, &output.render_log("agent"))?;

        if output.timed_out {
            warn!(
                timeout_secs = request.limits.timeout.as_secs(),
                "agent timed out"
            );
            return Err(anyhow!("agent timed out after {:?}", request.limits.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            return Err(anyhow!(
                "agent failed with status {:?} (see {})",
                output.status.code(),
                request.log_path.display()
            ));
        }

        debug!("agent completed successfully");
        Ok(())
    }
}

/// Run the agent and return its final answer verbatim.
///
/// Any answer left over from an earlier run is removed first, so an agent that
/// exits without answering is reported as missing output.
#[instrument(skip_all, fields(output_path = %request.output_path.display()))]
pub fn execute_and_read<E: Executor>(executor: &E, request: &ExecRequest) -> Result<String> {
    if request.output_path.exists() {
        fs::remove_file(&request.output_path).with_context(|| {
            format!("remove stale agent output {}", request.output_path.display())
        })?;
    }
    executor.exec(request)?;
    if !request.output_path.exists() {
        return Err(anyhow!(
            "missing agent output {}",
            request.output_path.display()
        ));
    }
    let text = fs::read_to_string(&request.output_path)
        .with_context(|| format!("read agent output {}", request.output_path.display()))?;
    debug!(bytes = text.len(), "read agent output");
    Ok(text)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
