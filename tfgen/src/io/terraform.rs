//! Adapter for the `terraform` CLI.
//!
//! Argument lists stay private to this module; callers pick a
//! [`TerraformCommand`] and get back a [`ToolReport`] with the exit code already
//! mapped to a [`ToolStatus`].

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::provider_schema::ProviderCatalog;
use crate::io::process::{CommandLimits, run_command};

/// Operations the pipeline needs from the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerraformCommand {
    Validate,
    Plan,
    Apply,
    ProvidersSchema,
}

impl TerraformCommand {
    fn args(self) -> &'static [&'static str] {
        match self {
            TerraformCommand::Validate => &["validate", "-no-color"],
            TerraformCommand::Plan => &["plan", "-no-color", "-input=false"],
            TerraformCommand::Apply => &["apply", "-auto-approve", "-no-color", "-input=false"],
            TerraformCommand::ProvidersSchema => &["providers", "schema", "-json"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TerraformCommand::Validate => "terraform validate",
            TerraformCommand::Plan => "terraform plan",
            TerraformCommand::Apply => "terraform apply",
            TerraformCommand::ProvidersSchema => "terraform providers schema",
        }
    }
}

/// Exit classification of one tool run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    /// Exit code 0.
    Passed,
    /// Non-zero exit code (or killed by a signal when `exit_code` is `None`).
    Failed { exit_code: Option<i32> },
    /// Killed after exceeding the configured timeout.
    TimedOut,
}

/// Result of one tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReport {
    pub command: TerraformCommand,
    pub status: ToolStatus,
    pub stdout: String,
    /// Flattened stderr (see [`flatten_diagnostics`]).
    pub diagnostics: String,
}

impl ToolReport {
    pub fn passed(&self) -> bool {
        self.status == ToolStatus::Passed
    }

    /// Error message for a failed run; `None` when the run passed.
    pub fn failure_message(&self) -> Option<String> {
        match self.status {
            ToolStatus::Passed => None,
            ToolStatus::TimedOut => Some(format!("{} timed out", self.command.name())),
            ToolStatus::Failed { exit_code } if self.diagnostics.is_empty() => Some(match exit_code {
                Some(code) => format!("{} exited with status {code}", self.command.name()),
                None => format!("{} was terminated by a signal", self.command.name()),
            }),
            ToolStatus::Failed { .. } => Some(self.diagnostics.clone()),
        }
    }
}

/// Runs tool commands against the working directory.
pub trait TerraformRunner {
    fn run(&self, command: TerraformCommand) -> Result<ToolReport>;
}

impl<T: TerraformRunner + ?Sized> TerraformRunner for &T {
    fn run(&self, command: TerraformCommand) -> Result<ToolReport> {
        (**self).run(command)
    }
}

/// Runner that spawns the `terraform` binary.
#[derive(Debug, Clone)]
pub struct TerraformCli {
    binary: String,
    workdir: PathBuf,
    limits: CommandLimits,
}

impl TerraformCli {
    pub fn new(binary: impl Into<String>, workdir: impl Into<PathBuf>, limits: CommandLimits) -> Self {
        Self {
            binary: binary.into(),
            workdir: workdir.into(),
            limits,
        }
    }
}

impl TerraformRunner for TerraformCli {
    #[instrument(skip_all, fields(command = command.name(), workdir = %self.workdir.display()))]
    fn run(&self, command: TerraformCommand) -> Result<ToolReport> {
        info!("running terraform");
        let mut cmd = Command::new(&self.binary);
        cmd.args(command.args()).current_dir(&self.workdir);

        let output = run_command(cmd, None, self.limits)
            .with_context(|| format!("run {}", command.name()))?;

        let status = if output.timed_out {
            ToolStatus::TimedOut
        } else if output.status.success() {
            ToolStatus::Passed
        } else {
            ToolStatus::Failed {
                exit_code: output.status.code(),
            }
        };
        if status != ToolStatus::Passed {
            warn!(?status, "terraform reported failure");
        }
        debug!(?status, "terraform finished");

        Ok(ToolReport {
            command,
            status,
            stdout: output.stdout_text(),
            diagnostics: flatten_diagnostics(&output.stderr_text()),
        })
    }
}

/// Collapse multi-line tool diagnostics into a single line.
///
/// Box-drawing gutters are dropped, lines of a paragraph are joined with spaces,
/// and paragraphs are joined with ". ".
pub fn flatten_diagnostics(stderr: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in stderr.lines() {
        let line = line
            .trim()
            .trim_start_matches(['│', '╷', '╵'])
            .trim();
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
            continue;
        }
        current.push(line);
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }

    paragraphs
        .iter()
        .map(|p| p.trim_end_matches('.'))
        .collect::<Vec<_>>()
        .join(". ")
}

/// Fetch the provider schema document (`terraform providers schema -json`).
pub fn providers_schema<R: TerraformRunner>(runner: &R) -> Result<String> {
    let report = runner.run(TerraformCommand::ProvidersSchema)?;
    if let Some(message) = report.failure_message() {
        bail!("{message} (run `terraform init` in the working directory)");
    }
    Ok(report.stdout)
}

/// Load the resource catalog of `provider_source`.
pub fn load_catalog<R: TerraformRunner>(runner: &R, provider_source: &str) -> Result<ProviderCatalog> {
    let json = providers_schema(runner)?;
    ProviderCatalog::parse(&json, provider_source)
}
