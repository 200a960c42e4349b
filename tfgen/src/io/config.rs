//! Pipeline configuration stored under `.tfgen/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::process::CommandLimits;

/// Default config location relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".tfgen/config.toml";

/// Pipeline configuration (TOML).
///
/// Edited by humans; missing fields fall back to defaults. The retry budget is
/// not configurable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Which collaborator validates candidates.
    pub validation: Backend,

    /// Which collaborator applies validated templates.
    pub deployment: Backend,

    /// Write per-attempt artifacts under `.tfgen/attempts/`.
    pub attempt_log: bool,

    pub agent: AgentConfig,
    pub terraform: TerraformConfig,
    pub project: ProjectConfig,
}

/// Collaborator implementation choice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// LLM agent driven through the agent CLI.
    Agent,
    /// Direct `terraform` invocation.
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent CLI and its fixed leading arguments (e.g. `["codex", "exec"]`).
    pub command: Vec<String>,

    /// Model override passed to the agent CLI; the CLI default when unset.
    pub model: Option<String>,

    /// Wall-clock limit for one agent invocation, in seconds.
    pub timeout_secs: u64,

    /// Truncate agent stdout/stderr logs beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Byte budget for rendered prompts before optional sections are dropped.
    pub prompt_budget_bytes: usize,

    /// Offer the provider's resource list to the generation agent.
    pub resource_hints: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TerraformConfig {
    pub binary: String,

    /// Directory holding `main.tf`; relative paths resolve against the CLI's cwd.
    pub workdir: PathBuf,

    pub timeout_secs: u64,
    pub output_limit_bytes: usize,

    /// Provider whose resources are listed (`providers schema -json` key).
    pub provider_source: String,

    /// Resource name prefixes offered to the generation agent.
    pub resource_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectConfig {
    pub project_id: String,
    pub region: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "codex".to_string(),
                "exec".to_string(),
                "--sandbox".to_string(),
                "danger-full-access".to_string(),
                "--skip-git-repo-check".to_string(),
            ],
            model: None,
            timeout_secs: 15 * 60,
            output_limit_bytes: 100_000,
            prompt_budget_bytes: 40_000,
            resource_hints: true,
        }
    }
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            binary: "terraform".to_string(),
            workdir: PathBuf::from("."),
            timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
            provider_source: "registry.terraform.io/hashicorp/google".to_string(),
            resource_prefixes: vec!["google_compute_".to_string()],
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            region: "us-central1".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validation: Backend::Agent,
            deployment: Backend::Agent,
            attempt_log: true,
            agent: AgentConfig::default(),
            terraform: TerraformConfig::default(),
            project: ProjectConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn limits(&self) -> CommandLimits {
        CommandLimits {
            timeout: Duration::from_secs(self.timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

impl TerraformConfig {
    pub fn limits(&self) -> CommandLimits {
        CommandLimits {
            timeout: Duration::from_secs(self.timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.agent.output_limit_bytes == 0 {
            return Err(anyhow!("agent.output_limit_bytes must be > 0"));
        }
        if self.agent.prompt_budget_bytes == 0 {
            return Err(anyhow!("agent.prompt_budget_bytes must be > 0"));
        }
        if self.terraform.binary.trim().is_empty() {
            return Err(anyhow!("terraform.binary must not be empty"));
        }
        if self.terraform.timeout_secs == 0 {
            return Err(anyhow!("terraform.timeout_secs must be > 0"));
        }
        if self.terraform.output_limit_bytes == 0 {
            return Err(anyhow!("terraform.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
