//! Collaborators of the retry controller.
//!
//! Each role is a trait so the controller can be driven by LLM agents, by the
//! `terraform` CLI directly, or by scripted doubles in tests. Agents return raw
//! text; decoding verdicts is the controller's job.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::types::{Candidate, GenerationRequest};
use crate::io::executor::ExecRequest;
use crate::io::process::CommandLimits;

pub mod deployer;
pub mod generator;
pub mod validator;

pub use deployer::{AgentDeployer, ToolDeployer};
pub use generator::AgentGenerator;
pub use validator::{AgentValidator, ToolValidator};

pub(crate) const VERDICT_OUTPUT_SCHEMA: &str =
    include_str!("../../schemas/verdict_output.schema.json");

/// Produces candidate template text.
pub trait GenerationAgent {
    fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Checks a candidate and answers with verdict text.
pub trait ValidationAgent {
    fn validate(&self, candidate: &Candidate) -> Result<String>;
}

/// Applies the persisted template and answers with verdict text.
pub trait DeploymentAgent {
    fn deploy(&self) -> Result<String>;
}

impl<T: GenerationAgent + ?Sized> GenerationAgent for &T {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        (**self).generate(request)
    }
}

impl<T: ValidationAgent + ?Sized> ValidationAgent for &T {
    fn validate(&self, candidate: &Candidate) -> Result<String> {
        (**self).validate(candidate)
    }
}

impl<T: DeploymentAgent + ?Sized> DeploymentAgent for &T {
    fn deploy(&self) -> Result<String> {
        (**self).deploy()
    }
}

/// Where and how agent CLI invocations run.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Terraform working directory the agent operates in.
    pub workdir: PathBuf,
    /// Directory for answers, logs and output schemas.
    pub scratch_dir: PathBuf,
    pub limits: CommandLimits,
    pub prompt_budget_bytes: usize,
}

impl AgentSettings {
    /// Settings with `scratch_dir` resolved against the current directory.
    ///
    /// The agent runs inside `workdir`, so every path handed to it must be
    /// absolute to land where tfgen reads it back.
    pub fn new(
        workdir: PathBuf,
        scratch_dir: &Path,
        limits: CommandLimits,
        prompt_budget_bytes: usize,
    ) -> Result<Self> {
        let scratch_dir = std::path::absolute(scratch_dir)
            .with_context(|| format!("resolve scratch dir {}", scratch_dir.display()))?;
        Ok(Self {
            workdir,
            scratch_dir,
            limits,
            prompt_budget_bytes,
        })
    }

    pub(crate) fn request(&self, role: &str, prompt: String, schema: Option<PathBuf>) -> ExecRequest {
        ExecRequest {
            workdir: self.workdir.clone(),
            prompt,
            output_schema_path: schema,
            output_path: self.scratch_dir.join(format!("{role}.out")),
            log_path: self.scratch_dir.join(format!("{role}.log")),
            limits: self.limits,
        }
    }

    pub(crate) fn verdict_schema_path(&self) -> PathBuf {
        self.scratch_dir.join("verdict_output.schema.json")
    }
}

pub(crate) fn write_output_schema(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create schema dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write schema {}", path.display()))
}


#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use super::*;

    fn limits() -> CommandLimits {
        CommandLimits {
            timeout: Duration::from_secs(5),
            output_limit_bytes: 1_000,
        }
    }

    #[test]
    fn relative_scratch_dir_becomes_absolute() {
        let settings = AgentSettings::new(
            PathBuf::from("infra"),
            Path::new(".tfgen/agents"),
            limits(),
            1_000,
        )
        .expect("settings");

        let request = settings.request("generator", "p".to_string(), None);
        assert!(request.output_path.is_absolute());
        assert!(request.log_path.is_absolute());
        assert!(settings.verdict_schema_path().is_absolute());
        assert!(request.output_path.ends_with(".tfgen/agents/generator.out"));
        assert_eq!(request.workdir, PathBuf::from("infra"));
    }

    /// A real child process in a separate workdir answers into the scratch dir.
    #[cfg(unix)]
    #[test]
    fn agent_in_other_workdir_writes_where_tfgen_reads() {
        use crate::io::executor::{CodexExecutor, execute_and_read};

        let temp = tempfile::tempdir().expect("tempdir");
        let workdir = temp.path().join("infra");
        fs::create_dir_all(&workdir).expect("workdir");
        let settings = AgentSettings::new(
            workdir,
            &temp.path().join(".tfgen/agents"),
            limits(),
            1_000,
        )
        .expect("settings");
        fs::create_dir_all(&settings.scratch_dir).expect("scratch");

        // sh -c SCRIPT agent --output-last-message <path> -
        let executor = CodexExecutor::new(
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "cat >/dev/null; echo fresh > \"$2\"".to_string(),
                "agent".to_string(),
            ],
            None,
        );
        let request = settings.request("generator", "prompt".to_string(), None);
        let text = execute_and_read(&executor, &request).expect("answer");
        assert_eq!(text.trim(), "fresh");
    }
}
