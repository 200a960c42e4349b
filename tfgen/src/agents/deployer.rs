//! Deployment agents. They act on the template already in the working file.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::types::DeploymentVerdict;
use crate::io::executor::{Executor, execute_and_read};
use crate::io::prompt::PromptBuilder;
use crate::io::terraform::{TerraformCommand, TerraformRunner};
use crate::io::workspace::TEMPLATE_FILE;

use super::{AgentSettings, DeploymentAgent, VERDICT_OUTPUT_SCHEMA, write_output_schema};

/// Asks an LLM agent to run `terraform apply`.
#[derive(Debug, Clone)]
pub struct AgentDeployer<E> {
    executor: E,
    settings: AgentSettings,
}

impl<E: Executor> AgentDeployer<E> {
    pub fn new(executor: E, settings: AgentSettings) -> Self {
        Self { executor, settings }
    }
}

impl<E: Executor> DeploymentAgent for AgentDeployer<E> {
    #[instrument(skip_all)]
    fn deploy(&self) -> Result<String> {
        let schema_path = self.settings.verdict_schema_path();
        write_output_schema(&schema_path, VERDICT_OUTPUT_SCHEMA)?;

        let prompt =
            PromptBuilder::new(self.settings.prompt_budget_bytes).build_deployer(TEMPLATE_FILE)?;
        let exec = self.settings.request("deployer", prompt, Some(schema_path));
        execute_and_read(&self.executor, &exec)
    }
}

/// Runs `terraform apply -auto-approve`.
#[derive(Debug, Clone)]
pub struct ToolDeployer<R> {
    runner: R,
}

impl<R: TerraformRunner> ToolDeployer<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: TerraformRunner> DeploymentAgent for ToolDeployer<R> {
    #[instrument(skip_all)]
    fn deploy(&self) -> Result<String> {
        let report = self.runner.run(TerraformCommand::Apply)?;
        let verdict = match report.failure_message() {
            None => DeploymentVerdict::passed(Vec::new()),
            Some(message) => {
                info!("apply failed");
                DeploymentVerdict::failed(vec![message])
            }
        };
        serde_json::to_string(&verdict).context("serialize verdict")
    }
}
