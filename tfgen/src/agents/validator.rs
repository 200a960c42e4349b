//! Validation agents: an LLM agent that runs the tool, or the tool itself.
//!
//! Both persist the cleaned candidate to the working file first, so the tool
//! always checks exactly the text the controller would hand back.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::types::{Candidate, ValidationVerdict};
use crate::io::executor::{Executor, execute_and_read};
use crate::io::prompt::PromptBuilder;
use crate::io::terraform::{TerraformCommand, TerraformRunner};
use crate::io::workspace::{TEMPLATE_FILE, TemplateStore};

use super::{AgentSettings, VERDICT_OUTPUT_SCHEMA, ValidationAgent, write_output_schema};

/// Asks an LLM agent to run `terraform validate` and `terraform plan`.
#[derive(Debug, Clone)]
pub struct AgentValidator<E, S> {
    executor: E,
    store: S,
    settings: AgentSettings,
}

impl<E: Executor, S: TemplateStore> AgentValidator<E, S> {
    pub fn new(executor: E, store: S, settings: AgentSettings) -> Self {
        Self {
            executor,
            store,
            settings,
        }
    }
}

impl<E: Executor, S: TemplateStore> ValidationAgent for AgentValidator<E, S> {
    #[instrument(skip_all)]
    fn validate(&self, candidate: &Candidate) -> Result<String> {
        let template = candidate.template();
        self.store.persist(&template).context("persist candidate")?;

        let schema_path = self.settings.verdict_schema_path();
        write_output_schema(&schema_path, VERDICT_OUTPUT_SCHEMA)?;

        let prompt = PromptBuilder::new(self.settings.prompt_budget_bytes)
            .build_validator(TEMPLATE_FILE, &template)?;
        let exec = self.settings.request("validator", prompt, Some(schema_path));
        execute_and_read(&self.executor, &exec)
    }
}

/// Runs `terraform validate`, then `terraform plan` as a double check.
#[derive(Debug, Clone)]
pub struct ToolValidator<R, S> {
    runner: R,
    store: S,
}

impl<R: TerraformRunner, S: TemplateStore> ToolValidator<R, S> {
    pub fn new(runner: R, store: S) -> Self {
        Self { runner, store }
    }

    fn check(&self) -> Result<ValidationVerdict> {
        for command in [TerraformCommand::Validate, TerraformCommand::Plan] {
            let report = self.runner.run(command)?;
            if let Some(message) = report.failure_message() {
                info!(command = command.name(), "candidate rejected by tool");
                return Ok(ValidationVerdict::failed(vec![message]));
            }
        }
        Ok(ValidationVerdict::passed(Vec::new()))
    }
}

impl<R: TerraformRunner, S: TemplateStore> ValidationAgent for ToolValidator<R, S> {
    #[instrument(skip_all)]
    fn validate(&self, candidate: &Candidate) -> Result<String> {
        self.store
            .persist(&candidate.template())
            .context("persist candidate")?;
        let verdict = self.check()?;
        serde_json::to_string(&verdict).context("serialize verdict")
    }
}
