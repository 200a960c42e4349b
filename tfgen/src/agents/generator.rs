//! Generation agent backed by the agent CLI.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::types::GenerationRequest;
use crate::io::config::ProjectConfig;
use crate::io::executor::{Executor, execute_and_read};
use crate::io::prompt::{GeneratorInputs, PromptBuilder};

use super::{AgentSettings, GenerationAgent};

/// Writes templates through an LLM agent.
#[derive(Debug, Clone)]
pub struct AgentGenerator<E> {
    executor: E,
    settings: AgentSettings,
    project: ProjectConfig,
    resources: Vec<String>,
    rules: Vec<String>,
}

impl<E: Executor> AgentGenerator<E> {
    pub fn new(executor: E, settings: AgentSettings, project: ProjectConfig) -> Self {
        Self {
            executor,
            settings,
            project,
            resources: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Restrict the agent to these resource types (listed in the prompt).
    pub fn with_resources(mut self, resources: Vec<String>) -> Self {
        self.resources = resources;
        self
    }

    /// Mandatory-argument rules the template must honor (listed in the prompt).
    pub fn with_rules(mut self, rules: Vec<String>) -> Self {
        self.rules = rules;
        self
    }
}

impl<E: Executor> GenerationAgent for AgentGenerator<E> {
    #[instrument(skip_all, fields(prior_errors = request.accumulated_errors.len()))]
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let prompt = PromptBuilder::new(self.settings.prompt_budget_bytes).build_generator(
            &GeneratorInputs {
                description: request.description.clone(),
                project_id: self.project.project_id.clone(),
                region: self.project.region.clone(),
                error_context: request.error_context(),
                resources: self.resources.clone(),
                rules: self.rules.clone(),
            },
        )?;
        debug!(prompt_bytes = prompt.len(), "generation prompt rendered");

        let exec = self.settings.request("generator", prompt, None);
        execute_and_read(&self.executor, &exec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{CapturingExecutor, settings};

    fn project() -> ProjectConfig {
        ProjectConfig {
            project_id: "demo".to_string(),
            region: "us-east1".to_string(),
        }
    }

    #[test]
    fn first_attempt_prompt_has_no_feedback() {
        let temp = tempfile::tempdir().expect("tempdir");
        let executor = CapturingExecutor::new("provider \"google\" {}");
        let agent = AgentGenerator::new(&executor, settings(temp.path()), project());

        let text = agent
            .generate(&GenerationRequest::new("one vm", Vec::new()))
            .expect("generate");

        assert_eq!(text, "provider \"google\" {}");
        let request = executor.request();
        assert!(request.prompt.contains("one vm"));
        assert!(request.prompt.contains("project: demo, region: us-east1"));
        assert!(!request.prompt.contains("Previous Errors"));
        assert!(request.output_schema_path.is_none());
        assert!(request.output_path.ends_with("generator.out"));
    }

    #[test]
    fn retry_prompt_carries_every_prior_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let executor = CapturingExecutor::new("x");
        let agent = AgentGenerator::new(&executor, settings(temp.path()), project())
            .with_resources(vec!["google_compute_instance".to_string()]);

        let request = GenerationRequest::new(
            "one vm",
            vec!["first error".to_string(), "second error".to_string()],
        );
        agent.generate(&request).expect("generate");

        let prompt = executor.request().prompt;
        assert!(prompt.contains("first error"));
        assert!(prompt.contains("second error"));
        assert!(prompt.contains("google_compute_instance"));
    }

    #[test]
    fn required_argument_rules_reach_the_prompt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let executor = CapturingExecutor::new("x");
        let agent = AgentGenerator::new(&executor, settings(temp.path()), project())
            .with_resources(vec!["google_compute_instance".to_string()])
            .with_rules(vec![
                "resource google_compute_instance requires boot_disk,machine_type,name as arguments."
                    .to_string(),
                "If block boot_disk is used within google_compute_instance it requires the source argument."
                    .to_string(),
            ]);

        agent
            .generate(&GenerationRequest::new("one vm", Vec::new()))
            .expect("generate");

        let prompt = executor.request().prompt;
        assert!(prompt.contains("### Required Arguments"));
        assert!(prompt.contains("requires boot_disk,machine_type,name as arguments."));
        assert!(prompt.contains("it requires the source argument."));
    }
}
