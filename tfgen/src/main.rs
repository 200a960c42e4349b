//! Terraform template generator.
//!
//! `tfgen generate` turns a description into a validated `main.tf`, retrying with
//! the validator's feedback up to three times, and optionally deploys it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use tfgen::agents::{
    AgentDeployer, AgentGenerator, AgentSettings, AgentValidator, DeploymentAgent,
    ToolDeployer, ToolValidator, ValidationAgent,
};
use tfgen::controller::{RetryController, SubmitOutcome};
use tfgen::exit_codes;
use tfgen::io::config::{Backend, DEFAULT_CONFIG_PATH, PipelineConfig, load_config, write_config};
use tfgen::io::executor::CodexExecutor;
use tfgen::io::terraform::{TerraformCli, load_catalog};
use tfgen::io::workspace::FileTemplateStore;
use tfgen::logging;

#[derive(Parser)]
#[command(
    name = "tfgen",
    version,
    about = "Generate validated Terraform templates from a description"
)]
struct Cli {
    /// Config file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the config file and the baseline `main.tf.bk` if missing.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Generate and validate a template; print it on success.
    Generate {
        /// Architecture description.
        description: Option<String>,
        /// Read the description from a file instead.
        #[arg(long, conflicts_with = "description")]
        file: Option<PathBuf>,
        /// Apply the template once it validates.
        #[arg(long)]
        deploy: bool,
        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List provider resource types offered to the generation agent.
    Resources,
    /// Print required-argument rules for the named resource types.
    Rules {
        #[arg(required = true)]
        resources: Vec<String>,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Generate {
            description,
            file,
            deploy,
            json,
        } => {
            let description = match file {
                Some(path) => fs::read_to_string(&path)
                    .with_context(|| format!("read description {}", path.display()))?,
                None => description.unwrap_or_default(),
            };
            cmd_generate(&cli.config, &description, deploy, json)
        }
        Command::Resources => cmd_resources(&cli.config),
        Command::Rules { resources } => cmd_rules(&cli.config, &resources),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    let cfg = if force || !config_path.exists() {
        let cfg = PipelineConfig::default();
        write_config(config_path, &cfg)?;
        println!("wrote {}", config_path.display());
        cfg
    } else {
        load_config(config_path)?
    };

    let store = FileTemplateStore::new(&cfg.terraform.workdir);
    if store.init_baseline(&cfg.project, force)? {
        println!("wrote {}", store.baseline_path().display());
        println!("wrote {}", store.template_path().display());
    }
    if cfg.project.project_id.is_empty() {
        eprintln!(
            "set [project].project_id in {} and re-run `tfgen init --force`",
            config_path.display()
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_generate(config_path: &Path, description: &str, deploy: bool, json: bool) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let state_dir = state_dir(config_path);
    let settings = AgentSettings::new(
        cfg.terraform.workdir.clone(),
        &state_dir.join("agents"),
        cfg.agent.limits(),
        cfg.agent.prompt_budget_bytes,
    )?;
    let executor = CodexExecutor::from_config(&cfg.agent);
    let terraform = terraform_cli(&cfg);
    let store = FileTemplateStore::new(&cfg.terraform.workdir);

    let hints = generation_hints(&cfg, &terraform);
    let generator = AgentGenerator::new(&executor, settings.clone(), cfg.project.clone())
        .with_resources(hints.resources)
        .with_rules(hints.rules);
    let validator: Box<dyn ValidationAgent + '_> = match cfg.validation {
        Backend::Agent => Box::new(AgentValidator::new(&executor, &store, settings.clone())),
        Backend::Tool => Box::new(ToolValidator::new(&terraform, &store)),
    };

    let mut controller = RetryController::new(&generator, &*validator, &store);
    if cfg.attempt_log {
        controller = controller.with_attempt_log(state_dir.join("attempts"));
    }

    let outcome = match controller.submit(description, |event| eprintln!("{event}")) {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("{err}");
            if let tfgen::error::PipelineError::ValidationDecode { raw, .. } = &err {
                eprintln!("raw verdict:\n{raw}");
            }
            return Ok(if err.is_decode() {
                exit_codes::DECODE
            } else {
                exit_codes::INVALID
            });
        }
    };

    print_outcome(&outcome, json)?;
    let SubmitOutcome::Succeeded { template, .. } = &outcome else {
        return Ok(exit_codes::EXHAUSTED);
    };
    if !deploy {
        return Ok(exit_codes::OK);
    }

    let deployer: Box<dyn DeploymentAgent + '_> = match cfg.deployment {
        Backend::Agent => Box::new(AgentDeployer::new(&executor, settings)),
        Backend::Tool => Box::new(ToolDeployer::new(&terraform)),
    };
    eprintln!("deploying {}", store.template_path().display());
    let verdict = match controller.deploy(&*deployer, template) {
        Ok(verdict) => verdict,
        Err(err) => {
            eprintln!("{err}");
            return Ok(exit_codes::INVALID);
        }
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    }
    if verdict.is_accepted() {
        eprintln!("deployment succeeded");
        Ok(exit_codes::OK)
    } else {
        eprintln!("deployment failed: {}", verdict.errors.join(". "));
        for suggestion in &verdict.suggestions {
            eprintln!("suggestion: {suggestion}");
        }
        Ok(exit_codes::DEPLOY_FAILED)
    }
}

fn print_outcome(outcome: &SubmitOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    match outcome {
        SubmitOutcome::Succeeded {
            template,
            suggestions,
            attempts_used,
        } => {
            println!("{}", template.as_str());
            eprintln!("validated after {attempts_used} attempt(s)");
            for suggestion in suggestions {
                eprintln!("suggestion: {suggestion}");
            }
        }
        SubmitOutcome::Failed {
            errors,
            suggestions,
            attempts_used,
        } => {
            eprintln!("template still invalid after {attempts_used} attempts");
            for error in errors {
                eprintln!("error: {error}");
            }
            for suggestion in suggestions {
                eprintln!("suggestion: {suggestion}");
            }
        }
    }
    Ok(())
}

fn cmd_resources(config_path: &Path) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let catalog = load_catalog(&terraform_cli(&cfg), &cfg.terraform.provider_source)?;
    for name in catalog.resource_names(&cfg.terraform.resource_prefixes) {
        println!("{name}");
    }
    Ok(exit_codes::OK)
}

fn cmd_rules(config_path: &Path, resources: &[String]) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let catalog = load_catalog(&terraform_cli(&cfg), &cfg.terraform.provider_source)?;
    for rule in catalog.required_argument_rules(resources)? {
        println!("{rule}");
    }
    Ok(exit_codes::OK)
}

fn terraform_cli(cfg: &PipelineConfig) -> TerraformCli {
    TerraformCli::new(
        cfg.terraform.binary.clone(),
        cfg.terraform.workdir.clone(),
        cfg.terraform.limits(),
    )
}

/// Provider knowledge offered to the generation agent.
#[derive(Debug, Default)]
struct GenerationHints {
    resources: Vec<String>,
    /// Required-argument rules for `resources`.
    rules: Vec<String>,
}

/// Hints for the generation prompt; empty when disabled or unavailable.
fn generation_hints(cfg: &PipelineConfig, terraform: &TerraformCli) -> GenerationHints {
    if !cfg.agent.resource_hints {
        return GenerationHints::default();
    }
    let catalog = match load_catalog(terraform, &cfg.terraform.provider_source) {
        Ok(catalog) => catalog,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "resource hints unavailable");
            return GenerationHints::default();
        }
    };
    let resources = catalog.resource_names(&cfg.terraform.resource_prefixes);
    let rules = match catalog.required_argument_rules(&resources) {
        Ok(rules) => rules,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "required-argument rules unavailable");
            Vec::new()
        }
    };
    GenerationHints { resources, rules }
}

/// Directory holding the config, agent scratch files and attempt logs.
fn state_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["tfgen", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn parse_generate_with_flags() {
        let cli = Cli::parse_from([
            "tfgen",
            "generate",
            "two vms",
            "--deploy",
            "--json",
            "--config",
            "custom.toml",
        ]);
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        match cli.command {
            Command::Generate {
                description,
                file,
                deploy,
                json,
            } => {
                assert_eq!(description.as_deref(), Some("two vms"));
                assert!(file.is_none());
                assert!(deploy);
                assert!(json);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn description_and_file_conflict() {
        let result = Cli::try_parse_from(["tfgen", "generate", "two vms", "--file", "d.txt"]);
        assert!(result.is_err());
    }

    #[test]
    fn rules_requires_a_resource() {
        assert!(Cli::try_parse_from(["tfgen", "rules"]).is_err());
    }

    #[test]
    fn state_dir_is_config_parent() {
        assert_eq!(
            state_dir(Path::new(".tfgen/config.toml")),
            PathBuf::from(".tfgen")
        );
        assert_eq!(state_dir(Path::new("config.toml")), PathBuf::from("."));
    }
}
