//! Orchestration of one submission: generate, validate, retry, and deploy on request.
//!
//! The controller owns no loop state between calls. Each `submit` drives a fresh
//! [`RetrySession`] and performs the side effects that belong to each transition:
//! calling the agents, restoring the baseline after a rejection, writing attempt
//! artifacts, and reporting progress.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::agents::{DeploymentAgent, GenerationAgent, ValidationAgent};
use crate::core::normalize::decode_verdict;
use crate::core::session::{MAX_ATTEMPTS, RetrySession, SessionEvent, SessionState};
use crate::core::types::{Candidate, DeploymentVerdict, ValidatedTemplate, ValidationVerdict};
use crate::error::{PipelineError, TransitionError};
use crate::io::attempt_log::{AttemptLog, AttemptRecord};
use crate::io::workspace::TemplateStore;

/// Progress reported while a submission runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    AttemptStarted { attempt: u32, max_attempts: u32 },
    CandidateGenerated { attempt: u32 },
    ValidationPassed { attempt: u32 },
    ValidationFailed { attempt: u32, errors: Vec<String> },
    Retrying { next_attempt: u32, max_attempts: u32 },
    Exhausted { attempts_used: u32 },
}

impl std::fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerEvent::AttemptStarted {
                attempt,
                max_attempts,
            } => write!(f, "attempt {attempt}/{max_attempts}: generating template"),
            ControllerEvent::CandidateGenerated { attempt } => {
                write!(f, "attempt {attempt}: validating template")
            }
            ControllerEvent::ValidationPassed { attempt } => {
                write!(f, "attempt {attempt}: template passed validation")
            }
            ControllerEvent::ValidationFailed { attempt, errors } => write!(
                f,
                "attempt {attempt}: template failed validation: {}",
                errors.join(". ")
            ),
            ControllerEvent::Retrying {
                next_attempt,
                max_attempts,
            } => write!(f, "retrying ({next_attempt}/{max_attempts})"),
            ControllerEvent::Exhausted { attempts_used } => write!(
                f,
                "no valid template after {attempts_used} attempts"
            ),
        }
    }
}

/// Final result of a submission that ran to a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Succeeded {
        template: ValidatedTemplate,
        suggestions: Vec<String>,
        attempts_used: u32,
    },
    /// Retry budget exhausted; carries the last verdict's feedback.
    Failed {
        errors: Vec<String>,
        suggestions: Vec<String>,
        attempts_used: u32,
    },
}

impl SubmitOutcome {
    pub fn attempts_used(&self) -> u32 {
        match self {
            SubmitOutcome::Succeeded { attempts_used, .. }
            | SubmitOutcome::Failed { attempts_used, .. } => *attempts_used,
        }
    }

    pub fn template(&self) -> Option<&ValidatedTemplate> {
        match self {
            SubmitOutcome::Succeeded { template, .. } => Some(template),
            SubmitOutcome::Failed { .. } => None,
        }
    }
}

/// Drives the generate/validate loop against borrowed or owned collaborators.
#[derive(Debug, Clone)]
pub struct RetryController<G, V, S> {
    generator: G,
    validator: V,
    store: S,
    attempt_log_root: Option<PathBuf>,
}

impl<G, V, S> RetryController<G, V, S>
where
    G: GenerationAgent,
    V: ValidationAgent,
    S: TemplateStore,
{
    pub fn new(generator: G, validator: V, store: S) -> Self {
        Self {
            generator,
            validator,
            store,
            attempt_log_root: None,
        }
    }

    /// Write per-attempt artifacts below `root`.
    pub fn with_attempt_log(mut self, root: impl Into<PathBuf>) -> Self {
        self.attempt_log_root = Some(root.into());
        self
    }

    /// Run one submission to a terminal state.
    ///
    /// A rejected template is retried until `MAX_ATTEMPTS` candidates have been
    /// produced; exhaustion is reported as [`SubmitOutcome::Failed`]. Agent
    /// failures and undecodable verdicts stop the loop with an error.
    #[instrument(skip_all, fields(description_bytes = description.len()))]
    pub fn submit<F: FnMut(&ControllerEvent)>(
        &self,
        description: &str,
        mut on_event: F,
    ) -> Result<SubmitOutcome, PipelineError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(PipelineError::EmptyDescription);
        }

        let log = self.start_attempt_log();
        let mut session = RetrySession::new().apply(SessionEvent::Submitted)?;
        let mut generation_ms = 0u64;

        loop {
            session = match &session.state {
                SessionState::Generating => {
                    let attempt = session.current_attempt();
                    on_event(&ControllerEvent::AttemptStarted {
                        attempt,
                        max_attempts: session.max_attempts,
                    });
                    let started = Instant::now();
                    let raw = self
                        .generator
                        .generate(&session.generation_request(description))
                        .map_err(|err| PipelineError::Generation {
                            attempt,
                            message: format!("{err:#}"),
                        })?;
                    generation_ms = elapsed_ms(started);
                    let candidate = Candidate::new(raw);
                    if candidate.template().trim().is_empty() {
                        warn!(attempt, "generator returned an empty candidate");
                        return Err(PipelineError::Generation {
                            attempt,
                            message: "empty candidate".to_string(),
                        });
                    }
                    debug!(
                        attempt,
                        bytes = candidate.raw_output().len(),
                        generation_ms,
                        "candidate generated"
                    );
                    on_event(&ControllerEvent::CandidateGenerated { attempt });
                    session.apply(SessionEvent::Generated(candidate))?
                }
                SessionState::Validating(candidate) => {
                    let attempt = session.attempt_count;
                    let verdict =
                        self.validate(attempt, candidate, log.as_ref(), generation_ms)?;
                    if verdict.is_accepted() {
                        on_event(&ControllerEvent::ValidationPassed { attempt });
                    } else {
                        on_event(&ControllerEvent::ValidationFailed {
                            attempt,
                            errors: verdict.errors.clone(),
                        });
                        self.store
                            .restore_baseline()
                            .map_err(PipelineError::workspace)?;
                    }

                    let next = session.apply(SessionEvent::Validated(verdict))?;
                    match &next.state {
                        SessionState::Generating => on_event(&ControllerEvent::Retrying {
                            next_attempt: next.current_attempt(),
                            max_attempts: next.max_attempts,
                        }),
                        SessionState::Failed { attempts_used, .. } => {
                            on_event(&ControllerEvent::Exhausted {
                                attempts_used: *attempts_used,
                            });
                        }
                        _ => {}
                    }
                    next
                }
                SessionState::Succeeded { .. } | SessionState::Failed { .. } => break,
                SessionState::Idle => {
                    return Err(TransitionError {
                        state: "idle",
                        event: "loop step",
                    }
                    .into());
                }
            };
        }

        let outcome = match session.state {
            SessionState::Succeeded {
                template,
                suggestions,
                attempts_used,
            } => SubmitOutcome::Succeeded {
                template,
                suggestions,
                attempts_used,
            },
            SessionState::Failed {
                errors,
                suggestions,
                attempts_used,
            } => SubmitOutcome::Failed {
                errors,
                suggestions,
                attempts_used,
            },
            other => {
                return Err(TransitionError {
                    state: other.name(),
                    event: "completion",
                }
                .into());
            }
        };
        info!(
            attempts_used = outcome.attempts_used(),
            max_attempts = MAX_ATTEMPTS,
            succeeded = outcome.template().is_some(),
            "submission finished"
        );
        Ok(outcome)
    }

    /// Persist a validated template and apply it once.
    ///
    /// The deployment verdict is returned as decoded; a failed apply is a verdict
    /// with `valid: false`, not an error.
    #[instrument(skip_all)]
    pub fn deploy<D: DeploymentAgent + ?Sized>(
        &self,
        deployer: &D,
        template: &ValidatedTemplate,
    ) -> Result<DeploymentVerdict, PipelineError> {
        self.store
            .persist(template.as_str())
            .map_err(PipelineError::workspace)?;
        let raw = deployer
            .deploy()
            .map_err(|err| PipelineError::Deployment {
                message: format!("{err:#}"),
            })?;
        let verdict = decode_verdict(&raw).map_err(|error| PipelineError::Deployment {
            message: format!("could not decode deployment verdict: {error}"),
        })?;
        info!(valid = verdict.valid, "deployment finished");
        Ok(verdict)
    }

    fn validate(
        &self,
        attempt: u32,
        candidate: &Candidate,
        log: Option<&AttemptLog>,
        generation_ms: u64,
    ) -> Result<ValidationVerdict, PipelineError> {
        let started = Instant::now();
        let raw = self
            .validator
            .validate(candidate)
            .map_err(|err| PipelineError::ValidationAgent {
                attempt,
                message: format!("{err:#}"),
            })?;
        let decoded = decode_verdict(&raw);

        if let Some(log) = log {
            let record = AttemptRecord {
                attempt,
                candidate,
                raw_verdict: &raw,
                verdict: decoded.as_ref().ok(),
                generation_ms,
                validation_ms: elapsed_ms(started),
            };
            if let Err(err) = log.write(&record) {
                warn!(attempt, err = %format!("{err:#}"), "failed to write attempt log");
            }
        }

        match decoded {
            Ok(verdict) => {
                debug!(
                    attempt,
                    valid = verdict.valid,
                    errors = verdict.errors.len(),
                    "verdict decoded"
                );
                Ok(verdict)
            }
            Err(error) => {
                warn!(attempt, %error, "verdict could not be decoded");
                if let Err(err) = self.store.restore_baseline() {
                    warn!(err = %format!("{err:#}"), "failed to restore baseline");
                }
                Err(PipelineError::ValidationDecode {
                    attempt,
                    error,
                    raw,
                })
            }
        }
    }

    fn start_attempt_log(&self) -> Option<AttemptLog> {
        let root = self.attempt_log_root.as_ref()?;
        match AttemptLog::start(root) {
            Ok(log) => {
                debug!(submission = log.submission(), "attempt log started");
                Some(log)
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "attempt log disabled");
                None
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
