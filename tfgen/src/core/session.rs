//! Retry session state machine.
//!
//! A [`RetrySession`] is a plain value: [`RetrySession::apply`] consumes it with an
//! event and returns the next session. The controller performs the side effects
//! that go with each transition; this module only decides where to go.
//!
//! ```text
//! Idle --Submitted--> Generating --Generated--> Validating
//!                        ^                          |
//!                        +---- rejected, budget ----+--> Failed (rejected, no budget)
//!                                                   +--> Succeeded (accepted)
//! ```

use crate::core::types::{Candidate, GenerationRequest, ValidatedTemplate, ValidationVerdict};
use crate::error::TransitionError;

/// Generate-validate cycles allowed per submission.
pub const MAX_ATTEMPTS: u32 = 3;

/// Where a session is in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Generating,
    /// Holds the candidate of the current attempt until its verdict arrives.
    Validating(Candidate),
    Succeeded {
        template: ValidatedTemplate,
        suggestions: Vec<String>,
        attempts_used: u32,
    },
    Failed {
        errors: Vec<String>,
        suggestions: Vec<String>,
        attempts_used: u32,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Generating => "generating",
            SessionState::Validating(_) => "validating",
            SessionState::Succeeded { .. } => "succeeded",
            SessionState::Failed { .. } => "failed",
        }
    }
}

/// Inputs that drive the session forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Submitted,
    Generated(Candidate),
    Validated(ValidationVerdict),
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Submitted => "submission",
            SessionEvent::Generated(_) => "candidate",
            SessionEvent::Validated(_) => "verdict",
        }
    }
}

/// Loop bookkeeping for one submission.
///
/// `attempt_count` counts candidates produced so far; it moves on the
/// `Generating -> Validating` edge, so an accepted verdict on attempt k leaves
/// `attempts_used == k`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySession {
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub accumulated_errors: Vec<String>,
    pub state: SessionState,
}

impl Default for RetrySession {
    fn default() -> Self {
        Self::new()
    }
}

impl RetrySession {
    pub fn new() -> Self {
        Self {
            attempt_count: 0,
            max_attempts: MAX_ATTEMPTS,
            accumulated_errors: Vec::new(),
            state: SessionState::Idle,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            SessionState::Succeeded { .. } | SessionState::Failed { .. }
        )
    }

    /// Attempt number the next (or current) candidate belongs to.
    pub fn current_attempt(&self) -> u32 {
        match self.state {
            SessionState::Generating => self.attempt_count + 1,
            _ => self.attempt_count,
        }
    }

    /// Request for the next generation call, carrying every earlier error.
    pub fn generation_request(&self, description: &str) -> GenerationRequest {
        GenerationRequest::new(description, self.accumulated_errors.clone())
    }

    /// Apply one event and return the next session.
    pub fn apply(self, event: SessionEvent) -> Result<RetrySession, TransitionError> {
        match (self.state, event) {
            (
                SessionState::Idle | SessionState::Succeeded { .. } | SessionState::Failed { .. },
                SessionEvent::Submitted,
            ) => Ok(RetrySession {
                state: SessionState::Generating,
                ..RetrySession::new()
            }),
            (SessionState::Generating, SessionEvent::Generated(candidate)) => Ok(RetrySession {
                attempt_count: self.attempt_count + 1,
                state: SessionState::Validating(candidate),
                ..self
            }),
            (SessionState::Validating(candidate), SessionEvent::Validated(verdict)) => {
                if verdict.is_accepted() {
                    return Ok(RetrySession {
                        state: SessionState::Succeeded {
                            template: ValidatedTemplate::from_candidate(&candidate),
                            suggestions: verdict.suggestions,
                            attempts_used: self.attempt_count,
                        },
                        ..RetrySession::new()
                    });
                }
                if self.attempt_count >= self.max_attempts {
                    return Ok(RetrySession {
                        state: SessionState::Failed {
                            errors: verdict.errors,
                            suggestions: verdict.suggestions,
                            attempts_used: self.attempt_count,
                        },
                        ..RetrySession::new()
                    });
                }
                let mut accumulated_errors = self.accumulated_errors;
                accumulated_errors.push(verdict.retry_feedback());
                Ok(RetrySession {
                    attempt_count: self.attempt_count,
                    max_attempts: self.max_attempts,
                    accumulated_errors,
                    state: SessionState::Generating,
                })
            }
            (state, event) => Err(TransitionError {
                state: state.name(),
                event: event.name(),
            }),
        }
    }
}
