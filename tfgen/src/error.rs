//! Error taxonomy surfaced by the retry controller.
//!
//! Collaborators report failures through `anyhow`; the controller folds them into
//! [`PipelineError`] so callers can tell a hard stop from a decode failure
//! without string matching. A rejected template is not an error here: it is
//! either retried or reported as `SubmitOutcome::Failed`.

use thiserror::Error;

/// Verdict text that could not be turned into a structured verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("verdict text is empty after normalization")]
    Empty,

    #[error("verdict is not valid JSON: {0}")]
    Syntax(String),

    #[error("verdict does not match schema:\n- {}", .0.join("\n- "))]
    Schema(Vec<String>),
}

/// Event applied in a session state that does not accept it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply {event} while {state}")]
pub struct TransitionError {
    pub state: &'static str,
    pub event: &'static str,
}

/// Errors surfaced by `RetryController::submit` and `RetryController::deploy`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("provide a description of the architecture to generate")]
    EmptyDescription,

    #[error("generation agent failed on attempt {attempt}: {message}")]
    Generation { attempt: u32, message: String },

    #[error("validation agent failed on attempt {attempt}: {message}")]
    ValidationAgent { attempt: u32, message: String },

    #[error("could not decode validation verdict on attempt {attempt}: {error}")]
    ValidationDecode {
        attempt: u32,
        error: DecodeError,
        raw: String,
    },

    #[error("template workspace error: {message}")]
    Workspace { message: String },

    #[error("deployment agent failed: {message}")]
    Deployment { message: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl PipelineError {
    pub(crate) fn workspace(err: anyhow::Error) -> Self {
        Self::Workspace {
            message: format!("{err:#}"),
        }
    }

    /// True for malformed agent output as opposed to an agent that never answered.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::ValidationDecode { .. })
    }
}
