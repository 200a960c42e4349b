//! Value objects passed between the controller and its collaborators.
//!
//! Nothing here performs I/O. Candidates and verdicts are immutable once built;
//! the controller moves them between states instead of sharing them.

use serde::{Deserialize, Serialize};

use crate::core::normalize::clean_template;

/// Prefix for every error entry fed back into the next generation attempt.
pub const RETRY_ERROR_PREFIX: &str =
    "Solve the following error made when generating the previous template: ";

/// Input for one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub description: String,
    /// Feedback from every earlier rejected attempt of this submission, oldest first.
    pub accumulated_errors: Vec<String>,
}

impl GenerationRequest {
    pub fn new(description: impl Into<String>, accumulated_errors: Vec<String>) -> Self {
        Self {
            description: description.into(),
            accumulated_errors,
        }
    }

    /// Accumulated errors rendered as one text block (empty on the first attempt).
    pub fn error_context(&self) -> String {
        self.accumulated_errors
            .iter()
            .map(|entry| format!("\n{entry}"))
            .collect()
    }
}

/// Unvalidated template text produced by the generation agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    raw_output: String,
}

impl Candidate {
    pub fn new(raw_output: impl Into<String>) -> Self {
        Self {
            raw_output: raw_output.into(),
        }
    }

    pub fn raw_output(&self) -> &str {
        &self.raw_output
    }

    /// Template text with model formatting artifacts removed.
    pub fn template(&self) -> String {
        clean_template(&self.raw_output)
    }
}

/// Structured pass/fail result from the validation agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ValidationVerdict {
    pub fn passed(suggestions: Vec<String>) -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            suggestions,
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
            suggestions: Vec::new(),
        }
    }

    /// Whether the controller may accept this verdict.
    ///
    /// A verdict that claims `valid` while still listing errors is not accepted.
    pub fn is_accepted(&self) -> bool {
        self.valid && self.errors.is_empty()
    }

    /// Feedback entry appended to the session after a rejection.
    pub fn retry_feedback(&self) -> String {
        format!("{RETRY_ERROR_PREFIX}{}", self.errors.join(". "))
    }
}

/// Deployment results share the validation verdict shape.
pub type DeploymentVerdict = ValidationVerdict;

/// Template text that passed validation in a completed submission.
///
/// Only the controller can build one, so holding a value proves a successful
/// `submit` happened before `deploy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidatedTemplate(String);

impl ValidatedTemplate {
    pub(crate) fn from_candidate(candidate: &Candidate) -> Self {
        Self(candidate.template())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
