//! Scripted collaborators for driving the controller without agents or `terraform`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use anyhow::{Result, anyhow};

use crate::agents::{DeploymentAgent, GenerationAgent, ValidationAgent};
use crate::core::types::{Candidate, GenerationRequest, ValidationVerdict};
use crate::io::workspace::TemplateStore;

/// Verdict text as a well-behaved agent would answer.
pub fn verdict_json(valid: bool, errors: &[&str]) -> String {
    let verdict = ValidationVerdict {
        valid,
        errors: errors.iter().map(|e| e.to_string()).collect(),
        suggestions: Vec::new(),
    };
    serde_json::to_string(&verdict).unwrap_or_default()
}

/// Returns queued outputs in order and records every request.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    outputs: RefCell<VecDeque<Result<String, String>>>,
    requests: RefCell<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new<I, T>(outputs: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            outputs: RefCell::new(outputs.into_iter().map(|o| Ok(o.into())).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Generator whose first call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            outputs: RefCell::new(VecDeque::from([Err(message.to_string())])),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl GenerationAgent for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        match self.outputs.borrow_mut().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted generator exhausted")),
        }
    }
}

/// Answers with queued verdict texts and records the candidates it saw.
#[derive(Debug, Default)]
pub struct ScriptedValidator {
    verdicts: RefCell<VecDeque<String>>,
    candidates: RefCell<Vec<Candidate>>,
}

impl ScriptedValidator {
    pub fn new<I, T>(verdicts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            verdicts: RefCell::new(verdicts.into_iter().map(Into::into).collect()),
            candidates: RefCell::new(Vec::new()),
        }
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        self.candidates.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.candidates.borrow().len()
    }
}

impl ValidationAgent for ScriptedValidator {
    fn validate(&self, candidate: &Candidate) -> Result<String> {
        self.candidates.borrow_mut().push(candidate.clone());
        self.verdicts
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted validator exhausted"))
    }
}

/// Answers every deploy with the same verdict text.
#[derive(Debug, Default)]
pub struct ScriptedDeployer {
    verdict: String,
    calls: Cell<usize>,
}

impl ScriptedDeployer {
    pub fn new(verdict: String) -> Self {
        Self {
            verdict,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl DeploymentAgent for ScriptedDeployer {
    fn deploy(&self) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.verdict.clone())
    }
}

/// In-memory template store counting baseline restores.
#[derive(Debug, Default)]
pub struct RecordingStore {
    persisted: RefCell<Vec<String>>,
    restores: Cell<usize>,
    fail_restore: bool,
}

impl RecordingStore {
    /// Store whose restore always fails, as with a missing baseline.
    pub fn without_baseline() -> Self {
        Self {
            fail_restore: true,
            ..Self::default()
        }
    }

    pub fn persisted(&self) -> Vec<String> {
        self.persisted.borrow().clone()
    }

    pub fn restores(&self) -> usize {
        self.restores.get()
    }
}

impl TemplateStore for RecordingStore {
    fn persist(&self, template: &str) -> Result<()> {
        self.persisted.borrow_mut().push(template.to_string());
        Ok(())
    }

    fn restore_baseline(&self) -> Result<()> {
        if self.fail_restore {
            return Err(anyhow!("missing baseline main.tf.bk"));
        }
        self.restores.set(self.restores.get() + 1);
        Ok(())
    }
}
