//! Submission-level tests for the retry controller.
//!
//! Scripted collaborators stand in for the agents and the working file, so each
//! test pins down how many times every collaborator was called and with what.

use std::fs;

use tfgen::agents::{ToolValidator, ValidationAgent};
use tfgen::controller::{ControllerEvent, RetryController, SubmitOutcome};
use tfgen::core::session::MAX_ATTEMPTS;
use tfgen::core::types::Candidate;
use tfgen::error::{DecodeError, PipelineError};
use tfgen::io::config::ProjectConfig;
use tfgen::io::terraform::{TerraformCommand, TerraformRunner, ToolReport, ToolStatus};
use tfgen::io::workspace::{FileTemplateStore, baseline_template};
use tfgen::test_support::{
    RecordingStore, ScriptedDeployer, ScriptedGenerator, ScriptedValidator, verdict_json,
};

const CANDIDATE: &str = "provider \"google\" {}\nresource \"google_compute_instance\" \"vm\" {}";

fn rejected(error: &str) -> String {
    verdict_json(false, &[error])
}

/// One accepted verdict on the first attempt ends the loop.
#[test]
fn first_attempt_success_returns_template_and_suggestions() {
    let generator = ScriptedGenerator::new([CANDIDATE]);
    let validator = ScriptedValidator::new([
        r#"{"valid": true, "errors": [], "suggestions": ["add a firewall rule"]}"#,
    ]);
    let store = RecordingStore::default();
    let controller = RetryController::new(&generator, &validator, &store);

    let outcome = controller.submit("create one VM", |_| {}).expect("submit");

    match outcome {
        SubmitOutcome::Succeeded {
            template,
            suggestions,
            attempts_used,
        } => {
            assert_eq!(attempts_used, 1);
            assert_eq!(suggestions, vec!["add a firewall rule"]);
            assert_eq!(template.as_str(), CANDIDATE);
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(generator.calls(), 1);
    assert_eq!(validator.calls(), 1);
    assert_eq!(store.restores(), 0);
}

/// Two rejections then an acceptance: three attempts, feedback accumulated.
#[test]
fn third_attempt_success_sees_accumulated_errors() {
    let generator = ScriptedGenerator::new(["first", "second", CANDIDATE]);
    let validator = ScriptedValidator::new([
        rejected("missing provider block"),
        rejected("missing provider block"),
        verdict_json(true, &[]),
    ]);
    let store = RecordingStore::default();
    let controller = RetryController::new(&generator, &validator, &store);

    let outcome = controller.submit("create one VM", |_| {}).expect("submit");

    assert_eq!(outcome.attempts_used(), 3);
    assert!(outcome.template().is_some());

    let requests = generator.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].accumulated_errors.is_empty());
    assert!(requests[2].error_context().contains("missing provider block"));
    assert_eq!(requests[2].accumulated_errors.len(), 2);
    assert_eq!(store.restores(), 2);
}

/// Three rejections exhaust the budget; the last verdict's errors are reported.
#[test]
fn exhausted_budget_reports_final_errors() {
    let generator = ScriptedGenerator::new(["a", "b", "c", "d"]);
    let validator = ScriptedValidator::new([
        rejected("error one"),
        rejected("error two"),
        r#"{"valid": false, "errors": ["error three"], "suggestions": ["declare the network"]}"#
            .to_string(),
    ]);
    let store = RecordingStore::default();
    let controller = RetryController::new(&generator, &validator, &store);

    let mut events = Vec::new();
    let outcome = controller
        .submit("create one VM", |event| events.push(event.clone()))
        .expect("submit");

    assert_eq!(
        outcome,
        SubmitOutcome::Failed {
            errors: vec!["error three".to_string()],
            suggestions: vec!["declare the network".to_string()],
            attempts_used: MAX_ATTEMPTS,
        }
    );
    assert_eq!(generator.calls(), 3);
    assert_eq!(validator.calls(), 3);
    assert_eq!(store.restores(), 3);
    assert_eq!(
        events.last(),
        Some(&ControllerEvent::Exhausted { attempts_used: 3 })
    );
}

/// Trailing characters after the JSON object are a decode failure, not a rejection.
#[test]
fn trailing_garbage_is_a_decode_error() {
    let generator = ScriptedGenerator::new([CANDIDATE, CANDIDATE]);
    let validator = ScriptedValidator::new([r#"{"valid": false, "errors": ["x"]} trailing"#]);
    let store = RecordingStore::default();
    let controller = RetryController::new(&generator, &validator, &store);

    let err = controller.submit("create one VM", |_| {}).unwrap_err();

    match &err {
        PipelineError::ValidationDecode {
            attempt,
            error,
            raw,
        } => {
            assert_eq!(*attempt, 1);
            assert!(matches!(error, DecodeError::Syntax(_)));
            assert!(raw.ends_with("trailing"));
        }
        other => panic!("expected decode error, got {other:?}"),
    }
    assert!(err.is_decode());
    assert_eq!(generator.calls(), 1);
}

/// Fenced, Python-flavoured verdicts decode like clean JSON.
#[test]
fn fenced_python_literals_are_accepted() {
    let generator = ScriptedGenerator::new([CANDIDATE]);
    let validator = ScriptedValidator::new([
        "```json\n{\"valid\": True, \"errors\": [], \"suggestions\": None}\n```",
    ]);
    let store = RecordingStore::default();
    let controller = RetryController::new(&generator, &validator, &store);

    let outcome = controller.submit("create one VM", |_| {}).expect("submit");

    assert_eq!(outcome.attempts_used(), 1);
    assert!(outcome.template().is_some());
}

/// A verdict claiming validity while listing errors is retried.
#[test]
fn valid_flag_with_errors_is_rejected() {
    let generator = ScriptedGenerator::new(["a", CANDIDATE]);
    let validator = ScriptedValidator::new([
        r#"{"valid": true, "errors": ["unsupported argument"]}"#.to_string(),
        verdict_json(true, &[]),
    ]);
    let store = RecordingStore::default();
    let controller = RetryController::new(&generator, &validator, &store);

    let outcome = controller.submit("create one VM", |_| {}).expect("submit");

    assert_eq!(outcome.attempts_used(), 2);
    assert!(generator.requests()[1]
        .error_context()
        .contains("unsupported argument"));
}

/// Every earlier feedback entry survives into later generation requests.
#[test]
fn error_context_grows_monotonically() {
    let generator = ScriptedGenerator::new(["a", "b", "c"]);
    let validator = ScriptedValidator::new([
        rejected("alpha"),
        rejected("beta"),
        rejected("gamma"),
    ]);
    let store = RecordingStore::default();
    let controller = RetryController::new(&generator, &validator, &store);

    controller.submit("create one VM", |_| {}).expect("submit");

    let contexts: Vec<String> = generator
        .requests()
        .iter()
        .map(|r| r.error_context())
        .collect();
    for window in contexts.windows(2) {
        assert!(window[1].contains(window[0].as_str()));
    }
    assert!(contexts[2].contains("alpha"));
    assert!(contexts[2].contains("beta"));
    assert!(!contexts[2].contains("gamma"));
}

/// The validator sees each candidate once, in generation order.
#[test]
fn each_candidate_is_validated_exactly_once() {
    let generator = ScriptedGenerator::new(["a", "b"]);
    let validator = ScriptedValidator::new([rejected("bad"), verdict_json(true, &[])]);
    let store = RecordingStore::default();
    let controller = RetryController::new(&generator, &validator, &store);

    controller.submit("create one VM", |_| {}).expect("submit");

    let seen: Vec<String> = validator
        .candidates()
        .iter()
        .map(|c| c.raw_output().to_string())
        .collect();
    assert_eq!(seen, vec!["a", "b"]);
}

/// A second submission starts from scratch.
#[test]
fn resubmission_resets_accumulated_errors() {
    let generator = ScriptedGenerator::new(["a", "b", "c", "d"]);
    let validator = ScriptedValidator::new([
        rejected("first submission error"),
        rejected("first submission error"),
        rejected("first submission error"),
        verdict_json(true, &[]),
    ]);
    let store = RecordingStore::default();
    let controller = RetryController::new(&generator, &validator, &store);

    let first = controller.submit("create one VM", |_| {}).expect("first");
    assert_eq!(first.attempts_used(), 3);

    let second = controller.submit("create two VMs", |_| {}).expect("second");
    assert_eq!(second.attempts_used(), 1);

    let last = generator.requests().pop().expect("request");
    assert_eq!(last.description, "create two VMs");
    assert!(last.accumulated_errors.is_empty());
}

/// A missing baseline aborts the loop instead of validating against a stale file.
#[test]
fn restore_failure_is_a_workspace_error() {
    let generator = ScriptedGenerator::new(["a", "b"]);
    let validator = ScriptedValidator::new([rejected("bad"), verdict_json(true, &[])]);
    let store = RecordingStore::without_baseline();
    let controller = RetryController::new(&generator, &validator, &store);

    let err = controller.submit("create one VM", |_| {}).unwrap_err();

    assert!(matches!(err, PipelineError::Workspace { .. }));
    assert_eq!(generator.calls(), 1);
}

/// Deploying a validated template persists it and invokes the deployer once.
#[test]
fn deploy_after_success() {
    let generator = ScriptedGenerator::new([format!("```hcl\n{CANDIDATE}\n```")]);
    let validator = ScriptedValidator::new([verdict_json(true, &[])]);
    let store = RecordingStore::default();
    let controller = RetryController::new(&generator, &validator, &store);
    let outcome = controller.submit("create one VM", |_| {}).expect("submit");
    let template = outcome.template().expect("validated").clone();

    let deployer = ScriptedDeployer::new(verdict_json(true, &[]));
    let verdict = controller.deploy(&deployer, &template).expect("deploy");

    assert!(verdict.is_accepted());
    assert_eq!(deployer.calls(), 1);
    assert_eq!(store.persisted(), vec![CANDIDATE.to_string()]);
}

struct RejectingRunner;

impl TerraformRunner for RejectingRunner {
    fn run(&self, command: TerraformCommand) -> anyhow::Result<ToolReport> {
        Ok(ToolReport {
            command,
            status: ToolStatus::Failed { exit_code: Some(1) },
            stdout: String::new(),
            diagnostics: "Error: Missing required argument".to_string(),
        })
    }
}

/// With real files, a rejected candidate never survives in `main.tf`.
#[test]
fn working_file_is_restored_after_rejection() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = FileTemplateStore::new(temp.path());
    let project = ProjectConfig {
        project_id: "demo".to_string(),
        region: "us-central1".to_string(),
    };
    store.init_baseline(&project, false).expect("baseline");

    let validator = ToolValidator::new(RejectingRunner, &store);
    let generator = ScriptedGenerator::new(["resource {", "resource {{", "resource {{{"]);
    let controller = RetryController::new(&generator, &validator, &store);

    let outcome = controller.submit("create one VM", |_| {}).expect("submit");

    assert_eq!(
        outcome,
        SubmitOutcome::Failed {
            errors: vec!["Error: Missing required argument".to_string()],
            suggestions: Vec::new(),
            attempts_used: 3,
        }
    );
    assert_eq!(
        fs::read_to_string(store.template_path()).expect("read"),
        baseline_template(&project)
    );

    // The validator itself persists what it checks.
    validator
        .validate(&Candidate::new("resource \"a\" \"b\" {}"))
        .expect("validate");
    assert_eq!(
        fs::read_to_string(store.template_path()).expect("read"),
        "resource \"a\" \"b\" {}\n"
    );
}
