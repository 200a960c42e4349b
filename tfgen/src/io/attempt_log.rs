//! Per-attempt artifacts under `.tfgen/attempts/`.
//!
//! Debugging aid only; the controller never reads these back.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use crate::core::types::{Candidate, ValidationVerdict};

/// How the attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    Rejected,
    Undecodable,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptMeta {
    pub submission: String,
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub error_count: usize,
    pub generation_ms: u64,
    pub validation_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub candidate_path: PathBuf,
    pub verdict_path: PathBuf,
    pub raw_verdict_path: PathBuf,
    pub meta_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(root: &Path, submission: &str, attempt: u32) -> Self {
        let dir = root.join(submission).join(attempt.to_string());
        Self {
            candidate_path: dir.join("candidate.tf"),
            verdict_path: dir.join("verdict.json"),
            raw_verdict_path: dir.join("verdict.raw.txt"),
            meta_path: dir.join("meta.json"),
            dir,
        }
    }
}

pub struct AttemptRecord<'a> {
    pub attempt: u32,
    pub candidate: &'a Candidate,
    pub raw_verdict: &'a str,
    /// `None` when the verdict text could not be decoded.
    pub verdict: Option<&'a ValidationVerdict>,
    pub generation_ms: u64,
    pub validation_ms: u64,
}

/// Artifact writer for one submission.
#[derive(Debug, Clone)]
pub struct AttemptLog {
    root: PathBuf,
    submission: String,
}

impl AttemptLog {
    /// Start a log for a new submission under `root` (e.g. `.tfgen/attempts`).
    pub fn start(root: &Path) -> Result<Self> {
        let submission = unique_submission_id(root, unix_secs())?;
        Ok(Self {
            root: root.to_path_buf(),
            submission,
        })
    }

    pub fn submission(&self) -> &str {
        &self.submission
    }

    pub fn write(&self, record: &AttemptRecord<'_>) -> Result<AttemptPaths> {
        let paths = AttemptPaths::new(&self.root, &self.submission, record.attempt);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;

        let mut template = record.candidate.template();
        template.push('\n');
        write_text(&paths.candidate_path, &template)?;
        match record.verdict {
            Some(verdict) => write_json(&paths.verdict_path, verdict)?,
            None => write_text(&paths.raw_verdict_path, record.raw_verdict)?,
        }

        let outcome = match record.verdict {
            Some(verdict) if verdict.is_accepted() => AttemptOutcome::Accepted,
            Some(_) => AttemptOutcome::Rejected,
            None => AttemptOutcome::Undecodable,
        };
        write_json(
            &paths.meta_path,
            &AttemptMeta {
                submission: self.submission.clone(),
                attempt: record.attempt,
                outcome,
                error_count: record.verdict.map_or(0, |v| v.errors.len()),
                generation_ms: record.generation_ms,
                validation_ms: record.validation_ms,
            },
        )?;
        Ok(paths)
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn unique_submission_id(root: &Path, secs: u64) -> Result<String> {
    let base = format!("sub-{secs}");
    for suffix in 1..=999u32 {
        let id = if suffix == 1 {
            base.clone()
        } else {
            format!("{base}-{suffix}")
        };
        if !root.join(&id).exists() {
            return Ok(id);
        }
    }
    Err(anyhow!(
        "unable to pick a unique submission id from base '{base}'"
    ))
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
