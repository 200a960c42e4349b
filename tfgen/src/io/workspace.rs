//! The template file shared with the `terraform` CLI.
//!
//! `main.tf` is the single mutable resource of a session. `main.tf.bk` holds a
//! known-good baseline that is copied back after every rejected candidate, so the
//! next tool call never sees a broken file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::io::config::ProjectConfig;

pub const TEMPLATE_FILE: &str = "main.tf";
pub const BASELINE_FILE: &str = "main.tf.bk";

/// Storage for the template file the external tool inspects.
pub trait TemplateStore {
    /// Replace the working template with `template`.
    fn persist(&self, template: &str) -> Result<()>;

    /// Copy the baseline over the working template.
    fn restore_baseline(&self) -> Result<()>;
}

impl<T: TemplateStore + ?Sized> TemplateStore for &T {
    fn persist(&self, template: &str) -> Result<()> {
        (**self).persist(template)
    }

    fn restore_baseline(&self) -> Result<()> {
        (**self).restore_baseline()
    }
}

/// `main.tf` / `main.tf.bk` pair inside a Terraform working directory.
#[derive(Debug, Clone)]
pub struct FileTemplateStore {
    template_path: PathBuf,
    baseline_path: PathBuf,
}

impl FileTemplateStore {
    pub fn new(workdir: &Path) -> Self {
        Self {
            template_path: workdir.join(TEMPLATE_FILE),
            baseline_path: workdir.join(BASELINE_FILE),
        }
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    pub fn baseline_path(&self) -> &Path {
        &self.baseline_path
    }

    /// Write a provider-only baseline (and matching working file) when missing.
    ///
    /// Returns true when files were written.
    pub fn init_baseline(&self, project: &ProjectConfig, force: bool) -> Result<bool> {
        if !force && self.baseline_path.exists() {
            return Ok(false);
        }
        if let Some(parent) = self.baseline_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create workdir {}", parent.display()))?;
        }
        let baseline = baseline_template(project);
        fs::write(&self.baseline_path, &baseline)
            .with_context(|| format!("write {}", self.baseline_path.display()))?;
        fs::write(&self.template_path, &baseline)
            .with_context(|| format!("write {}", self.template_path.display()))?;
        Ok(true)
    }
}

impl TemplateStore for FileTemplateStore {
    fn persist(&self, template: &str) -> Result<()> {
        debug!(path = %self.template_path.display(), bytes = template.len(), "persisting template");
        let mut buf = template.trim_end().to_string();
        buf.push('\n');
        fs::write(&self.template_path, buf)
            .with_context(|| format!("write {}", self.template_path.display()))
    }

    fn restore_baseline(&self) -> Result<()> {
        debug!(path = %self.baseline_path.display(), "restoring baseline template");
        if !self.baseline_path.exists() {
            return Err(anyhow!(
                "missing baseline {} (run `tfgen init`)",
                self.baseline_path.display()
            ));
        }
        fs::copy(&self.baseline_path, &self.template_path).with_context(|| {
            format!(
                "copy {} to {}",
                self.baseline_path.display(),
                self.template_path.display()
            )
        })?;
        Ok(())
    }
}

/// Provider block for the configured project.
pub fn baseline_template(project: &ProjectConfig) -> String {
    format!(
        "provider \"google\" {{\n  project = \"{}\"\n  region  = \"{}\"\n}}\n",
        project.project_id, project.region
    )
}
