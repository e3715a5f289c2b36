//! Controls that write a whole configuration file

use super::{Category, Control, ControlContext, ControlError, ControlOutcome};
use crate::files::{atomic_write, backup_file, mode_of, FileAttributes};
use std::path::{Path, PathBuf};
use stig_runtime::{log_debug, log_info};

/// Replaces a file with known-good content
///
/// The previous file is copied aside first; the write itself is atomic and
/// applies mode and ownership before the rename.
#[derive(Debug, Clone)]
pub struct FileControl {
    id: String,
    description: String,
    category: Category,
    high_risk: bool,
    path: PathBuf,
    content: String,
    attributes: FileAttributes,
    backup: bool,
}

impl FileControl {
    pub fn new(id: &str, description: &str, category: Category, path: impl Into<PathBuf>, content: &str) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            category,
            high_risk: false,
            path: path.into(),
            content: content.to_string(),
            attributes: FileAttributes::default(),
            backup: true,
        }
    }

    pub fn with_attributes(mut self, attributes: FileAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn without_backup(mut self) -> Self {
        self.backup = false;
        self
    }

    pub fn high_risk(mut self) -> Self {
        self.high_risk = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_current(&self) -> bool {
        let content_matches = std::fs::read_to_string(&self.path)
            .map(|existing| existing == self.content)
            .unwrap_or(false);
        content_matches && mode_of(&self.path).map_or(true, |mode| mode == self.attributes.mode)
    }

    fn write_error(&self, error: std::io::Error) -> ControlError {
        ControlError::FileWrite {
            control: self.id.clone(),
            path: self.path.clone(),
            reason: error.to_string(),
        }
    }
}

impl Control for FileControl {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn category(&self) -> Category {
        self.category
    }

    fn high_risk(&self) -> bool {
        self.high_risk
    }

    fn apply(&self, ctx: &ControlContext<'_>) -> Result<ControlOutcome, ControlError> {
        if self.is_current() {
            log_debug!("File already current", "control" => self.id, "path" => self.path.display());
            return Ok(ControlOutcome::already_compliant());
        }

        if ctx.dry_run() {
            log_info!(&format!("[DRY RUN] Would write {}", self.path.display()), "control" => self.id);
            return Ok(ControlOutcome::changed(format!("would write {}", self.path.display())));
        }

        let mut outcome = ControlOutcome::changed(format!("wrote {}", self.path.display()));
        if self.backup {
            if let Some(backup) = backup_file(&self.path).map_err(|e| self.write_error(e))? {
                outcome.changes.push(format!("backed up to {}", backup.display()));
            }
        }

        outcome.warnings = atomic_write(
            &self.path,
            self.content.as_bytes(),
            &self.attributes,
            ctx.identity.as_ref(),
        )
        .map_err(|e| self.write_error(e))?;
        Ok(outcome)
    }
}
