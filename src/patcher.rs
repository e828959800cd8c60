//! The Patcher: read a file, run ordered literal substitutions, write it back.
//!
//! Pipeline for [`Patcher::apply`]:
//!
//! 1. Read the whole target as UTF-8 into a [`Document`]
//! 2. Run every [`Substitution`] in order against the evolving document
//! 3. In strict mode, fail if any step matched nothing and does not look applied
//! 4. Skip the write when the result equals the original
//! 5. Re-read the target and compare fingerprints to catch concurrent edits
//! 6. Atomically replace the target (tempfile + fsync + rename)

use crate::config::PatchSet;
use crate::document::Document;
use crate::edit::{atomic_write, EditError, Substitution};
use crate::safety::{SafetyError, WorkspaceGuard};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: EditError,
    },

    #[error("Substitution '{id}' matched nothing in {file}")]
    NoMatch { file: PathBuf, id: String },

    #[error("{file} changed on disk while it was being patched")]
    ConcurrentModification { file: PathBuf },

    #[error(transparent)]
    Safety(#[from] SafetyError),
}

/// Outcome of a patch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchStatus {
    /// The target was rewritten
    Applied,
    /// The final content equals the original; nothing was written
    Unchanged,
    /// Dry run: the target would be rewritten
    WouldApply,
}

impl fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchStatus::Applied => write!(f, "applied"),
            PatchStatus::Unchanged => write!(f, "unchanged"),
            PatchStatus::WouldApply => write!(f, "would apply"),
        }
    }
}

/// What a single substitution did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub id: String,
    /// Occurrences replaced by this step
    pub occurrences: usize,
    /// No occurrences, but the replacement text is already present
    pub already_applied: bool,
}

/// Per-run report, one per target file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use = "PatchReport should be checked for the final status"]
pub struct PatchReport {
    pub target: PathBuf,
    pub status: PatchStatus,
    pub steps: Vec<StepReport>,
    pub fingerprint_before: u64,
    pub fingerprint_after: u64,
}

impl PatchReport {
    /// The line printed after a successful run, e.g.
    /// `Updated MainForm.jsx successfully`.
    pub fn confirmation(&self) -> String {
        let name = self
            .target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.target.display().to_string());
        format!("Updated {name} successfully")
    }

    pub fn total_occurrences(&self) -> usize {
        self.steps.iter().map(|s| s.occurrences).sum()
    }

    /// Steps that matched nothing and do not look applied.
    pub fn unmatched(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| s.occurrences == 0 && !s.already_applied)
    }
}

/// In-memory result of running the substitutions, before any write.
#[derive(Debug, Clone)]
pub struct Transformation {
    pub original: Document,
    pub patched: Document,
    pub steps: Vec<StepReport>,
}

impl Transformation {
    pub fn changed(&self) -> bool {
        self.original != self.patched
    }

    fn into_report(self, target: &Path, status: PatchStatus) -> PatchReport {
        PatchReport {
            target: target.to_path_buf(),
            status,
            fingerprint_before: self.original.fingerprint(),
            fingerprint_after: self.patched.fingerprint(),
            steps: self.steps,
        }
    }
}

/// Ordered literal substring replacement on one file.
#[derive(Debug, Clone)]
pub struct Patcher {
    target: PathBuf,
    substitutions: Vec<Substitution>,
    strict: bool,
}

impl Patcher {
    pub fn new(target: impl Into<PathBuf>, substitutions: Vec<Substitution>) -> Self {
        Self {
            target: target.into(),
            substitutions,
            strict: false,
        }
    }

    /// Build a patcher for a patch set, resolving its target against the
    /// workspace root.
    ///
    /// Workspace-relative targets must stay inside the workspace.
    pub fn from_patch_set(set: &PatchSet, workspace_root: &Path) -> Result<Self, PatchError> {
        let target = if set.meta.workspace_relative {
            let guard = WorkspaceGuard::new(workspace_root)?;
            guard.validate_path(&set.meta.target)?
        } else {
            set.resolve_target(workspace_root)
        };

        Ok(Self::new(target, set.substitutions.clone()).strict(set.meta.strict))
    }

    /// Fail on substitutions that match nothing.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Run every substitution in order against a document. Touches no files.
    pub fn transform(&self, original: &Document) -> Result<Transformation, PatchError> {
        let mut current = original.clone();
        let mut steps = Vec::with_capacity(self.substitutions.len());

        for substitution in &self.substitutions {
            let (next, occurrences) = current.substitute(substitution);
            let already_applied = occurrences == 0 && substitution.looks_applied(next.as_str());
            debug!(
                id = %substitution.id,
                occurrences,
                already_applied,
                "substitution evaluated"
            );

            if occurrences == 0 && !already_applied {
                if self.strict {
                    return Err(PatchError::NoMatch {
                        file: self.target.clone(),
                        id: substitution.id.clone(),
                    });
                }
                info!(
                    id = %substitution.id,
                    file = %self.target.display(),
                    "substitution matched nothing"
                );
            }

            steps.push(StepReport {
                id: substitution.id.clone(),
                occurrences,
                already_applied,
            });
            current = next;
        }

        Ok(Transformation {
            original: original.clone(),
            patched: current,
            steps,
        })
    }

    /// Read the target and compute the result without writing.
    pub fn check(&self) -> Result<(PatchReport, Transformation), PatchError> {
        let original = self.read()?;
        let transformation = self.transform(&original)?;
        let status = if transformation.changed() {
            PatchStatus::WouldApply
        } else {
            PatchStatus::Unchanged
        };
        Ok((
            transformation.clone().into_report(&self.target, status),
            transformation,
        ))
    }

    /// Read, substitute, and write the target back.
    pub fn apply(&self) -> Result<PatchReport, PatchError> {
        let original = self.read()?;
        let transformation = self.transform(&original)?;
        self.commit(transformation)
    }

    /// Write a previously computed transformation to the target.
    ///
    /// Fails with [`PatchError::ConcurrentModification`] if the target no
    /// longer holds the transformation's original content.
    pub fn commit(&self, transformation: Transformation) -> Result<PatchReport, PatchError> {
        if !transformation.changed() {
            info!(file = %self.target.display(), "content unchanged, skipping write");
            return Ok(transformation.into_report(&self.target, PatchStatus::Unchanged));
        }

        let on_disk = self.read()?;
        if on_disk.fingerprint() != transformation.original.fingerprint() {
            return Err(PatchError::ConcurrentModification {
                file: self.target.clone(),
            });
        }

        atomic_write(&self.target, transformation.patched.as_str().as_bytes()).map_err(
            |source| PatchError::Write {
                path: self.target.clone(),
                source,
            },
        )?;

        info!(
            file = %self.target.display(),
            bytes = transformation.patched.len(),
            "target rewritten"
        );
        Ok(transformation.into_report(&self.target, PatchStatus::Applied))
    }

    fn read(&self) -> Result<Document, PatchError> {
        fs::read_to_string(&self.target)
            .map(Document::from)
            .map_err(|source| PatchError::Read {
                path: self.target.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_target(content: &str) -> (tempfile::TempDir, PathBuf) {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("MainForm.jsx");
        fs::write(&file_path, content).unwrap();
        (temp_dir, file_path)
    }

    #[test]
    fn test_single_button_scenario() {
        let (_dir, path) = write_target("<button onClick={x}>A</button>");
        let patcher = Patcher::new(
            &path,
            vec![Substitution::new(
                "wrap",
                "<button onClick={x}>A</button>",
                "{cond && (<button onClick={x}>A</button>)}",
            )],
        );

        let report = patcher.apply().unwrap();
        assert_eq!(report.status, PatchStatus::Applied);
        assert_eq!(report.confirmation(), "Updated MainForm.jsx successfully");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{cond && (<button onClick={x}>A</button>)}"
        );
    }

    #[test]
    fn test_order_is_respected() {
        let (_dir, path) = write_target("a");
        let patcher = Patcher::new(
            &path,
            vec![
                Substitution::new("first", "a", "b"),
                Substitution::new("second", "b", "c"),
            ],
        );
        let report = patcher.apply().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "c");
        assert_eq!(report.steps[0].occurrences, 1);
        assert_eq!(report.steps[1].occurrences, 1);

        let (_dir, path) = write_target("a");
        let reversed = Patcher::new(
            &path,
            vec![
                Substitution::new("second", "b", "c"),
                Substitution::new("first", "a", "b"),
            ],
        );
        let _ = reversed.apply().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "b");
    }

    #[test]
    fn test_no_match_is_silent_noop() {
        let (_dir, path) = write_target("unrelated content\n");
        let patcher = Patcher::new(&path, vec![Substitution::new("t", "missing", "found")]);

        let report = patcher.apply().unwrap();
        assert_eq!(report.status, PatchStatus::Unchanged);
        assert_eq!(report.fingerprint_before, report.fingerprint_after);
        assert_eq!(report.unmatched().count(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "unrelated content\n");
    }

    #[test]
    fn test_strict_no_match_fails_without_writing() {
        let (_dir, path) = write_target("old and more");
        let patcher = Patcher::new(
            &path,
            vec![
                Substitution::new("hit", "old", "new"),
                Substitution::new("miss", "absent", "present"),
            ],
        )
        .strict(true);

        let err = patcher.apply().unwrap_err();
        assert!(matches!(err, PatchError::NoMatch { ref id, .. } if id == "miss"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "old and more");
    }

    #[test]
    fn test_strict_tolerates_already_applied() {
        let (_dir, path) = write_target("new and more");
        let patcher =
            Patcher::new(&path, vec![Substitution::new("hit", "old", "new")]).strict(true);

        let report = patcher.apply().unwrap();
        assert_eq!(report.status, PatchStatus::Unchanged);
        assert!(report.steps[0].already_applied);
        assert_eq!(report.unmatched().count(), 0);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let patcher = Patcher::new(
            temp_dir.path().join("missing.jsx"),
            vec![Substitution::new("t", "a", "b")],
        );
        let err = patcher.apply().unwrap_err();
        assert!(matches!(err, PatchError::Read { .. }));
    }

    #[test]
    fn test_check_does_not_write() {
        let (_dir, path) = write_target("old");
        let patcher = Patcher::new(&path, vec![Substitution::new("t", "old", "new")]);

        let (report, transformation) = patcher.check().unwrap();
        assert_eq!(report.status, PatchStatus::WouldApply);
        assert_eq!(transformation.patched.as_str(), "new");
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
    }

    #[test]
    fn test_commit_detects_concurrent_modification() {
        let (_dir, path) = write_target("old");
        let patcher = Patcher::new(&path, vec![Substitution::new("t", "old", "new")]);

        let (_report, transformation) = patcher.check().unwrap();
        fs::write(&path, "old, edited elsewhere").unwrap();

        let err = patcher.commit(transformation).unwrap_err();
        assert!(matches!(err, PatchError::ConcurrentModification { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "old, edited elsewhere");
    }

    #[test]
    fn test_commit_after_check() {
        let (_dir, path) = write_target("old");
        let patcher = Patcher::new(&path, vec![Substitution::new("t", "old", "new")]);

        let (_report, transformation) = patcher.check().unwrap();
        let report = patcher.commit(transformation).unwrap();
        assert_eq!(report.status, PatchStatus::Applied);
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    #[cfg(unix)]
    fn test_apply_through_symlinked_target() {
        use std::os::unix::fs::symlink;

        let (dir, real) = write_target("old");
        let link = dir.path().join("link.jsx");
        symlink(&real, &link).unwrap();

        let patcher = Patcher::new(&link, vec![Substitution::new("t", "old", "new")]);
        let report = patcher.apply().unwrap();

        assert_eq!(report.status, PatchStatus::Applied);
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).unwrap(), "new");
    }

    #[test]
    fn test_transform_is_pure() {
        let patcher = Patcher::new("unused.jsx", vec![Substitution::new("t", "x", "y")]);
        let doc = Document::new("x x");
        let transformation = patcher.transform(&doc).unwrap();
        assert!(transformation.changed());
        assert_eq!(transformation.patched.as_str(), "y y");
        assert_eq!(transformation.steps[0].occurrences, 2);
    }

    #[test]
    fn test_from_patch_set_rejects_escape() {
        use crate::config::{Metadata, PatchSet};

        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path().join("ws");
        fs::create_dir_all(&workspace).unwrap();
        fs::write(temp_dir.path().join("outside.jsx"), "x").unwrap();

        let set = PatchSet {
            meta: Metadata {
                target: "../outside.jsx".to_string(),
                workspace_relative: true,
                ..Metadata::default()
            },
            substitutions: vec![Substitution::new("t", "x", "y")],
        };

        let err = Patcher::from_patch_set(&set, &workspace).unwrap_err();
        assert!(matches!(
            err,
            PatchError::Safety(SafetyError::OutsideWorkspace { .. })
        ));
    }

    #[test]
    fn test_from_patch_set_carries_strict() {
        use crate::config::{Metadata, PatchSet};

        let (dir, _path) = write_target("x");
        let set = PatchSet {
            meta: Metadata {
                target: "MainForm.jsx".to_string(),
                workspace_relative: true,
                strict: true,
                ..Metadata::default()
            },
            substitutions: vec![Substitution::new("t", "x", "y")],
        };

        let patcher = Patcher::from_patch_set(&set, dir.path()).unwrap();
        assert!(patcher.is_strict());
        assert!(patcher.target().ends_with("MainForm.jsx"));
    }
}
