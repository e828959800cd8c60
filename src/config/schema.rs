use crate::edit::Substitution;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// One target file plus the ordered substitutions to run against it.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchSet {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub substitutions: Vec<Substitution>,
}

impl PatchSet {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.meta.target.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                substitution_id: None,
                field: "meta.target",
            });
        }

        if self.substitutions.is_empty() {
            issues.push(ValidationIssue::EmptySubstitutionList);
        }

        let mut seen = HashSet::new();
        for substitution in &self.substitutions {
            if substitution.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    substitution_id: None,
                    field: "id",
                });
            } else if !seen.insert(substitution.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId(substitution.id.clone()));
            }

            if substitution.search.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    substitution_id: Some(substitution.id.clone()),
                    field: "search",
                });
            } else if substitution.search == substitution.replacement {
                issues.push(ValidationIssue::InvalidCombo {
                    substitution_id: Some(substitution.id.clone()),
                    message: "search and replace are identical".to_string(),
                });
            }

            // A deletion cannot be recognized as applied, so a strict rerun would fail
            if self.meta.strict && substitution.replacement.is_empty() {
                issues.push(ValidationIssue::InvalidCombo {
                    substitution_id: Some(substitution.id.clone()),
                    message: "strict patch sets cannot use an empty replace".to_string(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Resolve the target path against a workspace root.
    pub fn resolve_target(&self, workspace_root: &Path) -> PathBuf {
        if self.meta.workspace_relative {
            workspace_root.join(&self.meta.target)
        } else {
            PathBuf::from(&self.meta.target)
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// File the substitutions apply to
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub workspace_relative: bool,
    /// Treat a substitution that matches nothing as an error
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptySubstitutionList,
    DuplicateId(String),
    MissingField {
        substitution_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        substitution_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptySubstitutionList => {
                write!(f, "patch set contains no substitutions")
            }
            ValidationIssue::DuplicateId(id) => {
                write!(f, "substitution id '{id}' is used more than once")
            }
            ValidationIssue::MissingField {
                substitution_id,
                field,
            } => match substitution_id {
                Some(id) => write!(f, "substitution '{id}' missing required field '{field}'"),
                None => write!(f, "missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo {
                substitution_id,
                message,
            } => match substitution_id {
                Some(id) => write!(f, "substitution '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch set: {message}"),
            },
        }
    }
}
