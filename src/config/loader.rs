use crate::config::schema::{PatchSet, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    /// A directory was given but held no `.toml` files
    NoPatchSets { dir: PathBuf },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read patch set from {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse patch set TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse patch set TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid patch set ({}): {}", path.display(), source),
                None => write!(f, "invalid patch set: {}", source),
            },
            ConfigError::NoPatchSets { dir } => {
                write!(f, "no .toml patch sets found in {}", dir.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::NoPatchSets { .. } => None,
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatchSet, ConfigError> {
    let set: PatchSet = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    set.validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(set)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchSet, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// List the patch set files a path refers to.
///
/// A file is returned as-is. A directory yields every `*.toml` file directly
/// inside it, sorted by name.
pub fn discover(path: impl AsRef<Path>) -> Result<Vec<PathBuf>, ConfigError> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).max_depth(1) {
        let entry = entry.map_err(|e| ConfigError::Io {
            path: e.path().unwrap_or(path).to_path_buf(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();

    if files.is_empty() {
        return Err(ConfigError::NoPatchSets {
            dir: path.to_path_buf(),
        });
    }
    Ok(files)
}

/// Load every patch set a path refers to, in discovery order.
pub fn load_all(path: impl AsRef<Path>) -> Result<Vec<(PathBuf, PatchSet)>, ConfigError> {
    discover(path)?
        .into_iter()
        .map(|file| load_from_path(&file).map(|set| (file, set)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[meta]
name = "minimal"
target = "App.jsx"

[[substitutions]]
id = "swap"
search = "old"
replace = "new"
"#;

    #[test]
    fn test_load_from_str() {
        let set = load_from_str(MINIMAL).unwrap();
        assert_eq!(set.meta.name, "minimal");
        assert_eq!(set.meta.target, "App.jsx");
        assert!(!set.meta.workspace_relative);
        assert!(!set.meta.strict);
        assert_eq!(set.substitutions.len(), 1);
        assert_eq!(set.substitutions[0].replacement, "new");
    }

    #[test]
    fn test_literal_multiline_strings_are_exact() {
        let input = r#"
[meta]
target = "App.jsx"

[[substitutions]]
id = "wrap"
search = '''
  <a>
    x
  </a>'''
replace = '''
  {ok && (
    <a>x</a>
  )}'''
"#;
        let set = load_from_str(input).unwrap();
        assert_eq!(set.substitutions[0].search, "  <a>\n    x\n  </a>");
        assert_eq!(set.substitutions[0].replacement, "  {ok && (\n    <a>x</a>\n  )}");
    }

    #[test]
    fn test_toml_error_gets_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("broken.toml");
        fs::write(&file, "[meta\n").unwrap();

        let err = load_from_path(&file).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { path: Some(_), .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_validation_error_gets_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("empty.toml");
        fs::write(&file, "[meta]\ntarget = \"a\"\n").unwrap();

        let err = load_from_path(&file).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { path: Some(_), .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = load_from_path("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_discover_directory_sorted() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("b.toml"), MINIMAL).unwrap();
        fs::write(temp_dir.path().join("a.toml"), MINIMAL).unwrap();
        fs::write(temp_dir.path().join("notes.md"), "ignored").unwrap();
        fs::create_dir(temp_dir.path().join("nested")).unwrap();
        fs::write(temp_dir.path().join("nested/c.toml"), MINIMAL).unwrap();

        let files = discover(temp_dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.toml", "b.toml"]);

        let sets = load_all(temp_dir.path()).unwrap();
        assert_eq!(sets.len(), 2);
    }

    #[test]
    fn test_discover_empty_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = discover(temp_dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NoPatchSets { .. }));
    }
}
