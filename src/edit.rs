use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The fundamental edit primitive: exact literal replacement of a snippet.
///
/// All patch sets compile down to an ordered list of these. Matching is
/// exact; no whitespace normalization, no patterns. The one allowance is line
/// endings: LF snippets match a CRLF document, and are written back as CRLF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    /// Label used in reports and strict-mode errors
    pub id: String,
    /// Literal text to search for
    pub search: String,
    /// Literal text every occurrence of `search` is replaced with
    #[serde(rename = "replace")]
    pub replacement: String,
}

impl Substitution {
    pub fn new(
        id: impl Into<String>,
        search: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            search: search.into(),
            replacement: replacement.into(),
        }
    }

    /// Number of non-overlapping occurrences of the search text.
    ///
    /// An empty search string never matches.
    pub fn count_in(&self, text: &str) -> usize {
        if self.search.is_empty() {
            return 0;
        }
        let (search, _) = self.in_line_endings_of(text);
        text.matches(&*search).count()
    }

    /// Replace every non-overlapping occurrence, scanning left to right.
    pub fn apply_to(&self, text: &str) -> String {
        if self.search.is_empty() {
            return text.to_string();
        }
        let (search, replacement) = self.in_line_endings_of(text);
        text.replace(&*search, &replacement)
    }

    /// True if the replacement text is already present and the search text
    /// is not, i.e. this step looks applied.
    ///
    /// A deletion (empty replacement) leaves nothing to look for and never
    /// looks applied.
    pub fn looks_applied(&self, text: &str) -> bool {
        if self.replacement.is_empty() || self.count_in(text) > 0 {
            return false;
        }
        let (_, replacement) = self.in_line_endings_of(text);
        text.contains(&*replacement)
    }

    /// Search and replacement text as they would appear in `text`.
    ///
    /// When `text` uses CRLF and the search text has bare LF line breaks,
    /// both sides are translated to CRLF. Every other byte of `text` is
    /// left alone.
    fn in_line_endings_of(&self, text: &str) -> (Cow<'_, str>, Cow<'_, str>) {
        if text.contains("\r\n") && has_bare_lf(&self.search) {
            (to_crlf(&self.search), to_crlf(&self.replacement))
        } else {
            (Cow::Borrowed(self.search.as_str()), Cow::Borrowed(self.replacement.as_str()))
        }
    }
}

fn has_bare_lf(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes
        .iter()
        .enumerate()
        .any(|(i, &b)| b == b'\n' && (i == 0 || bytes[i - 1] != b'\r'))
}

/// Turn every bare LF into CRLF; existing CRLF pairs are kept as they are.
fn to_crlf(s: &str) -> Cow<'_, str> {
    if !has_bare_lf(s) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + s.matches('\n').count());
    let mut prev = None;
    for c in s.chars() {
        if c == '\n' && prev != Some('\r') {
            out.push('\r');
        }
        out.push(c);
        prev = Some(c);
    }
    Cow::Owned(out)
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path has no parent directory: {0}")]
    NoParent(PathBuf),

    #[error("Failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full content lands at `path` or the previous file stays in
/// place. Permissions of an existing file are copied onto the replacement,
/// since the tempfile is created owner-only. A symlinked `path` is followed,
/// so the link survives and the file it points to is replaced.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let resolved = match fs::canonicalize(path) {
        Ok(real) => real,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => path.to_path_buf(),
        Err(e) => return Err(e.into()),
    };
    let path = resolved.as_path();

    // Same directory keeps the rename on one filesystem
    let parent = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => return Err(EditError::NoParent(path.to_path_buf())),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| EditError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    Ok(())
}
