use crate::edit::Substitution;
use xxhash_rust::xxh3::xxh3_64;

/// The full text of a target file, held between read and write.
///
/// A `Document` is never mutated in place: every substitution produces a new
/// value, so the original content stays available for diffing and for the
/// concurrent-modification check before write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    content: String,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// xxh3 hash of the document bytes.
    pub fn fingerprint(&self) -> u64 {
        xxh3_64(self.content.as_bytes())
    }

    /// Apply one substitution, returning the new document and the number of
    /// occurrences that were replaced.
    ///
    /// Every non-overlapping occurrence is replaced, scanning left to right.
    /// Zero occurrences yields an identical document.
    #[must_use]
    pub fn substitute(&self, substitution: &Substitution) -> (Document, usize) {
        let count = substitution.count_in(&self.content);
        if count == 0 {
            return (self.clone(), 0);
        }
        (Document::new(substitution.apply_to(&self.content)), count)
    }
}

impl From<String> for Document {
    fn from(content: String) -> Self {
        Self::new(content)
    }
}
