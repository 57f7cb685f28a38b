//! Label file loading.
//!
//! The label file holds one disease category per line. Line order defines the
//! class index the classifier was trained with; blank lines are ignored and
//! surrounding whitespace is trimmed.

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("Failed to read label file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Label file '{0}' contains no labels")]
    Empty(PathBuf),
}

/// Ordered set of class names. Index `i` names output `i` of the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        let content = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let labels = Self::parse(&content);
        if labels.is_empty() {
            return Err(LabelError::Empty(path.to_path_buf()));
        }
        Ok(labels)
    }

    /// Parses label file content without checking for emptiness.
    pub fn parse(content: &str) -> Self {
        let labels = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { labels }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.labels.iter().position(|label| label == name)
    }

    pub fn names(&self) -> &[String] {
        &self.labels
    }
}
