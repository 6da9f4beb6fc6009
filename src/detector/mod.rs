//! Duplicate detection boundary.
//!
//! Content comparison is delegated to an external tool. A
//! [`DuplicateDetector`] receives every candidate path of a run (sources and
//! files already in the target) and partitions them into groups of
//! byte-identical files, each tagged with an opaque [`ContentId`].
//!
//! - [`FclonesDetector`]: runs `fclones group` and parses its JSON report.
//!
//! Files the detector leaves out of its report are treated as unique
//! content by [`ContentIndex`].

pub mod fclones;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::resolver::ContentId;
use crate::scanner::path_utils::path_key;

pub use fclones::FclonesDetector;

/// One set of byte-identical files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedGroup {
    /// Identity shared by every member.
    pub content: ContentId,
    /// Member paths as reported by the detector.
    pub files: Vec<PathBuf>,
}

impl DetectedGroup {
    /// Create a group.
    #[must_use]
    pub fn new(content: ContentId, files: Vec<PathBuf>) -> Self {
        Self { content, files }
    }
}

/// Partitions files into groups of identical content.
pub trait DuplicateDetector: Send + Sync {
    /// Group `files` by content.
    ///
    /// Files may be omitted from the result; they are then treated as
    /// unique.
    ///
    /// # Errors
    ///
    /// Returns a [`DetectorError`] if detection cannot be carried out.
    fn detect(&self, files: &[PathBuf]) -> Result<Vec<DetectedGroup>, DetectorError>;
}

/// Errors raised by a duplicate detector.
#[derive(thiserror::Error, Debug)]
pub enum DetectorError {
    /// The detector program could not be started.
    #[error("failed to run '{program}': {source}")]
    Spawn {
        /// Program that was invoked
        program: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The detector ran but reported failure.
    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        /// Program that was invoked
        program: String,
        /// Exit status description
        status: String,
        /// Captured standard error
        stderr: String,
    },

    /// The detector's report could not be understood.
    #[error("could not parse duplicate report: {0}")]
    Parse(#[from] serde_json::Error),

    /// Talking to the detector failed.
    #[error("I/O error while talking to the detector: {0}")]
    Io(#[from] std::io::Error),
}

/// Lookup from path to [`ContentId`], built from detector output.
#[derive(Debug, Clone, Default)]
pub struct ContentIndex {
    ids: HashMap<String, ContentId>,
}

impl ContentIndex {
    /// Index every member of every group.
    #[must_use]
    pub fn from_groups(groups: &[DetectedGroup]) -> Self {
        let ids = groups
            .iter()
            .flat_map(|g| g.files.iter().map(move |f| (path_key(f), g.content.clone())))
            .collect();
        Self { ids }
    }

    /// Reported identity of `path`, if any.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&ContentId> {
        self.ids.get(&path_key(path))
    }

    /// Identity of a source file; unreported files get a unique id.
    #[must_use]
    pub fn source_id(&self, path: &Path) -> ContentId {
        match self.get(path) {
            Some(id) => id.clone(),
            None => {
                log::warn!(
                    "{} was not reported by the detector; treating it as unique",
                    path.display()
                );
                ContentId::unreported(path)
            }
        }
    }

    /// Number of indexed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
