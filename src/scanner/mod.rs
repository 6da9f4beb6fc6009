//! Source enumeration and destination mapping.
//!
//! This module provides functionality for:
//! - Resolving source arguments and the target directory ([`layout`])
//! - Listing the files below a path, and the other entries of a
//!   destination directory ([`walker`])
//! - Unicode path normalization ([`path_utils`])
//!
//! # Example
//!
//! ```no_run
//! use archive_cp::scanner::{SourceLayout, Walker};
//! use std::path::Path;
//!
//! let layout = SourceLayout::new(Path::new("/archive"), &["/mirror/."])?;
//! for spec in layout.sources() {
//!     for file in Walker::new(&spec.path).collect_files()? {
//!         println!("{} -> {}", file.path.display(), layout.destination_of(&file.path)?.display());
//!     }
//! }
//! # Ok::<(), archive_cp::scanner::ScanError>(())
//! ```

pub mod layout;
pub mod path_utils;
pub mod walker;

use std::path::PathBuf;
use std::time::SystemTime;

pub use layout::{SourceLayout, SourceSpec};
pub use walker::{list_occupants, Walker};

/// Name prefix of in-flight copies in a destination directory.
pub const TEMP_PREFIX: &str = ".archive-cp.";

/// Metadata for a discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl FileEntry {
    /// Create a new FileEntry.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }

    /// File name as a string, converted lossily.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A directory entry that is not a regular file: a symlink, a
/// subdirectory, or a special file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupant {
    /// Path of the entry itself
    pub path: PathBuf,
    /// Last modification time of the entry, not of what it points to
    pub modified: SystemTime,
    /// For a symlink to a regular file, the file it resolves to
    pub link_target: Option<PathBuf>,
}

impl Occupant {
    /// Entry name as a string, converted lossily.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Errors that can occur while resolving sources or listing files.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A source argument has no file name to place in the target.
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// A file was found outside every source.
    #[error("Not under any source: {0}")]
    NotUnderSource(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
