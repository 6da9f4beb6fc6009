//! Duplicate-group naming and resolution.
//!
//! This module decides, for one destination directory, which files get
//! physically copied and what each copy is called. It is a pure function of
//! the duplicate groups reported by the detector and the directory's current
//! listing:
//!
//! - Files whose contents are identical are copied once.
//! - Distinct contents that would share a name are disambiguated with a
//!   timestamp suffix (see [`naming`]).
//! - Files already in the directory are never renamed or overwritten.
//!
//! # Architecture
//!
//! * [`naming`]: suffix format, base-name recovery, comparison keys.
//! * [`resolve`]: the [`GroupResolver`] itself.
//! * [`verify`]: optional content verification guarding against a faulty
//!   detector.
//!
//! # Example
//!
//! ```
//! use archive_cp::resolver::{ContentId, GroupResolver, ResolverConfig, SourceFile};
//! use std::path::{Path, PathBuf};
//! use std::time::{Duration, UNIX_EPOCH};
//!
//! let t1 = UNIX_EPOCH + Duration::from_secs(1_000);
//! let t2 = UNIX_EPOCH + Duration::from_secs(2_000);
//! let sources = vec![
//!     SourceFile::new(PathBuf::from("/mirror-a/bar.txt"), t1, ContentId::new("aaaa")),
//!     SourceFile::new(PathBuf::from("/mirror-b/bar.txt"), t2, ContentId::new("bbbb")),
//! ];
//!
//! let resolver = GroupResolver::new(ResolverConfig::default());
//! let assignment = resolver.resolve(Path::new("/archive"), &sources, &[]).unwrap();
//!
//! // The newest content keeps the name, the older one is suffixed.
//! assert_eq!(assignment.name_of(&ContentId::new("bbbb")), Some("bar.txt"));
//! assert_eq!(
//!     assignment.name_of(&ContentId::new("aaaa")),
//!     Some("bar.txt.19700101T001640.000000Z")
//! );
//! ```

pub mod naming;
pub mod resolve;
pub mod verify;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use resolve::{GroupResolver, ResolverConfig};
pub use verify::{Blake3Verifier, ContentVerifier};

/// Opaque content identity supplied by the duplicate detector.
///
/// Two files with equal ids are trusted to be byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wrap a detector-provided key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Unique id for a file the detector did not report.
    ///
    /// It never equals the id of any other file, so the file is treated as
    /// distinct content and always copied.
    #[must_use]
    pub fn unreported(path: &Path) -> Self {
        Self(format!("unreported:{}", path.display()))
    }

    /// The raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A candidate input file bound for one destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Proposed filename in the destination directory.
    pub name: String,
    /// Last modification time.
    pub modified: SystemTime,
    /// Content identity reported by the detector.
    pub content: ContentId,
}

impl SourceFile {
    /// Create a source file whose proposed name is its own file name.
    #[must_use]
    pub fn new(path: PathBuf, modified: SystemTime, content: ContentId) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            modified,
            content,
        }
    }

    /// Override the proposed destination name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// A file already present in the destination directory.
///
/// Its name is immovable: the resolver never renames or replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingEntry {
    /// Filename within the destination directory.
    pub name: String,
    /// Last modification time.
    pub modified: SystemTime,
    /// Content identity, if the detector reported one.
    pub content: Option<ContentId>,
}

impl ExistingEntry {
    /// Create an entry with known content.
    #[must_use]
    pub fn new(name: impl Into<String>, modified: SystemTime, content: ContentId) -> Self {
        Self {
            name: name.into(),
            modified,
            content: Some(content),
        }
    }

    /// Create an entry whose content could not be identified.
    #[must_use]
    pub fn unknown(name: impl Into<String>, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            modified,
            content: None,
        }
    }
}

/// What has to happen for a placement to be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementAction {
    /// Copy the selected member to the assigned name.
    Copy,
    /// The destination already holds this content under the assigned name.
    AlreadyPresent,
}

/// The destination of one duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    /// Final filename within the destination directory.
    pub name: String,
    /// Content identity of the group.
    pub content: ContentId,
    /// Member chosen as the copy source.
    pub source: PathBuf,
    /// Modification time of the chosen member.
    #[serde(with = "system_time_rfc3339")]
    pub modified: SystemTime,
    /// Members that are not copied because the chosen member covers them.
    pub duplicates: Vec<PathBuf>,
    /// Whether a copy is needed.
    pub action: PlacementAction,
}

impl Placement {
    /// Whether the assigned name carries a disambiguation suffix.
    #[must_use]
    pub fn is_disambiguated(&self) -> bool {
        naming::base_name(&self.name) != self.name
    }
}

/// Observable events that did not prevent resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Two contents computed the same suffixed name; a discriminator was
    /// appended to the later one.
    Collision {
        /// The name that was already taken.
        taken: String,
        /// The name that was assigned instead.
        assigned: String,
        /// Content that received the discriminated name.
        content: ContentId,
    },
}

/// Complete naming decision for one destination directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    /// Destination directory.
    pub directory: PathBuf,
    /// One placement per duplicate group, ordered by collision set then name.
    pub placements: Vec<Placement>,
    /// Non-fatal events raised while resolving.
    pub diagnostics: Vec<Diagnostic>,
}

impl Assignment {
    /// The filename assigned to a content, if any.
    #[must_use]
    pub fn name_of(&self, content: &ContentId) -> Option<&str> {
        self.placements
            .iter()
            .find(|p| &p.content == content)
            .map(|p| p.name.as_str())
    }

    /// The placement covering a source path (selected or unselected member).
    #[must_use]
    pub fn placement_for(&self, path: &Path) -> Option<&Placement> {
        self.placements
            .iter()
            .find(|p| p.source == path || p.duplicates.iter().any(|d| d == path))
    }

    /// Placements that need a physical copy.
    pub fn copies(&self) -> impl Iterator<Item = &Placement> {
        self.placements
            .iter()
            .filter(|p| p.action == PlacementAction::Copy)
    }

    /// Placements already satisfied by the destination.
    pub fn already_present(&self) -> impl Iterator<Item = &Placement> {
        self.placements
            .iter()
            .filter(|p| p.action == PlacementAction::AlreadyPresent)
    }

    /// Destination path of a placement.
    #[must_use]
    pub fn destination(&self, placement: &Placement) -> PathBuf {
        self.directory.join(&placement.name)
    }
}

/// Errors that stop resolution of a directory.
///
/// Every variant names the destination directory so the operator can find
/// the conflict; none of them is resolved by guessing.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Files reported as duplicates differ when compared.
    #[error(
        "integrity check failed in {}: {} share content id {key} but differ",
        .directory.display(),
        .names.join(" and ")
    )]
    Integrity {
        /// Destination directory being resolved.
        directory: PathBuf,
        /// The files that differ.
        names: Vec<String>,
        /// The content id they were reported under.
        key: ContentId,
    },

    /// An existing file of unknown content holds a name that incoming
    /// content needs.
    #[error(
        "'{name}' in {} has unknown content and blocks content {key}; resolve it manually",
        .directory.display()
    )]
    ImmovableOccupant {
        /// Destination directory being resolved.
        directory: PathBuf,
        /// The occupied filename.
        name: String,
        /// Content that wanted the name.
        key: ContentId,
    },

    /// Reading a file for verification failed.
    #[error("failed to verify {}: {source}", .path.display())]
    Verify {
        /// File that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ResolveError {
    /// Destination directory involved, if the error names one.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        match self {
            Self::Integrity { directory, .. } | Self::ImmovableOccupant { directory, .. } => {
                Some(directory)
            }
            Self::Verify { .. } => None,
        }
    }
}

mod system_time_rfc3339 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::Serializer;
    use std::time::SystemTime;

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let utc: DateTime<Utc> = (*time).into();
        serializer.serialize_str(&utc.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}
