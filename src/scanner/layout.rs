//! Mapping of source arguments to destination paths.
//!
//! Each source argument is placed under the target directory the way `cp -r`
//! would place it:
//!
//! | Argument | Lands at |
//! |----------|----------|
//! | `dir` | `target/dir/...` |
//! | `dir/.` | `target/...` (contents only) |
//! | `file` | `target/file` |
//!
//! # Example
//!
//! ```no_run
//! use archive_cp::scanner::SourceLayout;
//! use std::path::Path;
//!
//! let layout = SourceLayout::new(Path::new("/archive"), &["/mirror-a/.", "/mirror-b"])?;
//! let dest = layout.destination_of(Path::new("/mirror-b/pkg/foo.tar"))?;
//! assert_eq!(dest, Path::new("/archive/mirror-b/pkg/foo.tar"));
//! # Ok::<(), archive_cp::scanner::ScanError>(())
//! ```

use std::path::{Path, PathBuf};

use super::path_utils::{absolute, strip_contents_marker};
use super::ScanError;

/// One source argument, resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    /// Absolute path of the source file or directory.
    pub path: PathBuf,
    /// Where `path` itself lands.
    pub destination: PathBuf,
}

impl SourceSpec {
    /// Resolve a command-line source argument against the target directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NotFound`] if the source does not exist, or
    /// [`ScanError::InvalidSource`] if it has no usable file name.
    pub fn parse(arg: &str, target: &Path) -> Result<Self, ScanError> {
        let (stripped, contents_only) = strip_contents_marker(arg);
        let path = std::fs::canonicalize(stripped).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ScanError::NotFound(PathBuf::from(arg)),
            _ => ScanError::Io {
                path: PathBuf::from(arg),
                source: e,
            },
        })?;

        let destination = if contents_only && path.is_dir() {
            target.to_path_buf()
        } else {
            let name = path
                .file_name()
                .ok_or_else(|| ScanError::InvalidSource(arg.to_string()))?;
            target.join(name)
        };

        Ok(Self { path, destination })
    }
}

/// All sources of a run together with the target directory.
#[derive(Debug, Clone)]
pub struct SourceLayout {
    target: PathBuf,
    sources: Vec<SourceSpec>,
}

impl SourceLayout {
    /// Resolve every source argument.
    ///
    /// The target does not need to exist yet.
    ///
    /// # Errors
    ///
    /// Fails on the first source that cannot be resolved.
    pub fn new<S: AsRef<str>>(target: &Path, sources: &[S]) -> Result<Self, ScanError> {
        let target = absolute(target).map_err(|source| ScanError::Io {
            path: target.to_path_buf(),
            source,
        })?;
        if target.exists() && !target.is_dir() {
            return Err(ScanError::NotADirectory(target));
        }

        let sources = sources
            .iter()
            .map(|arg| SourceSpec::parse(arg.as_ref(), &target))
            .collect::<Result<Vec<_>, _>>()?;

        for spec in &sources {
            log::debug!(
                "Source {} -> {}",
                spec.path.display(),
                spec.destination.display()
            );
        }

        Ok(Self { target, sources })
    }

    /// Absolute target directory.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Resolved sources, in argument order.
    #[must_use]
    pub fn sources(&self) -> &[SourceSpec] {
        &self.sources
    }

    /// Destination path of a file found under one of the sources.
    ///
    /// When sources nest, the most specific one wins.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NotUnderSource`] if no source contains `path`.
    pub fn destination_of(&self, path: &Path) -> Result<PathBuf, ScanError> {
        self.sources
            .iter()
            .filter_map(|spec| {
                path.strip_prefix(&spec.path)
                    .ok()
                    .map(|rest| (spec.path.components().count(), spec, rest))
            })
            .max_by_key(|(depth, _, _)| *depth)
            .map(|(_, spec, rest)| {
                if rest.as_os_str().is_empty() {
                    spec.destination.clone()
                } else {
                    spec.destination.join(rest)
                }
            })
            .ok_or_else(|| ScanError::NotUnderSource(path.to_path_buf()))
    }
}
