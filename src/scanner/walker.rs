//! Recursive file enumeration using walkdir.
//!
//! # Overview
//!
//! [`Walker`] lists the regular files below a source or the target
//! directory. Traversal is single-threaded and sorted by file name so that
//! every run sees files in the same order.
//!
//! - Symbolic links are not followed and not listed; [`list_occupants`]
//!   reports them, together with subdirectories, for one directory.
//! - Temporary files left by an interrupted copy are skipped.
//! - Unreadable entries are yielded as [`ScanError`]s instead of stopping
//!   the walk.
//!
//! # Example
//!
//! ```no_run
//! use archive_cp::scanner::Walker;
//! use std::path::Path;
//!
//! for entry in Walker::new(Path::new("/mirror")).walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use walkdir::WalkDir;

use super::{FileEntry, Occupant, ScanError, TEMP_PREFIX};

/// Sorted, non-following directory walker.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a walker rooted at `path`, which may be a file or a directory.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            root: path.to_path_buf(),
            shutdown_flag: None,
        }
    }

    /// Stop yielding entries once `flag` is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Walk the tree, yielding regular files.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileEntry, ScanError>> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_temp_name(entry.file_name().to_string_lossy().as_ref()))
            .map_while(move |result| {
                if self.is_shutdown_requested() {
                    log::debug!("Walker: Shutdown requested, stopping iteration");
                    return None;
                }
                Some(result)
            })
            .filter_map(move |result| match result {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        if entry.file_type().is_symlink() {
                            log::debug!("Skipping symlink: {}", entry.path().display());
                        }
                        return None;
                    }
                    let path = entry.into_path();
                    match std::fs::symlink_metadata(&path) {
                        Ok(metadata) => Some(Ok(FileEntry {
                            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                            size: metadata.len(),
                            path,
                        })),
                        Err(e) => Some(Err(handle_io_error(&path, e))),
                    }
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), Path::to_path_buf);
                    let error = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                    Some(Err(handle_io_error(&path, error)))
                }
            })
    }

    /// Collect every file, logging and dropping unreadable entries.
    ///
    /// # Errors
    ///
    /// Returns the error for the root itself if it cannot be read at all.
    pub fn collect_files(&self) -> Result<Vec<FileEntry>, ScanError> {
        if let Err(e) = std::fs::symlink_metadata(&self.root) {
            return Err(handle_io_error(&self.root, e));
        }
        let mut files = Vec::new();
        for entry in self.walk() {
            match entry {
                Ok(file) => files.push(file),
                Err(e) => log::warn!("{}", e),
            }
        }
        Ok(files)
    }
}

/// List the entries of `dir` that are not regular files, sorted by name.
///
/// A symlink to a regular file records the file it points to (relative
/// links are taken relative to `dir`); dangling links and links to
/// anything else get no target. A missing `dir` has no entries.
///
/// # Errors
///
/// Returns a [`ScanError`] if `dir` exists but cannot be read.
pub fn list_occupants(dir: &Path) -> Result<Vec<Occupant>, ScanError> {
    let read = match std::fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(handle_io_error(dir, e)),
    };

    let mut occupants = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| handle_io_error(dir, e))?;
        if is_temp_name(entry.file_name().to_string_lossy().as_ref()) {
            continue;
        }
        let path = entry.path();
        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("{}", handle_io_error(&path, e));
                continue;
            }
        };
        let file_type = metadata.file_type();
        if file_type.is_file() {
            continue;
        }
        let link_target = if file_type.is_symlink() {
            std::fs::read_link(&path)
                .ok()
                .map(|t| if t.is_relative() { dir.join(t) } else { t })
                .filter(|t| std::fs::metadata(t).is_ok_and(|m| m.is_file()))
        } else {
            None
        };
        occupants.push(Occupant {
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            path,
            link_target,
        });
    }
    occupants.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(occupants)
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX)
}

fn handle_io_error(path: &Path, error: std::io::Error) -> ScanError {
    use std::io::ErrorKind;

    match error.kind() {
        ErrorKind::PermissionDenied => ScanError::PermissionDenied(path.to_path_buf()),
        ErrorKind::NotFound => ScanError::NotFound(path.to_path_buf()),
        _ => ScanError::Io {
            path: path.to_path_buf(),
            source: error,
        },
    }
}
