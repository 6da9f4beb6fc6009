//! Single-file placement primitives.
//!
//! None of these functions ever replaces an existing destination: a name
//! that is already taken yields [`TransferError::DestinationExists`].
//!
//! Copies are written to a temporary file next to the destination
//! (`.archive-cp.XXXXXX`), given the source's permissions and timestamps,
//! and only then renamed into place, so the destination name never holds a
//! partial file.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use filetime::FileTime;

use super::{LinkMode, TransferError, TransferMethod};
use crate::scanner::TEMP_PREFIX;

/// Outcome of placing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placed {
    /// How the file was placed.
    pub method: TransferMethod,
    /// Bytes written to the destination (0 for links).
    pub bytes: u64,
}

/// Place `source` at `destination` according to `mode`.
///
/// Hardlinks fall back to a copy when the filesystem refuses them.
///
/// # Errors
///
/// See [`copy_atomic`]; links fail the same way.
pub fn place(source: &Path, destination: &Path, mode: LinkMode) -> Result<Placed, TransferError> {
    match mode {
        LinkMode::Copy => copy_atomic(source, destination).map(|bytes| Placed {
            method: TransferMethod::Copied,
            bytes,
        }),
        LinkMode::Hardlink => link_or_copy(source, destination),
        LinkMode::Symlink => symlink(source, destination).map(|()| Placed {
            method: TransferMethod::Symlinked,
            bytes: 0,
        }),
    }
}

/// Copy `source` to `destination`, preserving permissions and timestamps.
///
/// Missing parent directories are created.
///
/// # Errors
///
/// * [`TransferError::SourceMissing`] if the source vanished.
/// * [`TransferError::DestinationExists`] if the destination name is taken.
/// * [`TransferError::Io`] for any other I/O failure.
pub fn copy_atomic(source: &Path, destination: &Path) -> Result<u64, TransferError> {
    let dir = parent_of(destination)?;
    fs::create_dir_all(dir).map_err(|e| TransferError::io(dir, e))?;

    let mut input = File::open(source).map_err(|e| source_error(source, e))?;
    let metadata = input.metadata().map_err(|e| TransferError::io(source, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| TransferError::io(dir, e))?;

    let bytes = io::copy(&mut input, tmp.as_file_mut()).map_err(|e| TransferError::io(source, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| TransferError::io(tmp.path(), e))?;

    fs::set_permissions(tmp.path(), metadata.permissions())
        .map_err(|e| TransferError::io(tmp.path(), e))?;
    filetime::set_file_times(
        tmp.path(),
        FileTime::from_last_access_time(&metadata),
        FileTime::from_last_modification_time(&metadata),
    )
    .map_err(|e| TransferError::io(tmp.path(), e))?;

    tmp.persist_noclobber(destination).map_err(|e| {
        if e.error.kind() == io::ErrorKind::AlreadyExists {
            TransferError::DestinationExists(destination.to_path_buf())
        } else {
            TransferError::io(destination, e.error)
        }
    })?;

    Ok(bytes)
}

/// Hardlink `source` to `destination`, copying if linking is not possible.
///
/// # Errors
///
/// Same as [`copy_atomic`].
pub fn link_or_copy(source: &Path, destination: &Path) -> Result<Placed, TransferError> {
    let dir = parent_of(destination)?;
    fs::create_dir_all(dir).map_err(|e| TransferError::io(dir, e))?;

    match fs::hard_link(source, destination) {
        Ok(()) => Ok(Placed {
            method: TransferMethod::Hardlinked,
            bytes: 0,
        }),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(TransferError::DestinationExists(destination.to_path_buf()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound && !source.exists() => {
            Err(TransferError::SourceMissing(source.to_path_buf()))
        }
        Err(e) => {
            log::debug!(
                "Cannot hardlink {} ({}), copying instead",
                source.display(),
                e
            );
            copy_atomic(source, destination).map(|bytes| Placed {
                method: TransferMethod::Copied,
                bytes,
            })
        }
    }
}

/// Create a symbolic link at `destination` pointing to `source`.
///
/// # Errors
///
/// * [`TransferError::DestinationExists`] if the destination name is taken.
/// * [`TransferError::Io`] for any other failure.
pub fn symlink(source: &Path, destination: &Path) -> Result<(), TransferError> {
    let dir = parent_of(destination)?;
    fs::create_dir_all(dir).map_err(|e| TransferError::io(dir, e))?;

    #[cfg(unix)]
    let result = std::os::unix::fs::symlink(source, destination);
    #[cfg(windows)]
    let result = std::os::windows::fs::symlink_file(source, destination);

    result.map_err(|e| {
        if e.kind() == io::ErrorKind::AlreadyExists {
            TransferError::DestinationExists(destination.to_path_buf())
        } else {
            TransferError::io(destination, e)
        }
    })
}

fn parent_of(destination: &Path) -> Result<&Path, TransferError> {
    destination.parent().ok_or_else(|| {
        TransferError::io(
            destination,
            io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"),
        )
    })
}

fn source_error(source: &Path, error: io::Error) -> TransferError {
    if error.kind() == io::ErrorKind::NotFound {
        TransferError::SourceMissing(source.to_path_buf())
    } else {
        TransferError::io(source, error)
    }
}
