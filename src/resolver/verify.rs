//! Content verification for detector-reported duplicates.
//!
//! The resolver trusts the detector's partition. When paranoid mode is on,
//! a [`ContentVerifier`] double-checks that files grouped under one content
//! id really are identical before any of them is skipped.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer for streaming digests.
const BUFFER_SIZE: usize = 64 * 1024;

/// Compares the contents of two files.
pub trait ContentVerifier: Send + Sync {
    /// Returns `true` if both files hold identical bytes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if either file cannot be read.
    fn same_content(&self, a: &Path, b: &Path) -> io::Result<bool>;
}

/// Verifier comparing file sizes, then streaming BLAKE3 digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Verifier;

impl Blake3Verifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Compute the BLAKE3 digest of a file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or read.
    pub fn digest(path: &Path) -> io::Result<blake3::Hash> {
        let mut file = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            let n = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..n]);
        }
        Ok(hasher.finalize())
    }
}

impl ContentVerifier for Blake3Verifier {
    fn same_content(&self, a: &Path, b: &Path) -> io::Result<bool> {
        if std::fs::metadata(a)?.len() != std::fs::metadata(b)?.len() {
            log::trace!("Size mismatch: {} vs {}", a.display(), b.display());
            return Ok(false);
        }
        Ok(Self::digest(a)? == Self::digest(b)?)
    }
}
