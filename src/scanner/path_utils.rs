//! Unicode-aware path helpers.
//!
//! macOS stores filenames in NFD (decomposed) form while Linux and Windows
//! usually hand out NFC, so the same visible name can arrive as different
//! bytes:
//!
//! - NFC: `café.txt` - 'é' is U+00E9
//! - NFD: `café.txt` - 'e' U+0065 + combining acute accent U+0301
//!
//! Destination names are compared after NFC normalisation so an archive fed
//! from both kinds of systems does not end up with two visually identical
//! entries.
//!
//! # Example
//!
//! ```
//! use archive_cp::scanner::path_utils::{normalize_path_str, path_key};
//! use std::path::Path;
//!
//! assert_eq!(normalize_path_str("cafe\u{0301}.txt"), "café.txt");
//! assert_eq!(path_key(Path::new("café.txt")), path_key(Path::new("cafe\u{0301}.txt")));
//! ```

use std::path::{Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

/// Normalize a string to NFC.
#[must_use]
pub fn normalize_path_str(s: &str) -> String {
    s.nfc().collect()
}

/// Comparison key for a whole path.
///
/// Non-UTF-8 components are converted lossily before normalisation.
#[must_use]
pub fn path_key(path: &Path) -> String {
    normalize_path_str(&path.to_string_lossy())
}

/// Split a trailing `/.` off a command-line source argument.
///
/// Returns the argument without the marker and whether it was present.
/// `dir/.` means "the contents of dir"; a bare `.` is left alone.
#[must_use]
pub fn strip_contents_marker(arg: &str) -> (&str, bool) {
    for marker in ["/.", "\\."] {
        if let Some(stripped) = arg.strip_suffix(marker) {
            if stripped.is_empty() {
                return ("/", true);
            }
            return (stripped, true);
        }
    }
    (arg, false)
}

/// Make a path absolute, resolving symlinks when the path exists.
///
/// # Errors
///
/// Returns an I/O error if the current directory cannot be determined.
pub fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        Err(_) => std::path::absolute(path),
    }
}

/// Whether `path` lies at or below `root`.
#[must_use]
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}
