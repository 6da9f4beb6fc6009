//! Destination file naming contract.
//!
//! # Overview
//!
//! When distinct contents would share a filename in one destination
//! directory, all but one of them receive a disambiguated name formed by
//! appending the file's modification time (UTC, microsecond precision):
//!
//! ```text
//! bar.txt  ->  bar.txt.20240131T235959.123456Z
//! ```
//!
//! If two contents still land on the same suffixed name, a numeric
//! discriminator is appended:
//!
//! ```text
//! bar.txt  ->  bar.txt.20240131T235959.123456Z.2
//! ```
//!
//! [`base_name`] undoes either form, so files already disambiguated by a
//! previous run fold back onto the name they were derived from. The
//! `stem.YYYYMMDDTHHMMSS.ext` and `stem.YYYYMMDDTHHMMSS.xxxxxxxx.ext` forms
//! written by older archiving scripts are recognised as well.
//!
//! # Example
//!
//! ```
//! use archive_cp::resolver::naming::{base_name, disambiguate};
//! use std::time::{Duration, UNIX_EPOCH};
//!
//! let mtime = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
//! let name = disambiguate("bar.txt", mtime, None);
//! assert_eq!(name, "bar.txt.20231114T221320.000000Z");
//! assert_eq!(base_name(&name), "bar.txt");
//! ```

use std::borrow::Cow;
use std::sync::LazyLock;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::scanner::path_utils::normalize_path_str;

/// strftime pattern for the disambiguation suffix.
pub const SUFFIX_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

/// First discriminator used when a suffixed name is already taken.
pub const FIRST_DISCRIMINATOR: u32 = 2;

static SUFFIXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>.+)\.[0-9]{8}T[0-9]{6}\.[0-9]{6}Z(?:\.[0-9]+)?$")
        .expect("suffix pattern is valid")
});

static LEGACY_TIME_CHKSUM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<stem>.+)\.[0-9]{8}T[0-9]{6}\.[0-9a-zA-Z]{8}(?P<ext>\.[^.]+)?$")
        .expect("legacy checksum pattern is valid")
});

static LEGACY_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<stem>.+)\.[0-9]{8}T[0-9]{6}(?P<ext>\.[^.]+)?$")
        .expect("legacy time pattern is valid")
});

/// Format a modification time as a disambiguation suffix.
#[must_use]
pub fn timestamp_suffix(modified: SystemTime) -> String {
    let utc: DateTime<Utc> = modified.into();
    utc.format(SUFFIX_FORMAT).to_string()
}

/// Build the disambiguated name for `base`.
///
/// `discriminator` is `None` for the first attempt and `Some(n)` (n >= 2)
/// once the plain suffixed name turned out to be taken.
#[must_use]
pub fn disambiguate(base: &str, modified: SystemTime, discriminator: Option<u32>) -> String {
    let suffix = timestamp_suffix(modified);
    match discriminator {
        Some(n) => format!("{base}.{suffix}.{n}"),
        None => format!("{base}.{suffix}"),
    }
}

/// Recover the name a file had before it was disambiguated.
///
/// Names that carry no recognised suffix are returned unchanged.
#[must_use]
pub fn base_name(name: &str) -> Cow<'_, str> {
    if let Some(caps) = SUFFIXED.captures(name) {
        return Cow::Owned(caps["base"].to_string());
    }

    for pattern in [&*LEGACY_TIME_CHKSUM, &*LEGACY_TIME] {
        if let Some(caps) = pattern.captures(name) {
            let ext = caps.name("ext").map_or("", |m| m.as_str());
            return Cow::Owned(format!("{}{}", &caps["stem"], ext));
        }
    }

    Cow::Borrowed(name)
}

/// Key used to compare filenames within one directory.
///
/// Names are NFC-normalised so that the NFD names macOS produces compare
/// equal to their composed forms; with `ignore_case` they are lowercased too.
#[must_use]
pub fn name_key(name: &str, ignore_case: bool) -> String {
    let normalized = normalize_path_str(name);
    if ignore_case {
        normalized.to_lowercase()
    } else {
        normalized
    }
}

/// Key that defines a name collision set: the [`name_key`] of the base name.
#[must_use]
pub fn collision_key(name: &str, ignore_case: bool) -> String {
    name_key(&base_name(name), ignore_case)
}
