//! Shared fixtures for the integration tests.

use archive_cp::detector::{DetectedGroup, DetectorError, DuplicateDetector};
use archive_cp::resolver::ContentId;
use filetime::FileTime;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Groups files by their bytes, like `fclones` does.
#[derive(Debug, Default)]
pub struct ByteDetector {
    /// Files left out of the report.
    pub unreported: Vec<PathBuf>,
}

impl ByteDetector {
    pub fn ignoring(paths: &[PathBuf]) -> Self {
        Self {
            unreported: paths.to_vec(),
        }
    }
}

impl DuplicateDetector for ByteDetector {
    fn detect(&self, files: &[PathBuf]) -> Result<Vec<DetectedGroup>, DetectorError> {
        let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for file in files {
            if self.unreported.iter().any(|p| p == file) {
                continue;
            }
            let hash = blake3::hash(&fs::read(file)?).to_hex().to_string();
            groups.entry(hash).or_default().push(file.clone());
        }
        Ok(groups
            .into_iter()
            .map(|(hash, files)| DetectedGroup::new(ContentId::new(hash), files))
            .collect())
    }
}

/// Write `content` to `root/rel` with the given mtime (seconds since epoch).
pub fn write_file(root: &Path, rel: &str, content: &[u8], mtime: i64) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    path
}

/// Relative paths of all regular files under `root`, sorted.
pub fn list_tree(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

/// `dir/.` as a source argument.
pub fn contents_of(dir: &Path) -> String {
    format!("{}/.", dir.display())
}

/// Canonical temp dir, so paths compare equal to what the scanner reports.
pub fn canonical(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().canonicalize().unwrap()
}
