//! [`DuplicateDetector`] backed by the `fclones` command-line tool.
//!
//! Candidate paths are written to `fclones group --stdin`, one per line, and
//! the JSON report is read back:
//!
//! ```json
//! {
//!   "header": { "version": "0.34.0", ... },
//!   "groups": [
//!     { "file_len": 3, "file_hash": "4d9f...", "files": ["/a/x", "/b/x"] }
//!   ]
//! }
//! ```
//!
//! The default extra arguments make fclones report every file rather than
//! only duplicates. `--hidden` adds dotfiles; `--rf-over=0 --min=0` adds
//! unique and empty files. `-H` groups hard links to one file together.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::Deserialize;

use super::{DetectedGroup, DetectorError, DuplicateDetector};
use crate::resolver::ContentId;

/// Default program name.
pub const DEFAULT_PROGRAM: &str = "fclones";

/// Arguments appended after `group --stdin -f json` unless overridden.
pub const DEFAULT_ARGS: &[&str] = &["-H", "--hidden", "--rf-over=0", "--min=0"];

#[derive(Debug, Deserialize)]
struct Report {
    groups: Vec<ReportGroup>,
}

#[derive(Debug, Deserialize)]
struct ReportGroup {
    #[serde(default)]
    file_len: Option<u64>,
    file_hash: String,
    files: Vec<PathBuf>,
}

/// Parse an fclones JSON report.
///
/// The content id combines the file length and hash, so equal hashes of
/// different lengths never merge.
///
/// # Errors
///
/// Returns [`DetectorError::Parse`] if the report is not valid JSON of the
/// expected shape.
pub fn parse_report(json: &str) -> Result<Vec<DetectedGroup>, DetectorError> {
    let report: Report = serde_json::from_str(json)?;
    Ok(report
        .groups
        .into_iter()
        .map(|g| {
            let key = match g.file_len {
                Some(len) => format!("{len}:{}", g.file_hash),
                None => g.file_hash,
            };
            DetectedGroup::new(ContentId::new(key), g.files)
        })
        .collect())
}

/// Runs `fclones group` as a subprocess.
#[derive(Debug, Clone)]
pub struct FclonesDetector {
    program: String,
    args: Vec<String>,
    quiet: bool,
}

impl Default for FclonesDetector {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            args: DEFAULT_ARGS.iter().map(|s| (*s).to_string()).collect(),
            quiet: false,
        }
    }
}

impl FclonesDetector {
    /// Create a detector using `fclones` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Replace the extra arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Drop the tool's diagnostic output unless it fails.
    #[must_use]
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// The executable that will be run.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["group", "--stdin", "-f", "json"])
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl DuplicateDetector for FclonesDetector {
    fn detect(&self, files: &[PathBuf]) -> Result<Vec<DetectedGroup>, DetectorError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        log::info!("Running {} on {} file(s)", self.program, files.len());
        let mut child = self.command().spawn().map_err(|source| DetectorError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Feed stdin from a separate thread so a full stdout pipe cannot
        // deadlock us.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("child stdin was not captured"))?;
        let input: Vec<u8> = files
            .iter()
            .flat_map(|f| {
                let mut line = f.to_string_lossy().into_owned().into_bytes();
                line.push(b'\n');
                line
            })
            .collect();
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child.wait_with_output()?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                log::debug!("{} closed stdin early", self.program);
            }
            Ok(Err(e)) => return Err(DetectorError::Io(e)),
            Err(_) => return Err(std::io::Error::other("stdin writer panicked").into()),
        }

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(DetectorError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        if !self.quiet {
            for line in stderr.as_bytes().lines().map_while(Result::ok) {
                if !line.trim().is_empty() {
                    log::info!("{}: {}", self.program, line);
                }
            }
        }

        let groups = parse_report(&String::from_utf8_lossy(&output.stdout))?;
        log::debug!("{} reported {} group(s)", self.program, groups.len());
        Ok(groups)
    }
}
