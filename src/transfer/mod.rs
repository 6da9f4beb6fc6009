//! Applying resolved assignments to the filesystem.
//!
//! # Overview
//!
//! A [`TransferPlan`] is built from one or more
//! [`Assignment`](crate::resolver::Assignment)s once every destination
//! directory has been resolved. [`execute`] then places each file:
//! - Copies run on a bounded rayon pool (`io_threads`).
//! - The shutdown flag is checked before every file.
//! - A failed copy is recorded and the remaining copies continue.
//! - In dry-run mode nothing is written; the plan is only logged.
//!
//! # Example
//!
//! ```no_run
//! use archive_cp::transfer::{execute, TransferConfig, TransferPlan};
//! # fn demo(assignment: &archive_cp::resolver::Assignment) -> Result<(), archive_cp::transfer::TransferError> {
//! let plan = TransferPlan::from_assignment(assignment);
//! let report = execute(&plan, &TransferConfig::default().with_dry_run(true), None)?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod copy;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use bytesize::ByteSize;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::progress::ProgressCallback;
use crate::resolver::Assignment;

/// How a selected file is placed in the destination.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Copy the file contents.
    #[default]
    Copy,
    /// Hardlink to the source, copying when that is not possible.
    Hardlink,
    /// Symbolic link to the source.
    Symlink,
}

/// How a file actually ended up in the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    /// Contents were copied.
    Copied,
    /// A hardlink was created.
    Hardlinked,
    /// A symbolic link was created.
    Symlinked,
    /// Dry run; nothing was written.
    Planned,
}

/// Error type for transfer operations.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The source disappeared before it could be copied.
    #[error("source not found: {0}")]
    SourceMissing(PathBuf),

    /// The destination name was taken after resolution.
    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),

    /// The worker pool could not be created.
    #[error("failed to start copy workers: {0}")]
    Pool(String),

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One file to place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOp {
    /// Selected source file.
    pub source: PathBuf,
    /// Full destination path.
    pub destination: PathBuf,
    /// Source modification time.
    pub modified: SystemTime,
}

/// Why a source file is not placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The destination already holds this content.
    AlreadyPresent,
    /// Another member of its duplicate group is placed instead.
    UnselectedDuplicate,
}

impl SkipReason {
    fn describe(self) -> &'static str {
        match self {
            Self::AlreadyPresent => "already present",
            Self::UnselectedDuplicate => "unselected duplicate",
        }
    }
}

/// A source file left out of the transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skip {
    /// Source file.
    pub path: PathBuf,
    /// Destination that covers it.
    pub destination: PathBuf,
    /// Why it is skipped.
    pub reason: SkipReason,
}

/// All file operations of a run.
#[derive(Debug, Clone, Default)]
pub struct TransferPlan {
    ops: Vec<TransferOp>,
    skips: Vec<Skip>,
}

impl TransferPlan {
    /// Create an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations needed to realise one assignment.
    #[must_use]
    pub fn from_assignment(assignment: &Assignment) -> Self {
        let mut plan = Self::new();
        plan.add_assignment(assignment);
        plan
    }

    /// Append the operations of another assignment.
    pub fn add_assignment(&mut self, assignment: &Assignment) {
        for placement in &assignment.placements {
            let destination = assignment.destination(placement);
            match placement.action {
                crate::resolver::PlacementAction::Copy => self.ops.push(TransferOp {
                    source: placement.source.clone(),
                    destination: destination.clone(),
                    modified: placement.modified,
                }),
                crate::resolver::PlacementAction::AlreadyPresent => self.skips.push(Skip {
                    path: placement.source.clone(),
                    destination: destination.clone(),
                    reason: SkipReason::AlreadyPresent,
                }),
            }
            self.skips.extend(placement.duplicates.iter().map(|path| Skip {
                path: path.clone(),
                destination: destination.clone(),
                reason: SkipReason::UnselectedDuplicate,
            }));
        }
    }

    /// Files to place.
    #[must_use]
    pub fn ops(&self) -> &[TransferOp] {
        &self.ops
    }

    /// Files left out.
    #[must_use]
    pub fn skips(&self) -> &[Skip] {
        &self.skips
    }

    /// Whether nothing needs to be placed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Configuration for [`execute`].
#[derive(Debug, Clone, Default)]
pub struct TransferConfig {
    /// How files are placed.
    pub link_mode: LinkMode,
    /// Log the plan without touching the filesystem.
    pub dry_run: bool,
    /// Worker threads for copies (0 = one per CPU).
    pub io_threads: usize,
    /// Stop starting new copies once set.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
}

impl TransferConfig {
    /// Set the link mode.
    #[must_use]
    pub fn with_link_mode(mut self, link_mode: LinkMode) -> Self {
        self.link_mode = link_mode;
        self
    }

    /// Enable or disable dry-run mode.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the number of copy workers.
    #[must_use]
    pub fn with_io_threads(mut self, io_threads: usize) -> Self {
        self.io_threads = io_threads;
        self
    }

    /// Set the shutdown flag.
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
}

/// A file that was placed (or would be, in a dry run).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transferred {
    /// Source file.
    pub source: PathBuf,
    /// Destination path.
    pub destination: PathBuf,
    /// How it was placed.
    pub method: TransferMethod,
    /// Bytes written.
    pub bytes: u64,
}

/// A file that could not be placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferFailure {
    /// Source file.
    pub source: PathBuf,
    /// Destination path.
    pub destination: PathBuf,
    /// Error message.
    pub error: String,
}

/// Results of executing a plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransferReport {
    /// Placed files.
    pub transferred: Vec<Transferred>,
    /// Files left out.
    pub skipped: Vec<Skip>,
    /// Files that could not be placed.
    pub failures: Vec<TransferFailure>,
    /// Total bytes written.
    pub bytes: u64,
    /// Whether the run was cut short by a shutdown request.
    pub interrupted: bool,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl TransferReport {
    /// Check if every planned file was placed.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty() && !self.interrupted
    }

    /// Human-readable summary of the operation.
    #[must_use]
    pub fn summary(&self) -> String {
        let verb = if self.dry_run { "Would place" } else { "Placed" };
        let mut summary = format!(
            "{} {} file(s) ({}), skipped {}",
            verb,
            self.transferred.len(),
            ByteSize(self.bytes),
            self.skipped.len()
        );
        if !self.failures.is_empty() {
            summary.push_str(&format!(", {} failed", self.failures.len()));
        }
        if self.interrupted {
            summary.push_str(" (interrupted)");
        }
        summary
    }
}

/// Carry out a plan.
///
/// Individual failures are collected in the report rather than returned.
///
/// # Errors
///
/// Returns [`TransferError::Pool`] if the worker pool cannot be built.
pub fn execute(
    plan: &TransferPlan,
    config: &TransferConfig,
    progress: Option<&dyn ProgressCallback>,
) -> Result<TransferReport, TransferError> {
    let mut report = TransferReport {
        skipped: plan.skips.clone(),
        dry_run: config.dry_run,
        ..TransferReport::default()
    };

    for skip in &report.skipped {
        log::debug!("skipped {} ({})", skip.path.display(), skip.reason.describe());
    }

    if config.dry_run {
        for op in &plan.ops {
            log::debug!("'{}' -> '{}'", op.source.display(), op.destination.display());
            let bytes = std::fs::metadata(&op.source).map_or(0, |m| m.len());
            report.bytes += bytes;
            report.transferred.push(Transferred {
                source: op.source.clone(),
                destination: op.destination.clone(),
                method: TransferMethod::Planned,
                bytes,
            });
        }
        return Ok(report);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.io_threads)
        .thread_name(|i| format!("archive-cp-io-{i}"))
        .build()
        .map_err(|e| TransferError::Pool(e.to_string()))?;

    if let Some(cb) = progress {
        cb.on_phase_start("copying", plan.ops.len());
    }
    let done = AtomicUsize::new(0);

    let results: Vec<Option<Result<copy::Placed, TransferError>>> = pool.install(|| {
        plan.ops
            .par_iter()
            .map(|op| {
                if config.is_shutdown_requested() {
                    return None;
                }
                let result = copy::place(&op.source, &op.destination, config.link_mode);
                if let Some(cb) = progress {
                    let current = done.fetch_add(1, Ordering::Relaxed) + 1;
                    cb.on_progress(current, &op.destination.to_string_lossy());
                    if let Ok(placed) = &result {
                        cb.on_item_completed(placed.bytes);
                    }
                }
                Some(result)
            })
            .collect()
    });

    if let Some(cb) = progress {
        cb.on_phase_end("copying");
    }

    for (op, result) in plan.ops.iter().zip(results) {
        match result {
            None => report.interrupted = true,
            Some(Ok(placed)) => {
                log::debug!("'{}' -> '{}'", op.source.display(), op.destination.display());
                report.bytes += placed.bytes;
                report.transferred.push(Transferred {
                    source: op.source.clone(),
                    destination: op.destination.clone(),
                    method: placed.method,
                    bytes: placed.bytes,
                });
            }
            Some(Err(e)) => {
                log::warn!("Failed to place {}: {}", op.source.display(), e);
                report.failures.push(TransferFailure {
                    source: op.source.clone(),
                    destination: op.destination.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    if report.interrupted {
        log::warn!("Transfer interrupted; remaining files were not placed");
    }
    log::debug!("{}", report.summary());
    Ok(report)
}
