//! End-to-end archiving run.
//!
//! # Overview
//!
//! [`Archiver`] ties the pieces together:
//! 1. **Scan** - list the files of every source and of the target
//! 2. **Detect** - one call to the [`DuplicateDetector`] for all of them
//! 3. **Bucket** - group files by destination directory
//! 4. **Resolve** - compute an [`Assignment`] for every directory
//! 5. **Transfer** - place the selected files
//!
//! Nothing is written before every directory has been resolved, so a
//! conflict anywhere aborts the run with the target untouched.
//!
//! # Example
//!
//! ```no_run
//! use archive_cp::detector::FclonesDetector;
//! use archive_cp::pipeline::{Archiver, ArchiverConfig};
//! use std::path::Path;
//!
//! let archiver = Archiver::new(Box::new(FclonesDetector::new()), ArchiverConfig::default());
//! let summary = archiver.run(&["/mirror-a/.", "/mirror-b/."], Path::new("/archive"))?;
//! println!("{}", summary.report.summary());
//! # Ok::<(), archive_cp::pipeline::PipelineError>(())
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::detector::{ContentIndex, DetectorError, DuplicateDetector};
use crate::error::ExitCode;
use crate::progress::ProgressCallback;
use crate::resolver::{
    Assignment, Blake3Verifier, ExistingEntry, GroupResolver, ResolveError, ResolverConfig,
    SourceFile,
};
use crate::scanner::path_utils::{is_within, path_key};
use crate::scanner::{list_occupants, FileEntry, Occupant, ScanError, SourceLayout, Walker};
use crate::transfer::{self, LinkMode, TransferConfig, TransferError, TransferPlan, TransferReport};

/// Configuration for an [`Archiver`].
#[derive(Debug, Clone, Default)]
pub struct ArchiverConfig {
    /// Name comparison options.
    pub resolver: ResolverConfig,
    /// Verify detector groups by reading file contents.
    pub paranoid: bool,
    /// Placement options.
    pub transfer: TransferConfig,
}

impl ArchiverConfig {
    /// Build from loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            resolver: ResolverConfig::default().with_ignore_case(config.ignore_case),
            paranoid: config.paranoid,
            transfer: TransferConfig::default()
                .with_link_mode(config.link_mode)
                .with_io_threads(config.io_threads),
        }
    }

    /// Compare names case-insensitively.
    #[must_use]
    pub fn with_ignore_case(mut self, ignore_case: bool) -> Self {
        self.resolver = self.resolver.with_ignore_case(ignore_case);
        self
    }

    /// Enable paranoid verification.
    #[must_use]
    pub fn with_paranoid(mut self, paranoid: bool) -> Self {
        self.paranoid = paranoid;
        self
    }

    /// Set the link mode.
    #[must_use]
    pub fn with_link_mode(mut self, link_mode: LinkMode) -> Self {
        self.transfer = self.transfer.with_link_mode(link_mode);
        self
    }

    /// Enable or disable dry-run mode.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.transfer = self.transfer.with_dry_run(dry_run);
        self
    }

    /// Set the number of copy workers.
    #[must_use]
    pub fn with_io_threads(mut self, io_threads: usize) -> Self {
        self.transfer = self.transfer.with_io_threads(io_threads);
        self
    }
}

/// Errors that abort a run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The run was interrupted by user (Ctrl+C or shutdown signal).
    #[error("Run interrupted by user")]
    Interrupted,

    /// A source or the target could not be read.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Duplicate detection failed.
    #[error(transparent)]
    Detector(#[from] DetectorError),

    /// A destination directory could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The transfer step could not start.
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Files bound for one destination directory.
#[derive(Debug, Default)]
struct Bucket {
    sources: Vec<SourceFile>,
    existing: Vec<ExistingEntry>,
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Absolute target directory.
    pub target: PathBuf,
    /// Number of source files considered.
    pub source_files: usize,
    /// Number of files already in the target.
    pub existing_files: usize,
    /// Resolved destination directories.
    pub assignments: Vec<Assignment>,
    /// Transfer results.
    pub report: TransferReport,
}

impl RunSummary {
    /// Number of destination names that needed disambiguation.
    #[must_use]
    pub fn disambiguated(&self) -> usize {
        self.assignments
            .iter()
            .flat_map(|a| a.copies())
            .filter(|p| p.is_disambiguated())
            .count()
    }

    /// Number of discriminator collisions.
    #[must_use]
    pub fn collisions(&self) -> usize {
        self.assignments.iter().map(|a| a.diagnostics.len()).sum()
    }

    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        if self.report.interrupted {
            ExitCode::Interrupted
        } else if self.report.failures.is_empty() {
            ExitCode::Success
        } else {
            ExitCode::PartialSuccess
        }
    }
}

/// Runs the archiving pipeline.
pub struct Archiver {
    detector: Box<dyn DuplicateDetector>,
    config: ArchiverConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for Archiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archiver")
            .field("config", &self.config)
            .field("shutdown_flag", &self.shutdown_flag)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish_non_exhaustive()
    }
}

impl Archiver {
    /// Create an archiver using `detector` for content identity.
    #[must_use]
    pub fn new(detector: Box<dyn DuplicateDetector>, config: ArchiverConfig) -> Self {
        Self {
            detector,
            config,
            shutdown_flag: None,
            progress: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.config.transfer = self.config.transfer.with_shutdown_flag(flag.clone());
        self.shutdown_flag = Some(flag);
        self
    }

    /// Report progress to `callback`.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    fn check_shutdown(&self) -> Result<(), PipelineError> {
        if self
            .shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
        {
            log::info!("Interrupted by shutdown signal");
            return Err(PipelineError::Interrupted);
        }
        Ok(())
    }

    fn walker(&self, root: &Path) -> Walker {
        let walker = Walker::new(root);
        match &self.shutdown_flag {
            Some(flag) => walker.with_shutdown_flag(flag.clone()),
            None => walker,
        }
    }

    /// Copy `sources` into `target`.
    ///
    /// # Errors
    ///
    /// See [`Archiver::run_layout`]; additionally fails if a source
    /// argument cannot be resolved.
    pub fn run<S: AsRef<str>>(
        &self,
        sources: &[S],
        target: &Path,
    ) -> Result<RunSummary, PipelineError> {
        let layout = SourceLayout::new(target, sources)?;
        self.run_layout(&layout)
    }

    /// Run the full pipeline for an already resolved layout.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] if scanning, detection or resolution
    /// fails, or the run is interrupted before copying starts. Failures of
    /// individual copies are reported in the summary instead.
    pub fn run_layout(&self, layout: &SourceLayout) -> Result<RunSummary, PipelineError> {
        let (assignments, source_files, existing_files) = self.resolve_layout(layout)?;
        self.check_shutdown()?;

        let mut plan = TransferPlan::new();
        for assignment in &assignments {
            plan.add_assignment(assignment);
        }
        log::info!(
            "{} file(s) to place, {} skipped",
            plan.ops().len(),
            plan.skips().len()
        );

        let report = transfer::execute(&plan, &self.config.transfer, self.progress.as_deref())?;

        Ok(RunSummary {
            target: layout.target().to_path_buf(),
            source_files,
            existing_files,
            assignments,
            report,
        })
    }

    /// Scan, detect and resolve without touching the filesystem.
    ///
    /// Returns the assignments (sorted by directory) and the number of
    /// source and existing files.
    ///
    /// # Errors
    ///
    /// Same as [`Archiver::run_layout`].
    pub fn resolve_layout(
        &self,
        layout: &SourceLayout,
    ) -> Result<(Vec<Assignment>, usize, usize), PipelineError> {
        let target = layout.target();

        if let Some(cb) = &self.progress {
            cb.on_phase_start("scanning", 0);
        }
        let sources = self.scan_sources(layout)?;
        let (existing, occupants) = if target.is_dir() {
            (self.walker(target).collect_files()?, self.scan_occupants(&sources)?)
        } else {
            (Vec::new(), Vec::new())
        };
        if let Some(cb) = &self.progress {
            cb.on_phase_end("scanning");
        }
        self.check_shutdown()?;
        log::info!(
            "Found {} source file(s), {} file(s) already in {}",
            sources.len(),
            existing.len(),
            target.display()
        );

        let mut candidates: Vec<PathBuf> = existing
            .iter()
            .map(|f| f.path.clone())
            .chain(sources.iter().map(|(f, _)| f.path.clone()))
            .collect();
        let mut listed: HashSet<String> = candidates.iter().map(|p| path_key(p)).collect();
        for link in occupants.iter().filter_map(|o| o.link_target.as_ref()) {
            if listed.insert(path_key(link)) {
                candidates.push(link.clone());
            }
        }
        let index = ContentIndex::from_groups(&self.detector.detect(&candidates)?);
        self.check_shutdown()?;

        let buckets = bucket(&sources, &existing, &occupants, &index);
        let resolver = self.resolver();
        let mut assignments = Vec::with_capacity(buckets.len());
        for (directory, bucket) in &buckets {
            if bucket.sources.is_empty() {
                continue;
            }
            self.check_shutdown()?;
            assignments.push(resolver.resolve(directory, &bucket.sources, &bucket.existing)?);
        }

        Ok((assignments, sources.len(), existing.len()))
    }

    fn resolver(&self) -> GroupResolver {
        let resolver = GroupResolver::new(self.config.resolver);
        if self.config.paranoid {
            log::debug!("Paranoid mode: verifying duplicate groups by content");
            resolver.with_verifier(Arc::new(Blake3Verifier::new()))
        } else {
            resolver
        }
    }

    /// List the symlinks and subdirectories of every destination directory.
    fn scan_occupants(
        &self,
        sources: &[(FileEntry, PathBuf)],
    ) -> Result<Vec<Occupant>, PipelineError> {
        let dirs: BTreeSet<&Path> = sources.iter().filter_map(|(_, d)| d.parent()).collect();
        let mut occupants = Vec::new();
        for dir in dirs {
            self.check_shutdown()?;
            occupants.extend(list_occupants(dir)?);
        }
        Ok(occupants)
    }

    /// List every source file with its destination path.
    fn scan_sources(&self, layout: &SourceLayout) -> Result<Vec<(FileEntry, PathBuf)>, PipelineError> {
        let target = layout.target();
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for spec in layout.sources() {
            for file in self.walker(&spec.path).collect_files()? {
                if is_within(&file.path, target) {
                    log::debug!("skipped {} (already in target)", file.path.display());
                    continue;
                }
                if !seen.insert(path_key(&file.path)) {
                    continue;
                }
                let destination = layout.destination_of(&file.path)?;
                if let Some(cb) = &self.progress {
                    cb.on_progress(files.len() + 1, &file.path.to_string_lossy());
                }
                files.push((file, destination));
            }
        }
        Ok(files)
    }
}

/// Group sources and existing entries by destination directory.
///
/// A symlink to a regular file holds that file's content; any other
/// occupant has unknown content.
fn bucket(
    sources: &[(FileEntry, PathBuf)],
    existing: &[FileEntry],
    occupants: &[Occupant],
    index: &ContentIndex,
) -> BTreeMap<PathBuf, Bucket> {
    let mut buckets: BTreeMap<PathBuf, Bucket> = BTreeMap::new();

    for (file, destination) in sources {
        let (Some(dir), Some(name)) = (destination.parent(), destination.file_name()) else {
            continue;
        };
        let source = SourceFile::new(file.path.clone(), file.modified, index.source_id(&file.path))
            .with_name(name.to_string_lossy());
        buckets.entry(dir.to_path_buf()).or_default().sources.push(source);
    }

    for file in existing {
        let Some(dir) = file.path.parent() else {
            continue;
        };
        let entry = ExistingEntry {
            name: file.file_name(),
            modified: file.modified,
            content: index.get(&file.path).cloned(),
        };
        if entry.content.is_none() {
            log::debug!("No content id for existing file {}", file.path.display());
        }
        buckets.entry(dir.to_path_buf()).or_default().existing.push(entry);
    }

    let scanned: HashSet<String> = sources.iter().map(|(f, _)| path_key(&f.path)).collect();
    for occupant in occupants {
        let Some(dir) = occupant.path.parent() else {
            continue;
        };
        let content = occupant.link_target.as_deref().and_then(|t| {
            if scanned.contains(&path_key(t)) {
                Some(index.source_id(t))
            } else {
                index.get(t).cloned()
            }
        });
        let entry = match content {
            Some(content) => ExistingEntry::new(occupant.file_name(), occupant.modified, content),
            None => {
                log::debug!("No content id for {}", occupant.path.display());
                ExistingEntry::unknown(occupant.file_name(), occupant.modified)
            }
        };
        buckets.entry(dir.to_path_buf()).or_default().existing.push(entry);
    }

    buckets
}
