//! Command-line interface definitions.
//!
//! Arguments follow `cp`: any number of sources, then the target directory.
//! A source directory written with a trailing `/.` contributes its contents
//! rather than itself.
//!
//! # Example
//!
//! ```bash
//! # Merge two mirrors into one archive
//! archive-cp /mnt/mirror-a/. /mnt/mirror-b/. /srv/archive
//!
//! # Read sources from a file, see what would happen
//! find /mnt -maxdepth 1 -name 'dump-*' | archive-cp -n -f - /srv/archive
//!
//! # Machine-readable report
//! archive-cp --output json photos/ /srv/archive
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::transfer::LinkMode;

/// Copy files into an archive directory without losing distinct content.
///
/// Files whose content already exists in the target are skipped. When a
/// different file already holds the name, the newcomer gets a timestamp
/// suffix instead of overwriting it.
#[derive(Debug, Parser)]
#[command(name = "archive-cp")]
#[command(author, version, about, long_about = None)]
#[command(allow_missing_positional = true)]
pub struct Cli {
    /// Files or directories to copy (`dir/.` copies the directory's contents)
    #[arg(value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Directory to copy into (created if missing)
    #[arg(value_name = "TARGET_DIRECTORY", required = true)]
    pub target: PathBuf,

    /// Read additional sources from FILE, one per line (`-` for stdin)
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    pub source_file: Option<PathBuf>,

    /// Show what would be copied without writing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Treat names that differ only in case as the same name
    #[arg(short, long)]
    pub ignore_case: bool,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// How to place selected files
    #[arg(long, value_enum, value_name = "MODE")]
    pub link_mode: Option<LinkMode>,

    /// Verify reported duplicates by reading their contents
    #[arg(long)]
    pub paranoid: bool,

    /// Number of parallel copy workers (0 = one per CPU)
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// fclones executable to use for duplicate detection
    #[arg(long, value_name = "PROGRAM", env = "ARCHIVE_CP_FCLONES")]
    pub fclones: Option<String>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Print errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,
}

/// Format of the run report on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per placement plus a summary
    Text,
    /// A single JSON document
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a source list: one path per line, blank lines and `#` comments
/// ignored.
///
/// ```
/// use archive_cp::cli::parse_source_list;
///
/// let sources = parse_source_list("a\n\n# old\n  b/.  \n");
/// assert_eq!(sources, vec!["a", "b/."]);
/// ```
#[must_use]
pub fn parse_source_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
