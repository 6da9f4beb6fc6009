//! archive-cp - copy into an archive without losing distinct content
//!
//! Copies files from one or more sources into a target directory. Files
//! whose content is already present are skipped; files that would take a
//! name already held by different content get a timestamp suffix. Nothing
//! in the target is ever overwritten, and running the same copy twice
//! copies nothing the second time.
//!
//! Content identity comes from an external duplicate detector (`fclones`);
//! the naming decisions are made by [`resolver::GroupResolver`].

pub mod cli;
pub mod config;
pub mod detector;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod resolver;
pub mod scanner;
pub mod signal;
pub mod transfer;

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::cli::{parse_source_list, Cli, OutputFormat};
use crate::config::Config;
use crate::error::{ExitCode, UsageError};
use crate::pipeline::{Archiver, ArchiverConfig, RunSummary};
use crate::progress::Progress;
use crate::transfer::TransferMethod;

/// Run archive-cp for parsed arguments.
///
/// # Errors
///
/// Returns an error for invalid configuration, unreadable sources,
/// detector failures, or resolution conflicts. Use
/// [`ExitCode::for_error`] to map it to an exit code.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_cli(&cli);

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(ExitCode::Success);
    }

    let mut sources = cli.sources.clone();
    if let Some(list) = &cli.source_file {
        sources.extend(read_source_list(list)?);
    }
    if sources.is_empty() {
        return Err(UsageError("no source given".to_string()).into());
    }

    let handler = signal::install_handler()?;
    let detector = config.detector.build(cli.quiet);
    let archiver_config = ArchiverConfig::from_config(&config).with_dry_run(cli.dry_run);

    let mut archiver = Archiver::new(Box::new(detector), archiver_config)
        .with_shutdown_flag(handler.get_flag());
    if !cli.quiet && !cli.dry_run && cli.output == OutputFormat::Text {
        archiver = archiver.with_progress(Arc::new(Progress::new(false)));
    }

    log::debug!(
        "Archiving {} source(s) into {}",
        sources.len(),
        cli.target.display()
    );
    let summary = archiver.run(&sources, &cli.target)?;

    match cli.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text if !cli.quiet => print_text(&summary),
        OutputFormat::Text => {}
    }
    for failure in &summary.report.failures {
        log::error!(
            "cannot place '{}' -> '{}': {}",
            failure.source.display(),
            failure.destination.display(),
            failure.error
        );
    }

    Ok(summary.exit_code())
}

fn read_source_list(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read sources from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read source list {}", path.display()))?
    };
    Ok(parse_source_list(&content))
}

fn print_text(summary: &RunSummary) {
    for item in &summary.report.transferred {
        let arrow = match item.method {
            TransferMethod::Hardlinked => "=>",
            TransferMethod::Symlinked => "~>",
            TransferMethod::Copied | TransferMethod::Planned => "->",
        };
        println!(
            "'{}' {} '{}'",
            item.source.display(),
            arrow,
            item.destination.display()
        );
    }
    println!("{}", summary.report.summary());
    let renamed = summary.disambiguated();
    if renamed > 0 {
        println!("{renamed} file(s) renamed to avoid overwriting different content");
    }
}
