//! Layered configuration.
//!
//! Settings are merged with `figment`, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config`, else `<config dir>/archive-cp/config.toml`)
//! 3. Environment variables prefixed `ARCHIVE_CP_` (`__` separates nested
//!    keys, e.g. `ARCHIVE_CP_DETECTOR__PROGRAM`)
//! 4. Command-line flags ([`Config::apply_cli`])
//!
//! ```toml
//! io_threads = 8
//! ignore_case = true
//! link_mode = "hardlink"
//!
//! [detector]
//! program = "/opt/fclones/bin/fclones"
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::detector::fclones::{DEFAULT_ARGS, DEFAULT_PROGRAM};
use crate::detector::FclonesDetector;
use crate::transfer::LinkMode;

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "ARCHIVE_CP_";

/// Errors from loading configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A layer holds a value of the wrong type or an unknown variant.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),

    /// The effective configuration could not be rendered.
    #[error("Cannot render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// External duplicate detector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Executable to run.
    pub program: String,
    /// Extra arguments after `group --stdin -f json`.
    pub args: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            args: DEFAULT_ARGS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl DetectorConfig {
    /// Build the detector these settings describe.
    #[must_use]
    pub fn build(&self, quiet: bool) -> FclonesDetector {
        FclonesDetector::new()
            .with_program(self.program.clone())
            .with_args(self.args.clone())
            .with_quiet(quiet)
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of copy workers (0 = one per CPU).
    pub io_threads: usize,
    /// Compare destination names case-insensitively.
    pub ignore_case: bool,
    /// How selected files are placed.
    pub link_mode: LinkMode,
    /// Verify duplicate groups by content before trusting them.
    pub paranoid: bool,
    /// Duplicate detector.
    pub detector: DetectorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            io_threads: 4,
            ignore_case: false,
            link_mode: LinkMode::Copy,
            paranoid: false,
            detector: DetectorConfig::default(),
        }
    }
}

impl Config {
    /// Platform config file location, if a home directory is known.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "archive-cp").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The figment for defaults, `path` (or the default file) and the
    /// environment.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = path.map(Path::to_path_buf).or_else(Self::default_path) {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration without CLI overrides.
    ///
    /// A missing default file is fine; a missing explicit file is not.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `path` does not exist or any layer is
    /// malformed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
        }
        let config: Self = Self::figment(path).extract().map_err(Box::new)?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Overlay command-line flags.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(threads) = cli.io_threads {
            self.io_threads = threads;
        }
        if cli.ignore_case {
            self.ignore_case = true;
        }
        if let Some(mode) = cli.link_mode {
            self.link_mode = mode;
        }
        if cli.paranoid {
            self.paranoid = true;
        }
        if let Some(program) = &cli.fclones {
            self.detector.program.clone_from(program);
        }
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
