//! Integration tests for layered configuration.
//!
//! These cover defaults, TOML files, `ARCHIVE_CP_*` environment overrides
//! and CLI flags, in that order of precedence.

use archive_cp::cli::Cli;
use archive_cp::config::{Config, ConfigError};
use archive_cp::transfer::LinkMode;
use clap::Parser;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use std::sync::Mutex;
use tempfile::tempdir;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Clear all ARCHIVE_CP_* environment variables to avoid interference.
fn clear_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("ARCHIVE_CP_") {
            std::env::remove_var(key);
        }
    }
}

#[test]
fn test_config_load_defaults() {
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.io_threads, 4);
    assert_eq!(config.detector.args, vec!["-H", "--hidden", "--rf-over=0", "--min=0"]);
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
io_threads = 8
ignore_case = true
link_mode = "symlink"

[detector]
program = "/opt/fclones"
args = ["--min=0"]
"#,
    )
    .unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract()
        .unwrap();

    assert_eq!(config.io_threads, 8);
    assert!(config.ignore_case);
    assert_eq!(config.link_mode, LinkMode::Symlink);
    assert_eq!(config.detector.program, "/opt/fclones");
    assert_eq!(config.detector.args, vec!["--min=0"]);
}

#[test]
fn test_env_overrides_file() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "io_threads = 8\nparanoid = false\n").unwrap();

    std::env::set_var("ARCHIVE_CP_IO_THREADS", "16");
    std::env::set_var("ARCHIVE_CP_PARANOID", "true");
    // Double underscore for nesting
    std::env::set_var("ARCHIVE_CP_DETECTOR__PROGRAM", "fclones-nightly");

    let result = Config::load(Some(&config_path));
    clear_env();
    let config = result.unwrap();

    assert_eq!(config.io_threads, 16);
    assert!(config.paranoid);
    assert_eq!(config.detector.program, "fclones-nightly");
}

#[test]
fn test_env_alone() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    std::env::set_var("ARCHIVE_CP_LINK_MODE", "hardlink");

    let result: Result<Config, _> = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("ARCHIVE_CP_").split("__"))
        .extract();
    clear_env();

    assert_eq!(result.unwrap().link_mode, LinkMode::Hardlink);
}

#[test]
fn test_cli_overrides_everything() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "io_threads = 8\nlink_mode = \"symlink\"\n").unwrap();
    std::env::set_var("ARCHIVE_CP_IO_THREADS", "16");

    let result = Config::load(Some(&config_path));
    clear_env();
    let mut config = result.unwrap();
    let cli = Cli::try_parse_from([
        "archive-cp",
        "--io-threads",
        "1",
        "--link-mode",
        "copy",
        "src",
        "dst",
    ])
    .unwrap();
    config.apply_cli(&cli);

    assert_eq!(config.io_threads, 1);
    assert_eq!(config.link_mode, LinkMode::Copy);
}

#[test]
fn test_unset_cli_flags_leave_config_alone() {
    let mut config = Config {
        ignore_case: true,
        paranoid: true,
        io_threads: 2,
        ..Config::default()
    };
    let cli = Cli::try_parse_from(["archive-cp", "src", "dst"]).unwrap();
    config.apply_cli(&cli);

    assert!(config.ignore_case);
    assert!(config.paranoid);
    assert_eq!(config.io_threads, 2);
}

#[test]
fn test_invalid_toml_is_error() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "io_threads = \"many\"\n").unwrap();

    let err = Config::load(Some(&config_path)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_missing_explicit_file_is_error() {
    let temp_dir = tempdir().unwrap();
    let err = Config::load(Some(&temp_dir.path().join("absent.toml"))).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_default_path_points_at_config_toml() {
    if let Some(path) = Config::default_path() {
        assert_eq!(path.file_name().unwrap(), "config.toml");
    }
}
