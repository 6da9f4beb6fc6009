//! `run_app` driven through parsed arguments, with a stand-in `fclones`.

use super::support::{canonical, contents_of, list_tree, write_file};
use archive_cp::cli::Cli;
use archive_cp::error::ExitCode;
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn cli(config: &Path, args: &[&str]) -> Cli {
    let config = config.display().to_string();
    Cli::try_parse_from(
        ["archive-cp", "-q", "--config", config.as_str()]
            .into_iter()
            .chain(args.iter().copied()),
    )
    .unwrap()
}

fn empty_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.toml");
    fs::write(&path, "").unwrap();
    path
}

/// Write an executable shell script and return its path.
#[cfg(unix)]
fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Reports every input file as its own group, keyed by `cksum`, so equal
/// contents share a key.
#[cfg(unix)]
const FAKE_FCLONES: &str = r#"
printf '{"groups":['
sep=''
while IFS= read -r f; do
  h=$(cksum < "$f" | tr ' ' '-')
  printf '%s{"file_hash":"%s","files":["%s"]}' "$sep" "$h" "$f"
  sep=','
done
printf ']}\n'
"#;

#[cfg(unix)]
#[test]
fn test_run_app_copies_and_reruns_cleanly() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let tools = root.join("tools");
    fs::create_dir(&tools).unwrap();
    let fclones = script(&tools, "fclones", FAKE_FCLONES);
    let config = empty_config(&tools);

    let a = root.join("a");
    let b = root.join("b");
    write_file(&a, "f.txt", b"alpha", 1_000);
    write_file(&b, "f.txt", b"beta", 2_000);
    write_file(&b, "g.txt", b"alpha", 3_000);
    let target = root.join("archive");

    let sources = [contents_of(&a), contents_of(&b)];
    let fclones = fclones.display().to_string();
    let target_arg = target.display().to_string();
    let args = [
        "--fclones",
        fclones.as_str(),
        sources[0].as_str(),
        sources[1].as_str(),
        target_arg.as_str(),
    ];

    let code = archive_cp::run_app(cli(&config, &args)).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(
        list_tree(&target),
        vec!["f.txt", "f.txt.19700101T001640.000000Z", "g.txt"]
    );

    let code = archive_cp::run_app(cli(&config, &args)).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert_eq!(list_tree(&target).len(), 3);
}

#[cfg(unix)]
#[test]
fn test_sources_from_file() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let tools = root.join("tools");
    fs::create_dir(&tools).unwrap();
    let fclones = script(&tools, "fclones", FAKE_FCLONES);
    let config = empty_config(&tools);

    let a = root.join("a");
    write_file(&a, "one.txt", b"1", 1);
    let list = tools.join("sources.txt");
    fs::write(&list, format!("# mirrors\n{}\n", contents_of(&a))).unwrap();
    let target = root.join("archive");

    let fclones = fclones.display().to_string();
    let list = list.display().to_string();
    let target_arg = target.display().to_string();
    let code = archive_cp::run_app(cli(
        &config,
        &["--fclones", &fclones, "-f", &list, &target_arg],
    ))
    .unwrap();

    assert_eq!(code, ExitCode::Success);
    assert_eq!(list_tree(&target), vec!["one.txt"]);
}

#[cfg(unix)]
#[test]
fn test_detector_failure_is_general_error() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let fclones = script(&root, "fclones", "echo 'boom' >&2\nexit 3\n");
    let config = empty_config(&root);
    write_file(&root, "src/a.txt", b"a", 1);

    let fclones = fclones.display().to_string();
    let source = contents_of(&root.join("src"));
    let target = root.join("archive").display().to_string();
    let err = archive_cp::run_app(cli(&config, &["--fclones", &fclones, &source, &target]))
        .unwrap_err();

    assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
    assert!(format!("{err:#}").contains("boom"));
    assert!(!root.join("archive").exists());
}

#[cfg(unix)]
#[test]
fn test_unreported_occupant_is_conflict() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    // Reports nothing: every file is unknown.
    let fclones = script(&root, "fclones", "cat >/dev/null\necho '{\"groups\":[]}'\n");
    let config = empty_config(&root);
    write_file(&root, "src/a.txt", b"new", 1);
    write_file(&root, "archive/a.txt", b"old", 1);

    let fclones = fclones.display().to_string();
    let source = contents_of(&root.join("src"));
    let target = root.join("archive").display().to_string();
    let err = archive_cp::run_app(cli(&config, &["--fclones", &fclones, &source, &target]))
        .unwrap_err();

    assert_eq!(ExitCode::for_error(&err), ExitCode::Conflict);
    assert_eq!(fs::read(root.join("archive/a.txt")).unwrap(), b"old");
}

#[test]
fn test_missing_detector_program() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let config = empty_config(&root);
    write_file(&root, "src/a.txt", b"a", 1);

    let source = contents_of(&root.join("src"));
    let target = root.join("archive").display().to_string();
    let err = archive_cp::run_app(cli(
        &config,
        &["--fclones", "/nonexistent/fclones-xyz", &source, &target],
    ))
    .unwrap_err();

    assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
}

#[test]
fn test_no_sources_is_usage_error() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let config = empty_config(&root);
    let list = root.join("empty.txt");
    fs::write(&list, "\n# nothing\n").unwrap();

    let list = list.display().to_string();
    let target = root.join("archive").display().to_string();
    let err = archive_cp::run_app(cli(&config, &["-f", &list, &target])).unwrap_err();

    assert_eq!(ExitCode::for_error(&err), ExitCode::UsageError);
}

#[test]
fn test_print_config() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let config = root.join("config.toml");
    fs::write(&config, "io_threads = 2\n").unwrap();
    let target = root.join("archive").display().to_string();

    let code = archive_cp::run_app(cli(&config, &["--print-config", &target])).unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(!root.join("archive").exists());
}

#[test]
fn test_bad_config_file_is_error() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let config = root.join("config.toml");
    fs::write(&config, "link_mode = \"teleport\"\n").unwrap();
    let target = root.join("archive").display().to_string();

    let err = archive_cp::run_app(cli(&config, &["x", &target])).unwrap_err();
    assert!(err.to_string().contains("Invalid configuration"));
}
