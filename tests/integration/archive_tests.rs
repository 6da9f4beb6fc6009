//! End-to-end runs of the archiver against real directories.

use super::support::{canonical, contents_of, list_tree, write_file, ByteDetector};
use archive_cp::error::ExitCode;
use archive_cp::pipeline::{Archiver, ArchiverConfig, PipelineError};
use archive_cp::resolver::{naming, ResolveError};
use archive_cp::transfer::{LinkMode, SkipReason};
use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::tempdir;

fn archiver() -> Archiver {
    Archiver::new(Box::new(ByteDetector::default()), ArchiverConfig::default())
}

#[test]
fn test_duplicates_are_copied_once() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let a = root.join("mirror-a");
    let b = root.join("mirror-b");
    write_file(&a, "docs/report.pdf", b"same bytes", 2_000);
    write_file(&b, "docs/report.pdf", b"same bytes", 1_000);
    let target = root.join("archive");

    let summary = archiver()
        .run(&[contents_of(&a), contents_of(&b)], &target)
        .unwrap();

    assert_eq!(list_tree(&target), vec!["docs/report.pdf"]);
    assert_eq!(summary.report.transferred.len(), 1);
    assert_eq!(summary.report.transferred[0].source, b.join("docs/report.pdf"));
    assert_eq!(
        summary.report.skipped[0].reason,
        SkipReason::UnselectedDuplicate
    );
    // The oldest copy is the one kept.
    let mtime = fs::metadata(target.join("docs/report.pdf"))
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(
        mtime,
        std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_000)
    );
}

#[test]
fn test_different_content_same_name_is_renamed() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let a = root.join("a");
    let b = root.join("b");
    write_file(&a, "notes.txt", b"first draft", 1_000);
    write_file(&b, "notes.txt", b"final version", 2_000);
    let target = root.join("archive");

    let summary = archiver()
        .run(&[contents_of(&a), contents_of(&b)], &target)
        .unwrap();

    assert_eq!(
        list_tree(&target),
        vec!["notes.txt", "notes.txt.19700101T001640.000000Z"]
    );
    assert_eq!(fs::read(target.join("notes.txt")).unwrap(), b"final version");
    assert_eq!(
        fs::read(target.join("notes.txt.19700101T001640.000000Z")).unwrap(),
        b"first draft"
    );
    assert_eq!(summary.disambiguated(), 1);
    assert_eq!(summary.collisions(), 0);
}

#[test]
fn test_rerun_copies_nothing() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let a = root.join("a");
    let b = root.join("b");
    write_file(&a, "x/one.bin", b"1", 100);
    write_file(&a, "x/two.bin", b"2", 200);
    write_file(&b, "x/one.bin", b"other 1", 300);
    write_file(&b, "x/two.bin", b"2", 50);
    let target = root.join("archive");
    let sources = [contents_of(&a), contents_of(&b)];

    archiver().run(&sources, &target).unwrap();
    let first = list_tree(&target);
    let again = archiver().run(&sources, &target).unwrap();

    assert_eq!(list_tree(&target), first);
    assert!(again.report.transferred.is_empty());
    assert!(again
        .report
        .skipped
        .iter()
        .any(|s| s.reason == SkipReason::AlreadyPresent));
}

#[test]
fn test_existing_file_is_never_overwritten() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let src = root.join("src");
    let target = root.join("archive");
    write_file(&target, "a.txt", b"archived long ago", 500);
    write_file(&src, "a.txt", b"something new", 100);

    archiver().run(&[contents_of(&src)], &target).unwrap();

    assert_eq!(fs::read(target.join("a.txt")).unwrap(), b"archived long ago");
    assert_eq!(
        fs::read(target.join("a.txt.19700101T000140.000000Z")).unwrap(),
        b"something new"
    );
}

#[test]
fn test_directory_source_keeps_its_name() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let photos = root.join("photos");
    write_file(&photos, "2020/img.jpg", b"jpeg", 1);
    let single = write_file(&root, "loose.txt", b"loose", 1);
    let target = root.join("archive");

    archiver()
        .run(
            &[
                photos.display().to_string(),
                single.display().to_string(),
            ],
            &target,
        )
        .unwrap();

    assert_eq!(list_tree(&target), vec!["loose.txt", "photos/2020/img.jpg"]);
}

#[test]
fn test_target_inside_source_is_not_recopied() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    write_file(&root, "data.txt", b"data", 10);
    let target = root.join("archive");

    archiver().run(&[contents_of(&root)], &target).unwrap();
    let summary = archiver().run(&[contents_of(&root)], &target).unwrap();

    assert_eq!(list_tree(&target), vec!["data.txt"]);
    assert_eq!(summary.source_files, 1);
    assert!(summary.report.transferred.is_empty());
}

#[test]
fn test_unknown_occupant_aborts_without_writing() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let src = root.join("src");
    let target = root.join("archive");
    let occupant = write_file(&target, "a.txt", b"mystery", 10);
    write_file(&target, "sub/b.txt", b"b", 10);
    write_file(&src, "a.txt", b"incoming", 20);
    write_file(&src, "sub/c.txt", b"c", 20);

    let archiver = Archiver::new(
        Box::new(ByteDetector::ignoring(&[occupant])),
        ArchiverConfig::default(),
    );
    let err = archiver.run(&[contents_of(&src)], &target).unwrap_err();

    match err {
        PipelineError::Resolve(ResolveError::ImmovableOccupant { name, directory, .. }) => {
            assert_eq!(name, "a.txt");
            assert_eq!(directory, target);
        }
        other => panic!("expected ImmovableOccupant, got {other:?}"),
    }
    assert_eq!(list_tree(&target), vec!["a.txt", "sub/b.txt"]);
}

#[test]
fn test_directory_occupant_blocks_file_of_same_name() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let src = root.join("src");
    let target = root.join("archive");
    write_file(&target, "data/inner.txt", b"inner", 10);
    write_file(&src, "data", b"a plain file", 20);

    let err = archiver().run(&[contents_of(&src)], &target).unwrap_err();

    match err {
        PipelineError::Resolve(ResolveError::ImmovableOccupant { name, directory, .. }) => {
            assert_eq!(name, "data");
            assert_eq!(directory, target);
        }
        other => panic!("expected ImmovableOccupant, got {other:?}"),
    }
    assert_eq!(list_tree(&target), vec!["data/inner.txt"]);
}

#[test]
fn test_dry_run_writes_nothing() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let src = root.join("src");
    write_file(&src, "a.txt", b"a", 1);
    write_file(&src, "b/c.txt", b"c", 1);
    let target = root.join("archive");

    let archiver = Archiver::new(
        Box::new(ByteDetector::default()),
        ArchiverConfig::default().with_dry_run(true),
    );
    let summary = archiver.run(&[contents_of(&src)], &target).unwrap();

    assert!(!target.exists());
    assert_eq!(summary.report.transferred.len(), 2);
    assert!(summary.report.dry_run);
    assert!(summary.report.summary().starts_with("Would place 2 file(s)"));
}

#[test]
fn test_ignore_case_treats_names_as_one() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let a = root.join("a");
    let b = root.join("b");
    write_file(&a, "README", b"upper", 2_000);
    write_file(&b, "readme", b"lower", 1_000);
    let target = root.join("archive");

    let archiver = Archiver::new(
        Box::new(ByteDetector::default()),
        ArchiverConfig::default().with_ignore_case(true),
    );
    archiver
        .run(&[contents_of(&a), contents_of(&b)], &target)
        .unwrap();

    assert_eq!(
        list_tree(&target),
        vec!["README", "readme.19700101T001640.000000Z"]
    );
}

#[test]
fn test_paranoid_catches_wrong_grouping() {
    use archive_cp::detector::{DetectedGroup, DetectorError, DuplicateDetector};
    use archive_cp::resolver::ContentId;
    use std::path::PathBuf;

    struct Everything;
    impl DuplicateDetector for Everything {
        fn detect(&self, files: &[PathBuf]) -> Result<Vec<DetectedGroup>, DetectorError> {
            Ok(vec![DetectedGroup::new(ContentId::new("all"), files.to_vec())])
        }
    }

    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let a = root.join("a");
    let b = root.join("b");
    write_file(&a, "f.txt", b"one", 1);
    write_file(&b, "f.txt", b"two", 2);
    let target = root.join("archive");

    let archiver = Archiver::new(
        Box::new(Everything),
        ArchiverConfig::default().with_paranoid(true),
    );
    let err = archiver
        .run(&[contents_of(&a), contents_of(&b)], &target)
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Resolve(ResolveError::Integrity { .. })
    ));
    assert!(!target.exists());
}

#[test]
fn test_hardlink_mode() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let src = root.join("src");
    write_file(&src, "big.iso", b"image", 1);
    let target = root.join("archive");

    let archiver = Archiver::new(
        Box::new(ByteDetector::default()),
        ArchiverConfig::default().with_link_mode(LinkMode::Hardlink),
    );
    archiver.run(&[contents_of(&src)], &target).unwrap();

    assert_eq!(fs::read(target.join("big.iso")).unwrap(), b"image");
}

#[cfg(unix)]
#[test]
fn test_symlink_mode_rerun_places_nothing() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let src = root.join("src");
    write_file(&src, "notes.txt", b"v1", 1_000);
    write_file(&src, "sub/todo.txt", b"todo", 1_000);
    let target = root.join("archive");

    let archiver = Archiver::new(
        Box::new(ByteDetector::default()),
        ArchiverConfig::default().with_link_mode(LinkMode::Symlink),
    );
    let first = archiver.run(&[contents_of(&src)], &target).unwrap();
    assert_eq!(first.report.transferred.len(), 2);
    assert_eq!(fs::read_link(target.join("notes.txt")).unwrap(), src.join("notes.txt"));

    let second = archiver.run(&[contents_of(&src)], &target).unwrap();
    assert!(second.report.transferred.is_empty());
    assert!(second.report.failures.is_empty());
    assert_eq!(second.report.skipped.len(), 2);
    assert_eq!(second.exit_code(), ExitCode::Success);
}

#[cfg(unix)]
#[test]
fn test_symlink_mode_later_run_suffixes_new_content() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let a = root.join("a");
    let b = root.join("b");
    write_file(&a, "notes.txt", b"first draft", 1_000);
    let target = root.join("archive");

    let archiver = Archiver::new(
        Box::new(ByteDetector::default()),
        ArchiverConfig::default().with_link_mode(LinkMode::Symlink),
    );
    archiver.run(&[contents_of(&a)], &target).unwrap();

    write_file(&b, "notes.txt", b"second draft", 2_000);
    let summary = archiver
        .run(&[contents_of(&a), contents_of(&b)], &target)
        .unwrap();

    let suffixed = naming::disambiguate(
        "notes.txt",
        std::time::UNIX_EPOCH + std::time::Duration::from_secs(2_000),
        None,
    );
    assert!(summary.report.failures.is_empty());
    assert_eq!(summary.report.transferred.len(), 1);
    assert_eq!(summary.report.transferred[0].destination, target.join(&suffixed));
    assert_eq!(fs::read_link(target.join("notes.txt")).unwrap(), a.join("notes.txt"));
    assert_eq!(fs::read_link(target.join(&suffixed)).unwrap(), b.join("notes.txt"));
    assert_eq!(summary.exit_code(), ExitCode::Success);
}

#[test]
fn test_shutdown_before_run_is_interrupted() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let src = root.join("src");
    write_file(&src, "a.txt", b"a", 1);
    let target = root.join("archive");

    let archiver = archiver().with_shutdown_flag(Arc::new(AtomicBool::new(true)));
    let err = archiver.run(&[contents_of(&src)], &target).unwrap_err();

    assert!(matches!(err, PipelineError::Interrupted));
    assert!(!target.exists());
}

#[test]
fn test_missing_source_is_error() {
    let dir = tempdir().unwrap();
    let root = canonical(&dir);
    let err = archiver()
        .run(&[root.join("nope").display().to_string()], &root.join("t"))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Scan(_)));
}
