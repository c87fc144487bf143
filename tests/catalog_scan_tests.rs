use skiff::catalog::{build_server_catalog, scan_directory, FileAction};
use std::fs;

const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

#[test]
fn scan_hashes_sizes_and_skips_other_extensions() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("app-1.2.jar"), b"hello world").unwrap();
    fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
    fs::write(dir.path().join("noext"), b"ignored").unwrap();

    let catalog = scan_directory(dir.path(), "jar").expect("scan failed");
    assert_eq!(catalog.len(), 1);
    let record = &catalog.files[0];
    assert_eq!(record.file_name, "app-1.2.jar");
    assert_eq!(record.file_size, 11);
    assert_eq!(record.file_hash, HELLO_SHA256);
    assert_eq!(record.file_version, "1.2");
    assert_eq!(record.file_action, None, "local scans are untagged");
}

#[test]
fn scan_is_not_recursive() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sub = dir.path().join("nested");
    fs::create_dir_all(&sub).unwrap();
    fs::write(sub.join("deep.jar"), b"deep").unwrap();
    fs::write(dir.path().join("top.jar"), b"top").unwrap();

    let catalog = scan_directory(dir.path(), "jar").expect("scan failed");
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.files[0].file_name, "top.jar");
}

#[test]
fn scan_of_empty_directory_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let catalog = scan_directory(dir.path(), "jar").expect("scan failed");
    assert!(catalog.is_empty());
}

#[test]
fn identical_bytes_hash_identically_under_any_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("one.jar"), b"same bytes").unwrap();
    fs::write(dir.path().join("two.jar"), b"same bytes").unwrap();

    let catalog = scan_directory(dir.path(), "jar").expect("scan failed");
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.files[0].file_hash, catalog.files[1].file_hash);
}

#[test]
fn server_catalog_tags_by_source_directory() {
    let root = tempfile::tempdir().expect("tempdir");
    let increment = root.path().join("increment");
    let decrement = root.path().join("decrement");
    fs::create_dir_all(&increment).unwrap();
    fs::create_dir_all(&decrement).unwrap();
    fs::write(increment.join("new.jar"), b"fresh").unwrap();
    fs::write(decrement.join("old.jar"), b"stale").unwrap();

    let catalog = build_server_catalog(&increment, &decrement, "jar").expect("build failed");
    assert_eq!(catalog.len(), 2);
    let new = catalog.files.iter().find(|r| r.file_name == "new.jar").unwrap();
    let old = catalog.files.iter().find(|r| r.file_name == "old.jar").unwrap();
    assert_eq!(new.file_action, Some(FileAction::Add));
    assert_eq!(old.file_action, Some(FileAction::Del));
}

#[test]
fn server_catalog_creates_missing_watch_directories() {
    let root = tempfile::tempdir().expect("tempdir");
    let increment = root.path().join("increment");
    let decrement = root.path().join("decrement");

    let catalog = build_server_catalog(&increment, &decrement, "jar").expect("build failed");
    assert!(catalog.is_empty());
    assert!(increment.is_dir());
    assert!(decrement.is_dir());
}
