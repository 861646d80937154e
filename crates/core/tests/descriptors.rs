//! Descriptor resolution: directory ascent, inheritance, the legacy text
//! format, and offset handling.

use githeight::{get_version, GitHeightError, VersionRequest};
use tempfile::TempDir;

mod common;

use common::git;

#[tokio::test]
async fn test_descriptor_is_found_in_an_ancestor_directory() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    git::commit_version_json(path, "", r#"{"version": "1.0-beta"}"#)
        .await
        .expect("Failed to commit descriptor");
    git::commit_file(path, "nested/deep/code.rs", "// code", "nested code")
        .await
        .expect("Failed to commit");

    let oracle = get_version(path.join("nested/deep"), &VersionRequest::default())
        .expect("Failed to compute version");

    assert!(oracle.version_file_found);
    assert_eq!(oracle.simple_version, "1.0.2");
}

#[tokio::test]
async fn test_inherited_descriptor_merges_over_its_parent() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    git::write_version_json(
        path,
        "",
        r#"{"version": "1.0-beta", "gitCommitIdShortFixedLength": 8}"#,
    )
    .expect("Failed to write root descriptor");
    git::write_version_json(path, "lib", r#"{"inherit": true, "version": "2.3-rc"}"#)
        .expect("Failed to write child descriptor");
    git::run_git_command(&["add", "-A"], path).expect("Failed to add");
    git::run_git_command(&["commit", "-m", "descriptors"], path).expect("Failed to commit");

    let sha = git::head_sha(path).await.expect("Failed to read HEAD");
    let oracle = get_version(path.join("lib"), &VersionRequest::default())
        .expect("Failed to compute version");

    // Version comes from the child; the short-id length from the parent.
    assert_eq!(oracle.simple_version, "2.3.1");
    assert_eq!(oracle.git_commit_id_short.as_deref(), Some(&sha[..8]));
}

#[tokio::test]
async fn test_unresolvable_inherit_is_an_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    git::write_version_json(path, "lib", r#"{"inherit": true, "version": "2.3-rc"}"#)
        .expect("Failed to write child descriptor");

    let err = get_version(path.join("lib"), &VersionRequest::default()).unwrap_err();
    assert!(matches!(err, GitHeightError::InheritanceUnresolved(_)));
}

#[tokio::test]
async fn test_malformed_working_tree_descriptor_is_fatal() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    std::fs::write(path.join("version.json"), "{ not json").expect("Failed to write");

    let err = get_version(path, &VersionRequest::default()).unwrap_err();
    match err {
        GitHeightError::MalformedDescriptor { reference, .. } => {
            assert_eq!(reference, "working tree");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_malformed_ancestor_commit_descriptor_is_a_boundary() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");

    // History starts with a broken descriptor, later fixed.
    std::fs::write(path.join("version.json"), "{ not json").expect("Failed to write");
    git::run_git_command(&["add", "-A"], path).expect("Failed to add");
    git::run_git_command(&["commit", "-m", "broken"], path).expect("Failed to commit");

    git::commit_version_json(path, "", r#"{"version": "1.0-beta"}"#)
        .await
        .expect("Failed to commit fix");
    git::commit_file(path, "work.txt", "1", "work")
        .await
        .expect("Failed to commit");

    let oracle = get_version(path, &VersionRequest::default()).expect("Failed to compute version");

    // The broken commit is a version boundary, not a failure.
    assert_eq!(oracle.version_height, 2);
}

#[tokio::test]
async fn test_version_txt_legacy_format() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    std::fs::write(path.join("version.txt"), "2.5-rc\n3\n").expect("Failed to write");
    git::run_git_command(&["add", "-A"], path).expect("Failed to add");
    git::run_git_command(&["commit", "-m", "legacy descriptor"], path).expect("Failed to commit");

    let oracle = get_version(path, &VersionRequest::default()).expect("Failed to compute version");

    assert!(oracle.version_file_found);
    assert_eq!(oracle.version_height, 1);
    assert_eq!(oracle.version_height_offset, 3);
    // The emitted build component is height plus offset.
    assert_eq!(oracle.simple_version, "2.5.4");
    assert!(oracle.sem_ver2.starts_with("2.5.4-rc"));
}

#[tokio::test]
async fn test_version_json_shadows_version_txt() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    std::fs::write(path.join("version.txt"), "9.9\n").expect("Failed to write");
    git::write_version_json(path, "", r#"{"version": "1.4-beta"}"#)
        .expect("Failed to write descriptor");
    git::run_git_command(&["add", "-A"], path).expect("Failed to add");
    git::run_git_command(&["commit", "-m", "both descriptors"], path).expect("Failed to commit");

    let oracle = get_version(path, &VersionRequest::default()).expect("Failed to compute version");

    assert_eq!(oracle.major_minor_version, "1.4");
}

#[tokio::test]
async fn test_height_offset_shifts_the_emitted_height() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    git::commit_version_json(
        path,
        "",
        r#"{"version": "1.0-beta", "versionHeightOffset": 100}"#,
    )
    .await
    .expect("Failed to commit descriptor");
    git::commit_file(path, "work.txt", "1", "work")
        .await
        .expect("Failed to commit");

    let oracle = get_version(path, &VersionRequest::default()).expect("Failed to compute version");

    assert_eq!(oracle.version_height, 2);
    assert_eq!(oracle.version_height_offset, 100);
    assert_eq!(oracle.simple_version, "1.0.102");
}
