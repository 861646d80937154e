//! Public-release detection: ref-spec matching, CI hints, and explicit
//! overrides.

use githeight::{get_version, CloudBuildHints, VersionRequest};
use tempfile::TempDir;

mod common;

use common::fixtures::{short_id, PUBLIC_MAIN_DESCRIPTOR};
use common::git;

#[tokio::test]
async fn test_building_main_is_a_public_release() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    git::commit_version_json(path, "", PUBLIC_MAIN_DESCRIPTOR)
        .await
        .expect("Failed to commit descriptor");

    let oracle = get_version(path, &VersionRequest::default()).expect("Failed to compute version");

    assert!(oracle.public_release);
    // The per-commit disambiguator disappears from both dialects.
    assert_eq!(oracle.sem_ver2, "1.0.1-beta");
    assert_eq!(oracle.sem_ver1, "1.0.1-beta");
}

#[tokio::test]
async fn test_feature_branches_are_not_public() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    git::commit_version_json(path, "", PUBLIC_MAIN_DESCRIPTOR)
        .await
        .expect("Failed to commit descriptor");
    git::run_git_command(&["checkout", "-b", "feature/x"], path).expect("Failed to branch");

    let sha = git::head_sha(path).await.expect("Failed to read HEAD");
    let oracle = get_version(path, &VersionRequest::default()).expect("Failed to compute version");

    assert!(!oracle.public_release);
    assert_eq!(oracle.sem_ver2, format!("1.0.1-beta+g{}", short_id(&sha)));
}

#[tokio::test]
async fn test_cloud_branch_hint_beats_detached_head() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    git::commit_version_json(path, "", PUBLIC_MAIN_DESCRIPTOR)
        .await
        .expect("Failed to commit descriptor");

    // CI checkouts are typically detached; the hint names the real branch.
    let sha = git::head_sha(path).await.expect("Failed to read HEAD");
    git::checkout(path, &sha).await.expect("Failed to detach");

    let hints = CloudBuildHints {
        building_branch: Some("refs/heads/main".to_string()),
        ..Default::default()
    };
    let request = VersionRequest {
        cloud_build: Some(&hints),
        ..Default::default()
    };
    let oracle = get_version(path, &request).expect("Failed to compute version");

    assert!(oracle.public_release);
}

#[tokio::test]
async fn test_pull_request_builds_are_never_public() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    git::commit_version_json(path, "", PUBLIC_MAIN_DESCRIPTOR)
        .await
        .expect("Failed to commit descriptor");

    let hints = CloudBuildHints {
        pull_request: true,
        building_branch: Some("refs/heads/main".to_string()),
        ..Default::default()
    };
    let request = VersionRequest {
        cloud_build: Some(&hints),
        ..Default::default()
    };
    let oracle = get_version(path, &request).expect("Failed to compute version");

    assert!(!oracle.public_release);
}

#[tokio::test]
async fn test_explicit_override_wins() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    git::commit_version_json(path, "", r#"{"version": "1.0-beta"}"#)
        .await
        .expect("Failed to commit descriptor");

    let request = VersionRequest {
        public_release: Some(true),
        ..Default::default()
    };
    let oracle = get_version(path, &request).expect("Failed to compute version");

    assert!(oracle.public_release);
    assert_eq!(oracle.sem_ver2, "1.0.1-beta");
}
