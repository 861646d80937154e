//! Object-store scenarios: packed objects and refs, annotated tags,
//! worktrees, and alternates. The same histories must produce the same
//! versions regardless of how the objects are stored.

use githeight::{get_version, VersionRequest};
use tempfile::TempDir;

mod common;

use common::fixtures::SIMPLE_DESCRIPTOR;
use common::git;

async fn build_linear_history(path: &std::path::Path, commits: u32) {
    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    git::commit_version_json(path, "", SIMPLE_DESCRIPTOR)
        .await
        .expect("Failed to commit descriptor");
    for index in 1..commits {
        git::commit_file(path, "work.txt", &index.to_string(), "work")
            .await
            .expect("Failed to commit");
    }
}

#[tokio::test]
async fn test_packed_objects_match_loose_objects() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    build_linear_history(path, 12).await;
    let loose = get_version(path, &VersionRequest::default()).expect("Failed on loose objects");

    // Repack everything; deltified pack entries replace the loose objects.
    git::repack_all(path).await.expect("Failed to repack");
    let packed = get_version(path, &VersionRequest::default()).expect("Failed on packed objects");

    assert_eq!(loose.sem_ver2, packed.sem_ver2);
    assert_eq!(loose.version, packed.version);
    assert_eq!(loose.version_height, packed.version_height);
    assert_eq!(packed.version_height, 12);
}

#[tokio::test]
async fn test_packed_refs_resolve() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    build_linear_history(path, 3).await;
    git::pack_refs(path).await.expect("Failed to pack refs");

    let oracle = get_version(path, &VersionRequest::default()).expect("Failed to compute version");
    assert_eq!(oracle.version_height, 3);
}

#[tokio::test]
async fn test_annotated_tag_committish_peels_to_the_commit() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    build_linear_history(path, 2).await;
    git::annotated_tag(path, "v1.0.2", "release").await.expect("Failed to tag");
    git::commit_file(path, "work.txt", "later", "after tag")
        .await
        .expect("Failed to commit");

    let request = VersionRequest {
        committish: Some("v1.0.2".to_string()),
        ..Default::default()
    };
    let oracle = get_version(path, &request).expect("Failed to compute version");

    // The tag points two commits deep, not at HEAD.
    assert_eq!(oracle.version_height, 2);
}

#[tokio::test]
async fn test_abbreviated_committish_resolves() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    build_linear_history(path, 2).await;
    let sha = git::head_sha(path).await.expect("Failed to read HEAD");

    let request = VersionRequest {
        committish: Some(sha[..8].to_string()),
        ..Default::default()
    };
    let oracle = get_version(path, &request).expect("Failed to compute version");

    assert_eq!(oracle.git_commit_id.as_deref(), Some(sha.as_str()));
}

#[tokio::test]
async fn test_worktree_checkout_is_discovered() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();
    let main_repo = path.join("main-repo");
    let worktree = path.join("wt");

    build_linear_history(&main_repo, 4).await;
    git::run_git_command(
        &["worktree", "add", worktree.to_str().unwrap(), "HEAD"],
        &main_repo,
    )
    .expect("Failed to add worktree");

    // The worktree's `.git` is a `gitdir:` pointer file.
    let in_main = get_version(&main_repo, &VersionRequest::default()).expect("Failed in main");
    let in_worktree = get_version(&worktree, &VersionRequest::default()).expect("Failed in worktree");

    assert_eq!(in_main.version, in_worktree.version);
    assert_eq!(in_worktree.version_height, 4);
}

#[tokio::test]
async fn test_shared_clone_reads_through_alternates() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();
    let origin = path.join("origin");
    let clone = path.join("clone");

    build_linear_history(&origin, 5).await;

    // --shared leaves the clone's object store empty and writes
    // objects/info/alternates pointing at the origin.
    git::run_git_command(
        &[
            "clone",
            "--shared",
            origin.to_str().unwrap(),
            clone.to_str().unwrap(),
        ],
        path,
    )
    .expect("Failed to clone");

    let oracle = get_version(&clone, &VersionRequest::default()).expect("Failed in shared clone");
    assert_eq!(oracle.version_height, 5);
    assert_eq!(oracle.simple_version, "1.0.5");
}

#[tokio::test]
async fn test_auto_minimum_short_id_is_unique_and_bounded() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    git::commit_version_json(
        path,
        "",
        r#"{"version": "1.0-beta", "gitCommitIdShortAutoMinimum": 7}"#,
    )
    .await
    .expect("Failed to commit descriptor");

    let sha = git::head_sha(path).await.expect("Failed to read HEAD");
    let oracle = get_version(path, &VersionRequest::default()).expect("Failed to compute version");

    let short = oracle.git_commit_id_short.expect("short id present");
    assert!(short.len() >= 7);
    assert!(sha.starts_with(&short));
}

#[tokio::test]
async fn test_detached_head_still_versions() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    build_linear_history(path, 3).await;
    let sha = git::head_sha(path).await.expect("Failed to read HEAD");
    git::checkout(path, &sha).await.expect("Failed to detach");

    let oracle = get_version(path, &VersionRequest::default()).expect("Failed to compute version");

    assert_eq!(oracle.version_height, 3);
    assert!(!oracle.public_release);
}
