//! Path-filtered monorepo scenarios: commits outside a project's filters
//! contribute nothing to its height.

use githeight::{get_version, VersionRequest};
use tempfile::TempDir;

mod common;

use common::fixtures::PROJECT_SCOPED_DESCRIPTOR;
use common::git;

#[tokio::test]
async fn test_sibling_projects_version_independently() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");

    // Commit 1: project A appears.
    git::commit_version_json(path, "a", PROJECT_SCOPED_DESCRIPTOR)
        .await
        .expect("Failed to commit a");
    // Commit 2: project B appears.
    git::commit_version_json(path, "b", PROJECT_SCOPED_DESCRIPTOR)
        .await
        .expect("Failed to commit b");
    // Commits 3 and 4 touch only project B.
    git::commit_file(path, "b/work.txt", "1", "b work")
        .await
        .expect("Failed to commit");
    git::commit_file(path, "b/work.txt", "2", "b work")
        .await
        .expect("Failed to commit");

    let oracle_a = get_version(path.join("a"), &VersionRequest::default())
        .expect("Failed to compute version for a");
    let oracle_b = get_version(path.join("b"), &VersionRequest::default())
        .expect("Failed to compute version for b");

    // A's height is untouched by B-only commits.
    assert_eq!(oracle_a.version_height, 1);
    assert_eq!(oracle_b.version_height, 3);
}

#[tokio::test]
async fn test_commit_touching_only_excluded_paths_contributes_zero() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    git::commit_version_json(
        path,
        "",
        r#"{"version": "1.0-beta", "pathFilters": [".", ":!docs"]}"#,
    )
    .await
    .expect("Failed to commit descriptor");

    git::commit_file(path, "src/lib.rs", "pub fn f() {}", "code")
        .await
        .expect("Failed to commit");
    git::commit_file(path, "docs/guide.md", "guide", "docs only")
        .await
        .expect("Failed to commit");
    git::commit_file(path, "docs/guide.md", "guide v2", "docs only again")
        .await
        .expect("Failed to commit");

    let oracle = get_version(path, &VersionRequest::default()).expect("Failed to compute version");

    // Descriptor commit + code commit count; the two docs commits do not.
    assert_eq!(oracle.version_height, 2);
}

#[tokio::test]
async fn test_deleting_a_relevant_path_counts() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    git::commit_version_json(path, "a", PROJECT_SCOPED_DESCRIPTOR)
        .await
        .expect("Failed to commit descriptor");
    git::commit_file(path, "a/src/old.rs", "// old", "add file")
        .await
        .expect("Failed to commit");

    git::run_git_command(&["rm", "a/src/old.rs"], path).expect("Failed to rm");
    git::run_git_command(&["commit", "-m", "remove file"], path).expect("Failed to commit");

    let oracle = get_version(path.join("a"), &VersionRequest::default())
        .expect("Failed to compute version");

    assert_eq!(oracle.version_height, 3);
}

#[tokio::test]
async fn test_root_anchored_filter_reaches_outside_the_project() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path();

    git::ensure_empty_repository(path)
        .await
        .expect("Failed to create repo");
    git::commit_version_json(
        path,
        "proj",
        r#"{"version": "1.0-beta", "pathFilters": [".", ":/shared"]}"#,
    )
    .await
    .expect("Failed to commit descriptor");

    git::commit_file(path, "shared/lib.rs", "pub fn s() {}", "shared work")
        .await
        .expect("Failed to commit");
    git::commit_file(path, "unrelated/file.txt", "x", "unrelated work")
        .await
        .expect("Failed to commit");

    let oracle = get_version(path.join("proj"), &VersionRequest::default())
        .expect("Failed to compute version");

    // Descriptor commit + shared commit; the unrelated commit is skipped.
    assert_eq!(oracle.version_height, 2);
}
