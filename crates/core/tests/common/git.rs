//! Git test helpers for creating and manipulating test repositories

use std::path::Path;
use std::process::Command;

/// Result type for test operations
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Run a git command and check for success
pub fn run_git_command(args: &[&str], cwd: &Path) -> TestResult {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| format!("Failed to run git command: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("Git command {:?} failed: {}", args, stderr).into());
    }

    Ok(())
}

/// Run a git command and capture its stdout
pub fn run_git_output(args: &[&str], cwd: &Path) -> TestResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| format!("Failed to run git command: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("Git command {:?} failed: {}", args, stderr).into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Create an empty git repository
pub async fn ensure_empty_repository(path: &Path) -> TestResult {
    std::fs::create_dir_all(path).map_err(|e| format!("Failed to create directory: {}", e))?;

    run_git_command(&["init", "--initial-branch=main"], path)?;

    // Configure git user
    run_git_command(&["config", "user.email", "test@example.com"], path)?;
    run_git_command(&["config", "user.name", "Test User"], path)?;
    // Disable GPG signing
    run_git_command(&["config", "commit.gpgsign", "false"], path)?;

    Ok(())
}

/// Write a file and commit it
pub async fn commit_file(path: &Path, name: &str, content: &str, message: &str) -> TestResult {
    let file_path = path.join(name);
    if let Some(parent) = file_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&file_path, content)?;
    run_git_command(&["add", name], path)?;
    run_git_command(&["commit", "-m", message], path)
}

/// Write a version.json in the given repo-relative directory (no commit)
pub fn write_version_json(path: &Path, dir: &str, json: &str) -> TestResult {
    let dir_path = if dir.is_empty() {
        path.to_path_buf()
    } else {
        path.join(dir)
    };
    std::fs::create_dir_all(&dir_path)?;
    std::fs::write(dir_path.join("version.json"), json)?;
    Ok(())
}

/// Write a version.json in the given directory and commit it
#[allow(dead_code)]
pub async fn commit_version_json(path: &Path, dir: &str, json: &str) -> TestResult {
    write_version_json(path, dir, json)?;
    run_git_command(&["add", "-A"], path)?;
    run_git_command(&["commit", "-m", "set version"], path)
}

/// Create a tag
#[allow(dead_code)]
pub async fn tag(path: &Path, tag_name: &str) -> TestResult {
    run_git_command(&["tag", tag_name], path)
}

/// Create an annotated tag
#[allow(dead_code)]
pub async fn annotated_tag(path: &Path, tag_name: &str, message: &str) -> TestResult {
    run_git_command(&["tag", "-a", tag_name, "-m", message], path)
}

/// Checkout a specific commit or branch
#[allow(dead_code)]
pub async fn checkout(path: &Path, ref_name: &str) -> TestResult {
    run_git_command(&["checkout", ref_name], path)
}

/// The full hex id of HEAD
pub async fn head_sha(path: &Path) -> TestResult<String> {
    run_git_output(&["rev-parse", "HEAD"], path)
}

/// Repack everything into a single pack and drop the loose objects
#[allow(dead_code)]
pub async fn repack_all(path: &Path) -> TestResult {
    run_git_command(&["repack", "-a", "-d", "-f"], path)?;
    run_git_command(&["prune-packed"], path)
}

/// Move all refs into packed-refs
#[allow(dead_code)]
pub async fn pack_refs(path: &Path) -> TestResult {
    run_git_command(&["pack-refs", "--all"], path)
}
