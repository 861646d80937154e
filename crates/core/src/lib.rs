//! # githeight core library
//! Deterministic version numbers derived from a committed `version.json`
//! descriptor and the height of the Git history, read straight from the
//! object database (loose objects, packs, delta chains) with no external
//! `git` binary.
//!
//! ## Quick Start
//!
//! Get the version for the current project directory.
//!
//! ```rust,no_run
//! # use githeight::GitHeightError;
//! use githeight::{get_version, VersionRequest};
//!
//! let oracle = get_version(".", &VersionRequest::default())?;
//!
//! println!("{}", oracle.sem_ver2);
//! # Ok::<_, GitHeightError>(())
//! ```
//!
//! ## Strict vs. fallback entry points
//! - [`get_version`] — requires a real Git repository and errors otherwise.
//! - [`get_version_or_default`] — returns the zero oracle when no
//!   repository is found, for callers that run in non-git contexts.

pub mod cloud;
pub mod error;
pub mod filter;
pub mod git;
pub mod options;
pub mod oracle;
pub mod version;
pub mod walker;

pub use cloud::{CloudBuild, CloudBuildHints};
pub use error::{GitHeightError, Result};
pub use git::{GitRepository, ObjectId};
pub use options::VersionOptions;
pub use oracle::{VersionOracle, VersionRequest};
pub use version::SemanticVersion;

use std::path::PathBuf;

/// Compute the version oracle for the given project directory.
///
/// The repository is discovered by ascending from `project_dir`; the
/// descriptor governing that directory is resolved in the working tree and
/// at the commit being built, and the height walk runs over the committed
/// history.
///
/// # Examples
/// Returning an error when the target is not a Git repository:
/// ```rust
/// use githeight::{get_version, GitHeightError, VersionRequest};
///
/// let err = get_version("/tmp/not-a-repo-githeight", &VersionRequest::default()).unwrap_err();
/// match err {
///     GitHeightError::NotARepository(_) => {}
///     other => panic!("unexpected error: {other}"),
/// }
/// ```
///
/// # Errors
/// - [`GitHeightError::NotARepository`] if the path is not inside a Git repository.
/// - [`GitHeightError::MalformedDescriptor`] if the descriptor at the built
///   commit or in the working tree does not parse.
/// - [`GitHeightError::HeightOverflow`] if the emitted height exceeds the
///   numeric component range.
pub fn get_version(
    project_dir: impl Into<PathBuf>,
    request: &VersionRequest<'_>,
) -> Result<VersionOracle> {
    let project_dir = project_dir.into();
    let repo = GitRepository::discover(&project_dir)?;
    VersionOracle::for_repository(&repo, &project_dir, request)
}

/// Compute the version oracle, falling back to the zero oracle when no
/// repository is found.
///
/// # Examples
/// ```rust
/// use githeight::{get_version_or_default, GitHeightError, VersionRequest};
///
/// let oracle = get_version_or_default("/tmp/not-a-repo-githeight", &VersionRequest::default())?;
/// assert_eq!(oracle.sem_ver2, "0.0.0");
/// assert!(!oracle.version_file_found);
/// # Ok::<_, GitHeightError>(())
/// ```
///
/// # Errors
/// Everything [`get_version`] reports except [`GitHeightError::NotARepository`].
pub fn get_version_or_default(
    project_dir: impl Into<PathBuf>,
    request: &VersionRequest<'_>,
) -> Result<VersionOracle> {
    let project_dir = project_dir.into();
    match GitRepository::try_discover(&project_dir)? {
        Some(repo) => VersionOracle::for_repository(&repo, &project_dir, request),
        None => Ok(VersionOracle::zero()),
    }
}
