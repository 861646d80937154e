//! Cloud-build adapter interface.
//!
//! CI systems know things the repository cannot: the ref actually being
//! built (a detached-HEAD checkout loses it) and whether the build is a
//! pull-request validation. Callers surface those hints through this trait;
//! the oracle prefers them over repository state. Detecting a concrete CI
//! system from its environment variables is the caller's job.

/// Hints a cloud build system supplies to the oracle.
pub trait CloudBuild {
    /// Whether this adapter recognises the current environment.
    fn is_applicable(&self) -> bool;

    /// Pull-request validation builds never count as public releases.
    fn is_pull_request(&self) -> bool {
        false
    }

    /// The branch being built, normalised to `refs/heads/...`.
    fn building_branch(&self) -> Option<String> {
        None
    }

    /// The tag being built, normalised to `refs/tags/...`.
    fn building_tag(&self) -> Option<String> {
        None
    }

    /// The commit id being built, as reported by the CI system.
    fn commit_id(&self) -> Option<String> {
        None
    }
}

/// Sink for publishing the computed build number to the CI system.
pub type SetCloudBuildNumber<'a> = dyn FnMut(&str) + 'a;

/// Sink for publishing one named build variable to the CI system.
pub type SetCloudBuildVariable<'a> = dyn FnMut(&str, &str) + 'a;

/// A plain-data [`CloudBuild`] implementation for callers that already
/// gathered the hints themselves.
#[derive(Debug, Clone, Default)]
pub struct CloudBuildHints {
    pub pull_request: bool,
    pub building_branch: Option<String>,
    pub building_tag: Option<String>,
    pub commit_id: Option<String>,
}

impl CloudBuild for CloudBuildHints {
    fn is_applicable(&self) -> bool {
        self.pull_request
            || self.building_branch.is_some()
            || self.building_tag.is_some()
            || self.commit_id.is_some()
    }

    fn is_pull_request(&self) -> bool {
        self.pull_request
    }

    fn building_branch(&self) -> Option<String> {
        self.building_branch.clone()
    }

    fn building_tag(&self) -> Option<String> {
        self.building_tag.clone()
    }

    fn commit_id(&self) -> Option<String> {
        self.commit_id.clone()
    }
}
