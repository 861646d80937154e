//! Path filters scoping the height walk to a subtree of the repository.
//!
//! A specification is an include or an exclude (`:!` / `:^` prefixes),
//! relative to the descriptor's directory unless anchored to the repository
//! root with `:/` or a leading `/`. Compilation normalises each to a single
//! repo-relative, forward-slash path.

use crate::error::{GitHeightError, Result};
use crate::git::tree::names_equal;

/// One compiled path specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPath {
    exclude: bool,
    /// Normalised repo-relative path; empty means the repository root.
    repo_relative: String,
}

impl FilterPath {
    /// Compile a specification. `relative_to` is the descriptor's
    /// repo-relative directory (empty at the repository root).
    pub fn parse(spec: &str, relative_to: &str) -> Result<Self> {
        let bad = |reason: &str| GitHeightError::InvalidPathFilter {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let mut rest = spec;
        let exclude = if let Some(stripped) = rest.strip_prefix(":!").or_else(|| rest.strip_prefix(":^")) {
            rest = stripped;
            true
        } else {
            false
        };

        let (anchored, rest) = if let Some(stripped) = rest.strip_prefix(":/") {
            (true, stripped)
        } else if let Some(stripped) = rest.strip_prefix('/') {
            (true, stripped)
        } else {
            (false, rest)
        };

        let mut segments: Vec<&str> = Vec::new();
        if !anchored {
            segments.extend(relative_to.split('/').filter(|s| !s.is_empty()));
        }
        for segment in rest.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(bad("escapes the repository root"));
                    }
                }
                other => segments.push(other),
            }
        }

        Ok(FilterPath {
            exclude,
            repo_relative: segments.join("/"),
        })
    }

    pub fn is_exclude(&self) -> bool {
        self.exclude
    }

    /// Whether this filter names the whole repository.
    pub fn is_root(&self) -> bool {
        self.repo_relative.is_empty()
    }

    pub fn repo_relative_path(&self) -> &str {
        &self.repo_relative
    }

    /// Whether a repo-relative path is the filter path or lies under it.
    pub fn matches(&self, path: &[u8], ignore_case: bool) -> bool {
        if self.is_root() {
            return true;
        }
        let own = self.repo_relative.as_bytes();
        if path.len() == own.len() {
            return names_equal(path, own, ignore_case);
        }
        path.len() > own.len()
            && path[own.len()] == b'/'
            && names_equal(&path[..own.len()], own, ignore_case)
    }
}

/// An ordered set of compiled filters. An empty set means the entire
/// repository is relevant.
#[derive(Debug, Clone, Default)]
pub struct PathFilterSet {
    filters: Vec<FilterPath>,
    has_includes: bool,
}

impl PathFilterSet {
    pub fn compile(specs: &[String], relative_to: &str) -> Result<Self> {
        let filters = specs
            .iter()
            .map(|spec| FilterPath::parse(spec, relative_to))
            .collect::<Result<Vec<_>>>()?;
        let has_includes = filters.iter().any(|f| !f.is_exclude());
        Ok(PathFilterSet {
            filters,
            has_includes,
        })
    }

    /// No specifications at all: every path is relevant.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// A path is relevant when some include covers it (or no includes
    /// exist) and no exclude covers it.
    pub fn is_relevant(&self, path: &[u8], ignore_case: bool) -> bool {
        for filter in &self.filters {
            if filter.is_exclude() && filter.matches(path, ignore_case) {
                return false;
            }
        }
        if !self.has_includes {
            return true;
        }
        self.filters
            .iter()
            .any(|f| !f.is_exclude() && f.matches(path, ignore_case))
    }
}
