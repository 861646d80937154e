//! The version-height walk.
//!
//! `height(C)` is the length, in commits and inclusive of `C`, of the
//! longest ancestry path from `C` along which the resolved descriptor keeps
//! matching `C`'s version (at the precision implied by the height position)
//! and each counted commit touches at least one path the filters consider
//! relevant.

use std::collections::HashMap;

use crate::error::{GitHeightError, Result};
use crate::filter::PathFilterSet;
use crate::git::tree::TreeEntryKind;
use crate::git::{CommitRecord, GitRepository, ObjectId, Tree};
use crate::options::{DescriptorResolver, ResolvedOptions};
use crate::version::SemanticVersion;

/// Per-query walk state: memoised heights and resolved descriptors. Lives
/// for one oracle invocation and is discarded with it.
pub struct HeightWalker<'repo> {
    repo: &'repo GitRepository,
    project_dir: String,
    resolver: DescriptorResolver<'repo>,
    options: HashMap<ObjectId, Option<ResolvedOptions>>,
    heights: HashMap<ObjectId, u32>,
}

impl<'repo> HeightWalker<'repo> {
    /// `project_dir` is the repo-relative directory whose descriptor governs
    /// the walk (empty for the repository root).
    pub fn new(repo: &'repo GitRepository, project_dir: impl Into<String>) -> Self {
        HeightWalker {
            repo,
            project_dir: project_dir.into(),
            resolver: DescriptorResolver::new(repo),
            options: HashMap::new(),
            heights: HashMap::new(),
        }
    }

    /// The descriptor governing the project directory at a commit, cached
    /// per commit (and per blob underneath). Errors propagate; use this for
    /// the commit actually being built.
    pub fn resolved_options_at(&mut self, commit: &ObjectId) -> Result<Option<ResolvedOptions>> {
        if let Some(cached) = self.options.get(commit) {
            return Ok(cached.clone());
        }
        let resolved = self.resolver.resolve_at_commit(commit, &self.project_dir)?;
        self.options.insert(*commit, resolved.clone());
        Ok(resolved)
    }

    /// The declared version at an ancestor commit, for boundary checks.
    /// A malformed descriptor in an ancestor is a boundary, not a failure.
    fn version_for_boundary(&mut self, commit: &ObjectId) -> Result<Option<SemanticVersion>> {
        let resolved = match self.resolved_options_at(commit) {
            Ok(resolved) => resolved,
            Err(GitHeightError::MalformedDescriptor { reference, reason }) => {
                tracing::warn!(%reference, %reason, "treating malformed ancestor descriptor as a version boundary");
                self.options.insert(*commit, None);
                None
            }
            Err(other) => return Err(other),
        };
        Ok(resolved.map(|r| {
            r.options
                .version
                .clone()
                .unwrap_or_else(|| SemanticVersion::new(0, 0))
        }))
    }

    /// Compute the version height at `start`. A commit with no reachable
    /// descriptor has height zero.
    pub fn height(&mut self, start: &ObjectId) -> Result<u32> {
        let Some(base) = self.resolved_options_at(start)? else {
            tracing::debug!(commit = %start, "no version descriptor reachable; height is zero");
            return Ok(0);
        };
        let base_version = base
            .options
            .version
            .clone()
            .unwrap_or_else(|| SemanticVersion::new(0, 0));
        let filters = PathFilterSet::compile(
            base.options.path_filters.as_deref().unwrap_or(&[]),
            &base.directory,
        )?;

        self.walk(start, &base_version, &filters)
    }

    /// Iterative DFS with an explicit stack. A commit stays on the stack
    /// until every continuing parent has a memoised height, so the depth of
    /// the stack is bounded by the history, never the call stack.
    fn walk(
        &mut self,
        start: &ObjectId,
        base_version: &SemanticVersion,
        filters: &PathFilterSet,
    ) -> Result<u32> {
        let ignore_case = self.repo.ignore_case();
        let mut stack: Vec<ObjectId> = vec![*start];

        while let Some(current) = stack.last().copied() {
            if self.heights.contains_key(&current) {
                stack.pop();
                continue;
            }

            let commit = self.repo.read_commit(&current)?;

            let mut max_parent_height = 0u32;
            let mut unresolved: Vec<ObjectId> = Vec::new();
            for parent in &commit.parents {
                if !self.parent_continues(parent, base_version)? {
                    // Beyond the version boundary: contributes zero.
                    continue;
                }
                match self.heights.get(parent) {
                    Some(height) => max_parent_height = max_parent_height.max(*height),
                    None => unresolved.push(*parent),
                }
            }
            if !unresolved.is_empty() {
                stack.extend(unresolved);
                continue; // revisit `current` after its parents settle
            }

            let bump = if filters.is_empty() {
                1
            } else if self.commit_is_relevant(&commit, filters, ignore_case)? {
                1
            } else {
                0
            };
            self.heights.insert(current, max_parent_height + bump);
            stack.pop();
        }

        Ok(*self.heights.get(start).expect("start settled by the loop"))
    }

    /// The `continue` predicate: an ancestor continues the walk while its
    /// declared version would not reset the height of the base version.
    fn parent_continues(
        &mut self,
        parent: &ObjectId,
        base_version: &SemanticVersion,
    ) -> Result<bool> {
        match self.version_for_boundary(parent)? {
            Some(version) => Ok(!base_version.will_height_reset(&version)),
            None => Ok(false),
        }
    }

    /// Whether a commit introduces, modifies, or deletes any filter-relevant
    /// path against any of its parents (or against the empty tree for a
    /// root commit).
    fn commit_is_relevant(
        &mut self,
        commit: &CommitRecord,
        filters: &PathFilterSet,
        ignore_case: bool,
    ) -> Result<bool> {
        let new_tree = self.repo.read_tree(&commit.tree)?;
        if commit.parents.is_empty() {
            let mut prefix = Vec::new();
            return self.diff_trees(None, Some(&new_tree), &mut prefix, filters, ignore_case);
        }
        for parent in &commit.parents {
            let parent_commit = self.repo.read_commit(parent)?;
            if parent_commit.tree == commit.tree {
                continue; // identical trees cannot be relevant
            }
            let old_tree = self.repo.read_tree(&parent_commit.tree)?;
            let mut prefix = Vec::new();
            if self.diff_trees(
                Some(&old_tree),
                Some(&new_tree),
                &mut prefix,
                filters,
                ignore_case,
            )? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Recursive tree diff, pruning equal subtrees and descending differing
    /// ones. `None` stands for the empty tree. Returns as soon as one
    /// relevant changed path is found.
    fn diff_trees(
        &self,
        old: Option<&Tree>,
        new: Option<&Tree>,
        prefix: &mut Vec<u8>,
        filters: &PathFilterSet,
        ignore_case: bool,
    ) -> Result<bool> {
        let empty = Tree::default();
        let old = old.unwrap_or(&empty);
        let new = new.unwrap_or(&empty);

        for entry in &new.entries {
            let old_entry = old.get(&entry.name, ignore_case);
            if let Some(old_entry) = old_entry {
                if old_entry.kind == entry.kind && old_entry.id == entry.id {
                    continue; // unchanged, prune
                }
            }

            let depth = push_segment(prefix, &entry.name);
            let relevant = match entry.kind {
                TreeEntryKind::Subtree => {
                    let new_subtree = self.repo.read_tree(&entry.id)?;
                    match old_entry {
                        Some(old_entry) if old_entry.kind == TreeEntryKind::Subtree => {
                            let old_subtree = self.repo.read_tree(&old_entry.id)?;
                            self.diff_trees(
                                Some(&old_subtree),
                                Some(&new_subtree),
                                prefix,
                                filters,
                                ignore_case,
                            )?
                        }
                        // A file became a subtree: the file's deletion and
                        // every added path underneath both count.
                        Some(_) => {
                            filters.is_relevant(prefix, ignore_case)
                                || self.diff_trees(
                                    None,
                                    Some(&new_subtree),
                                    prefix,
                                    filters,
                                    ignore_case,
                                )?
                        }
                        None => self.diff_trees(
                            None,
                            Some(&new_subtree),
                            prefix,
                            filters,
                            ignore_case,
                        )?,
                    }
                }
                TreeEntryKind::File => match old_entry {
                    Some(old_entry) if old_entry.kind == TreeEntryKind::Subtree => {
                        let old_subtree = self.repo.read_tree(&old_entry.id)?;
                        filters.is_relevant(prefix, ignore_case)
                            || self.diff_trees(
                                Some(&old_subtree),
                                None,
                                prefix,
                                filters,
                                ignore_case,
                            )?
                    }
                    _ => filters.is_relevant(prefix, ignore_case),
                },
            };
            prefix.truncate(depth);
            if relevant {
                return Ok(true);
            }
        }

        // Entries deleted by the new tree.
        for old_entry in &old.entries {
            if new.get(&old_entry.name, ignore_case).is_some() {
                continue;
            }
            let depth = push_segment(prefix, &old_entry.name);
            let relevant = match old_entry.kind {
                TreeEntryKind::File => filters.is_relevant(prefix, ignore_case),
                TreeEntryKind::Subtree => {
                    let old_subtree = self.repo.read_tree(&old_entry.id)?;
                    self.diff_trees(Some(&old_subtree), None, prefix, filters, ignore_case)?
                }
            };
            prefix.truncate(depth);
            if relevant {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// Append `/name` to the path buffer, returning the length to truncate back
/// to afterwards.
fn push_segment(prefix: &mut Vec<u8>, name: &[u8]) -> usize {
    let depth = prefix.len();
    if !prefix.is_empty() {
        prefix.push(b'/');
    }
    prefix.extend_from_slice(name);
    depth
}
