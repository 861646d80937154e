//! The declarative version descriptor: `version.json` with parent-directory
//! inheritance, plus the legacy two-line `version.txt`.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{GitHeightError, Result};
use crate::git::{GitRepository, ObjectId};
use crate::version::SemanticVersion;

/// Preferred descriptor filename. Always lowercase on disk.
pub const JSON_FILE_NAME: &str = "version.json";
/// Legacy plain-text descriptor filename.
pub const TXT_FILE_NAME: &str = "version.txt";

/// How far into the numeric version a derived value reaches. Variant order
/// is the precision order, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VersionPrecision {
    Major,
    Minor,
    Build,
    Revision,
}

/// `assemblyVersion`: either a bare version string or an object carrying a
/// version and/or a truncation precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssemblyVersionOptions {
    Simple(SemanticVersion),
    Detailed(AssemblyVersionDetail),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssemblyVersionDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<SemanticVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<VersionPrecision>,
}

impl AssemblyVersionOptions {
    pub fn version(&self) -> Option<&SemanticVersion> {
        match self {
            AssemblyVersionOptions::Simple(version) => Some(version),
            AssemblyVersionOptions::Detailed(detail) => detail.version.as_ref(),
        }
    }

    pub fn precision(&self) -> VersionPrecision {
        match self {
            AssemblyVersionOptions::Simple(_) => VersionPrecision::Minor,
            AssemblyVersionOptions::Detailed(detail) => {
                detail.precision.unwrap_or(VersionPrecision::Minor)
            }
        }
    }

    fn merge_over(&self, base: &AssemblyVersionOptions) -> AssemblyVersionOptions {
        let merged = AssemblyVersionDetail {
            version: self.version().or_else(|| base.version()).cloned(),
            // A bare string form only declares a version; precision falls
            // through to the base.
            precision: match self {
                AssemblyVersionOptions::Simple(_) => Some(base.precision()),
                AssemblyVersionOptions::Detailed(detail) => {
                    detail.precision.or(Some(base.precision()))
                }
            },
        };
        AssemblyVersionOptions::Detailed(merged)
    }
}

/// `nugetPackageVersion`: which SemVer dialect the NuGet string uses and how
/// many numeric components it keeps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NuGetPackageVersionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sem_ver: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<VersionPrecision>,
}

impl NuGetPackageVersionOptions {
    pub fn sem_ver(&self) -> u8 {
        self.sem_ver.unwrap_or(1)
    }

    pub fn precision(&self) -> VersionPrecision {
        self.precision.unwrap_or(VersionPrecision::Build)
    }

    fn merge_over(&self, base: &Self) -> Self {
        NuGetPackageVersionOptions {
            sem_ver: self.sem_ver.or(base.sem_ver),
            precision: self.precision.or(base.precision),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CloudBuildNumberCommitWhen {
    Always,
    Never,
    NonPublicReleaseOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CloudBuildNumberCommitWhere {
    BuildMetadata,
    FourthVersionComponent,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudBuildNumberCommitIdOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when: Option<CloudBuildNumberCommitWhen>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_: Option<CloudBuildNumberCommitWhere>,
}

impl CloudBuildNumberCommitIdOptions {
    pub fn when(&self) -> CloudBuildNumberCommitWhen {
        self.when
            .unwrap_or(CloudBuildNumberCommitWhen::NonPublicReleaseOnly)
    }

    pub fn where_(&self) -> CloudBuildNumberCommitWhere {
        self.where_
            .unwrap_or(CloudBuildNumberCommitWhere::BuildMetadata)
    }

    fn merge_over(&self, base: &Self) -> Self {
        CloudBuildNumberCommitIdOptions {
            when: self.when.or(base.when),
            where_: self.where_.or(base.where_),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudBuildNumberOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_commit_id: Option<CloudBuildNumberCommitIdOptions>,
}

impl CloudBuildNumberOptions {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    pub fn include_commit_id(&self) -> CloudBuildNumberCommitIdOptions {
        self.include_commit_id.clone().unwrap_or_default()
    }

    fn merge_over(&self, base: &Self) -> Self {
        CloudBuildNumberOptions {
            enabled: self.enabled.or(base.enabled),
            include_commit_id: merge_nested(
                self.include_commit_id.as_ref(),
                base.include_commit_id.as_ref(),
                CloudBuildNumberCommitIdOptions::merge_over,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudBuildOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_version_variables: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_number: Option<CloudBuildNumberOptions>,
}

impl CloudBuildOptions {
    pub fn set_version_variables(&self) -> bool {
        self.set_version_variables.unwrap_or(true)
    }

    pub fn build_number(&self) -> CloudBuildNumberOptions {
        self.build_number.clone().unwrap_or_default()
    }

    fn merge_over(&self, base: &Self) -> Self {
        CloudBuildOptions {
            set_version_variables: self.set_version_variables.or(base.set_version_variables),
            build_number: merge_nested(
                self.build_number.as_ref(),
                base.build_number.as_ref(),
                CloudBuildNumberOptions::merge_over,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReleaseVersionIncrement {
    Major,
    Minor,
    Build,
}

/// `release`: consumed by the release-preparation workflow, parsed and
/// round-tripped here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_increment: Option<ReleaseVersionIncrement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_unstable_tag: Option<String>,
}

impl ReleaseOptions {
    fn merge_over(&self, base: &Self) -> Self {
        ReleaseOptions {
            branch_name: self.branch_name.clone().or_else(|| base.branch_name.clone()),
            version_increment: self.version_increment.or(base.version_increment),
            first_unstable_tag: self
                .first_unstable_tag
                .clone()
                .or_else(|| base.first_unstable_tag.clone()),
        }
    }
}

fn merge_nested<T: Clone>(
    child: Option<&T>,
    base: Option<&T>,
    merge: impl Fn(&T, &T) -> T,
) -> Option<T> {
    match (child, base) {
        (Some(child), Some(base)) => Some(merge(child, base)),
        (Some(child), None) => Some(child.clone()),
        (None, Some(base)) => Some(base.clone()),
        (None, None) => None,
    }
}

/// The parsed descriptor. Field accessors apply the documented defaults;
/// unknown keys are preserved in `extra` for round-trip writers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VersionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<SemanticVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assembly_version: Option<AssemblyVersionOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_height_offset: Option<i32>,
    /// Legacy spelling of `versionHeightOffset`; the newer field wins when
    /// both are present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_number_offset: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit_id_short_fixed_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit_id_short_auto_minimum: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sem_ver1_numeric_identifier_padding: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nuget_package_version: Option<NuGetPackageVersionOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_filters: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_release_ref_spec: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_build: Option<CloudBuildOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseOptions>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub inherit: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    #[serde(skip)]
    frozen: bool,
}

impl PartialEq for VersionOptions {
    fn eq(&self, other: &Self) -> bool {
        // Frozenness is a sharing property, not part of the value.
        self.version == other.version
            && self.assembly_version == other.assembly_version
            && self.version_height_offset == other.version_height_offset
            && self.build_number_offset == other.build_number_offset
            && self.git_commit_id_short_fixed_length == other.git_commit_id_short_fixed_length
            && self.git_commit_id_short_auto_minimum == other.git_commit_id_short_auto_minimum
            && self.sem_ver1_numeric_identifier_padding
                == other.sem_ver1_numeric_identifier_padding
            && self.nuget_package_version == other.nuget_package_version
            && self.path_filters == other.path_filters
            && self.public_release_ref_spec == other.public_release_ref_spec
            && self.cloud_build == other.cloud_build
            && self.release == other.release
            && self.inherit == other.inherit
            && self.extra == other.extra
    }
}

impl VersionOptions {
    /// Parse a `version.json` body. `reference` names the source (a commit
    /// id or "working tree") in error messages.
    pub fn from_json_bytes(data: &[u8], reference: &str) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| GitHeightError::MalformedDescriptor {
            reference: reference.to_string(),
            reason: e.to_string(),
        })
    }

    /// Parse a legacy `version.txt`: a version on the first line and an
    /// optional height offset on the second.
    pub fn from_text_bytes(data: &[u8], reference: &str) -> Result<Self> {
        let text = std::str::from_utf8(data).map_err(|_| GitHeightError::MalformedDescriptor {
            reference: reference.to_string(),
            reason: "version.txt is not UTF-8".to_string(),
        })?;
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

        let version_line = lines.next().ok_or_else(|| GitHeightError::MalformedDescriptor {
            reference: reference.to_string(),
            reason: "version.txt is empty".to_string(),
        })?;
        let version =
            SemanticVersion::parse(version_line).map_err(|e| GitHeightError::MalformedDescriptor {
                reference: reference.to_string(),
                reason: e.to_string(),
            })?;

        let build_number_offset = match lines.next() {
            Some(line) => Some(line.parse::<i32>().map_err(|_| {
                GitHeightError::MalformedDescriptor {
                    reference: reference.to_string(),
                    reason: format!("invalid height offset '{line}'"),
                }
            })?),
            None => None,
        };

        Ok(VersionOptions {
            version: Some(version),
            build_number_offset,
            ..VersionOptions::default()
        })
    }

    /// The effective height offset: `versionHeightOffset`, falling back to
    /// the legacy `buildNumberOffset`.
    pub fn version_height_offset(&self) -> i32 {
        self.version_height_offset
            .or(self.build_number_offset)
            .unwrap_or(0)
    }

    pub fn git_commit_id_short_fixed_length(&self) -> usize {
        self.git_commit_id_short_fixed_length.unwrap_or(10) as usize
    }

    /// Zero means "use the fixed length".
    pub fn git_commit_id_short_auto_minimum(&self) -> usize {
        self.git_commit_id_short_auto_minimum.unwrap_or(0) as usize
    }

    pub fn sem_ver1_numeric_identifier_padding(&self) -> usize {
        self.sem_ver1_numeric_identifier_padding.unwrap_or(4) as usize
    }

    pub fn assembly_precision(&self) -> VersionPrecision {
        self.assembly_version
            .as_ref()
            .map(AssemblyVersionOptions::precision)
            .unwrap_or(VersionPrecision::Minor)
    }

    pub fn nuget_package_version(&self) -> NuGetPackageVersionOptions {
        self.nuget_package_version.clone().unwrap_or_default()
    }

    pub fn cloud_build(&self) -> CloudBuildOptions {
        self.cloud_build.clone().unwrap_or_default()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Mark this descriptor immutable for cache sharing. Mutation after
    /// freezing requires [`VersionOptions::thawed_copy`].
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// A mutable deep copy of a possibly-frozen descriptor.
    pub fn thawed_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.frozen = false;
        copy
    }

    /// Overlay `self` (a child declaring `inherit`) on `base`. Scalar
    /// fields from the child win; object fields merge recursively; the
    /// result clears `inherit`.
    pub fn merge_inherited(&self, base: &VersionOptions) -> VersionOptions {
        debug_assert!(self.inherit, "merge_inherited on a non-inheriting child");
        let mut merged = base.thawed_copy();

        merged.version = self.version.clone().or(merged.version);
        merged.assembly_version = merge_nested(
            self.assembly_version.as_ref(),
            merged.assembly_version.as_ref(),
            |child, base| child.merge_over(base),
        );
        merged.version_height_offset = self.version_height_offset.or(merged.version_height_offset);
        merged.build_number_offset = self.build_number_offset.or(merged.build_number_offset);
        merged.git_commit_id_short_fixed_length = self
            .git_commit_id_short_fixed_length
            .or(merged.git_commit_id_short_fixed_length);
        merged.git_commit_id_short_auto_minimum = self
            .git_commit_id_short_auto_minimum
            .or(merged.git_commit_id_short_auto_minimum);
        merged.sem_ver1_numeric_identifier_padding = self
            .sem_ver1_numeric_identifier_padding
            .or(merged.sem_ver1_numeric_identifier_padding);
        merged.nuget_package_version = merge_nested(
            self.nuget_package_version.as_ref(),
            merged.nuget_package_version.as_ref(),
            NuGetPackageVersionOptions::merge_over,
        );
        merged.path_filters = self.path_filters.clone().or(merged.path_filters);
        merged.public_release_ref_spec = self
            .public_release_ref_spec
            .clone()
            .or(merged.public_release_ref_spec);
        merged.cloud_build = merge_nested(
            self.cloud_build.as_ref(),
            merged.cloud_build.as_ref(),
            CloudBuildOptions::merge_over,
        );
        merged.release = merge_nested(
            self.release.as_ref(),
            merged.release.as_ref(),
            ReleaseOptions::merge_over,
        );
        for (key, value) in &self.extra {
            merged.extra.insert(key.clone(), value.clone());
        }
        merged.inherit = false;
        merged
    }
}

/// A resolved descriptor together with the repo-relative directory it was
/// found in (relative path filters anchor there).
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub options: Rc<VersionOptions>,
    pub directory: String,
}

/// The repo-relative ancestor directories of `dir`, nearest first, ending
/// with the repository root.
fn ancestor_dirs(dir: &str) -> Vec<String> {
    let mut dirs = Vec::new();
    let mut current = dir.trim_matches('/').to_string();
    loop {
        dirs.push(current.clone());
        match current.rfind('/') {
            Some(cut) => current.truncate(cut),
            None if !current.is_empty() => current.clear(),
            None => break,
        }
    }
    dirs
}

/// Resolves descriptors inside commit trees, caching parsed descriptors by
/// blob id so identical trees parse once per walk.
pub struct DescriptorResolver<'repo> {
    repo: &'repo GitRepository,
    blob_cache: HashMap<ObjectId, Rc<VersionOptions>>,
}

impl<'repo> DescriptorResolver<'repo> {
    pub fn new(repo: &'repo GitRepository) -> Self {
        DescriptorResolver {
            repo,
            blob_cache: HashMap::new(),
        }
    }

    /// Resolve the descriptor governing `project_dir` in the given commit,
    /// ascending directories and applying `inherit` merges.
    pub fn resolve_at_commit(
        &mut self,
        commit_id: &ObjectId,
        project_dir: &str,
    ) -> Result<Option<ResolvedOptions>> {
        let commit = self.repo.read_commit(commit_id)?;
        let reference = commit_id.to_hex();
        self.resolve_in_tree(&commit.tree, project_dir, &reference)
    }

    fn resolve_in_tree(
        &mut self,
        root_tree: &ObjectId,
        start_dir: &str,
        reference: &str,
    ) -> Result<Option<ResolvedOptions>> {
        let Some((options, directory)) = self.find_nearest(root_tree, start_dir, reference)? else {
            return Ok(None);
        };

        if !options.inherit {
            return Ok(Some(ResolvedOptions { options, directory }));
        }

        // The child inherits: merge it over the nearest ancestor descriptor.
        let base = match parent_dir(&directory) {
            Some(parent) => self.resolve_in_tree(root_tree, &parent, reference)?,
            None => None,
        };
        let base = base.ok_or_else(|| {
            GitHeightError::InheritanceUnresolved(format!("{directory} (at {reference})"))
        })?;
        let mut merged = options.merge_inherited(&base.options);
        merged.freeze();
        Ok(Some(ResolvedOptions {
            options: Rc::new(merged),
            directory,
        }))
    }

    /// Find the nearest descriptor file at or above `start_dir` in the
    /// commit tree.
    fn find_nearest(
        &mut self,
        root_tree: &ObjectId,
        start_dir: &str,
        reference: &str,
    ) -> Result<Option<(Rc<VersionOptions>, String)>> {
        for dir in ancestor_dirs(start_dir) {
            for (file, json) in [(JSON_FILE_NAME, true), (TXT_FILE_NAME, false)] {
                let path = if dir.is_empty() {
                    file.to_string()
                } else {
                    format!("{dir}/{file}")
                };
                let Some((blob_id, is_tree)) = self.repo.entry_at_path(root_tree, &path)? else {
                    continue;
                };
                if is_tree {
                    continue;
                }
                if let Some(cached) = self.blob_cache.get(&blob_id) {
                    return Ok(Some((Rc::clone(cached), dir)));
                }
                let data = self.repo.read_blob(&blob_id)?;
                let mut options = if json {
                    VersionOptions::from_json_bytes(&data, reference)?
                } else {
                    VersionOptions::from_text_bytes(&data, reference)?
                };
                options.freeze();
                let options = Rc::new(options);
                self.blob_cache.insert(blob_id, Rc::clone(&options));
                return Ok(Some((options, dir)));
            }
        }
        Ok(None)
    }
}

fn parent_dir(dir: &str) -> Option<String> {
    if dir.is_empty() {
        return None;
    }
    Some(match dir.rfind('/') {
        Some(cut) => dir[..cut].to_string(),
        None => String::new(),
    })
}

/// Resolve the descriptor governing `project_dir` in the working tree,
/// ascending directories on the filesystem with the same `inherit` rule.
pub fn resolve_working_tree(
    work_dir: &Path,
    project_dir: &str,
) -> Result<Option<ResolvedOptions>> {
    resolve_working_tree_from(work_dir, project_dir)
}

fn resolve_working_tree_from(
    work_dir: &Path,
    start_dir: &str,
) -> Result<Option<ResolvedOptions>> {
    let Some((options, directory)) = find_nearest_on_disk(work_dir, start_dir)? else {
        return Ok(None);
    };

    if !options.inherit {
        return Ok(Some(ResolvedOptions {
            options: Rc::new(options),
            directory,
        }));
    }

    let base = match parent_dir(&directory) {
        Some(parent) => resolve_working_tree_from(work_dir, &parent)?,
        None => None,
    };
    let base = base.ok_or_else(|| {
        GitHeightError::InheritanceUnresolved(format!("{directory} (in working tree)"))
    })?;
    Ok(Some(ResolvedOptions {
        options: Rc::new(options.merge_inherited(&base.options)),
        directory,
    }))
}

fn find_nearest_on_disk(
    work_dir: &Path,
    start_dir: &str,
) -> Result<Option<(VersionOptions, String)>> {
    for dir in ancestor_dirs(start_dir) {
        let dir_path = if dir.is_empty() {
            work_dir.to_path_buf()
        } else {
            work_dir.join(&dir)
        };
        for (file, json) in [(JSON_FILE_NAME, true), (TXT_FILE_NAME, false)] {
            let path = dir_path.join(file);
            let data = match std::fs::read(&path) {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let options = if json {
                VersionOptions::from_json_bytes(&data, "working tree")?
            } else {
                VersionOptions::from_text_bytes(&data, "working tree")?
            };
            return Ok(Some((options, dir)));
        }
    }
    Ok(None)
}
