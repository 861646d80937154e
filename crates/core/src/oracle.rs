//! The version oracle: combines the resolved descriptor, the computed
//! height, the commit identity, and the public-release state into every
//! output string a build consumes.

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use regex::Regex;
use serde::Serialize;

use crate::cloud::CloudBuild;
use crate::error::{GitHeightError, Result};
use crate::git::{GitRepository, ObjectId};
use crate::options::{
    CloudBuildNumberCommitWhen, CloudBuildNumberCommitWhere, VersionOptions, VersionPrecision,
};
use crate::version::{SemVerPosition, SemanticVersion, MAX_COMPONENT};
use crate::walker::HeightWalker;

/// Caller-supplied inputs beyond the project directory.
pub struct VersionRequest<'a> {
    /// Commit to compute the version for; HEAD when absent.
    pub committish: Option<String>,
    /// Overrides the ref-spec-derived public-release state.
    pub public_release: Option<bool>,
    /// Overrides the descriptor's `versionHeightOffset`.
    pub version_height_offset: Option<i32>,
    /// CI hints, preferred over repository state when applicable.
    pub cloud_build: Option<&'a dyn CloudBuild>,
}

impl Default for VersionRequest<'_> {
    fn default() -> Self {
        VersionRequest {
            committish: None,
            public_release: None,
            version_height_offset: None,
            cloud_build: None,
        }
    }
}

impl std::fmt::Debug for VersionRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionRequest")
            .field("committish", &self.committish)
            .field("public_release", &self.public_release)
            .field("version_height_offset", &self.version_height_offset)
            .field("cloud_build", &self.cloud_build.map(|_| "..."))
            .finish()
    }
}

/// Every derived version value for one build.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionOracle {
    /// Four-component numeric version.
    pub version: String,
    pub assembly_version: String,
    pub assembly_file_version: String,
    pub assembly_informational_version: String,
    /// `Major.Minor.Build`.
    pub simple_version: String,
    pub major_minor_version: String,
    pub build_number: u16,
    pub version_height: u32,
    pub version_height_offset: i32,
    /// Leading `-` included when non-empty.
    pub prerelease_version: String,
    /// Leading `+` included when non-empty.
    pub build_metadata_fragment: String,
    pub sem_ver1: String,
    pub sem_ver2: String,
    pub nu_get_package_version: String,
    pub npm_package_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_build_number: Option<String>,
    pub cloud_build_all_vars: BTreeMap<String, String>,
    pub cloud_build_version_vars: BTreeMap<String, String>,
    pub git_commit_id: Option<String>,
    pub git_commit_id_short: Option<String>,
    pub git_commit_date_ticks: Option<i64>,
    pub public_release: bool,
    pub version_file_found: bool,
}

impl std::fmt::Display for VersionOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sem_ver2)
    }
}

impl VersionOracle {
    /// The oracle for a directory with no repository or descriptor at all:
    /// every numeric field zero, nothing found.
    pub fn zero() -> Self {
        Self::assemble(Inputs {
            options: Rc::new(VersionOptions::default()),
            version: SemanticVersion::new(0, 0),
            height: 0,
            offset_override: None,
            commit: None,
            short_id: None,
            date_ticks: None,
            public_release: false,
            version_file_found: false,
        })
        .expect("zero oracle carries no height to overflow")
    }

    /// Compute the oracle for a project directory inside a repository.
    pub fn for_repository(
        repo: &GitRepository,
        project_dir: &Path,
        request: &VersionRequest<'_>,
    ) -> Result<Self> {
        let project_rel = repo_relative_dir(repo, project_dir);
        let mut walker = HeightWalker::new(repo, project_rel.clone());

        let cloud = request
            .cloud_build
            .filter(|adapter| adapter.is_applicable());

        // The commit being built: explicit committish, then the CI hint,
        // then HEAD.
        let commit = match &request.committish {
            Some(spec) => Some(repo.resolve_committish(spec)?),
            None => match cloud.and_then(|c| c.commit_id()) {
                Some(hint) => Some(repo.resolve_committish(&hint)?),
                None => repo.head_commit()?,
            },
        };

        // Descriptor errors at the commit being built or in the working
        // tree are fatal; ancestors degrade inside the walker.
        let committed = match commit {
            Some(id) => walker.resolved_options_at(&id)?,
            None => None,
        };
        let working = match repo.work_dir() {
            Some(work_dir) => crate::options::resolve_working_tree(work_dir, &project_rel)?,
            None => None,
        };

        let committed_version = committed
            .as_ref()
            .and_then(|r| r.options.version.clone());
        let effective = working.as_ref().or(committed.as_ref());
        let version_file_found = effective.is_some();
        let options = effective
            .map(|r| Rc::clone(&r.options))
            .unwrap_or_default();
        let version = options
            .version
            .clone()
            .unwrap_or_else(|| SemanticVersion::new(0, 0));

        // Height comes from the committed graph; an uncommitted version
        // change that would reset it zeroes it here.
        let height = match commit {
            Some(id) => {
                let walked = walker.height(&id)?;
                match &committed_version {
                    Some(committed_version) if version.will_height_reset(committed_version) => 0,
                    _ => walked,
                }
            }
            None => 0,
        };

        let public_release = match request.public_release {
            Some(explicit) => explicit,
            None => {
                if cloud.is_some_and(|c| c.is_pull_request()) {
                    false
                } else {
                    let building_ref = cloud
                        .and_then(|c| c.building_tag().or_else(|| c.building_branch()))
                        .or(repo.head()?.ref_name);
                    match building_ref {
                        Some(name) => ref_matches_public_spec(&options, &name)?,
                        None => false,
                    }
                }
            }
        };

        let (short_id, date_ticks) = match commit {
            Some(id) => {
                let record = repo.read_commit(&id)?;
                (
                    Some(short_commit_id(repo, &id, &options)),
                    record.author_date_ticks(),
                )
            }
            None => (None, None),
        };

        Self::assemble(Inputs {
            options,
            version,
            height,
            offset_override: request.version_height_offset,
            commit,
            short_id,
            date_ticks,
            public_release,
            version_file_found,
        })
    }

    fn assemble(inputs: Inputs) -> Result<Self> {
        let Inputs {
            options,
            version,
            height,
            offset_override,
            commit,
            short_id,
            date_ticks,
            public_release,
            version_file_found,
        } = inputs;

        let offset = offset_override.unwrap_or_else(|| options.version_height_offset());
        // A negative offset can undercut the walked height; emitted heights
        // saturate at zero.
        let emitted_height = (height as i64 + offset as i64).max(0);
        let height_position = version.height_position();
        let commit_position = version.commit_id_position();

        let checked_height = |position: &'static str| -> Result<u16> {
            if emitted_height > MAX_COMPONENT as i64 {
                return Err(GitHeightError::HeightOverflow {
                    height: emitted_height,
                    position,
                });
            }
            Ok(emitted_height as u16)
        };

        let build_component = match height_position {
            Some(SemVerPosition::Build) => checked_height("build")?,
            _ => version.build.unwrap_or(0),
        };
        let revision_component = match height_position {
            Some(SemVerPosition::Revision) => checked_height("revision")?,
            _ => match (commit_position, commit) {
                (Some(SemVerPosition::Revision), Some(id)) => {
                    id.truncated_u16().min(MAX_COMPONENT)
                }
                _ => version.revision.unwrap_or(0),
            },
        };

        let substituted_height = emitted_height.clamp(0, u32::MAX as i64) as u32;
        let major = version.major;
        let minor = version.minor;

        let version4 = format!("{major}.{minor}.{build_component}.{revision_component}");
        let simple_version = format!("{major}.{minor}.{build_component}");
        let major_minor_version = format!("{major}.{minor}");

        let prerelease = version.prerelease_with_height(substituted_height);
        let prerelease_version = if prerelease.is_empty() {
            String::new()
        } else {
            format!("-{prerelease}")
        };

        // The first metadata identifier is the commit disambiguator on
        // non-public-release builds.
        let mut metadata_identifiers: Vec<String> = Vec::new();
        if !public_release {
            if let Some(short) = &short_id {
                metadata_identifiers.push(format!("g{short}"));
            }
        }
        let declared_metadata = version.metadata_with_height(substituted_height);
        metadata_identifiers.extend(
            declared_metadata
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        let build_metadata_fragment = if metadata_identifiers.is_empty() {
            String::new()
        } else {
            format!("+{}", metadata_identifiers.join("."))
        };

        let sem_ver2 = format!("{simple_version}{prerelease_version}{build_metadata_fragment}");

        let padding = options.sem_ver1_numeric_identifier_padding();
        let sem_ver1 = semver1_string(
            &simple_version,
            &prerelease,
            &metadata_identifiers,
            padding,
        );

        let assembly_version = assembly_version_string(
            &options,
            &version,
            build_component,
            revision_component,
        );

        let nuget = options.nuget_package_version();
        let nuget_base = base_by_precision(
            major,
            minor,
            build_component,
            revision_component,
            nuget.precision(),
        );
        let nu_get_package_version = if nuget.sem_ver() >= 2 {
            format!("{nuget_base}{prerelease_version}{build_metadata_fragment}")
        } else {
            semver1_string(&nuget_base, &prerelease, &metadata_identifiers, padding)
        };
        let npm_package_version = sem_ver2.clone();

        let cloud_options = options.cloud_build();
        let cloud_build_number = cloud_options.build_number().enabled().then(|| {
            let include = cloud_options.build_number().include_commit_id();
            let commit_applies = match include.when() {
                CloudBuildNumberCommitWhen::Always => true,
                CloudBuildNumberCommitWhen::Never => false,
                CloudBuildNumberCommitWhen::NonPublicReleaseOnly => !public_release,
            };
            match (commit_applies, &short_id, commit) {
                (true, Some(short), Some(id)) => match include.where_() {
                    CloudBuildNumberCommitWhere::BuildMetadata => {
                        format!("{simple_version}{prerelease_version}+g{short}")
                    }
                    CloudBuildNumberCommitWhere::FourthVersionComponent => {
                        let id16 = id.truncated_u16().min(MAX_COMPONENT);
                        format!("{simple_version}.{id16}{prerelease_version}")
                    }
                },
                _ => format!("{simple_version}{prerelease_version}"),
            }
        });

        let mut oracle = VersionOracle {
            version: version4,
            assembly_version,
            assembly_file_version: String::new(),
            assembly_informational_version: sem_ver2.clone(),
            simple_version,
            major_minor_version,
            build_number: build_component,
            version_height: height,
            version_height_offset: offset,
            prerelease_version,
            build_metadata_fragment,
            sem_ver1,
            sem_ver2,
            nu_get_package_version,
            npm_package_version,
            cloud_build_number,
            cloud_build_all_vars: BTreeMap::new(),
            cloud_build_version_vars: BTreeMap::new(),
            git_commit_id: commit.map(|id| id.to_hex()),
            git_commit_id_short: short_id,
            git_commit_date_ticks: date_ticks,
            public_release,
            version_file_found,
        };
        oracle.assembly_file_version = oracle.version.clone();
        oracle.cloud_build_all_vars = oracle.all_variables();
        if cloud_options.set_version_variables() {
            oracle.cloud_build_version_vars = oracle.version_variables();
        }
        Ok(oracle)
    }

    /// Every output as a `GITHEIGHT_`-prefixed variable, for CI export.
    fn all_variables(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        let mut set = |name: &str, value: String| {
            vars.insert(format!("GITHEIGHT_{name}"), value);
        };
        set("Version", self.version.clone());
        set("AssemblyVersion", self.assembly_version.clone());
        set("AssemblyFileVersion", self.assembly_file_version.clone());
        set(
            "AssemblyInformationalVersion",
            self.assembly_informational_version.clone(),
        );
        set("SimpleVersion", self.simple_version.clone());
        set("MajorMinorVersion", self.major_minor_version.clone());
        set("BuildNumber", self.build_number.to_string());
        set("VersionHeight", self.version_height.to_string());
        set("VersionHeightOffset", self.version_height_offset.to_string());
        set("PrereleaseVersion", self.prerelease_version.clone());
        set(
            "BuildMetadataFragment",
            self.build_metadata_fragment.clone(),
        );
        set("SemVer1", self.sem_ver1.clone());
        set("SemVer2", self.sem_ver2.clone());
        set("NuGetPackageVersion", self.nu_get_package_version.clone());
        set("NpmPackageVersion", self.npm_package_version.clone());
        set("PublicRelease", self.public_release.to_string());
        set("VersionFileFound", self.version_file_found.to_string());
        if let Some(id) = &self.git_commit_id {
            set("GitCommitId", id.clone());
        }
        if let Some(short) = &self.git_commit_id_short {
            set("GitCommitIdShort", short.clone());
        }
        if let Some(ticks) = self.git_commit_date_ticks {
            set("GitCommitDateTicks", ticks.to_string());
        }
        if let Some(number) = &self.cloud_build_number {
            set("CloudBuildNumber", number.clone());
        }
        vars
    }

    /// The conventional version variables build scripts consume.
    fn version_variables(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "GitAssemblyInformationalVersion".to_string(),
                self.assembly_informational_version.clone(),
            ),
            ("GitBuildVersion".to_string(), self.version.clone()),
            (
                "GitBuildVersionSimple".to_string(),
                self.simple_version.clone(),
            ),
            ("PublicRelease".to_string(), self.public_release.to_string()),
        ])
    }
}

struct Inputs {
    options: Rc<VersionOptions>,
    version: SemanticVersion,
    height: u32,
    offset_override: Option<i32>,
    commit: Option<ObjectId>,
    short_id: Option<String>,
    date_ticks: Option<i64>,
    public_release: bool,
    version_file_found: bool,
}

/// The project directory as a repo-relative forward-slash path.
fn repo_relative_dir(repo: &GitRepository, project_dir: &Path) -> String {
    let Some(work_dir) = repo.work_dir() else {
        return String::new();
    };
    let absolute = if project_dir.is_absolute() {
        project_dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(project_dir))
            .unwrap_or_else(|_| project_dir.to_path_buf())
    };
    let absolute = crate::git::repo::normalize(absolute);
    match absolute.strip_prefix(work_dir) {
        Ok(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => String::new(),
    }
}

/// Whether the building ref matches any of the descriptor's anchored
/// public-release patterns.
fn ref_matches_public_spec(options: &VersionOptions, building_ref: &str) -> Result<bool> {
    let Some(patterns) = &options.public_release_ref_spec else {
        return Ok(false);
    };
    for pattern in patterns {
        if Regex::new(pattern)?.is_match(building_ref) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn short_commit_id(repo: &GitRepository, id: &ObjectId, options: &VersionOptions) -> String {
    let auto_minimum = options.git_commit_id_short_auto_minimum();
    if auto_minimum > 0 {
        repo.unique_abbreviation(id, auto_minimum)
    } else {
        let fixed = options.git_commit_id_short_fixed_length().clamp(4, 40);
        id.to_hex()[..fixed].to_string()
    }
}

/// SemVer 1 rendering: prerelease identifiers keep `-` separators, numeric
/// identifiers gain fixed-width zero padding (so lexical ordering matches
/// numeric ordering), and the metadata segment is absorbed with `-`
/// separators.
fn semver1_string(
    base: &str,
    prerelease: &str,
    metadata_identifiers: &[String],
    padding: usize,
) -> String {
    let mut out = base.to_string();
    for identifier in prerelease.split('.').filter(|s| !s.is_empty()) {
        out.push('-');
        if identifier.bytes().all(|b| b.is_ascii_digit()) {
            out.push_str(&format!("{:0>padding$}", identifier));
        } else {
            out.push_str(identifier);
        }
    }
    for identifier in metadata_identifiers {
        out.push('-');
        out.push_str(identifier);
    }
    out
}

/// `AssemblyVersion`: the declared assembly version (or the main version),
/// zeroed beyond the configured precision, always four components.
fn assembly_version_string(
    options: &VersionOptions,
    version: &SemanticVersion,
    build_component: u16,
    revision_component: u16,
) -> String {
    let declared = options
        .assembly_version
        .as_ref()
        .and_then(|av| av.version().cloned());
    let (major, minor, build, revision) = match &declared {
        Some(assembly) => (
            assembly.major,
            assembly.minor,
            assembly.build.unwrap_or(0),
            assembly.revision.unwrap_or(0),
        ),
        None => (
            version.major,
            version.minor,
            build_component,
            revision_component,
        ),
    };

    let precision = options.assembly_precision();
    let minor = if precision >= VersionPrecision::Minor { minor } else { 0 };
    let build = if precision >= VersionPrecision::Build { build } else { 0 };
    let revision = if precision >= VersionPrecision::Revision {
        revision
    } else {
        0
    };
    format!("{major}.{minor}.{build}.{revision}")
}

fn base_by_precision(
    major: u16,
    minor: u16,
    build: u16,
    revision: u16,
    precision: VersionPrecision,
) -> String {
    match precision {
        VersionPrecision::Major => format!("{major}"),
        VersionPrecision::Minor => format!("{major}.{minor}"),
        VersionPrecision::Build => format!("{major}.{minor}.{build}"),
        VersionPrecision::Revision => format!("{major}.{minor}.{build}.{revision}"),
    }
}
