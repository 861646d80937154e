//! Version representation and height-reset rules.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{GitHeightError, Result};

/// Highest value a numeric version component may hold. `0xFFFF` is reserved
/// (historical PE-header constraint).
pub const MAX_COMPONENT: u16 = 0xFFFE;

/// Placeholder substituted with the computed height at emit time.
pub const HEIGHT_TOKEN: &str = "{height}";

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // SemVer 2.0.0, extended with up to four numeric components and the
    // {height} placeholder as a legal identifier fragment.
    Regex::new(
        r"(?x)^
        (?P<major>0|[1-9]\d*)\.(?P<minor>0|[1-9]\d*)
        (?:\.(?P<build>0|[1-9]\d*))?
        (?:\.(?P<revision>0|[1-9]\d*))?
        (?:-(?P<prerelease>[0-9A-Za-z\-\.\{\}]+))?
        (?:\+(?P<metadata>[0-9A-Za-z\-\.\{\}]+))?
        $",
    )
    .expect("static pattern compiles")
});

/// Where the height or commit id lands in the emitted version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemVerPosition {
    Build,
    Revision,
    Prerelease,
}

/// A declared semantic version: two to four numeric components, optional
/// prerelease and build metadata, either of which may embed `{height}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticVersion {
    pub major: u16,
    pub minor: u16,
    pub build: Option<u16>,
    pub revision: Option<u16>,
    /// Prerelease identifiers joined with `.`, without the leading `-`.
    pub prerelease: String,
    /// Build metadata identifiers joined with `.`, without the leading `+`.
    pub build_metadata: String,
}

impl SemanticVersion {
    pub fn new(major: u16, minor: u16) -> Self {
        SemanticVersion {
            major,
            minor,
            build: None,
            revision: None,
            prerelease: String::new(),
            build_metadata: String::new(),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let captures = VERSION_PATTERN
            .captures(text.trim())
            .ok_or_else(|| GitHeightError::InvalidSemver(text.to_string()))?;

        let component = |name: &str| -> Result<Option<u16>> {
            match captures.name(name) {
                None => Ok(None),
                Some(m) => {
                    let value: u32 = m
                        .as_str()
                        .parse()
                        .map_err(|_| GitHeightError::InvalidSemver(text.to_string()))?;
                    if value > MAX_COMPONENT as u32 {
                        return Err(GitHeightError::InvalidSemver(format!(
                            "{text}: component {value} exceeds {MAX_COMPONENT}"
                        )));
                    }
                    Ok(Some(value as u16))
                }
            }
        };

        let version = SemanticVersion {
            major: component("major")?.expect("pattern requires major"),
            minor: component("minor")?.expect("pattern requires minor"),
            build: component("build")?,
            revision: component("revision")?,
            prerelease: captures
                .name("prerelease")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            build_metadata: captures
                .name("metadata")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        };
        version.validate_identifiers(text)?;
        Ok(version)
    }

    /// Identifier-level checks the coarse pattern cannot express: empty
    /// identifiers and braces anywhere but in the exact `{height}` token.
    fn validate_identifiers(&self, original: &str) -> Result<()> {
        for section in [&self.prerelease, &self.build_metadata] {
            if section.is_empty() {
                continue;
            }
            for identifier in section.split('.') {
                let stripped = identifier.replace(HEIGHT_TOKEN, "");
                if identifier.is_empty() || stripped.contains(['{', '}']) {
                    return Err(GitHeightError::InvalidSemver(original.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Whether `{height}` appears in the prerelease.
    pub fn prerelease_carries_height(&self) -> bool {
        self.prerelease.contains(HEIGHT_TOKEN)
    }

    /// Where the computed height is encoded, per the declared components:
    /// a `{height}` prerelease wins, then the first unspecified numeric
    /// slot. Fully-specified versions carry no height.
    pub fn height_position(&self) -> Option<SemVerPosition> {
        if self.prerelease_carries_height() {
            Some(SemVerPosition::Prerelease)
        } else if self.build.is_none() {
            Some(SemVerPosition::Build)
        } else if self.revision.is_none() {
            Some(SemVerPosition::Revision)
        } else {
            None
        }
    }

    /// Where the truncated commit id is encoded: the revision slot, unless
    /// the height owns it or the declaration already fills it.
    pub fn commit_id_position(&self) -> Option<SemVerPosition> {
        if self.revision.is_some() || self.height_position() == Some(SemVerPosition::Revision) {
            None
        } else {
            Some(SemVerPosition::Revision)
        }
    }

    /// Whether replacing `self` (the version at a descendant) with `other`
    /// (the version at an ancestor) resets the version height. The
    /// comparison precision follows the height position: heights in the
    /// build component survive build/revision edits, heights in the
    /// revision component survive revision edits, and prerelease-encoded
    /// heights require the prerelease text to match too.
    pub fn will_height_reset(&self, other: &SemanticVersion) -> bool {
        let position = self.height_position();
        if position != other.height_position() {
            return true;
        }
        match position {
            Some(SemVerPosition::Build) => {
                self.major != other.major || self.minor != other.minor
            }
            Some(SemVerPosition::Revision) => {
                self.major != other.major
                    || self.minor != other.minor
                    || self.build != other.build
            }
            Some(SemVerPosition::Prerelease) => {
                self.major != other.major
                    || self.minor != other.minor
                    || self.build != other.build
                    || self.prerelease != other.prerelease
            }
            // No height slot: any numeric change is a new version line.
            None => {
                self.major != other.major
                    || self.minor != other.minor
                    || self.build != other.build
                    || self.revision != other.revision
            }
        }
    }

    /// The prerelease with `{height}` substituted.
    pub fn prerelease_with_height(&self, height: u32) -> String {
        self.prerelease.replace(HEIGHT_TOKEN, &height.to_string())
    }

    /// The build metadata with `{height}` substituted.
    pub fn metadata_with_height(&self, height: u32) -> String {
        self.build_metadata.replace(HEIGHT_TOKEN, &height.to_string())
    }

    /// Numeric-only view (`M.m[.b[.r]]`), used by assembly-version
    /// declarations.
    pub fn is_numeric_only(&self) -> bool {
        self.prerelease.is_empty() && self.build_metadata.is_empty()
    }

    /// Comparable form for a fully-substituted version, for SemVer-correct
    /// ordering through the `semver` crate.
    pub fn to_semver(&self, height: u32) -> Result<semver::Version> {
        let mut version = semver::Version::new(
            self.major as u64,
            self.minor as u64,
            self.build.unwrap_or(0) as u64,
        );
        let prerelease = self.prerelease_with_height(height);
        if !prerelease.is_empty() {
            version.pre = semver::Prerelease::new(&prerelease)?;
        }
        let metadata = self.metadata_with_height(height);
        if !metadata.is_empty() {
            version.build = semver::BuildMetadata::new(&metadata)?;
        }
        Ok(version)
    }
}

impl std::fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(build) = self.build {
            write!(f, ".{build}")?;
        }
        if let Some(revision) = self.revision {
            write!(f, ".{revision}")?;
        }
        if !self.prerelease.is_empty() {
            write!(f, "-{}", self.prerelease)?;
        }
        if !self.build_metadata.is_empty() {
            write!(f, "+{}", self.build_metadata)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for SemanticVersion {
    type Err = GitHeightError;

    fn from_str(s: &str) -> Result<Self> {
        SemanticVersion::parse(s)
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        SemanticVersion::parse(&text).map_err(serde::de::Error::custom)
    }
}
