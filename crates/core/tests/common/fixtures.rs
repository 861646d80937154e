//! Shared descriptor fixtures for githeight tests

/// The descriptor most scenario tests build on: height in the build
/// component, commit id in the revision component.
pub const SIMPLE_DESCRIPTOR: &str = r#"{"version": "1.0-beta"}"#;

/// Same version line, bumped minor. Replacing [`SIMPLE_DESCRIPTOR`] with
/// this resets the version height.
#[allow(dead_code)]
pub const BUMPED_DESCRIPTOR: &str = r#"{"version": "1.1-beta"}"#;

/// A descriptor scoped to its own directory, for monorepo layouts.
#[allow(dead_code)]
pub const PROJECT_SCOPED_DESCRIPTOR: &str = r#"{
    "version": "1.0-alpha",
    "pathFilters": ["."]
}"#;

/// Marks main as the public-release branch.
#[allow(dead_code)]
pub const PUBLIC_MAIN_DESCRIPTOR: &str = r#"{
    "version": "1.0-beta",
    "publicReleaseRefSpec": ["^refs/heads/main$"]
}"#;

/// The expected short commit id fragment for a full hex id, at the default
/// fixed length of ten.
pub fn short_id(full_hex: &str) -> String {
    full_hex[..10].to_string()
}

/// The big-endian 16-bit truncation of a full hex id, as it appears in the
/// revision component.
pub fn revision_of(full_hex: &str) -> u16 {
    u16::from_str_radix(&full_hex[..4], 16).unwrap().min(0xFFFE)
}
