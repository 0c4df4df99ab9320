//! Semver range handling
//!
//! Dependency ranges use npm conventions, which differ from the `semver`
//! crate's cargo defaults in two ways this module papers over: a bare
//! version (`1.2.3`) means exact equality, and comparator sets are
//! space-separated (`>=1.0.0 <2.0.0`) rather than comma-separated.
//! Non-semver specifiers (git URLs, tarballs, tags, `file:` paths) are
//! detected and passed through as "assume compatible".

use semver::{Version, VersionReq};

use crate::error::PolicyError;

/// Parse and validate a semver version string
pub fn parse_version(version: &str) -> Result<Version, PolicyError> {
    Version::parse(version).map_err(|e| PolicyError::InvalidVersion {
        version: version.to_string(),
        reason: e.to_string(),
    })
}

/// Whether a specifier is a semver range at all.
///
/// Git, URL, tag, and path specifiers are legal in manifests but opaque
/// to version reconciliation.
pub fn is_semver_specifier(range: &str) -> bool {
    let range = range.trim();
    if range.is_empty() {
        return false;
    }
    if range.contains("://") || range.contains('/') {
        return false;
    }
    for prefix in ["git+", "git:", "file:", "link:", "npm:", "workspace:"] {
        if range.starts_with(prefix) {
            return false;
        }
    }
    // A dist-tag like "latest" or "next" has no digits at all
    range.chars().any(|c| c.is_ascii_digit()) || range == "*"
}

/// Parse an npm-style range into a `VersionReq`
pub fn parse_range(range: &str) -> Result<VersionReq, PolicyError> {
    let normalized = normalize(range);
    VersionReq::parse(&normalized).map_err(|e| PolicyError::InvalidVersion {
        version: range.to_string(),
        reason: e.to_string(),
    })
}

/// Does `version` satisfy the npm-style `range`?
pub fn satisfies(version: &Version, range: &str) -> Result<bool, PolicyError> {
    Ok(parse_range(range)?.matches(version))
}

fn normalize(range: &str) -> String {
    let range = range.trim();
    if range.is_empty() || range == "*" {
        return "*".to_string();
    }

    // Bare version means exact match under npm semantics
    if Version::parse(range).is_ok() {
        return format!("={range}");
    }

    // Space-separated comparators are an AND set
    if !range.contains(',') && range.contains(' ') {
        let parts: Vec<&str> = range.split_whitespace().collect();
        if parts.iter().all(|p| p.starts_with(['>', '<', '='])) {
            return parts.join(", ");
        }
    }

    range.to_string()
}

/// The lower bound of the next major release after `version`
pub fn next_major(version: &Version) -> Version {
    Version::new(version.major + 1, 0, 0)
}

/// The standard range emitted for a bumped package: `>=V <NEXT_MAJOR`
pub fn bumped_range(version: &Version) -> String {
    format!(">={} <{}", version, next_major(version))
}
