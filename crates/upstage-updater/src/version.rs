//! Version parsing for feed documents.
//!
//! Feeds publish NuGet-style short versions such as `1.2` or `1.2-beta`.
//! These are accepted by padding the missing components with zero.

use semver::Version;

use crate::error::UpdateError;

/// Parse a version, accepting one- and two-component forms.
pub fn parse_version(input: &str) -> Result<Version, UpdateError> {
    let input = input.trim();
    if let Ok(version) = Version::parse(input) {
        return Ok(version);
    }

    let split = input.find(['-', '+']).unwrap_or(input.len());
    let (core, suffix) = input.split_at(split);

    let components: Vec<&str> = core.split('.').collect();
    if components.len() > 3 || components.iter().any(|c| c.is_empty()) {
        return Err(UpdateError::VersionParseError(format!(
            "'{}' is not a semantic version",
            input
        )));
    }

    let mut padded = components;
    while padded.len() < 3 {
        padded.push("0");
    }

    Ok(Version::parse(&format!("{}{}", padded.join("."), suffix))?)
}

/// Whether the version carries a prerelease label.
pub fn is_prerelease(version: &Version) -> bool {
    !version.pre.is_empty()
}

/// Serde adapter that reads versions leniently and writes them normalized.
pub mod lenient {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(version: &Version, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(version)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Version, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_version(&raw).map_err(serde::de::Error::custom)
    }
}
