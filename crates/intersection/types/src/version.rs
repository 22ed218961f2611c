//! Semantic versions for contract history

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// A contract version in `MAJOR.MINOR.PATCH` form.
///
/// Ordering is numeric per component, so `1.10.0 > 1.9.0`. Serialized as
/// the dotted string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl ContractVersion {
    /// The version every intersection starts at
    pub const INITIAL: ContractVersion = ContractVersion {
        major: 1,
        minor: 0,
        patch: 0,
    };

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn bump_major(&self) -> Self {
        Self::new(self.major + 1, 0, 0)
    }

    pub fn bump_minor(&self) -> Self {
        Self::new(self.major, self.minor + 1, 0)
    }

    pub fn bump_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }
}

impl Default for ContractVersion {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl std::fmt::Display for ContractVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Error parsing a contract version string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid contract version '{0}': expected MAJOR.MINOR.PATCH")]
pub struct VersionParseError(pub String);

impl FromStr for ContractVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(VersionParseError(s.to_string()));
        }

        let parse = |part: &str| {
            part.parse::<u64>()
                .map_err(|_| VersionParseError(s.to_string()))
        };

        Ok(Self::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

impl TryFrom<String> for ContractVersion {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContractVersion> for String {
    fn from(version: ContractVersion) -> Self {
        version.to_string()
    }
}
