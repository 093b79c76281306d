use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An on-disk layout version, ordered numerically field by field.
///
/// Serialized as a `"major.minor.patch"` string in metadata files and
/// JSON reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LayoutVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

/// The layout version this build of the tool scaffolds and upgrades to.
pub const CURRENT_VERSION: LayoutVersion = LayoutVersion::new(0, 4, 0);

/// The earliest layout any released scaffold produced.
pub const EARLIEST_VERSION: LayoutVersion = LayoutVersion::new(0, 1, 0);

impl LayoutVersion {
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for LayoutVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for LayoutVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, '.');
        let mut next = || -> Result<u16, Error> {
            parts
                .next()
                .ok_or_else(|| Error::InvalidVersion { value: s.into() })?
                .parse()
                .map_err(|_| Error::InvalidVersion { value: s.into() })
        };
        let major = next()?;
        let minor = next()?;
        let patch = next()?;
        Ok(Self::new(major, minor, patch))
    }
}

impl TryFrom<String> for LayoutVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LayoutVersion> for String {
    fn from(v: LayoutVersion) -> Self {
        v.to_string()
    }
}
