// src/version/mod.rs

//! Version handling for modules and packages
//!
//! Two version shapes flow through the system:
//! - [`NumericVersion`]: the four-component version a module declares about
//!   itself (`major.minor.patch.build`). This is the "raw" version and the key
//!   of the conflict set.
//! - [`SemanticVersion`]: a numeric core plus an optional pre-release
//!   ("special") tag. This is the version part of an artifact identity.
//!
//! Special tags are stored lowercase so that `1.0.0.0-SNAPSHOT` and
//! `1.0.0.0-snapshot` name the same package, matching how package indexes
//! normalise ids and versions.

mod folder;
mod resolver;

pub use folder::{parse_folder_name, FolderVersion};
pub use resolver::{CanonicalVersion, VersionResolver};

use crate::error::{Error, Result};
use semver::Prerelease;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A four-component numeric version (`major.minor.patch.build`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NumericVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub build: u64,
}

impl NumericVersion {
    /// The all-zero sentinel some modules ship with
    pub const ZERO: NumericVersion = NumericVersion::new(0, 0, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64, build: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }

    /// Parse a dotted version with two to four components
    ///
    /// Examples:
    /// - "1.2" → 1.2.0.0
    /// - "1.2.3" → 1.2.3.0
    /// - "1.2.3.4" → 1.2.3.4
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(Error::ParseError(format!(
                "Expected 2 to 4 version components in '{}'",
                s
            )));
        }

        let mut components = [0u64; 4];
        for (slot, part) in components.iter_mut().zip(&parts) {
            *slot = part.parse::<u64>().map_err(|e| {
                Error::ParseError(format!("Invalid version component in '{}': {}", s, e))
            })?;
        }

        Ok(Self::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Same major, minor and patch (build number ignored)
    pub fn same_patch(&self, other: &NumericVersion) -> bool {
        self.major == other.major && self.minor == other.minor && self.patch == other.patch
    }

    /// Same major and minor (patch and build ignored)
    pub fn same_minor(&self, other: &NumericVersion) -> bool {
        self.major == other.major && self.minor == other.minor
    }
}

impl fmt::Display for NumericVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.build
        )
    }
}

impl FromStr for NumericVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A numeric version with an optional pre-release tag
///
/// Ordering compares the numeric core first. For equal cores a version
/// without a special tag is greater than any version carrying one, so a
/// release always sorts after its snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemanticVersion {
    pub version: NumericVersion,
    pub special: Option<Prerelease>,
}

impl SemanticVersion {
    /// A release version (no special tag)
    pub fn release(version: NumericVersion) -> Self {
        Self {
            version,
            special: None,
        }
    }

    /// A version carrying a special tag
    ///
    /// An empty tag yields a release version.
    pub fn with_special(version: NumericVersion, special: &str) -> Result<Self> {
        let special = special.trim();
        if special.is_empty() {
            return Ok(Self::release(version));
        }

        let tag = Prerelease::new(&special.to_ascii_lowercase()).map_err(|e| {
            Error::ParseError(format!("Invalid special version '{}': {}", special, e))
        })?;

        Ok(Self {
            version,
            special: Some(tag),
        })
    }

    /// Parse `major.minor[.patch[.build]][-special]`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('-') {
            Some((core, special)) => Self::with_special(NumericVersion::parse(core)?, special),
            None => Ok(Self::release(NumericVersion::parse(s)?)),
        }
    }

    /// A snapshot is any version with a special tag
    pub fn is_snapshot(&self) -> bool {
        self.special.is_some()
    }

    pub fn special_str(&self) -> Option<&str> {
        self.special.as_ref().map(|p| p.as_str())
    }
}

impl From<NumericVersion> for SemanticVersion {
    fn from(version: NumericVersion) -> Self {
        Self::release(version)
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.version.cmp(&other.version) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match (&self.special, &other.special) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)?;
        if let Some(ref special) = self.special {
            write!(f, "-{}", special)?;
        }
        Ok(())
    }
}

impl FromStr for SemanticVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
