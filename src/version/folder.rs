// src/version/folder.rs

//! Folder-name version grammar
//!
//! Modules are usually shipped under a directory named after their version,
//! e.g. `.../acme-core/1.4.2/acme.core.dll` or `.../api/2.0-snapshot/api.dll`.
//! A folder name matches when it starts with `<digits>.<digits_or_underscore>...`;
//! the numeric core maps onto up to four components (extra ones truncated,
//! missing ones zero). Anything after the core, minus leading dashes, is the
//! tail, which must be recognised by one of the configured snapshot patterns.

use super::{NumericVersion, SemanticVersion};
use crate::error::Result;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static FOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<core>[0-9]+\.[0-9_.]+)-*(?P<tail>.*)$").unwrap());

/// Marker prepended to tails that start with a digit
const NUMERIC_TAIL_MARKER: &str = "v-";

/// Result of parsing a version-like folder name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderVersion {
    pub version: NumericVersion,
    pub is_snapshot: bool,
    /// Build qualifier captured from the tail
    pub build: Option<String>,
}

impl FolderVersion {
    /// Build the semantic version for this folder
    ///
    /// Snapshots carry `label` (or `label-build`) as their special tag.
    pub fn to_semantic(&self, label: &str) -> Result<SemanticVersion> {
        if !self.is_snapshot {
            return Ok(SemanticVersion::release(self.version));
        }

        match self.build {
            Some(ref build) => {
                SemanticVersion::with_special(self.version, &format!("{}-{}", label, build))
            }
            None => SemanticVersion::with_special(self.version, label),
        }
    }
}

/// Parse a single folder name against the given tail patterns
///
/// Returns `None` when the name does not look like a version or when its
/// tail is not recognised by any pattern.
pub fn parse_folder_name<'a, I>(name: &str, patterns: I) -> Option<FolderVersion>
where
    I: IntoIterator<Item = &'a Regex>,
{
    let name = name.to_ascii_lowercase();
    let caps = FOLDER_RE.captures(&name)?;
    let core = caps.name("core").map(|m| m.as_str()).unwrap_or_default();
    let tail = caps.name("tail").map(|m| m.as_str()).unwrap_or_default();

    let (is_snapshot, build) = match parse_tail(tail, patterns) {
        Some(parsed) => parsed,
        None => {
            debug!("Unrecognised version tail '{}' in folder '{}'", tail, name);
            return None;
        }
    };

    Some(FolderVersion {
        version: parse_core(core),
        is_snapshot,
        build,
    })
}

/// Map `1.2_3.4.5` style cores onto four components
///
/// Unparseable components become zero.
fn parse_core(core: &str) -> NumericVersion {
    let mut components = [0u64; 4];
    for (slot, part) in components
        .iter_mut()
        .zip(core.split(['.', '_', '-']))
    {
        *slot = part.parse::<u64>().unwrap_or(0);
    }
    NumericVersion::new(components[0], components[1], components[2], components[3])
}

/// Match a tail against the snapshot patterns
///
/// An empty tail is a plain release. Otherwise the tail is normalised (a
/// leading digit gets a marker prefix, dots become dashes) and the first
/// matching pattern decides the snapshot flag and build qualifier.
fn parse_tail<'a, I>(tail: &str, patterns: I) -> Option<(bool, Option<String>)>
where
    I: IntoIterator<Item = &'a Regex>,
{
    if tail.trim().is_empty() {
        return Some((false, None));
    }

    let mut normalized = if tail.starts_with(|c: char| c.is_ascii_digit()) {
        format!("{}{}", NUMERIC_TAIL_MARKER, tail)
    } else {
        tail.to_string()
    };
    normalized = normalized.replace('.', "-");

    for pattern in patterns {
        if let Some(caps) = pattern.captures(&normalized) {
            debug!("Special version '{}' matches pattern {}", normalized, pattern);
            let build = caps.name("build").map(|m| m.as_str().to_string());
            let is_snapshot = caps.name("snapshot").is_some();
            return Some((is_snapshot, build));
        }
    }

    None
}
