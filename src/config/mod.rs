// src/config/mod.rs

//! Per-directory configuration
//!
//! A `modpack.toml` file may sit in any directory of the module tree. The
//! configuration that applies to a module is the merge of every such file
//! from the module's directory up to the filesystem root, the nearest file
//! taking precedence.
//!
//! ```toml
//! [global]
//! ignore = false
//! snapshot_label = "snapshot"
//!
//! [dependencies.mapping]
//! "Newtonsoft.Json|9.0.1" = "^json\\.net\\..*"
//!
//! [snapshot.mapping]
//! plain = "^(?P<snapshot>snapshot)(-(?P<build>.+))?$"
//!
//! [package.mapping]
//! "Contoso" = "^(?P<rename>Acme)\\..*"
//!
//! [dependencies.circular]
//! jaxen = "jdom|1.0"
//! ```

mod reader;
mod resolver;

pub use reader::{read_file, CONFIG_FILE_NAME};
#[cfg(test)]
pub(crate) use reader::parse_str;
pub use resolver::{ConfigurationResolver, DirectoryConfigResolver};

use crate::version::SemanticVersion;
use regex::Regex;

/// Default special tag for folder-derived snapshots
pub const DEFAULT_SNAPSHOT_LABEL: &str = "snapshot";

/// A keyed regular expression from one of the mapping tables
#[derive(Debug, Clone)]
pub struct NamedPattern {
    pub key: String,
    pub regex: Regex,
}

impl NamedPattern {
    fn same_as(&self, other: &NamedPattern) -> bool {
        self.key == other.key && self.regex.as_str() == other.regex.as_str()
    }
}

/// Manual override binding matching references to a package identity
#[derive(Debug, Clone)]
pub struct PackageMapping {
    /// Package id to bind to
    pub package: String,
    /// Version to bind to; the requested version when absent
    pub version: Option<SemanticVersion>,
    /// Matched against `name.version` of the reference
    pub regex: Regex,
}

impl PackageMapping {
    fn same_as(&self, other: &PackageMapping) -> bool {
        self.package == other.package
            && self.version == other.version
            && self.regex.as_str() == other.regex.as_str()
    }
}

/// Declared cycle `from -> to`, re-projected one level up at `min_version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircularEdge {
    pub from: String,
    pub to: String,
    pub min_version: SemanticVersion,
}

/// Merged configuration for one directory scope
#[derive(Debug, Clone)]
pub struct Configuration {
    pub ignore: bool,
    pub snapshot_label: String,
    pub mappings: Vec<PackageMapping>,
    pub snapshot_patterns: Vec<NamedPattern>,
    pub package_renames: Vec<NamedPattern>,
    pub circular: Vec<CircularEdge>,
    /// Whether a file set `snapshot_label` explicitly
    label_is_explicit: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            ignore: false,
            snapshot_label: DEFAULT_SNAPSHOT_LABEL.to_string(),
            mappings: Vec::new(),
            snapshot_patterns: Vec::new(),
            package_renames: Vec::new(),
            circular: Vec::new(),
            label_is_explicit: false,
        }
    }
}

impl Configuration {
    pub(crate) fn set_snapshot_label(&mut self, label: String) {
        self.snapshot_label = label;
        self.label_is_explicit = true;
    }

    /// Merge a child scope over its parent
    ///
    /// Ignore flags are OR-ed. Ordered lists keep the child's entries first,
    /// followed by parent entries the child does not already have. The
    /// nearest explicit snapshot label wins.
    pub fn merge(child: &Configuration, parent: &Configuration) -> Configuration {
        let mut merged = child.clone();
        merged.ignore = child.ignore || parent.ignore;

        if !child.label_is_explicit && parent.label_is_explicit {
            merged.snapshot_label = parent.snapshot_label.clone();
            merged.label_is_explicit = true;
        }

        for mapping in &parent.mappings {
            if !merged.mappings.iter().any(|m| m.same_as(mapping)) {
                merged.mappings.push(mapping.clone());
            }
        }
        for pattern in &parent.snapshot_patterns {
            if !merged.snapshot_patterns.iter().any(|p| p.same_as(pattern)) {
                merged.snapshot_patterns.push(pattern.clone());
            }
        }
        for pattern in &parent.package_renames {
            if !merged.package_renames.iter().any(|p| p.same_as(pattern)) {
                merged.package_renames.push(pattern.clone());
            }
        }
        for edge in &parent.circular {
            if !merged.circular.contains(edge) {
                merged.circular.push(edge.clone());
            }
        }

        merged
    }

    /// Snapshot tail patterns in priority order
    pub fn snapshot_regexes(&self) -> impl Iterator<Item = &Regex> {
        self.snapshot_patterns.iter().map(|p| &p.regex)
    }

    /// First manual mapping matching `name.version`
    pub fn find_mapping(&self, name: &str, version: &str) -> Option<&PackageMapping> {
        let subject = format!("{}.{}", name, version);
        self.mappings.iter().find(|m| m.regex.is_match(&subject))
    }

    /// Whether `dependency` is declared circular for `package`, ignoring case
    pub fn is_circular(&self, package: &str, dependency: &str) -> bool {
        self.circular
            .iter()
            .any(|edge| edge.from.eq_ignore_ascii_case(package) && edge.to.eq_ignore_ascii_case(dependency))
    }

    /// Circular edge starting at `from`
    pub fn circular_from(&self, from: &str) -> impl Iterator<Item = &CircularEdge> {
        self.circular
            .iter()
            .filter(move |edge| edge.from.eq_ignore_ascii_case(from))
    }

    /// Extra package ids derived from the rename patterns
    ///
    /// The `rename` group of a matching pattern (or the whole match) is
    /// replaced by the pattern's key.
    pub fn renamed_ids(&self, package: &str) -> Vec<String> {
        let mut ids = Vec::new();
        for pattern in &self.package_renames {
            let Some(caps) = pattern.regex.captures(package) else {
                continue;
            };
            let Some(matched) = caps.name("rename").or_else(|| caps.get(0)) else {
                continue;
            };
            if matched.as_str().is_empty() {
                continue;
            }
            let renamed = format!(
                "{}{}{}",
                &package[..matched.start()],
                pattern.key,
                &package[matched.end()..]
            );
            if renamed != package && !ids.contains(&renamed) {
                ids.push(renamed);
            }
        }
        ids
    }
}
