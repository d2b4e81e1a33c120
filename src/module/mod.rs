// src/module/mod.rs

//! Binary module inspection
//!
//! This module provides the capabilities the resolution engines consume
//! without knowing any binary format:
//! - [`MetadataReader`]: name, declared version, platform and references
//! - [`ApiAnalyzer`]: public API diffs between two builds and usage of a diff
//!   by a dependent module
//! - [`SharedLibraryClassifier`]: references to host-provided libraries that
//!   are never tracked as dependencies
//!
//! [`ModuleReader`] implements the first two over two formats: sidecar
//! `<file>.module.toml` descriptors and ELF shared objects.

mod elf;
mod manifest;
mod shared;

pub use elf::ElfModule;
pub use manifest::{sidecar_path, ModuleManifest, SIDECAR_SUFFIX};
pub use shared::{HostLibraryRegistry, SharedLibraryClassifier};

use crate::error::{Error, Result};
use crate::version::NumericVersion;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

/// One declared dependency of a module on another by nominal version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceEdge {
    pub name: String,
    pub version: NumericVersion,
    /// Full descriptor string as written in the module, if any
    pub descriptor: Option<String>,
}

impl ReferenceEdge {
    pub fn new(name: impl Into<String>, version: NumericVersion) -> Self {
        Self {
            name: name.into(),
            version,
            descriptor: None,
        }
    }

    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.descriptor = Some(descriptor.into());
        self
    }

    /// Descriptor used for shared-library classification
    pub fn classification_key(&self) -> &str {
        self.descriptor.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for ReferenceEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// Structural metadata of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMetadata {
    pub name: String,
    pub version: NumericVersion,
    /// Target platform tag, e.g. `net40` or `x86_64`
    pub platform: String,
    pub references: Vec<ReferenceEdge>,
}

/// Reads structural metadata out of a module file
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<ModuleMetadata>;
}

/// Externally visible API of a module
///
/// Exports map a symbol (`Type` or `Type::member`) to its signature.
/// Imports are the symbols the module consumes from its dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiSurface {
    pub exports: BTreeMap<String, String>,
    pub imports: BTreeSet<String>,
}

impl ApiSurface {
    /// Structural diff from `self` (older) to `newer`
    pub fn diff(&self, newer: &ApiSurface) -> ApiDiff {
        let mut diff = ApiDiff::default();
        for (symbol, signature) in &newer.exports {
            match self.exports.get(symbol) {
                None => {
                    diff.added.insert(symbol.clone());
                }
                Some(old) if old != signature => {
                    diff.changed.insert(symbol.clone());
                }
                Some(_) => {}
            }
        }
        for symbol in self.exports.keys() {
            if !newer.exports.contains_key(symbol) {
                diff.removed.insert(symbol.clone());
            }
        }
        diff
    }

    /// Whether this module consumes any added or changed symbol of `diff`
    ///
    /// Importing a member of an added or changed type counts as usage.
    pub fn uses(&self, diff: &ApiDiff) -> bool {
        diff.added.iter().chain(&diff.changed).any(|symbol| {
            let member_prefix = format!("{}::", symbol);
            self.imports
                .iter()
                .any(|import| import == symbol || import.starts_with(&member_prefix))
        })
    }
}

/// Added, removed and changed externally visible symbols
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub changed: BTreeSet<String>,
}

impl ApiDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Public API comparison and usage analysis
pub trait ApiAnalyzer: Send + Sync {
    /// Diff the public API of `old` against `new`
    fn diff(&self, old: &Path, new: &Path) -> Result<ApiDiff>;

    /// Whether the module at `consumer` uses the added or changed surface
    fn uses(&self, consumer: &Path, diff: &ApiDiff) -> Result<bool>;
}

/// Format-dispatching reader
///
/// A sidecar descriptor takes precedence; otherwise the file itself must be
/// an ELF shared object.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleReader;

impl ModuleReader {
    pub fn new() -> Self {
        Self
    }

    fn surface(&self, path: &Path) -> Result<ApiSurface> {
        let sidecar = sidecar_path(path);
        if sidecar.is_file() {
            return Ok(ModuleManifest::load(&sidecar)?.surface());
        }
        Ok(ElfModule::load(path)?.surface)
    }
}

impl MetadataReader for ModuleReader {
    fn read(&self, path: &Path) -> Result<ModuleMetadata> {
        let sidecar = sidecar_path(path);
        if sidecar.is_file() {
            return ModuleManifest::load(&sidecar)?.metadata();
        }
        Ok(ElfModule::load(path)?.metadata)
    }
}

impl ApiAnalyzer for ModuleReader {
    fn diff(&self, old: &Path, new: &Path) -> Result<ApiDiff> {
        let old_surface = self.surface(old).map_err(analysis_error)?;
        let new_surface = self.surface(new).map_err(analysis_error)?;
        Ok(old_surface.diff(&new_surface))
    }

    fn uses(&self, consumer: &Path, diff: &ApiDiff) -> Result<bool> {
        Ok(self.surface(consumer).map_err(analysis_error)?.uses(diff))
    }
}

/// Module name a file name implies, lowercased
///
/// Shared objects are named up to `.so`, everything else by its stem.
pub fn module_stem(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_string_lossy().to_lowercase();
    if let Some(name) = file_name.strip_suffix(".so") {
        return Some(name.to_string());
    }
    if let Some(idx) = file_name.find(".so.") {
        return Some(file_name[..idx].to_string());
    }
    let stem = path.file_stem()?.to_string_lossy().to_lowercase();
    Some(stem)
}

fn analysis_error(err: Error) -> Error {
    match err {
        Error::AnalysisError(_) => err,
        other => Error::AnalysisError(other.to_string()),
    }
}
