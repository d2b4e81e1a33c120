// src/assembler/manifest.rs
//! JSON package manifests
//!
//! Each package is a single `<id>.<version>.json` file in the output
//! directory. The file name follows the layout [`DirectoryIndex`] reads, so
//! an output directory can serve as the package index of a later run.
//!
//! [`DirectoryIndex`]: crate::repository::DirectoryIndex

use super::{PackageAssembler, PackageSpec};
use crate::cache::ArtifactIdentity;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Sibling files shipped next to the module when present
const SIBLING_EXTENSIONS: &[&str] = &["pdb", "xml"];

/// Root structure of a package manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub id: String,
    pub version: String,
    /// Id of the artifact this package was built from
    pub origin: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub owners: String,
    pub description: String,
    pub platform: String,
    #[serde(default)]
    pub dependencies: Vec<ManifestDependency>,
    #[serde(default)]
    pub files: Vec<PackageFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestDependency {
    pub id: String,
    /// Minimum accepted version
    pub version: String,
}

/// A file copied into the package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageFile {
    pub source: PathBuf,
    pub target: String,
}

impl PackageManifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::ParseError(format!("Invalid package manifest {}: {}", path.display(), e)))
    }
}

/// Writes one JSON manifest per package id into an output directory
pub struct ManifestAssembler {
    output: PathBuf,
    authors: String,
    owners: String,
}

impl ManifestAssembler {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            authors: String::new(),
            owners: String::new(),
        }
    }

    pub fn with_authors(mut self, authors: impl Into<String>, owners: impl Into<String>) -> Self {
        self.authors = authors.into();
        self.owners = owners.into();
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn manifest_path(&self, id: &str, version: &str) -> PathBuf {
        self.output.join(format!("{}.{}.json", id, version))
    }

    fn files(spec: &PackageSpec) -> Vec<PackageFile> {
        let target_dir = format!("lib/{}", spec.platform);
        let mut files = vec![package_file(&spec.path, &target_dir)];
        for extension in SIBLING_EXTENSIONS {
            let sibling = spec.path.with_extension(extension);
            if sibling != spec.path && sibling.is_file() {
                files.push(package_file(&sibling, &target_dir));
            }
        }
        files
    }

    fn manifest(&self, spec: &PackageSpec, id: &str) -> PackageManifest {
        PackageManifest {
            id: id.to_string(),
            version: spec.identity.version.to_string(),
            origin: spec.identity.name.clone(),
            authors: self.authors.clone(),
            owners: self.owners.clone(),
            description: format!("{} {}", spec.identity.name, spec.identity.version),
            platform: spec.platform.clone(),
            dependencies: spec
                .dependencies
                .iter()
                .map(|d| ManifestDependency {
                    id: d.name.clone(),
                    version: d.min_version.to_string(),
                })
                .collect(),
            files: Self::files(spec),
        }
    }

    fn write(&self, manifest: &PackageManifest) -> Result<PathBuf> {
        let path = self.manifest_path(&manifest.id, &manifest.version);
        let content = serde_json::to_string_pretty(manifest)
            .map_err(|e| Error::ParseError(format!("Failed to serialize {}: {}", path.display(), e)))?;
        fs::write(&path, content)?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }
}

fn package_file(path: &Path, target_dir: &str) -> PackageFile {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    PackageFile {
        source: path.to_path_buf(),
        target: format!("{}/{}", target_dir, name),
    }
}

impl PackageAssembler for ManifestAssembler {
    fn exists(&self, identity: &ArtifactIdentity) -> bool {
        self.manifest_path(&identity.name, &identity.version.to_string())
            .is_file()
    }

    fn assemble(&self, spec: &PackageSpec) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.output)?;

        let mut written = Vec::new();
        written.push(self.write(&self.manifest(spec, &spec.identity.name))?);
        for id in &spec.extra_ids {
            info!("{} also published as {}", spec.identity, id);
            written.push(self.write(&self.manifest(spec, id))?);
        }
        Ok(written)
    }

    fn remove(&self, identity: &ArtifactIdentity) -> Result<()> {
        if !self.output.is_dir() {
            return Ok(());
        }

        let suffix = format!(".{}.json", identity.version).to_lowercase();
        for entry in fs::read_dir(&self.output)? {
            let path = entry?.path();
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if !file_name.ends_with(&suffix) {
                continue;
            }
            match PackageManifest::from_file(&path) {
                Ok(manifest) if manifest.origin.eq_ignore_ascii_case(&identity.name) => {
                    fs::remove_file(&path)?;
                    debug!("Removed {}", path.display());
                }
                Ok(_) => {}
                Err(e) => warn!("{}", e),
            }
        }
        Ok(())
    }
}
