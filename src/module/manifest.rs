// src/module/manifest.rs
//! Sidecar module descriptors
//!
//! A module file may be accompanied by `<file>.module.toml` describing what a
//! binary parser would otherwise extract:
//!
//! ```toml
//! name = "Acme.Core"
//! version = "1.2.0.0"
//! platform = "net40"
//!
//! [[references]]
//! name = "Acme.Util"
//! version = "1.0.0.0"
//! descriptor = "Acme.Util, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"
//!
//! [api]
//! imports = ["Acme.Util.Widget::Spin"]
//!
//! [api.exports]
//! "Acme.Core.Gear" = "class"
//! ```

use super::{ApiSurface, ModuleMetadata, ReferenceEdge};
use crate::error::{Error, Result};
use crate::version::NumericVersion;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Suffix appended to a module's file name to locate its descriptor
pub const SIDECAR_SUFFIX: &str = ".module.toml";

/// Descriptor path for a module file
pub fn sidecar_path(module: &Path) -> PathBuf {
    let mut name = module
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(SIDECAR_SUFFIX);
    module.with_file_name(name)
}

/// Root structure of a `.module.toml` descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub name: String,
    pub version: String,

    #[serde(default)]
    pub platform: String,

    #[serde(default)]
    pub references: Vec<ManifestReference>,

    #[serde(default)]
    pub api: ManifestApi,

    #[serde(skip)]
    origin: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestReference {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestApi {
    #[serde(default)]
    pub exports: BTreeMap<String, String>,
    #[serde(default)]
    pub imports: BTreeSet<String>,
}

impl ModuleManifest {
    /// Load a descriptor from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| read_error(path, e))?;
        let mut manifest: ModuleManifest =
            toml::from_str(&content).map_err(|e| read_error(path, e))?;
        if manifest.name.trim().is_empty() {
            return Err(read_error(path, "missing module name"));
        }
        manifest.origin = path.to_path_buf();
        Ok(manifest)
    }

    /// Structural metadata declared by the descriptor
    pub fn metadata(&self) -> Result<ModuleMetadata> {
        let version =
            NumericVersion::parse(&self.version).map_err(|e| read_error(&self.origin, e))?;

        let mut references = Vec::with_capacity(self.references.len());
        for reference in &self.references {
            let ref_version = NumericVersion::parse(&reference.version)
                .map_err(|e| read_error(&self.origin, format!("reference {}: {}", reference.name, e)))?;
            let mut edge = ReferenceEdge::new(reference.name.trim(), ref_version);
            if let Some(ref descriptor) = reference.descriptor {
                edge = edge.with_descriptor(descriptor.clone());
            }
            references.push(edge);
        }

        Ok(ModuleMetadata {
            name: self.name.trim().to_string(),
            version,
            platform: self.platform.clone(),
            references,
        })
    }

    pub fn surface(&self) -> ApiSurface {
        ApiSurface {
            exports: self.api.exports.clone(),
            imports: self.api.imports.clone(),
        }
    }
}

fn read_error(path: &Path, reason: impl std::fmt::Display) -> Error {
    Error::ReadError {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/repo/acme/1.0/acme.core.dll")),
            PathBuf::from("/repo/acme/1.0/acme.core.dll.module.toml")
        );
    }

    #[test]
    fn test_load_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acme.core.dll.module.toml");
        std::fs::write(
            &path,
            r#"
name = "Acme.Core"
version = "1.2"
platform = "net40"

[[references]]
name = "Acme.Util"
version = "1.0.0.0"
descriptor = "Acme.Util, Version=1.0.0.0"

[api]
imports = ["Acme.Util.Widget::Spin"]

[api.exports]
"Acme.Core.Gear" = "class"
"#,
        )
        .unwrap();

        let manifest = ModuleManifest::load(&path).unwrap();
        let metadata = manifest.metadata().unwrap();
        assert_eq!(metadata.name, "Acme.Core");
        assert_eq!(metadata.version, NumericVersion::new(1, 2, 0, 0));
        assert_eq!(metadata.platform, "net40");
        assert_eq!(metadata.references.len(), 1);
        assert_eq!(
            metadata.references[0].classification_key(),
            "Acme.Util, Version=1.0.0.0"
        );

        let surface = manifest.surface();
        assert!(surface.exports.contains_key("Acme.Core.Gear"));
        assert!(surface.imports.contains("Acme.Util.Widget::Spin"));
    }

    #[test]
    fn test_bad_version_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.dll.module.toml");
        std::fs::write(&path, "name = \"Broken\"\nversion = \"one\"\n").unwrap();

        let manifest = ModuleManifest::load(&path).unwrap();
        assert!(matches!(manifest.metadata(), Err(Error::ReadError { .. })));

        std::fs::write(&path, "not toml [").unwrap();
        assert!(matches!(ModuleManifest::load(&path), Err(Error::ReadError { .. })));
    }
}
