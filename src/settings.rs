// src/settings.rs
//! Tool settings
//!
//! Settings describe one conversion run: where modules are found, where the
//! caches and packages go, how strict resolution is and which package index
//! is consulted. Every field has a default, so a settings file only needs the
//! values it changes:
//!
//! ```toml
//! source = "/srv/modules"
//! resolution_level = 16
//! official_repository = "https://api.nuget.org/v3-flatcontainer/"
//!
//! [host_libraries]
//! markers = ["System.", "libc.so"]
//! exclusions = ["System.Reactive"]
//! ```

use crate::error::{Error, Result};
use crate::flags::ResolutionFlags;
use crate::module::HostLibraryRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Public NuGet v3 flat-container endpoint
pub const DEFAULT_OFFICIAL_REPOSITORY: &str = "https://api.nuget.org/v3-flatcontainer/";

/// Special tag tried when a release is not published
pub const DEFAULT_INDEX_SNAPSHOT_LABEL: &str = "SNAPSHOT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the module tree
    pub source: PathBuf,
    /// Artifact cache, resolutions and unresolved markers
    pub cache_dir: PathBuf,
    /// Where package manifests are written
    pub output_dir: PathBuf,
    /// Reuse cached resolutions and skip packages that already exist
    pub use_cache: bool,
    /// Resolution strictness bitset
    pub resolution_level: u32,
    /// Remote package index; disabled when empty
    pub official_repository: Option<String>,
    /// Local package index directory, preferred over the remote one
    pub local_repository: Option<PathBuf>,
    pub snapshot_label: String,
    /// Module file extensions, without the dot
    pub extensions: Vec<String>,
    pub host_libraries: HostLibraryRegistry,
    pub author: String,
    pub owner: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: PathBuf::from("."),
            cache_dir: PathBuf::from("cache"),
            output_dir: PathBuf::from("packages"),
            use_cache: true,
            resolution_level: 0,
            official_repository: Some(DEFAULT_OFFICIAL_REPOSITORY.to_string()),
            local_repository: None,
            snapshot_label: DEFAULT_INDEX_SNAPSHOT_LABEL.to_string(),
            extensions: vec!["dll".to_string(), "exe".to_string(), "so".to_string()],
            host_libraries: HostLibraryRegistry::default(),
            author: String::new(),
            owner: String::new(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigError(format!("Invalid settings: {}", e)))
    }

    pub fn flags(&self) -> ResolutionFlags {
        ResolutionFlags::from_level(self.resolution_level)
    }

    /// Whether `path` has one of the scanned extensions
    ///
    /// Versioned shared objects (`libfoo.so.1.2`) count as `so`.
    pub fn is_module(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy().to_lowercase();
        self.extensions.iter().any(|ext| {
            let ext = ext.trim_start_matches('.').to_lowercase();
            name.ends_with(&format!(".{}", ext)) || (ext == "so" && name.contains(".so."))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::parse("").unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.use_cache);
        assert_eq!(settings.flags(), ResolutionFlags::empty());
        assert_eq!(settings.official_repository.as_deref(), Some(DEFAULT_OFFICIAL_REPOSITORY));
    }

    #[test]
    fn test_partial_file() {
        let settings = Settings::parse(
            r#"
source = "/srv/modules"
resolution_level = 17
use_cache = false

[host_libraries]
markers = ["libc.so"]
exclusions = []
"#,
        )
        .unwrap();
        assert_eq!(settings.source, PathBuf::from("/srv/modules"));
        assert!(!settings.use_cache);
        assert!(settings.flags().contains(ResolutionFlags::ACCEPT_ZERO_VERSION));
        assert!(settings.flags().contains(ResolutionFlags::SKIP_BUILD_COMPAT_FALLBACK));
        assert_eq!(settings.output_dir, PathBuf::from("packages"));
    }

    #[test]
    fn test_invalid_settings() {
        assert!(matches!(Settings::parse("use_cache = \"yes\""), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_is_module() {
        let settings = Settings::default();
        assert!(settings.is_module(Path::new("/a/Acme.Core.DLL")));
        assert!(settings.is_module(Path::new("/a/libfoo.so.1.2")));
        assert!(settings.is_module(Path::new("/a/libfoo.so")));
        assert!(!settings.is_module(Path::new("/a/Acme.Core.pdb")));
        assert!(!settings.is_module(Path::new("/a/Acme.dll.module.toml")));
    }
}
