// src/config/resolver.rs

//! Ancestor-directory configuration lookup

use super::reader::{read_file, CONFIG_FILE_NAME};
use super::Configuration;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Provides the merged configuration that applies to a path
pub trait ConfigurationResolver: Send + Sync {
    fn get(&self, path: &Path) -> Configuration;
}

/// Walks from a path's directory to the filesystem root, merging every
/// `modpack.toml` found on the way
///
/// Parsed files are memoised per directory for the lifetime of the resolver.
#[derive(Default)]
pub struct DirectoryConfigResolver {
    files: RwLock<HashMap<PathBuf, Option<Arc<Configuration>>>>,
}

impl DirectoryConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop memoised files, e.g. after a configuration file changed
    pub fn invalidate(&self) {
        self.files.write().clear();
    }

    fn load_dir(&self, dir: &Path) -> Option<Arc<Configuration>> {
        if let Some(cached) = self.files.read().get(dir) {
            return cached.clone();
        }

        let conf_path = dir.join(CONFIG_FILE_NAME);
        let loaded = if conf_path.is_file() {
            match read_file(&conf_path) {
                Ok(config) => {
                    debug!("Configuration {} added for resolution", conf_path.display());
                    Some(Arc::new(config))
                }
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            }
        } else {
            None
        };

        self.files
            .write()
            .insert(dir.to_path_buf(), loaded.clone());
        loaded
    }
}

impl ConfigurationResolver for DirectoryConfigResolver {
    fn get(&self, path: &Path) -> Configuration {
        let start = if path.is_dir() {
            Some(path)
        } else {
            path.parent()
        };

        let mut configuration = Configuration::default();
        let mut current = start;
        while let Some(dir) = current {
            if let Some(found) = self.load_dir(dir) {
                configuration = Configuration::merge(&configuration, &found);
            }
            current = dir.parent();
        }
        configuration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_ancestor_merge() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("vendor").join("acme").join("1.0");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            root.path().join(CONFIG_FILE_NAME),
            "[snapshot.mapping]\nroot = \"^(?P<snapshot>snapshot)$\"\n",
        )
        .unwrap();
        fs::write(
            root.path().join("vendor").join("acme").join(CONFIG_FILE_NAME),
            "[global]\nignore = true\n[snapshot.mapping]\nacme = \"^(?P<snapshot>nightly)$\"\n",
        )
        .unwrap();

        let resolver = DirectoryConfigResolver::new();
        let config = resolver.get(&nested.join("acme.dll"));
        assert!(config.ignore);
        let keys: Vec<&str> = config.snapshot_patterns.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["acme", "root"]);

        let sibling = resolver.get(&root.path().join("vendor").join("other.dll"));
        assert!(!sibling.ignore);
        assert_eq!(sibling.snapshot_patterns.len(), 1);
    }
}
