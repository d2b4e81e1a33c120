// src/resolver/store.rs
//! Persisted dependency resolutions
//!
//! - `resolutions/<version>--<name>--<dependency>.toml` holds the identity a
//!   parent's dependency was bound to:
//!   ```toml
//!   [dependency]
//!   version = "1.2.0.0"
//!   name = "Acme.Util"
//!   ```
//! - `unresolved/<dependency>--<rawVersion>` is an empty marker for an edge
//!   no rule could resolve. Markers are only ever added.

use crate::cache::{ArtifactIdentity, KEY_SEPARATOR};
use crate::error::{Error, Result};
use crate::version::{NumericVersion, SemanticVersion};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const RESOLUTIONS_DIR: &str = "resolutions";
pub const UNRESOLVED_DIR: &str = "unresolved";

#[derive(Debug, Serialize, Deserialize)]
struct ResolutionFile {
    dependency: ResolutionRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResolutionRecord {
    version: String,
    name: String,
}

/// Resolution cache and unresolved-edge markers under one directory
#[derive(Debug, Clone)]
pub struct ResolutionStore {
    dir: PathBuf,
}

impl ResolutionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn resolution_path(&self, parent: &ArtifactIdentity, dependency: &str) -> PathBuf {
        self.dir.join(RESOLUTIONS_DIR).join(format!(
            "{}{}{}.toml",
            parent.storage_key(),
            KEY_SEPARATOR,
            dependency
        ))
    }

    fn unresolved_path(&self, dependency: &str, version: NumericVersion) -> PathBuf {
        self.dir
            .join(UNRESOLVED_DIR)
            .join(format!("{}{}{}", dependency, KEY_SEPARATOR, version))
    }

    /// Previously resolved identity of `dependency` for `parent`
    pub fn load(&self, parent: &ArtifactIdentity, dependency: &str) -> Option<ArtifactIdentity> {
        let path = self.resolution_path(parent, dependency);
        if !path.is_file() {
            return None;
        }
        match read_resolution(&path) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!("Ignoring cached resolution {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, parent: &ArtifactIdentity, dependency: &str, resolved: &ArtifactIdentity) -> Result<()> {
        let path = self.resolution_path(parent, dependency);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = ResolutionFile {
            dependency: ResolutionRecord {
                version: resolved.version.to_string(),
                name: resolved.name.clone(),
            },
        };
        let content = toml::to_string(&file)
            .map_err(|e| Error::ParseError(format!("Failed to serialize {}: {}", path.display(), e)))?;
        fs::write(&path, content)?;
        debug!("Saved resolution {} -> {}", path.display(), resolved);
        Ok(())
    }

    /// Delete every resolution recorded for `parent`
    pub fn delete(&self, parent: &ArtifactIdentity) -> Result<usize> {
        let dir = self.dir.join(RESOLUTIONS_DIR);
        if !dir.is_dir() {
            return Ok(0);
        }

        let prefix = format!("{}{}", parent.storage_key(), KEY_SEPARATOR);
        let mut removed = 0;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        debug!("Removed {} cached resolution(s) of {}", removed, parent);
        Ok(removed)
    }

    /// Mark an edge as unresolved; false when it was already marked
    pub fn record_unresolved(&self, dependency: &str, version: NumericVersion) -> Result<bool> {
        let path = self.unresolved_path(dependency, version);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_unresolved(&self, dependency: &str, version: NumericVersion) -> bool {
        self.unresolved_path(dependency, version).is_file()
    }

    /// Names of every unresolved marker, sorted
    pub fn unresolved(&self) -> Result<Vec<String>> {
        let dir = self.dir.join(UNRESOLVED_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut markers = Vec::new();
        for entry in fs::read_dir(&dir)? {
            markers.push(entry?.file_name().to_string_lossy().into_owned());
        }
        markers.sort();
        Ok(markers)
    }
}

fn read_resolution(path: &Path) -> Result<ArtifactIdentity> {
    let content = fs::read_to_string(path)?;
    let file: ResolutionFile = toml::from_str(&content).map_err(|e| Error::ParseError(e.to_string()))?;
    Ok(ArtifactIdentity::new(
        file.dependency.name,
        SemanticVersion::parse(&file.dependency.version)?,
    ))
}
