// src/cache/store.rs
//! On-disk persistence of the artifact cache
//!
//! Two human-editable TOML files live in the cache directory:
//! - `artifacts.toml`: `"<version>--<name>"` tables with path, platform, raw
//!   version and references
//! - `versions.toml`: `"<rawVersion>--<name>" = [<semantic versions>]`
//!
//! Entries that fail to parse are logged and skipped so that one bad record
//! never discards the rest of the cache.

use super::{Artifact, ArtifactCache, ArtifactIdentity, ConflictKey, ConflictSet};
use crate::error::{Error, Result};
use crate::module::ReferenceEdge;
use crate::version::{NumericVersion, SemanticVersion};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use toml::Table;
use tracing::{debug, warn};

pub const ARTIFACTS_FILE: &str = "artifacts.toml";
pub const VERSIONS_FILE: &str = "versions.toml";

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactRecord {
    path: String,
    #[serde(default)]
    platform: String,
    raw_version: String,
    #[serde(default)]
    references: Vec<ReferenceRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReferenceRecord {
    name: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    descriptor: Option<String>,
}

impl From<&Artifact> for ArtifactRecord {
    fn from(artifact: &Artifact) -> Self {
        Self {
            path: artifact.path.display().to_string(),
            platform: artifact.platform.clone(),
            raw_version: artifact.raw_version.to_string(),
            references: artifact
                .references
                .iter()
                .map(|r| ReferenceRecord {
                    name: r.name.clone(),
                    version: r.version.to_string(),
                    descriptor: r.descriptor.clone(),
                })
                .collect(),
        }
    }
}

impl ArtifactRecord {
    fn into_artifact(self, identity: ArtifactIdentity) -> Result<Artifact> {
        let mut references = BTreeSet::new();
        for reference in self.references {
            let mut edge = ReferenceEdge::new(reference.name, NumericVersion::parse(&reference.version)?);
            edge.descriptor = reference.descriptor;
            references.insert(edge);
        }
        Ok(Artifact::new(
            PathBuf::from(self.path),
            self.platform,
            identity,
            NumericVersion::parse(&self.raw_version)?,
            references,
        ))
    }
}

/// Reads and writes the artifact cache files of one directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the cache; missing files yield an empty cache
    pub fn load(&self) -> Result<ArtifactCache> {
        let artifacts_path = self.dir.join(ARTIFACTS_FILE);
        let versions_path = self.dir.join(VERSIONS_FILE);
        if !artifacts_path.is_file() || !versions_path.is_file() {
            debug!("No persisted cache in {}", self.dir.display());
            return Ok(ArtifactCache::new());
        }

        let mut artifacts = BTreeMap::new();
        for (key, value) in read_table(&artifacts_path)? {
            let parsed = ArtifactIdentity::parse_storage_key(&key).and_then(|identity| {
                let record: ArtifactRecord = value
                    .try_into()
                    .map_err(|e: toml::de::Error| Error::ParseError(e.to_string()))?;
                record.into_artifact(identity)
            });
            match parsed {
                Ok(artifact) => {
                    artifacts.insert(artifact.identity.clone(), artifact);
                }
                Err(e) => warn!("Unable to parse persisted artifact {}, it will be ignored: {}", key, e),
            }
        }

        let mut conflicts = ConflictSet::new();
        for (key, value) in read_table(&versions_path)? {
            match parse_bucket(&key, &value) {
                Ok((bucket_key, versions)) => conflicts.insert_bucket(bucket_key, versions),
                Err(e) => warn!("Unable to parse persisted versions {}, it will be ignored: {}", key, e),
            }
        }

        debug!(
            "Loaded {} artifact(s) and {} version bucket(s) from {}",
            artifacts.len(),
            conflicts.len(),
            self.dir.display()
        );
        Ok(ArtifactCache::from_parts(artifacts, conflicts))
    }

    /// Persist the main table and the conflict set
    pub fn save(&self, cache: &ArtifactCache) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let artifacts: BTreeMap<String, ArtifactRecord> = cache
            .artifacts()
            .map(|a| (a.identity.storage_key(), ArtifactRecord::from(a)))
            .collect();
        write_toml(&self.dir.join(ARTIFACTS_FILE), &artifacts)?;

        let versions: BTreeMap<String, Vec<String>> = cache
            .conflicts()
            .iter()
            .map(|(key, versions)| (key.storage_key(), versions.iter().map(|v| v.to_string()).collect()))
            .collect();
        write_toml(&self.dir.join(VERSIONS_FILE), &versions)?;

        debug!("Saved {} artifact(s) to {}", cache.len(), self.dir.display());
        Ok(())
    }
}

fn read_table(path: &Path) -> Result<Table> {
    let content = fs::read_to_string(path)?;
    content
        .parse::<Table>()
        .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))
}

fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = toml::to_string(value)
        .map_err(|e| Error::ParseError(format!("Failed to serialize {}: {}", path.display(), e)))?;
    fs::write(path, content)?;
    Ok(())
}

fn parse_bucket(key: &str, value: &toml::Value) -> Result<(ConflictKey, BTreeSet<SemanticVersion>)> {
    let bucket_key = ConflictKey::parse_storage_key(key)?;
    let items = value
        .as_array()
        .ok_or_else(|| Error::ParseError("expected an array of versions".to_string()))?;
    let mut versions = BTreeSet::new();
    for item in items {
        let text = item
            .as_str()
            .ok_or_else(|| Error::ParseError("expected a version string".to_string()))?;
        versions.insert(SemanticVersion::parse(text)?);
    }
    Ok((bucket_key, versions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::{scanner, FakeReader};
    use std::sync::Arc;

    #[test]
    fn test_save_and_load() {
        let reader = Arc::new(FakeReader::default());
        reader.add("/repo/api/1.0/api.dll", "api", "1.0.0.0", &[("util", "2.0.0.0")]);
        reader.add("/repo/api/1.1/api.dll", "api", "1.0.0.0", &[]);
        let scanner = scanner(reader);
        let mut cache = ArtifactCache::new();
        cache.bulk_load(
            &scanner,
            &[PathBuf::from("/repo/api/1.0/api.dll"), PathBuf::from("/repo/api/1.1/api.dll")],
        );

        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));
        store.save(&cache).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.conflicts(), cache.conflicts());
        let identities = cache.identities();
        assert_eq!(loaded.get(&identities[0]), cache.get(&identities[0]));
    }

    #[test]
    fn test_missing_files_give_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CacheStore::new(dir.path()).load().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(ARTIFACTS_FILE),
            r#"
["1.0.0.0--good"]
path = "/repo/good/1.0/good.dll"
raw_version = "1.0.0.0"

["broken-key"]
path = "/repo/broken.dll"
raw_version = "1.0.0.0"

["2.0.0.0--bad"]
path = "/repo/bad.dll"
raw_version = "two"
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(VERSIONS_FILE),
            "\"1.0.0.0--good\" = [\"1.0.0.0\"]\n\"oops\" = [\"1.0\"]\n",
        )
        .unwrap();

        let cache = CacheStore::new(dir.path()).load().unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.conflicts().len(), 1);
    }
}
