// src/cache/mod.rs

//! Artifact cache
//!
//! The authoritative table of every known artifact, keyed by
//! [`ArtifactIdentity`], plus the [`ConflictSet`] recording which semantic
//! versions share one declared (raw) version of a module name.
//!
//! The cache is a single-writer component: all mutation goes through
//! [`ArtifactCache::upsert`], [`ArtifactCache::bulk_load`] and
//! [`ArtifactCache::remove`]. Metadata reads happen in [`ModuleScanner`] and
//! may run in parallel; applying their results is always sequential.

mod store;

pub use store::{CacheStore, ARTIFACTS_FILE, VERSIONS_FILE};

use crate::config::ConfigurationResolver;
use crate::error::{Error, Result};
use crate::module::{module_stem, MetadataReader, ReferenceEdge, SharedLibraryClassifier};
use crate::version::{CanonicalVersion, NumericVersion, SemanticVersion, VersionResolver};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Separator used in persisted keys
pub const KEY_SEPARATOR: &str = "--";

/// Unique key of an artifact or package: name plus semantic version
///
/// Ordered by name, then version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactIdentity {
    pub name: String,
    pub version: SemanticVersion,
}

impl ArtifactIdentity {
    pub fn new(name: impl Into<String>, version: SemanticVersion) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.version.is_snapshot()
    }

    /// `<version>--<name>`, the key used by persisted stores
    pub fn storage_key(&self) -> String {
        format!("{}{}{}", self.version, KEY_SEPARATOR, self.name)
    }

    pub fn parse_storage_key(key: &str) -> Result<Self> {
        let (version, name) = key.split_once(KEY_SEPARATOR).ok_or_else(|| {
            Error::ParseError(format!("Expected '<version>{}<name>', found '{}'", KEY_SEPARATOR, key))
        })?;
        if name.is_empty() {
            return Err(Error::ParseError(format!("Missing name in '{}'", key)));
        }
        Ok(Self::new(name, SemanticVersion::parse(version)?))
    }
}

impl fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// One tracked module
///
/// The identity never changes; path, platform and references are updated by
/// the cache only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
    platform: String,
    identity: ArtifactIdentity,
    raw_version: NumericVersion,
    references: BTreeSet<ReferenceEdge>,
}

impl Artifact {
    pub(crate) fn new(
        path: PathBuf,
        platform: String,
        identity: ArtifactIdentity,
        raw_version: NumericVersion,
        references: BTreeSet<ReferenceEdge>,
    ) -> Self {
        Self {
            path,
            platform,
            identity,
            raw_version,
            references,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn identity(&self) -> &ArtifactIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn version(&self) -> &SemanticVersion {
        &self.identity.version
    }

    /// Version the module declared about itself
    pub fn raw_version(&self) -> NumericVersion {
        self.raw_version
    }

    pub fn references(&self) -> &BTreeSet<ReferenceEdge> {
        &self.references
    }

    pub fn is_snapshot(&self) -> bool {
        self.identity.is_snapshot()
    }
}

/// Key of a [`ConflictSet`] bucket
///
/// Ordered by raw version, then lowercased name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConflictKey {
    pub raw_version: NumericVersion,
    pub name: String,
}

impl ConflictKey {
    pub fn new(raw_version: NumericVersion, name: &str) -> Self {
        Self {
            raw_version,
            name: name.to_lowercase(),
        }
    }

    /// `<rawVersion>--<name>`
    pub fn storage_key(&self) -> String {
        format!("{}{}{}", self.raw_version, KEY_SEPARATOR, self.name)
    }

    pub fn parse_storage_key(key: &str) -> Result<Self> {
        let (version, name) = key.split_once(KEY_SEPARATOR).ok_or_else(|| {
            Error::ParseError(format!("Expected '<rawVersion>{}<name>', found '{}'", KEY_SEPARATOR, key))
        })?;
        if name.is_empty() {
            return Err(Error::ParseError(format!("Missing name in '{}'", key)));
        }
        Ok(Self::new(NumericVersion::parse(version)?, name))
    }
}

/// Semantic versions known to share one (raw version, name)
///
/// A bucket with more than one release version means the nominal version is
/// ambiguous and dependency resolution has to disambiguate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictSet {
    buckets: BTreeMap<ConflictKey, BTreeSet<SemanticVersion>>,
}

impl ConflictSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `version` to the bucket of (`raw_version`, `name`)
    ///
    /// Returns false when the version was already registered.
    pub fn register(&mut self, raw_version: NumericVersion, name: &str, version: SemanticVersion) -> bool {
        self.buckets
            .entry(ConflictKey::new(raw_version, name))
            .or_default()
            .insert(version)
    }

    pub fn unregister(&mut self, raw_version: NumericVersion, name: &str, version: &SemanticVersion) {
        let key = ConflictKey::new(raw_version, name);
        if let Some(bucket) = self.buckets.get_mut(&key) {
            bucket.remove(version);
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
    }

    pub fn get(&self, raw_version: NumericVersion, name: &str) -> Option<&BTreeSet<SemanticVersion>> {
        self.buckets.get(&ConflictKey::new(raw_version, name))
    }

    /// Number of non-snapshot versions in a bucket
    pub fn release_count(&self, raw_version: NumericVersion, name: &str) -> usize {
        self.get(raw_version, name)
            .map(|bucket| bucket.iter().filter(|v| !v.is_snapshot()).count())
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConflictKey, &BTreeSet<SemanticVersion>)> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub(crate) fn insert_bucket(&mut self, key: ConflictKey, versions: BTreeSet<SemanticVersion>) {
        if !versions.is_empty() {
            self.buckets.entry(key).or_default().extend(versions);
        }
    }
}

/// Result of reading and version-resolving one module file
#[derive(Debug, Clone)]
pub struct ScannedModule {
    pub path: PathBuf,
    pub name: String,
    pub platform: String,
    pub version: CanonicalVersion,
    /// References left after host shared libraries were filtered out
    pub references: BTreeSet<ReferenceEdge>,
    /// The path's configuration asks for the module to be ignored
    pub ignore: bool,
}

impl ScannedModule {
    pub fn identity(&self) -> ArtifactIdentity {
        ArtifactIdentity::new(self.name.clone(), self.version.version.clone())
    }
}

/// Reads a module and derives everything the cache needs to store it
#[derive(Clone)]
pub struct ModuleScanner {
    reader: Arc<dyn MetadataReader>,
    versions: VersionResolver,
    configs: Arc<dyn ConfigurationResolver>,
    classifier: Arc<dyn SharedLibraryClassifier>,
}

impl ModuleScanner {
    pub fn new(
        reader: Arc<dyn MetadataReader>,
        versions: VersionResolver,
        configs: Arc<dyn ConfigurationResolver>,
        classifier: Arc<dyn SharedLibraryClassifier>,
    ) -> Self {
        Self {
            reader,
            versions,
            configs,
            classifier,
        }
    }

    pub fn scan(&self, path: &Path) -> Result<ScannedModule> {
        let metadata = self.reader.read(path)?;
        let config = self.configs.get(path);
        let version = self.versions.resolve(metadata.version, path, &config)?;

        let references = metadata
            .references
            .into_iter()
            .filter(|edge| {
                let shared = self.classifier.is_shared(edge.classification_key());
                if shared {
                    debug!("{} references host library {}", path.display(), edge.classification_key());
                }
                !shared
            })
            .collect();

        Ok(ScannedModule {
            path: path.to_path_buf(),
            name: metadata.name,
            platform: metadata.platform,
            version,
            references,
            ignore: config.ignore,
        })
    }
}

/// Main and ignored artifact tables plus the conflict set
#[derive(Debug, Clone, Default)]
pub struct ArtifactCache {
    artifacts: BTreeMap<ArtifactIdentity, Artifact>,
    ignored: BTreeMap<ArtifactIdentity, Artifact>,
    conflicts: ConflictSet,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(artifacts: BTreeMap<ArtifactIdentity, Artifact>, conflicts: ConflictSet) -> Self {
        Self {
            artifacts,
            ignored: BTreeMap::new(),
            conflicts,
        }
    }

    /// Read, resolve and insert or update the module at `path`
    ///
    /// Returns `None` when the module cannot be read or versioned, or when
    /// its configuration asks for it to be ignored.
    pub fn upsert(&mut self, scanner: &ModuleScanner, path: &Path) -> Option<ArtifactIdentity> {
        match scanner.scan(path) {
            Ok(scanned) => self.apply(scanned),
            Err(e) => {
                info!("IGNORE: {} due to {}", path.display(), e);
                None
            }
        }
    }

    /// Load every path not already backing a cached artifact
    ///
    /// Reads fan out across threads; results are applied in path order.
    pub fn bulk_load(&mut self, scanner: &ModuleScanner, paths: &[PathBuf]) -> Vec<ArtifactIdentity> {
        let known: HashSet<String> = self
            .artifacts
            .values()
            .chain(self.ignored.values())
            .map(|a| path_key(&a.path))
            .collect();

        let mut pending: Vec<&PathBuf> = paths
            .iter()
            .filter(|p| !known.contains(&path_key(p)))
            .collect();
        pending.sort();
        pending.dedup();

        debug!(
            "Loading {} module(s), {} already cached",
            pending.len(),
            paths.len() - pending.len()
        );

        let scanned: Vec<(&PathBuf, Result<ScannedModule>)> = pending
            .par_iter()
            .map(|path| (*path, scanner.scan(path)))
            .collect();

        let mut loaded = Vec::new();
        for (path, result) in scanned {
            match result {
                Ok(module) => {
                    if let Some(identity) = self.apply(module) {
                        loaded.push(identity);
                    }
                }
                Err(e) => info!("IGNORE: {} due to {}", path.display(), e),
            }
        }
        loaded
    }

    /// Insert or update from an already scanned module
    pub fn apply(&mut self, scanned: ScannedModule) -> Option<ArtifactIdentity> {
        let identity = scanned.identity();
        let ignore = scanned.ignore;

        let table = if ignore {
            &mut self.ignored
        } else {
            &mut self.artifacts
        };

        if table.contains_key(&identity) {
            Self::update(table, &identity, scanned);
        } else {
            info!("ADDED: {} from {}", identity, scanned.path.display());
            if !ignore {
                self.conflicts
                    .register(scanned.version.raw, &identity.name, identity.version.clone());
            }
            table.insert(
                identity.clone(),
                Artifact::new(
                    scanned.path,
                    scanned.platform,
                    identity.clone(),
                    scanned.version.raw,
                    scanned.references,
                ),
            );
        }

        if ignore {
            info!("IGNORE: {} because its configuration asks to", identity);
            return None;
        }
        Some(identity)
    }

    fn update(
        table: &mut BTreeMap<ArtifactIdentity, Artifact>,
        identity: &ArtifactIdentity,
        scanned: ScannedModule,
    ) {
        let Some(existing) = table.get_mut(identity) else {
            return;
        };

        if !stem_matches(&existing.path, &identity.name) && stem_matches(&scanned.path, &identity.name) {
            info!(
                "UPDATE: {} found in {} replaces {} as the file name matches",
                identity,
                scanned.path.display(),
                existing.path.display()
            );
            existing.path = scanned.path;
        } else if path_key(&existing.path) != path_key(&scanned.path) {
            info!(
                "IGNORE: {} found in {} already registered from {}",
                identity,
                scanned.path.display(),
                existing.path.display()
            );
            return;
        }

        existing.platform = scanned.platform;

        if !scanned.references.is_subset(&existing.references) {
            info!("UPDATE: references of {} have changed", identity);
            existing.references = scanned.references;
        }
    }

    /// Remove an artifact and its conflict set entry
    pub fn remove(&mut self, identity: &ArtifactIdentity) -> Option<Artifact> {
        let artifact = self.artifacts.remove(identity)?;
        self.conflicts
            .unregister(artifact.raw_version, &identity.name, &identity.version);
        info!("REMOVED: {}", identity);
        Some(artifact)
    }

    pub fn get(&self, identity: &ArtifactIdentity) -> Option<&Artifact> {
        self.artifacts.get(identity)
    }

    pub fn contains(&self, identity: &ArtifactIdentity) -> bool {
        self.artifacts.contains_key(identity)
    }

    /// Artifact backed by `path`, compared case-insensitively
    pub fn find_by_path(&self, path: &Path) -> Option<&Artifact> {
        let key = path_key(path);
        self.artifacts.values().find(|a| path_key(&a.path) == key)
    }

    /// Artifacts named `name` (case-insensitive), in version order
    pub fn by_name<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Artifact> + use<'a> {
        let name = name.to_string();
        self.artifacts
            .values()
            .filter(move |a| a.identity.name.eq_ignore_ascii_case(&name))
    }

    /// Cached artifact with `name` (case-insensitive) and `version`
    pub fn find(&self, name: &str, version: &SemanticVersion) -> Option<&Artifact> {
        self.by_name(name).find(|a| &a.identity.version == version)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    pub fn ignored(&self) -> impl Iterator<Item = &Artifact> {
        self.ignored.values()
    }

    pub fn identities(&self) -> Vec<ArtifactIdentity> {
        self.artifacts.keys().cloned().collect()
    }

    pub fn conflicts(&self) -> &ConflictSet {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

fn stem_matches(path: &Path, name: &str) -> bool {
    module_stem(path).is_some_and(|stem| stem == name.to_lowercase())
}
