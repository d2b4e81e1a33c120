// src/resolver/mod.rs

//! Dependency resolution
//!
//! Binds a reference edge of a cached artifact to the identity of the
//! package it should depend on. Rules are tried in order, the first one
//! producing an identity wins:
//!
//! 0. A resolution persisted by an earlier run
//! 1. A manual mapping from configuration, then the package index
//! 2. The exact local artifact when its declared version is unambiguous
//! 2b. Breaking-change selection among local builds sharing the version
//! 3. A local artifact with the same major.minor.patch
//! 4. The only local artifact with the same major.minor
//!
//! Every rule after 0 can be disabled through [`ResolutionFlags`].

pub(crate) mod breaking;
mod store;

pub use breaking::BreakingChangeResolver;
pub use store::{ResolutionStore, RESOLUTIONS_DIR, UNRESOLVED_DIR};

use crate::cache::{Artifact, ArtifactCache, ArtifactIdentity};
use crate::config::{Configuration, ConfigurationResolver};
use crate::error::{Error, Result};
use crate::flags::ResolutionFlags;
use crate::module::{ApiAnalyzer, ReferenceEdge};
use crate::repository::PackageLookup;
use crate::version::SemanticVersion;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Dependency resolution engine
pub struct DependencyResolver {
    flags: ResolutionFlags,
    configs: Arc<dyn ConfigurationResolver>,
    analyzer: Arc<dyn ApiAnalyzer>,
    repository: Option<Arc<dyn PackageLookup>>,
    /// Present when resolutions are cached across runs
    store: Option<ResolutionStore>,
}

impl DependencyResolver {
    pub fn new(
        flags: ResolutionFlags,
        configs: Arc<dyn ConfigurationResolver>,
        analyzer: Arc<dyn ApiAnalyzer>,
    ) -> Self {
        Self {
            flags,
            configs,
            analyzer,
            repository: None,
            store: None,
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn PackageLookup>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_store(mut self, store: ResolutionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn store(&self) -> Option<&ResolutionStore> {
        self.store.as_ref()
    }

    /// Resolve `edge` of `parent`
    ///
    /// `Ok(None)` means the edge is unresolved. Errors are limited to
    /// consistency failures between the artifact table and the conflict set.
    pub fn resolve(
        &self,
        cache: &ArtifactCache,
        parent: &Artifact,
        edge: &ReferenceEdge,
    ) -> Result<Option<ArtifactIdentity>> {
        if let Some(ref store) = self.store
            && let Some(cached) = store.load(parent.identity(), &edge.name)
        {
            debug!("{} of {} resolved from cache as {}", edge, parent.identity(), cached);
            return Ok(Some(cached));
        }

        let resolved = self.resolve_uncached(cache, parent, edge)?;

        if let Some(ref store) = self.store {
            match resolved {
                Some(ref identity) => {
                    if let Err(e) = store.save(parent.identity(), &edge.name, identity) {
                        warn!("Unable to cache resolution of {} for {}: {}", edge, parent.identity(), e);
                    }
                }
                None => match store.record_unresolved(&edge.name, edge.version) {
                    Ok(true) => debug!("Recorded unresolved dependency {}", edge),
                    Ok(false) => {}
                    Err(e) => warn!("Unable to record unresolved dependency {}: {}", edge, e),
                },
            }
        }

        Ok(resolved)
    }

    fn resolve_uncached(
        &self,
        cache: &ArtifactCache,
        parent: &Artifact,
        edge: &ReferenceEdge,
    ) -> Result<Option<ArtifactIdentity>> {
        if !self.flags.contains(ResolutionFlags::SKIP_OFFICIAL_REPOSITORY_LOOKUP) {
            if let Some(mapped) = self.manual_mapping(cache, parent, edge) {
                return Ok(Some(mapped));
            }
            if let Some(ref repository) = self.repository
                && let Some(published) = repository.find(&edge.name, edge.version)
            {
                info!("{} found in package index as {}", edge, published);
                return Ok(Some(published));
            }
        }

        let requested = SemanticVersion::release(edge.version);
        let releases = cache.conflicts().release_count(edge.version, &edge.name);

        let mut selected = ArtifactIdentity::new(edge.name.clone(), requested.clone());

        if releases == 1 {
            if let Some(exact) = cache.find(&edge.name, &requested) {
                info!("{} found locally at {}", edge, exact.path().display());
                return Ok(Some(exact.identity().clone()));
            }
            // The only build declaring this version sits under another folder version
            if let Some(version) = cache
                .conflicts()
                .get(edge.version, &edge.name)
                .and_then(|bucket| bucket.iter().find(|v| !v.is_snapshot()))
            {
                selected = ArtifactIdentity::new(edge.name.clone(), version.clone());
            }
        }

        if releases > 1
            && !self.flags.contains(ResolutionFlags::SKIP_CONFLICT_DISAMBIGUATION)
            && let Some(chosen) = self.disambiguate(cache, parent, edge)?
        {
            debug!("{} has {} local builds, {} selected", edge, releases, chosen);
            selected = chosen;
        }

        if !self.flags.contains(ResolutionFlags::SKIP_BUILD_COMPAT_FALLBACK)
            && let Some(found) = compatible_build(cache, &selected)
        {
            if found != selected {
                warn!("UPDATE: {} not found locally, replaced by {}", edge, found);
            }
            return Ok(Some(found));
        }

        if !self
            .flags
            .contains(ResolutionFlags::SKIP_MAJOR_MINOR_COMPAT_FALLBACK)
            && let Some(found) = compatible_minor(cache, &selected)
        {
            warn!("UPDATE: {} not found locally, replaced by {}", edge, found);
            return Ok(Some(found));
        }

        error!("Unable to find dependency {} of {}", edge, parent.identity());
        Ok(None)
    }

    /// Rule 1(a): manual mapping from the merged configuration
    ///
    /// The parent's scope is consulted first, then the scopes of cached
    /// modules carrying the dependency's name.
    fn manual_mapping(
        &self,
        cache: &ArtifactCache,
        parent: &Artifact,
        edge: &ReferenceEdge,
    ) -> Option<ArtifactIdentity> {
        let mut config = self.configs.get(parent.path());
        for artifact in mapping_scope(cache, edge) {
            config = Configuration::merge(&config, &self.configs.get(artifact.path()));
        }

        let mapping = config.find_mapping(&edge.name, &edge.version.to_string())?;
        let version = mapping
            .version
            .clone()
            .unwrap_or_else(|| SemanticVersion::release(edge.version));
        info!("Manual configuration maps {} to {}-{}", edge, mapping.package, version);
        Some(ArtifactIdentity::new(mapping.package.clone(), version))
    }

    /// Rule 2b: breaking-change selection among the conflict bucket
    fn disambiguate(
        &self,
        cache: &ArtifactCache,
        parent: &Artifact,
        edge: &ReferenceEdge,
    ) -> Result<Option<ArtifactIdentity>> {
        let Some(bucket) = cache.conflicts().get(edge.version, &edge.name) else {
            return Ok(None);
        };

        let mut candidates = Vec::with_capacity(bucket.len());
        for version in bucket {
            let artifact = cache.find(&edge.name, version).ok_or_else(|| {
                Error::ConsistencyError(format!(
                    "versions.toml references {}-{} while it doesn't exist in artifacts.toml",
                    edge.name, version
                ))
            })?;
            // Release packages never depend on snapshots
            if !parent.is_snapshot() && artifact.is_snapshot() {
                continue;
            }
            candidates.push(artifact);
        }

        Ok(BreakingChangeResolver::new(self.analyzer.as_ref()).resolve(&candidates, parent))
    }
}

/// Cached modules (ignored ones included) whose configuration may carry a
/// mapping for `edge`: same version if any, else newer, else same or newer
/// major, in version order
fn mapping_scope<'a>(cache: &'a ArtifactCache, edge: &ReferenceEdge) -> Vec<&'a Artifact> {
    let named: Vec<&Artifact> = cache
        .artifacts()
        .chain(cache.ignored())
        .filter(|a| a.name().eq_ignore_ascii_case(&edge.name))
        .collect();

    for stage in 0..3 {
        let mut scope: Vec<&Artifact> = named
            .iter()
            .copied()
            .filter(|a| {
                let version = a.version().version;
                match stage {
                    0 => version == edge.version,
                    1 => version >= edge.version,
                    _ => version.major >= edge.version.major,
                }
            })
            .collect();
        if !scope.is_empty() {
            scope.sort_by(|a, b| a.version().cmp(b.version()));
            return scope;
        }
    }
    Vec::new()
}

/// Rule 3: same name and major.minor.patch as `selected`
///
/// The exact identity wins when cached, then the lowest release, then the
/// lowest snapshot.
fn compatible_build(cache: &ArtifactCache, selected: &ArtifactIdentity) -> Option<ArtifactIdentity> {
    if let Some(exact) = cache.find(&selected.name, &selected.version) {
        return Some(exact.identity().clone());
    }

    let matching: Vec<&Artifact> = cache
        .by_name(&selected.name)
        .filter(|a| a.version().version.same_patch(&selected.version.version))
        .collect();

    matching
        .iter()
        .find(|a| !a.is_snapshot())
        .or_else(|| matching.first())
        .map(|a| a.identity().clone())
}

/// Rule 4: the only artifact with the same name and major.minor
fn compatible_minor(cache: &ArtifactCache, selected: &ArtifactIdentity) -> Option<ArtifactIdentity> {
    let mut matching = cache
        .by_name(&selected.name)
        .filter(|a| a.version().version.same_minor(&selected.version.version));

    let first = matching.next()?;
    if matching.next().is_some() {
        let version = selected.version.version;
        debug!(
            "Several {}.{} builds of {}, none selected",
            version.major, version.minor, selected.name
        );
        return None;
    }
    Some(first.identity().clone())
}

#[cfg(test)]
mod tests {
    use super::breaking::tests::FakeAnalyzer;
    use super::*;
    use crate::cache::tests::{scanner, FakeConfigs, FakeReader};
    use crate::cache::ModuleScanner;
    use crate::config::PackageMapping;
    use crate::repository::tests::MemoryIndex;
    use crate::repository::OfficialRepository;
    use crate::version::NumericVersion;
    use regex::Regex;
    use std::path::{Path, PathBuf};

    struct Fixture {
        dir: tempfile::TempDir,
        reader: Arc<FakeReader>,
        analyzer: FakeAnalyzer,
        cache: ArtifactCache,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                reader: Arc::new(FakeReader::default()),
                analyzer: FakeAnalyzer::default(),
                cache: ArtifactCache::new(),
            }
        }

        /// Register and load a module at `<dir>/<rel>`
        fn module(&mut self, rel: &str, name: &str, version: &str, refs: &[(&str, &str)]) -> PathBuf {
            let path = self.dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"module").unwrap();
            self.reader.add(path.to_str().unwrap(), name, version, refs);
            let scanner: ModuleScanner = scanner(self.reader.clone());
            self.cache.upsert(&scanner, &path).unwrap();
            path
        }

        fn resolver(analyzer: FakeAnalyzer, flags: ResolutionFlags) -> DependencyResolver {
            DependencyResolver::new(flags, Arc::new(FakeConfigs), Arc::new(analyzer))
        }

        fn artifact(&self, path: &Path) -> &Artifact {
            self.cache.find_by_path(path).unwrap()
        }
    }

    fn edge(name: &str, version: &str) -> ReferenceEdge {
        ReferenceEdge::new(name, NumericVersion::parse(version).unwrap())
    }

    fn id(name: &str, version: &str) -> ArtifactIdentity {
        ArtifactIdentity::new(name, SemanticVersion::parse(version).unwrap())
    }

    #[test]
    fn test_rule2_unambiguous_local_match() {
        let mut fx = Fixture::new();
        let app = fx.module("app/2.0/app.dll", "app", "2.0", &[("util", "1.0")]);
        fx.module("util/1.0/util.dll", "util", "1.0", &[]);
        let resolver = Fixture::resolver(FakeAnalyzer::default(), ResolutionFlags::empty());

        let resolved = resolver.resolve(&fx.cache, fx.artifact(&app), &edge("util", "1.0")).unwrap();
        assert_eq!(resolved, Some(id("util", "1.0")));
    }

    #[test]
    fn test_rule2_single_build_under_other_folder_version() {
        let mut fx = Fixture::new();
        let app = fx.module("app/2.0/app.dll", "app", "2.0", &[]);
        fx.module("api/1.1/api.dll", "api", "1.0", &[]);
        let resolver = Fixture::resolver(FakeAnalyzer::default(), ResolutionFlags::empty());

        let resolved = resolver.resolve(&fx.cache, fx.artifact(&app), &edge("api", "1.0")).unwrap();
        assert_eq!(resolved, Some(id("api", "1.1")));
    }

    #[test]
    fn test_rule2b_fires_for_ambiguous_version() {
        let mut fx = Fixture::new();
        let app = fx.module("app/2.0/app.dll", "app", "2.0", &[]);
        let v10 = fx.module("api/1.0/api.dll", "api", "1.0", &[]);
        let v11 = fx.module("api/1.1/api.dll", "api", "1.0", &[]);
        let v12 = fx.module("api/1.2/api.dll", "api", "1.0", &[]);
        fx.analyzer.add(&v10, &["Api::Get"], &[]);
        fx.analyzer.add(&v11, &["Api::Get", "Api::Put"], &[]);
        fx.analyzer.add(&v12, &["Api::Get", "Api::Put", "Api::Patch"], &[]);
        fx.analyzer.add(&app, &[], &["Api::Put"]);

        let parent = fx.artifact(&app).clone();
        let cache = fx.cache;
        let resolver = Fixture::resolver(fx.analyzer, ResolutionFlags::empty());

        // The exact 1.0 exists, but the bucket holds three releases
        let resolved = resolver.resolve(&cache, &parent, &edge("api", "1.0")).unwrap();
        assert_eq!(resolved, Some(id("api", "1.1")));
    }

    #[test]
    fn test_rule2b_excludes_snapshots_for_release_parent() {
        let mut fx = Fixture::new();
        let app = fx.module("app/2.0/app.dll", "app", "2.0", &[]);
        let v10 = fx.module("api/1.0/api.dll", "api", "1.0", &[]);
        let v11 = fx.module("api/1.1/api.dll", "api", "1.0", &[]);
        let snap = fx.module("api/1.2-snapshot/api.dll", "api", "1.0", &[]);
        fx.analyzer.add(&v10, &["Api::Get"], &[]);
        fx.analyzer.add(&v11, &["Api::Get"], &[]);
        fx.analyzer.add(&snap, &["Api::Get", "Api::Put"], &[]);
        fx.analyzer.add(&app, &[], &["Api::Put"]);

        let parent = fx.artifact(&app).clone();
        let cache = fx.cache;
        let resolver = Fixture::resolver(fx.analyzer, ResolutionFlags::empty());
        let resolved = resolver.resolve(&cache, &parent, &edge("api", "1.0")).unwrap();
        assert_eq!(resolved, Some(id("api", "1.0")));
    }

    #[test]
    fn test_consistency_error_propagates() {
        let mut fx = Fixture::new();
        let app = fx.module("app/2.0/app.dll", "app", "2.0", &[]);
        fx.module("api/1.0/api.dll", "api", "1.0", &[]);
        fx.module("api/1.1/api.dll", "api", "1.0", &[]);

        // Drop one artifact from the table but keep its version bucket
        let store = crate::cache::CacheStore::new(fx.dir.path().join("cache"));
        store.save(&fx.cache).unwrap();
        let artifacts = fx.dir.path().join("cache").join(crate::cache::ARTIFACTS_FILE);
        let content = std::fs::read_to_string(&artifacts).unwrap();
        let mut table: toml::Table = content.parse().unwrap();
        table.remove("1.1.0.0--api");
        std::fs::write(&artifacts, toml::to_string(&table).unwrap()).unwrap();
        let cache = store.load().unwrap();

        let parent = cache.find_by_path(&app).unwrap();
        let resolver = Fixture::resolver(FakeAnalyzer::default(), ResolutionFlags::empty());
        let err = resolver.resolve(&cache, parent, &edge("api", "1.0")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_rule3_build_mismatch() {
        let mut fx = Fixture::new();
        let app = fx.module("app/2.0/app.dll", "app", "2.0", &[]);
        fx.module("libs/util.dll", "util", "1.2.3.9", &[]);
        let resolver = Fixture::resolver(FakeAnalyzer::default(), ResolutionFlags::empty());

        let resolved = resolver.resolve(&fx.cache, fx.artifact(&app), &edge("util", "1.2.3.0")).unwrap();
        assert_eq!(resolved, Some(id("util", "1.2.3.9")));

        let strict = Fixture::resolver(
            FakeAnalyzer::default(),
            ResolutionFlags::SKIP_BUILD_COMPAT_FALLBACK | ResolutionFlags::SKIP_MAJOR_MINOR_COMPAT_FALLBACK,
        );
        assert_eq!(strict.resolve(&fx.cache, fx.artifact(&app), &edge("util", "1.2.3.0")).unwrap(), None);
    }

    #[test]
    fn test_rule4_requires_single_candidate() {
        let mut fx = Fixture::new();
        let app = fx.module("app/2.0/app.dll", "app", "2.0", &[]);
        fx.module("libs/a/util.dll", "util", "1.2.5.0", &[]);
        let resolver = Fixture::resolver(FakeAnalyzer::default(), ResolutionFlags::empty());
        assert_eq!(
            resolver.resolve(&fx.cache, fx.artifact(&app), &edge("util", "1.2.0.0")).unwrap(),
            Some(id("util", "1.2.5.0"))
        );

        fx.module("libs/b/util.dll", "util", "1.2.7.0", &[]);
        assert_eq!(resolver.resolve(&fx.cache, fx.artifact(&app), &edge("util", "1.2.0.0")).unwrap(), None);
    }

    #[test]
    fn test_rule1_manual_mapping_and_index() {
        struct MappingConfigs;
        impl ConfigurationResolver for MappingConfigs {
            fn get(&self, _path: &Path) -> Configuration {
                let mut config = Configuration::default();
                config.mappings.push(PackageMapping {
                    package: "Newtonsoft.Json".to_string(),
                    version: Some(SemanticVersion::parse("9.0.1").unwrap()),
                    regex: Regex::new(r"(?i)^json\.net\..*").unwrap(),
                });
                config
            }
        }

        let mut fx = Fixture::new();
        let app = fx.module("app/2.0/app.dll", "app", "2.0", &[]);
        let index = Arc::new(MemoryIndex::new(&[("Castle", "3.0")]));
        let resolver = DependencyResolver::new(
            ResolutionFlags::empty(),
            Arc::new(MappingConfigs),
            Arc::new(FakeAnalyzer::default()),
        )
        .with_repository(Arc::new(OfficialRepository::new(index, "SNAPSHOT")));

        let parent = fx.artifact(&app);
        assert_eq!(
            resolver.resolve(&fx.cache, parent, &edge("Json.Net", "4.5")).unwrap(),
            Some(id("Newtonsoft.Json", "9.0.1"))
        );
        assert_eq!(
            resolver.resolve(&fx.cache, parent, &edge("Castle.Core", "3.0")).unwrap(),
            Some(id("Castle", "3.0"))
        );

        let offline = DependencyResolver::new(
            ResolutionFlags::SKIP_OFFICIAL_REPOSITORY_LOOKUP,
            Arc::new(MappingConfigs),
            Arc::new(FakeAnalyzer::default()),
        );
        assert_eq!(offline.resolve(&fx.cache, parent, &edge("Json.Net", "4.5")).unwrap(), None);
    }

    #[test]
    fn test_cache_hit_and_unresolved_recorded_once() {
        let mut fx = Fixture::new();
        let app = fx.module("app/2.0/app.dll", "app", "2.0", &[]);
        fx.module("util/1.0/util.dll", "util", "1.0", &[]);
        let store = ResolutionStore::new(fx.dir.path().join("cache"));
        let resolver = Fixture::resolver(FakeAnalyzer::default(), ResolutionFlags::empty()).with_store(store.clone());
        let parent = fx.artifact(&app);

        assert_eq!(resolver.resolve(&fx.cache, parent, &edge("util", "1.0")).unwrap(), Some(id("util", "1.0")));
        assert_eq!(store.load(parent.identity(), "util"), Some(id("util", "1.0")));

        // Rule 0 answers even once the local module is gone
        let empty = ArtifactCache::new();
        assert_eq!(resolver.resolve(&empty, parent, &edge("util", "1.0")).unwrap(), Some(id("util", "1.0")));

        for _ in 0..3 {
            assert_eq!(resolver.resolve(&fx.cache, parent, &edge("ghost", "1.0")).unwrap(), None);
        }
        assert_eq!(store.unresolved().unwrap(), vec!["ghost--1.0.0.0".to_string()]);
    }
}
