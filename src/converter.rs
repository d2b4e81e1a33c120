// src/converter.rs
//! Conversion orchestration
//!
//! The [`Converter`] is the single owner of the artifact cache. It discovers
//! modules under the source root, loads them, resolves every reference and
//! hands the result to the package assembler. All cache mutations happen
//! through `&mut self`, so there is exactly one writer.

use crate::assembler::{plan_dependencies, ManifestAssembler, PackageAssembler, PackageSpec};
use crate::cache::{ArtifactCache, ArtifactIdentity, CacheStore, ModuleScanner};
use crate::config::{ConfigurationResolver, DirectoryConfigResolver};
use crate::error::{Error, Result};
use crate::module::{ApiAnalyzer, MetadataReader, ModuleReader, ReferenceEdge, SharedLibraryClassifier};
use crate::repository::{DirectoryIndex, FlatContainerIndex, OfficialRepository, PackageIndex, PackageLookup};
use crate::resolver::{DependencyResolver, ResolutionStore};
use crate::settings::Settings;
use crate::version::VersionResolver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// The pluggable parts a [`Converter`] is built from
pub struct Collaborators {
    pub reader: Arc<dyn MetadataReader>,
    pub analyzer: Arc<dyn ApiAnalyzer>,
    pub configs: Arc<dyn ConfigurationResolver>,
    pub classifier: Arc<dyn SharedLibraryClassifier>,
    pub repository: Option<Arc<dyn PackageLookup>>,
    pub assembler: Arc<dyn PackageAssembler>,
}

impl Collaborators {
    /// Default implementations configured from `settings`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let reader = Arc::new(ModuleReader::new());

        let index = match (&settings.local_repository, &settings.official_repository) {
            (Some(dir), _) => {
                info!("Using local package index {}", dir.display());
                Some(Arc::new(DirectoryIndex::new(dir)) as Arc<dyn PackageIndex>)
            }
            (None, Some(url)) if !url.trim().is_empty() => {
                info!("Using package index {}", url);
                Some(Arc::new(FlatContainerIndex::new(url)?) as Arc<dyn PackageIndex>)
            }
            _ => None,
        };
        let repository = index.map(|index| {
            Arc::new(OfficialRepository::new(index, settings.snapshot_label.clone())) as Arc<dyn PackageLookup>
        });

        Ok(Self {
            reader: reader.clone(),
            analyzer: reader,
            configs: Arc::new(DirectoryConfigResolver::new()),
            classifier: Arc::new(settings.host_libraries.clone()),
            repository,
            assembler: Arc::new(
                ManifestAssembler::new(&settings.output_dir).with_authors(&settings.author, &settings.owner),
            ),
        })
    }
}

/// Outcome of a sync run
#[derive(Debug, Default)]
pub struct SyncReport {
    pub created: Vec<ArtifactIdentity>,
    pub skipped: Vec<ArtifactIdentity>,
    pub failed: Vec<(ArtifactIdentity, String)>,
    /// Unresolved edge markers, `<dependency>--<rawVersion>`
    pub unresolved: Vec<String>,
}

impl SyncReport {
    pub fn log_summary(&self) {
        info!(
            "{} package(s) created, {} skipped, {} failed",
            self.created.len(),
            self.skipped.len(),
            self.failed.len()
        );
        for (identity, reason) in &self.failed {
            warn!("FAILED: {}: {}", identity, reason);
        }
        for marker in &self.unresolved {
            warn!("UNRESOLVED: {}", marker);
        }
    }
}

/// Outcome of rebuilding after a single file changed
#[derive(Debug, PartialEq, Eq)]
pub enum RebuildOutcome {
    Built(ArtifactIdentity),
    /// The file is gone; its artifact and package were removed
    Removed(ArtifactIdentity),
    /// The file was not loaded (unreadable, ignored) or was never known
    Skipped,
    Failed(ArtifactIdentity, String),
}

pub struct Converter {
    settings: Settings,
    cache: ArtifactCache,
    cache_store: CacheStore,
    scanner: ModuleScanner,
    resolver: DependencyResolver,
    configs: Arc<dyn ConfigurationResolver>,
    assembler: Arc<dyn PackageAssembler>,
}

impl Converter {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Result<Self> {
        let flags = settings.flags();
        let cache_store = CacheStore::new(&settings.cache_dir);
        let cache = if settings.use_cache {
            cache_store.load()?
        } else {
            ArtifactCache::new()
        };

        let scanner = ModuleScanner::new(
            collaborators.reader,
            VersionResolver::new(flags),
            collaborators.configs.clone(),
            collaborators.classifier,
        );

        let mut resolver = DependencyResolver::new(flags, collaborators.configs.clone(), collaborators.analyzer);
        if let Some(repository) = collaborators.repository {
            resolver = resolver.with_repository(repository);
        }
        if settings.use_cache {
            resolver = resolver.with_store(ResolutionStore::new(&settings.cache_dir));
        }

        Ok(Self {
            settings,
            cache,
            cache_store,
            scanner,
            resolver,
            configs: collaborators.configs,
            assembler: collaborators.assembler,
        })
    }

    pub fn from_settings(settings: Settings) -> Result<Self> {
        let collaborators = Collaborators::from_settings(&settings)?;
        Self::new(settings, collaborators)
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Module files under the source root, sorted
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let root = &self.settings.source;
        if !root.is_dir() {
            return Err(Error::IoError(format!("Source {} is not a directory", root.display())));
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.settings.is_module(e.path()))
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        debug!("Discovered {} module(s) under {}", paths.len(), root.display());
        Ok(paths)
    }

    /// Discover and load every module not cached yet, then persist the cache
    pub fn scan(&mut self) -> Result<Vec<ArtifactIdentity>> {
        let paths = self.discover()?;
        let loaded = self.cache.bulk_load(&self.scanner, &paths);
        info!(
            "{} module(s) loaded, {} artifact(s) cached, {} ignored",
            loaded.len(),
            self.cache.len(),
            self.cache.ignored().count()
        );
        self.save()?;
        Ok(loaded)
    }

    /// Scan, then build a package for every cached artifact
    ///
    /// Stops at the first consistency failure; every other failure only
    /// affects its own package.
    pub fn sync(&mut self) -> Result<SyncReport> {
        self.scan()?;

        let mut report = SyncReport::default();
        for identity in self.cache.identities() {
            if self.settings.use_cache && self.assembler.exists(&identity) {
                debug!("SKIP: package {} exists", identity);
                report.skipped.push(identity);
                continue;
            }

            match self.build(&identity) {
                Ok(_) => report.created.push(identity),
                Err(e) if e.is_fatal() => {
                    error!("Aborting, {} is inconsistent: {}", identity, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Package {} not created: {}", identity, e);
                    self.discard_package(&identity);
                    report.failed.push((identity, e.to_string()));
                }
            }
        }

        if let Some(store) = self.resolver.store() {
            report.unresolved = store.unresolved()?;
        }
        self.save()?;
        Ok(report)
    }

    /// React to a change of a single module file
    pub fn rebuild(&mut self, path: &Path) -> Result<RebuildOutcome> {
        let previous = self.cache.find_by_path(path).map(|a| a.identity().clone());

        if !path.exists() {
            let Some(identity) = previous else {
                debug!("{} is not a known module", path.display());
                return Ok(RebuildOutcome::Skipped);
            };
            self.forget(&identity);
            self.save()?;
            return Ok(RebuildOutcome::Removed(identity));
        }

        let Some(identity) = self.cache.upsert(&self.scanner, path) else {
            return Ok(RebuildOutcome::Skipped);
        };
        if let Some(ref previous) = previous
            && previous != &identity
        {
            info!("{} now provides {} instead of {}", path.display(), identity, previous);
            self.forget(previous);
        }

        self.discard_package(&identity);
        let outcome = match self.build(&identity) {
            Ok(_) => RebuildOutcome::Built(identity),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Package {} not created: {}", identity, e);
                self.discard_package(&identity);
                RebuildOutcome::Failed(identity, e.to_string())
            }
        };
        self.save()?;
        Ok(outcome)
    }

    /// Persist the artifact table and the conflict set
    pub fn save(&self) -> Result<()> {
        self.cache_store.save(&self.cache)
    }

    fn build(&self, identity: &ArtifactIdentity) -> Result<Vec<PathBuf>> {
        let artifact = self
            .cache
            .get(identity)
            .ok_or_else(|| Error::ConsistencyError(format!("{} is not cached", identity)))?;
        let config = self.configs.get(artifact.path());
        let references: Vec<ReferenceEdge> = artifact.references().iter().cloned().collect();

        let dependencies = plan_dependencies(identity, &config, &references, |edge| {
            self.resolver.resolve(&self.cache, artifact, edge)
        })?;

        let spec = PackageSpec {
            identity: identity.clone(),
            path: artifact.path().to_path_buf(),
            platform: artifact.platform().to_string(),
            dependencies,
            extra_ids: config.renamed_ids(&identity.name),
        };
        let written = self.assembler.assemble(&spec)?;
        info!("CREATED: {} ({} file(s))", identity, written.len());
        Ok(written)
    }

    /// Drop the package and the cached resolutions of `identity`
    fn discard_package(&self, identity: &ArtifactIdentity) {
        if let Err(e) = self.assembler.remove(identity) {
            warn!("Unable to remove package {}: {}", identity, e);
        }
        if let Some(store) = self.resolver.store()
            && let Err(e) = store.delete(identity)
        {
            warn!("Unable to remove cached resolutions of {}: {}", identity, e);
        }
    }

    fn forget(&mut self, identity: &ArtifactIdentity) {
        self.discard_package(identity);
        self.cache.remove(identity);
    }
}
