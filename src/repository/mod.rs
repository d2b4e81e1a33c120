// src/repository/mod.rs

//! External package repository lookup
//!
//! A dependency that is already published (on a public index or in a local
//! package folder) binds to the published identity instead of a locally
//! scanned module. [`OfficialRepository`] walks progressively shorter
//! dot-delimited name prefixes, trying both the exact version and its
//! snapshot variant for each, and remembers positive answers for the
//! lifetime of the process.

mod coalesce;
mod index;

pub use coalesce::LookupCache;
pub use index::{DirectoryIndex, FlatContainerIndex};

use crate::cache::ArtifactIdentity;
use crate::error::Result;
use crate::version::{NumericVersion, SemanticVersion};
use std::sync::Arc;
use tracing::{debug, info};

/// A source of published packages
pub trait PackageIndex: Send + Sync {
    /// Exact lookup of package `id` at `version`; `Ok(None)` when absent
    fn find(&self, id: &str, version: &SemanticVersion) -> Result<Option<ArtifactIdentity>>;
}

/// Lookup of a reference against a package index
pub trait PackageLookup: Send + Sync {
    fn find(&self, name: &str, version: NumericVersion) -> Option<ArtifactIdentity>;
}

/// Prefix and snapshot walk over a [`PackageIndex`] with single-flight caching
pub struct OfficialRepository {
    index: Arc<dyn PackageIndex>,
    snapshot_label: String,
    lookups: LookupCache<(NumericVersion, String)>,
}

impl OfficialRepository {
    pub fn new(index: Arc<dyn PackageIndex>, snapshot_label: impl Into<String>) -> Self {
        Self {
            index,
            snapshot_label: snapshot_label.into(),
            lookups: LookupCache::new(),
        }
    }

    /// Number of lookups answered from the in-process cache
    pub fn coalesced_count(&self) -> u64 {
        self.lookups.coalesced_count()
    }

    fn walk(&self, name: &str, version: NumericVersion) -> Option<ArtifactIdentity> {
        let release = SemanticVersion::release(version);
        let snapshot = SemanticVersion::with_special(version, &self.snapshot_label).ok();

        let parts: Vec<&str> = name.split('.').collect();
        for end in (1..=parts.len()).rev() {
            let candidate = parts[..end].join(".");

            match self.index.find(&candidate, &release) {
                Ok(Some(found)) => return Some(found),
                Ok(None) => {}
                Err(e) => info!("Can't query package index for {}-{}: {}", candidate, release, e),
            }

            if let Some(ref snapshot) = snapshot {
                match self.index.find(&candidate, snapshot) {
                    Ok(Some(found)) => {
                        info!("{}-{} not published, snapshot version used", candidate, release);
                        return Some(found);
                    }
                    Ok(None) => {}
                    Err(e) => info!("Can't query package index for {}-{}: {}", candidate, snapshot, e),
                }
            }
        }

        None
    }
}

impl PackageLookup for OfficialRepository {
    fn find(&self, name: &str, version: NumericVersion) -> Option<ArtifactIdentity> {
        let key = (version, name.to_lowercase());
        let found = self.lookups.get_or_lookup(key, || self.walk(name, version));
        match found {
            Some(ref identity) => info!("{}-{} found in package index as {}", name, version, identity),
            None => debug!("{}-{} not found in package index", name, version),
        }
        found
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Index publishing a fixed set of identities, recording every query
    pub(crate) struct MemoryIndex {
        published: Vec<ArtifactIdentity>,
        pub queries: Mutex<Vec<String>>,
    }

    impl MemoryIndex {
        pub fn new(published: &[(&str, &str)]) -> Self {
            Self {
                published: published
                    .iter()
                    .map(|(id, v)| ArtifactIdentity::new(*id, SemanticVersion::parse(v).unwrap()))
                    .collect(),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    impl PackageIndex for MemoryIndex {
        fn find(&self, id: &str, version: &SemanticVersion) -> Result<Option<ArtifactIdentity>> {
            self.queries.lock().push(format!("{}-{}", id, version));
            Ok(self
                .published
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(id) && &p.version == version)
                .cloned())
        }
    }

    #[test]
    fn test_prefix_walk() {
        let index = Arc::new(MemoryIndex::new(&[("Castle", "3.0.0.0")]));
        let repo = OfficialRepository::new(index.clone(), "SNAPSHOT");

        let found = repo.find("Castle.Core.Extra", NumericVersion::new(3, 0, 0, 0));
        assert_eq!(found.unwrap().name, "Castle");
        assert_eq!(
            *index.queries.lock(),
            vec![
                "Castle.Core.Extra-3.0.0.0",
                "Castle.Core.Extra-3.0.0.0-snapshot",
                "Castle.Core-3.0.0.0",
                "Castle.Core-3.0.0.0-snapshot",
                "Castle-3.0.0.0",
            ]
        );
    }

    #[test]
    fn test_snapshot_variant() {
        let index = Arc::new(MemoryIndex::new(&[("Acme", "1.0-snapshot")]));
        let repo = OfficialRepository::new(index, "SNAPSHOT");
        let found = repo.find("Acme", NumericVersion::new(1, 0, 0, 0)).unwrap();
        assert!(found.is_snapshot());
    }

    #[test]
    fn test_hits_are_cached() {
        let index = Arc::new(MemoryIndex::new(&[("Acme", "1.0")]));
        let repo = OfficialRepository::new(index.clone(), "SNAPSHOT");
        let version = NumericVersion::new(1, 0, 0, 0);

        assert!(repo.find("Acme", version).is_some());
        assert!(repo.find("acme", version).is_some());
        assert!(repo.find("Other", version).is_none());
        assert!(repo.find("Other", version).is_none());

        let queries = index.queries.lock();
        assert_eq!(queries.iter().filter(|q| q.starts_with("Acme")).count(), 1);
        assert_eq!(queries.iter().filter(|q| q.starts_with("Other")).count(), 4);
        assert_eq!(repo.coalesced_count(), 1);
    }
}
