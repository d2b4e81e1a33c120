// src/assembler/mod.rs

//! Package assembly
//!
//! Turns a resolved artifact into a package. The dependency list is planned
//! by [`plan_dependencies`], which applies the declared circular edges, and
//! the package itself is written by a [`PackageAssembler`].

mod manifest;

pub use manifest::{ManifestAssembler, ManifestDependency, PackageFile, PackageManifest};

use crate::cache::ArtifactIdentity;
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::module::ReferenceEdge;
use crate::version::SemanticVersion;
use std::path::PathBuf;
use tracing::{debug, info};

/// One direct dependency of a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDependency {
    pub name: String,
    pub min_version: SemanticVersion,
}

impl PackageDependency {
    pub fn new(name: impl Into<String>, min_version: SemanticVersion) -> Self {
        Self {
            name: name.into(),
            min_version,
        }
    }
}

/// Everything needed to produce a package
#[derive(Debug, Clone)]
pub struct PackageSpec {
    pub identity: ArtifactIdentity,
    pub path: PathBuf,
    pub platform: String,
    pub dependencies: Vec<PackageDependency>,
    /// Additional package ids the same content is published under
    pub extra_ids: Vec<String>,
}

/// Writes, detects and removes packages
pub trait PackageAssembler: Send + Sync {
    /// Whether the package for `identity` already exists
    fn exists(&self, identity: &ArtifactIdentity) -> bool;

    /// Produce the package, returning the files written
    fn assemble(&self, spec: &PackageSpec) -> Result<Vec<PathBuf>>;

    /// Remove the package for `identity`; missing packages are not an error
    fn remove(&self, identity: &ArtifactIdentity) -> Result<()>;
}

/// Build the direct dependency list of `package`
///
/// `resolve` is called for every reference that is not declared circular
/// with `package`; `Ok(None)` fails the whole package. Circular edges are
/// checked against the reference name and again against the resolved
/// package name, both ignoring case. When a dependency is
/// added and a circular edge starts at it, the edge's target is added too
/// (unless already present) so the cycle moves one level up.
pub fn plan_dependencies<F>(
    package: &ArtifactIdentity,
    config: &Configuration,
    references: &[ReferenceEdge],
    mut resolve: F,
) -> Result<Vec<PackageDependency>>
where
    F: FnMut(&ReferenceEdge) -> Result<Option<ArtifactIdentity>>,
{
    let mut dependencies: Vec<PackageDependency> = Vec::new();

    for reference in references {
        if config.is_circular(&package.name, &reference.name) {
            info!("{} is declared circular for {}, dropped", reference.name, package);
            continue;
        }

        let Some(resolved) = resolve(reference)? else {
            return Err(Error::DependencyUnresolved {
                name: reference.name.clone(),
                version: reference.version.to_string(),
                required_by: package.to_string(),
            });
        };

        if config.is_circular(&package.name, &resolved.name) {
            info!("{} resolved to {}, declared circular for {}, dropped", reference, resolved, package);
            continue;
        }
        if resolved.name.eq_ignore_ascii_case(&package.name) {
            debug!("{} references itself through {}, skipped", package, reference);
            continue;
        }
        if contains(&dependencies, &resolved.name) {
            continue;
        }
        debug!("{} depends on {}", package, resolved);
        dependencies.push(PackageDependency::new(resolved.name.clone(), resolved.version));

        for edge in config.circular_from(&resolved.name) {
            if edge.to.eq_ignore_ascii_case(&package.name) || contains(&dependencies, &edge.to) {
                continue;
            }
            info!(
                "{} pulls {} >= {} in place of its circular edge",
                package, edge.to, edge.min_version
            );
            dependencies.push(PackageDependency::new(edge.to.clone(), edge.min_version.clone()));
        }
    }

    Ok(dependencies)
}

fn contains(dependencies: &[PackageDependency], name: &str) -> bool {
    dependencies.iter().any(|d| d.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_str;
    use crate::version::NumericVersion;

    fn id(name: &str, version: &str) -> ArtifactIdentity {
        ArtifactIdentity::new(name, SemanticVersion::parse(version).unwrap())
    }

    fn edge(name: &str) -> ReferenceEdge {
        ReferenceEdge::new(name, NumericVersion::new(1, 0, 0, 0))
    }

    fn circular_config() -> Configuration {
        parse_str("[dependencies.circular]\njaxen = \"jdom|1.0\"\n", "modpack.toml")
    }

    fn resolve_all(edge: &ReferenceEdge) -> Result<Option<ArtifactIdentity>> {
        Ok(Some(id(&edge.name, "1.0")))
    }

    fn names(dependencies: &[PackageDependency]) -> Vec<&str> {
        dependencies.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_circular_edge_is_dropped_for_its_source() {
        let config = circular_config();
        let deps = plan_dependencies(
            &id("jaxen", "1.1"),
            &config,
            &[edge("jdom"), edge("xom")],
            resolve_all,
        )
        .unwrap();
        assert_eq!(names(&deps), vec!["xom"]);
    }

    #[test]
    fn test_circular_target_is_lifted_to_dependents() {
        let config = circular_config();
        let deps = plan_dependencies(&id("acme", "2.0"), &config, &[edge("jaxen")], resolve_all).unwrap();
        assert_eq!(names(&deps), vec!["jaxen", "jdom"]);
        assert_eq!(deps[1].min_version, SemanticVersion::parse("1.0").unwrap());

        // Already present: not added twice
        let deps = plan_dependencies(
            &id("acme", "2.0"),
            &config,
            &[edge("jdom"), edge("jaxen")],
            resolve_all,
        )
        .unwrap();
        assert_eq!(names(&deps), vec!["jdom", "jaxen"]);
    }

    #[test]
    fn test_circular_edges_ignore_case() {
        let config = parse_str("[dependencies.circular]\nJaxen = \"Jdom|1.0\"\n", "modpack.toml");

        let deps = plan_dependencies(&id("jaxen", "1.1"), &config, &[edge("jdom")], resolve_all).unwrap();
        assert!(deps.is_empty());

        let deps = plan_dependencies(&id("acme", "2.0"), &config, &[edge("JAXEN")], resolve_all).unwrap();
        assert_eq!(names(&deps), vec!["JAXEN", "Jdom"]);
    }

    #[test]
    fn test_circular_edge_matches_resolved_name() {
        let config = circular_config();
        // The reference is mapped onto the jdom package during resolution
        let deps = plan_dependencies(
            &id("jaxen", "1.1"),
            &config,
            &[edge("org.jdom.core"), edge("xom")],
            |edge| {
                let name = if edge.name == "org.jdom.core" { "jdom" } else { edge.name.as_str() };
                Ok(Some(id(name, "1.0")))
            },
        )
        .unwrap();
        assert_eq!(names(&deps), vec!["xom"]);
    }

    #[test]
    fn test_circular_target_never_depends_on_itself() {
        let config = circular_config();
        let deps = plan_dependencies(&id("jdom", "1.0"), &config, &[edge("jaxen")], resolve_all).unwrap();
        assert_eq!(names(&deps), vec!["jaxen"]);
    }

    #[test]
    fn test_self_and_duplicate_dependencies_are_skipped() {
        let config = Configuration::default();
        let deps = plan_dependencies(
            &id("Acme", "1.0"),
            &config,
            &[edge("Acme"), edge("Util"), edge("util")],
            resolve_all,
        )
        .unwrap();
        assert_eq!(names(&deps), vec!["Util"]);
    }

    #[test]
    fn test_unresolved_reference_fails_package() {
        let config = Configuration::default();
        let err = plan_dependencies(&id("Acme", "1.0"), &config, &[edge("Ghost")], |_| Ok(None))
            .unwrap_err();
        assert!(matches!(err, Error::DependencyUnresolved { ref name, .. } if name == "Ghost"));
    }

    #[test]
    fn test_resolver_errors_propagate() {
        let config = Configuration::default();
        let err = plan_dependencies(&id("Acme", "1.0"), &config, &[edge("Util")], |_| {
            Err(Error::ConsistencyError("versions.toml".into()))
        })
        .unwrap_err();
        assert!(err.is_fatal());
    }
}
