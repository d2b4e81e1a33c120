// src/lib.rs

//! Modpack
//!
//! Turns a tree of compiled binary modules into versioned,
//! dependency-annotated packages.
//!
//! # Architecture
//!
//! - Versions: declared module versions reconciled with folder conventions
//! - Cache: one owning table of artifacts plus the conflict set of builds
//!   sharing a declared version
//! - Resolution: a rule waterfall binding every reference to a package,
//!   with breaking-change analysis when several local builds qualify
//! - Assembly: dependency planning with declared cycles broken, then one
//!   manifest per package

pub mod assembler;
pub mod cache;
pub mod config;
pub mod converter;
mod error;
pub mod flags;
pub mod module;
pub mod repository;
pub mod resolver;
pub mod settings;
pub mod version;

pub use assembler::{ManifestAssembler, PackageAssembler, PackageDependency, PackageSpec};
pub use cache::{Artifact, ArtifactCache, ArtifactIdentity, CacheStore, ConflictSet};
pub use config::{Configuration, ConfigurationResolver, DirectoryConfigResolver};
pub use converter::{Collaborators, Converter, RebuildOutcome, SyncReport};
pub use error::{Error, Result};
pub use flags::ResolutionFlags;
pub use module::{ApiAnalyzer, MetadataReader, ModuleReader, SharedLibraryClassifier};
pub use repository::{OfficialRepository, PackageIndex, PackageLookup};
pub use resolver::{DependencyResolver, ResolutionStore};
pub use settings::Settings;
pub use version::{NumericVersion, SemanticVersion};
