// src/version/resolver.rs

//! Canonical version resolution
//!
//! Rules, first applicable wins:
//! 1. A module declaring `0.0.0.0` is rejected unless zero versions are accepted
//! 2. A version-like folder (or its parent) decides the version. A snapshot
//!    tail makes the module a snapshot; otherwise a mismatch with the declared
//!    version is logged and the folder version still wins
//! 3. Without a usable folder, the declared version is used as-is

use super::folder::{parse_folder_name, FolderVersion};
use super::{NumericVersion, SemanticVersion};
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::flags::ResolutionFlags;
use std::ffi::OsStr;
use std::path::Path;
use tracing::{debug, warn};

/// Outcome of resolving a module's version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalVersion {
    /// Version used in the artifact identity
    pub version: SemanticVersion,
    /// Version the module declared about itself
    pub raw: NumericVersion,
    /// Folder and declared versions disagree
    pub mismatch: bool,
}

impl CanonicalVersion {
    pub fn is_snapshot(&self) -> bool {
        self.version.is_snapshot()
    }
}

/// Derives canonical versions from declared versions and folder names
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionResolver {
    flags: ResolutionFlags,
}

impl VersionResolver {
    pub fn new(flags: ResolutionFlags) -> Self {
        Self { flags }
    }

    /// Resolve the canonical version of the module at `path`
    pub fn resolve(
        &self,
        raw: NumericVersion,
        path: &Path,
        config: &Configuration,
    ) -> Result<CanonicalVersion> {
        if raw.is_zero() && !self.flags.contains(ResolutionFlags::ACCEPT_ZERO_VERSION) {
            warn!("Declared version of {} is 0.0.0.0", path.display());
            return Err(Error::VersionNotResolvable(format!(
                "{} declares version 0.0.0.0",
                path.display()
            )));
        }

        if !self.flags.contains(ResolutionFlags::SKIP_FOLDER_VERSION)
            && let Some(folder) = self.parse_folder_version(path, config)
        {
            let version = folder.to_semantic(&config.snapshot_label)?;

            if folder.is_snapshot {
                return Ok(CanonicalVersion {
                    version,
                    raw,
                    mismatch: folder.version != raw,
                });
            }

            let mismatch = folder.version != raw;
            if mismatch {
                warn!(
                    "MISMATCH: {} folder version {} differs from declared {}, folder version taken",
                    path.display(),
                    folder.version,
                    raw
                );
            }
            return Ok(CanonicalVersion {
                version,
                raw,
                mismatch,
            });
        }

        Ok(CanonicalVersion {
            version: SemanticVersion::release(raw),
            raw,
            mismatch: false,
        })
    }

    /// Parse the version encoded in the module's folder, then its parent
    ///
    /// A folder whose tail yields an invalid special tag counts as
    /// unparseable.
    pub fn parse_folder_version(
        &self,
        path: &Path,
        config: &Configuration,
    ) -> Option<FolderVersion> {
        let dir = path.parent()?;

        let mut result = dir.file_name().and_then(|name| folder_version(name, config));

        if result.is_none()
            && !self
                .flags
                .contains(ResolutionFlags::SKIP_FOLDER_VERSION_RECURSION)
        {
            result = dir
                .parent()
                .and_then(Path::file_name)
                .and_then(|name| folder_version(name, config));
        }

        match result {
            Some(ref folder) => debug!("Folder version for {} is {}", path.display(), folder.version),
            None => debug!("Folder version is not parseable for {}", path.display()),
        }
        result
    }
}

fn folder_version(name: &OsStr, config: &Configuration) -> Option<FolderVersion> {
    let name = name.to_string_lossy();
    let folder = parse_folder_name(&name, config.snapshot_regexes())?;
    match folder.to_semantic(&config.snapshot_label) {
        Ok(_) => Some(folder),
        Err(e) => {
            debug!("Folder '{}' has no usable version: {}", name, e);
            None
        }
    }
}
