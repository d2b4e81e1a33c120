// src/repository/index.rs

//! Package index backends
//!
//! - [`FlatContainerIndex`]: remote index using the NuGet v3 flat-container
//!   layout (`{base}/{id}/index.json` lists every published version)
//! - [`DirectoryIndex`]: local folder of `<id>.<version>.<ext>` package files

use super::PackageIndex;
use crate::cache::ArtifactIdentity;
use crate::error::{Error, Result};
use crate::version::SemanticVersion;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Default timeout for index requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct VersionList {
    #[serde(default)]
    versions: Vec<String>,
}

/// Remote flat-container package index
pub struct FlatContainerIndex {
    base: String,
    client: Client,
}

impl FlatContainerIndex {
    pub fn new(base: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn versions_url(&self, id: &str) -> String {
        format!("{}/{}/index.json", self.base, id.to_lowercase())
    }
}

impl PackageIndex for FlatContainerIndex {
    fn find(&self, id: &str, version: &SemanticVersion) -> Result<Option<ArtifactIdentity>> {
        let url = self.versions_url(id);
        debug!("Querying {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::DownloadError(format!("{url}: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::DownloadError(format!("{url}: HTTP {}", response.status())));
        }

        let list: VersionList = response
            .json()
            .map_err(|e| Error::DownloadError(format!("{url}: {e}")))?;

        Ok(match_version(id, version, list.versions.iter().map(String::as_str)))
    }
}

/// Local folder acting as a package index
///
/// A file `Acme.Core.1.2.0.0.json` publishes `Acme.Core` at `1.2.0.0`.
pub struct DirectoryIndex {
    dir: PathBuf,
}

impl DirectoryIndex {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl PackageIndex for DirectoryIndex {
    fn find(&self, id: &str, version: &SemanticVersion) -> Result<Option<ArtifactIdentity>> {
        if !self.dir.is_dir() {
            return Ok(None);
        }

        let prefix = format!("{}.", id.to_lowercase());
        let mut published = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem() else {
                continue;
            };
            let stem = stem.to_string_lossy().to_lowercase();
            if let Some(rest) = stem.strip_prefix(&prefix) {
                published.push(rest.to_string());
            }
        }

        Ok(match_version(id, version, published.iter().map(String::as_str)))
    }
}

fn match_version<'a>(
    id: &str,
    wanted: &SemanticVersion,
    published: impl Iterator<Item = &'a str>,
) -> Option<ArtifactIdentity> {
    published
        .filter_map(|v| SemanticVersion::parse(v).ok())
        .find(|v| v == wanted)
        .map(|v| ArtifactIdentity::new(id, v))
}
