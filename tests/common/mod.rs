// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use modpack::assembler::PackageManifest;
use modpack::Settings;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A module tree, cache, package index and output directory in one tempdir
pub struct Workspace {
    pub dir: TempDir,
}

/// API surface of a module written to its sidecar descriptor
#[derive(Default)]
pub struct Api<'a> {
    pub exports: &'a [&'a str],
    pub imports: &'a [&'a str],
}

impl Workspace {
    pub fn new() -> Self {
        let ws = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        fs::create_dir_all(ws.source()).unwrap();
        fs::create_dir_all(ws.index()).unwrap();
        ws
    }

    pub fn source(&self) -> PathBuf {
        self.dir.path().join("modules")
    }

    pub fn index(&self) -> PathBuf {
        self.dir.path().join("index")
    }

    pub fn output(&self) -> PathBuf {
        self.dir.path().join("packages")
    }

    pub fn settings(&self) -> Settings {
        Settings {
            source: self.source(),
            cache_dir: self.dir.path().join("cache"),
            output_dir: self.output(),
            official_repository: None,
            local_repository: Some(self.index()),
            ..Settings::default()
        }
    }

    /// Write a module file and its sidecar descriptor under the source root
    pub fn module(
        &self,
        rel: &str,
        name: &str,
        version: &str,
        references: &[(&str, &str)],
        api: Api<'_>,
    ) -> PathBuf {
        let path = self.source().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"MZ").unwrap();

        let mut descriptor = format!("name = \"{}\"\nversion = \"{}\"\nplatform = \"net40\"\n", name, version);
        for (ref_name, ref_version) in references {
            descriptor.push_str(&format!(
                "\n[[references]]\nname = \"{}\"\nversion = \"{}\"\n",
                ref_name, ref_version
            ));
        }
        descriptor.push_str("\n[api]\nimports = [");
        let imports: Vec<String> = api.imports.iter().map(|i| format!("\"{}\"", i)).collect();
        descriptor.push_str(&imports.join(", "));
        descriptor.push_str("]\n\n[api.exports]\n");
        for export in api.exports {
            descriptor.push_str(&format!("\"{}\" = \"method\"\n", export));
        }

        fs::write(modpack::module::sidecar_path(&path), descriptor).unwrap();
        path
    }

    /// Write a `modpack.toml` into a directory of the source tree
    pub fn config(&self, rel_dir: &str, content: &str) {
        let dir = self.source().join(rel_dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(modpack::config::CONFIG_FILE_NAME), content).unwrap();
    }

    /// Publish a package in the local index
    pub fn publish(&self, id: &str, version: &str) {
        fs::write(self.index().join(format!("{}.{}.json", id, version)), "{}").unwrap();
    }

    pub fn package(&self, id: &str, version: &str) -> Option<PackageManifest> {
        let path = self.output().join(format!("{}.{}.json", id, version));
        path.is_file().then(|| PackageManifest::from_file(&path).unwrap())
    }
}

/// `(id, version)` pairs of a manifest's dependencies, sorted
pub fn dependencies(manifest: &PackageManifest) -> Vec<(String, String)> {
    let mut deps: Vec<(String, String)> = manifest
        .dependencies
        .iter()
        .map(|d| (d.id.clone(), d.version.clone()))
        .collect();
    deps.sort();
    deps
}
