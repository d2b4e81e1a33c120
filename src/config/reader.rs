// src/config/reader.rs

//! Lenient reader for `modpack.toml` files
//!
//! A broken entry never invalidates the rest of the file: malformed TOML
//! yields the default configuration, malformed entries are skipped, and each
//! problem is logged with the file it came from.

use super::{CircularEdge, Configuration, NamedPattern, PackageMapping};
use crate::error::{Error, Result};
use crate::version::SemanticVersion;
use regex::{Regex, RegexBuilder};
use std::path::Path;
use toml::{Table, Value};
use tracing::warn;

/// File name looked up in every ancestor directory
pub const CONFIG_FILE_NAME: &str = "modpack.toml";

/// Read one configuration file
///
/// Only I/O failures are reported as errors; content problems degrade to
/// defaults.
pub fn read_file(path: &Path) -> Result<Configuration> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(parse_str(&content, &path.display().to_string()))
}

pub(crate) fn parse_str(content: &str, origin: &str) -> Configuration {
    let mut configuration = Configuration::default();

    let table: Table = match content.parse() {
        Ok(table) => table,
        Err(e) => {
            warn!("Ignoring malformed configuration {}: {}", origin, e);
            return configuration;
        }
    };

    if let Some(global) = section(&table, &["global"]) {
        configuration.ignore = global
            .get("ignore")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if let Some(label) = global.get("snapshot_label").and_then(Value::as_str) {
            configuration.set_snapshot_label(label.to_string());
        }
    }

    if let Some(mappings) = section(&table, &["dependencies", "mapping"]) {
        for (key, value) in mappings {
            match parse_mapping(key, value) {
                Ok(mapping) => configuration.mappings.push(mapping),
                Err(e) => warn!("Skipping dependency mapping '{}' in {}: {}", key, origin, e),
            }
        }
    }

    if let Some(patterns) = section(&table, &["snapshot", "mapping"]) {
        configuration.snapshot_patterns = named_patterns(patterns, origin);
    }

    if let Some(patterns) = section(&table, &["package", "mapping"]) {
        configuration.package_renames = named_patterns(patterns, origin);
    }

    if let Some(edges) = section(&table, &["dependencies", "circular"]) {
        for (key, value) in edges {
            match parse_circular(key, value) {
                Ok(edge) => configuration.circular.push(edge),
                Err(e) => warn!("Skipping circular edge '{}' in {}: {}", key, origin, e),
            }
        }
    }

    configuration
}

fn section<'a>(table: &'a Table, path: &[&str]) -> Option<&'a Table> {
    let mut current = table;
    for key in path {
        current = current.get(*key)?.as_table()?;
    }
    Some(current)
}

fn case_insensitive(pattern: &str) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

fn value_str<'a>(value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| Error::ConfigError(format!("expected a string, found {}", value.type_str())))
}

fn named_patterns(table: &Table, origin: &str) -> Vec<NamedPattern> {
    let mut patterns = Vec::new();
    for (key, value) in table {
        match value_str(value).and_then(case_insensitive) {
            Ok(regex) => patterns.push(NamedPattern {
                key: key.clone(),
                regex,
            }),
            Err(e) => warn!("Skipping pattern '{}' in {}: {}", key, origin, e),
        }
    }
    patterns
}

/// `"<package>[|<version>]" = "<regex>"`
fn parse_mapping(key: &str, value: &Value) -> Result<PackageMapping> {
    let regex = case_insensitive(value_str(value)?)?;
    let (package, version) = match key.split_once('|') {
        Some((package, version)) => (package, Some(SemanticVersion::parse(version)?)),
        None => (key, None),
    };

    if package.trim().is_empty() {
        return Err(Error::ConfigError("empty package id".to_string()));
    }

    Ok(PackageMapping {
        package: package.trim().to_string(),
        version,
        regex,
    })
}

/// `<from> = "<to>|<minVersion>"`
fn parse_circular(key: &str, value: &Value) -> Result<CircularEdge> {
    let raw = value_str(value)?;
    let (to, version) = raw
        .split_once('|')
        .ok_or_else(|| Error::ConfigError(format!("expected '<name>|<version>', found '{}'", raw)))?;

    Ok(CircularEdge {
        from: key.to_string(),
        to: to.trim().to_string(),
        min_version: SemanticVersion::parse(version)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_flag_cases() {
        let cases = [
            ("[global]\nignore = true", true),
            ("ignore = true", false),
            ("[global]\nignore = false", false),
            ("[global]\nignore = \"something_wrong\"", false),
            ("[global]\nignore = something_wrong", false),
            ("", false),
        ];
        for (content, expected) in cases {
            assert_eq!(parse_str(content, "test").ignore, expected, "content: {:?}", content);
        }
    }

    #[test]
    fn test_full_file() {
        let content = r#"
[global]
snapshot_label = "nightly"

[dependencies.mapping]
"Newtonsoft.Json|9.0.1" = "^json\\.net\\..*"
"Castle.Core" = "^castle\\..*"

[snapshot.mapping]
plain = "^(?P<snapshot>snapshot)$"
bad = "^(unclosed"

[package.mapping]
"Contoso" = "^(?P<rename>Acme)\\..*"

[dependencies.circular]
jaxen = "jdom|1.0"
broken = "no-version"
"#;
        let config = parse_str(content, "test");
        assert_eq!(config.snapshot_label, "nightly");
        assert_eq!(config.mappings.len(), 2);
        assert_eq!(config.mappings[0].package, "Newtonsoft.Json");
        assert_eq!(
            config.mappings[0].version,
            Some(SemanticVersion::parse("9.0.1").unwrap())
        );
        assert!(config.find_mapping("JSON.NET.Core", "1.0.0.0").is_some());
        assert_eq!(config.snapshot_patterns.len(), 1);
        assert_eq!(config.package_renames.len(), 1);
        assert_eq!(config.circular.len(), 1);
        assert_eq!(config.circular[0].to, "jdom");
    }

    #[test]
    fn test_read_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[global]\nignore = true\n").unwrap();
        assert!(read_file(&path).unwrap().ignore);
        assert!(read_file(&dir.path().join("missing.toml")).is_err());
    }
}
