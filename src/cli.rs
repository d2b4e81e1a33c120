// src/cli.rs
//! CLI definitions for modpack
//!
//! Global options override the matching fields of the settings file.

use clap::{Parser, Subcommand};
use modpack::Settings;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "modpack")]
#[command(version)]
#[command(about = "Turn a tree of compiled modules into versioned, dependency-annotated packages", long_about = None)]
pub struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Root of the module tree
    #[arg(long, global = true)]
    pub source: Option<PathBuf>,

    /// Directory package manifests are written to
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Ignore cached resolutions and rebuild existing packages
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Resolution strictness bitset
    #[arg(long, global = true)]
    pub resolution_level: Option<u32>,

    /// Package index URL; an empty value disables index lookups
    #[arg(long, global = true)]
    pub official_repository: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load every module under the source root into the cache
    Scan,

    /// Scan, then build a package for every cached module
    Sync,

    /// Rebuild the package of a single changed or deleted module
    Rebuild {
        /// Path of the module file
        file: PathBuf,
    },
}

impl Cli {
    /// Settings from the settings file with command line overrides applied
    pub fn load_settings(&self) -> modpack::Result<Settings> {
        let mut settings = match self.settings {
            Some(ref path) => Settings::load(path)?,
            None => Settings::default(),
        };

        if let Some(ref source) = self.source {
            settings.source = source.clone();
        }
        if let Some(ref output) = self.output {
            settings.output_dir = output.clone();
        }
        if self.no_cache {
            settings.use_cache = false;
        }
        if let Some(level) = self.resolution_level {
            settings.resolution_level = level;
        }
        if let Some(ref url) = self.official_repository {
            settings.official_repository = Some(url.clone());
        }
        Ok(settings)
    }
}
