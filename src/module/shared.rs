// src/module/shared.rs
//! Host shared-library classification
//!
//! References to libraries the host platform provides are never tracked as
//! package dependencies. Classification is a pure substring match over the
//! reference descriptor; exclusions take precedence over markers.

use serde::{Deserialize, Serialize};

/// Decides whether a reference points at a host-provided library
pub trait SharedLibraryClassifier: Send + Sync {
    fn is_shared(&self, descriptor: &str) -> bool;
}

/// Default markers: platform public key tokens and core system libraries
pub const DEFAULT_MARKERS: &[&str] = &[
    "b77a5c561934e089",
    "b03f5f7f11d50a3a",
    "31bf3856ad364e35",
    "89845dcd8080cc91",
    "FSharp.Core",
    "mscorlib",
    "linux-vdso",
    "ld-linux",
    "libc.so",
    "libm.so",
    "libdl.so",
    "libpthread.so",
    "librt.so",
    "libgcc_s.so",
    "libstdc++.so",
];

/// Libraries that carry a marker but ship as regular packages
pub const DEFAULT_EXCLUSIONS: &[&str] = &["System.Reactive", "Microsoft.Threading.Task"];

/// Marker-based registry of host shared libraries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostLibraryRegistry {
    #[serde(default)]
    pub markers: Vec<String>,
    #[serde(default)]
    pub exclusions: Vec<String>,
}

impl HostLibraryRegistry {
    pub fn new(markers: Vec<String>, exclusions: Vec<String>) -> Self {
        Self {
            markers,
            exclusions,
        }
    }

    /// A registry that classifies nothing as shared
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl Default for HostLibraryRegistry {
    fn default() -> Self {
        Self::new(
            DEFAULT_MARKERS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl SharedLibraryClassifier for HostLibraryRegistry {
    fn is_shared(&self, descriptor: &str) -> bool {
        if self.exclusions.iter().any(|e| descriptor.contains(e.as_str())) {
            return false;
        }
        self.markers.iter().any(|m| descriptor.contains(m.as_str()))
    }
}
