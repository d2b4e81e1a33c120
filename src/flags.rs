// src/flags.rs

//! Resolution strictness flags
//!
//! Each flag switches off one rule of version or dependency resolution. The
//! bit values are stable because they are passed on the command line and
//! stored in settings files as a plain integer.

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResolutionFlags: u32 {
        /// Keep modules declaring the all-zero version
        const ACCEPT_ZERO_VERSION              = 1 << 0;
        /// Never derive versions from folder names
        const SKIP_FOLDER_VERSION              = 1 << 1;
        /// Only look at the module's own folder, not its parent
        const SKIP_FOLDER_VERSION_RECURSION    = 1 << 2;
        /// Skip manual mappings and package index lookups
        const SKIP_OFFICIAL_REPOSITORY_LOOKUP  = 1 << 3;
        /// Skip the same major.minor.patch fallback
        const SKIP_BUILD_COMPAT_FALLBACK       = 1 << 4;
        /// Skip the unique major.minor fallback
        const SKIP_MAJOR_MINOR_COMPAT_FALLBACK = 1 << 5;
        /// Skip breaking-change disambiguation of same-version modules
        const SKIP_CONFLICT_DISAMBIGUATION     = 1 << 6;
    }
}

impl ResolutionFlags {
    /// Build flags from a resolution level integer, ignoring unknown bits
    pub fn from_level(level: u32) -> Self {
        Self::from_bits_truncate(level)
    }
}
