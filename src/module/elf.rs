// src/module/elf.rs
//! ELF shared object inspection using goblin
//!
//! - Name: SONAME (or file name) up to `.so`
//! - Version: numeric suffix after `.so.` (`libfoo.so.1.2` is 1.2.0.0)
//! - Platform: ELF machine
//! - References: `DT_NEEDED` entries
//! - API surface: defined dynamic symbols as exports, undefined ones as imports

use super::{ApiSurface, ModuleMetadata, ReferenceEdge};
use crate::error::{Error, Result};
use crate::version::NumericVersion;
use goblin::elf::Elf;
use goblin::Object;
use std::path::Path;

/// Metadata and API surface of one ELF shared object
#[derive(Debug, Clone)]
pub struct ElfModule {
    pub metadata: ModuleMetadata,
    pub surface: ApiSurface,
}

impl ElfModule {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path).map_err(|e| read_error(path, e))?;
        let elf = match Object::parse(&content) {
            Ok(Object::Elf(elf)) => elf,
            Ok(_) => return Err(read_error(path, "not an ELF object")),
            Err(e) => return Err(read_error(path, e)),
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (name, version) = split_soname(elf.soname.unwrap_or(&file_name));

        let references = elf
            .libraries
            .iter()
            .map(|lib| {
                let (dep_name, dep_version) = split_soname(lib);
                ReferenceEdge::new(dep_name, dep_version).with_descriptor(*lib)
            })
            .collect();

        let metadata = ModuleMetadata {
            name,
            version,
            platform: goblin::elf::header::machine_to_str(elf.header.e_machine).to_string(),
            references,
        };

        Ok(Self {
            metadata,
            surface: surface(&elf),
        })
    }
}

fn surface(elf: &Elf) -> ApiSurface {
    let mut surface = ApiSurface::default();
    for sym in &elf.dynsyms {
        let Some(name) = elf.dynstrtab.get_at(sym.st_name) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        if sym.is_import() {
            surface.imports.insert(name.to_string());
        } else if sym.st_value != 0 {
            let signature = format!(
                "{}:{}",
                goblin::elf::sym::type_to_str(sym.st_type()),
                sym.st_size
            );
            surface.exports.insert(name.to_string(), signature);
        }
    }
    surface
}

/// Split `libfoo.so.1.2.3` into `("libfoo", 1.2.3.0)`
///
/// Names without `.so` keep their whole text and version 0.0.0.0. Suffix
/// components stop at the first non-numeric one.
pub(crate) fn split_soname(soname: &str) -> (String, NumericVersion) {
    if let Some(name) = soname.strip_suffix(".so") {
        return (name.to_string(), NumericVersion::ZERO);
    }
    let Some(idx) = soname.find(".so.") else {
        return (soname.to_string(), NumericVersion::ZERO);
    };
    let name = soname[..idx].to_string();

    let mut components = [0u64; 4];
    for (slot, part) in components.iter_mut().zip(soname[idx + 4..].split('.')) {
        match part.parse::<u64>() {
            Ok(n) => *slot = n,
            Err(_) => break,
        }
    }

    (
        name,
        NumericVersion::new(components[0], components[1], components[2], components[3]),
    )
}

fn read_error(path: &Path, reason: impl std::fmt::Display) -> Error {
    Error::ReadError {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_soname() {
        assert_eq!(
            split_soname("libssl.so.3"),
            ("libssl".to_string(), NumericVersion::new(3, 0, 0, 0))
        );
        assert_eq!(
            split_soname("libfoo.so.1.2.3"),
            ("libfoo".to_string(), NumericVersion::new(1, 2, 3, 0))
        );
        assert_eq!(
            split_soname("libbar.so"),
            ("libbar".to_string(), NumericVersion::ZERO)
        );
        assert_eq!(
            split_soname("libqux.so.2.beta"),
            ("libqux".to_string(), NumericVersion::new(2, 0, 0, 0))
        );
        assert_eq!(
            split_soname("plain"),
            ("plain".to_string(), NumericVersion::ZERO)
        );
    }

    #[test]
    fn test_non_elf_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libfake.so.1");
        std::fs::write(&path, b"definitely not an object file").unwrap();
        assert!(matches!(ElfModule::load(&path), Err(Error::ReadError { .. })));
    }
}
