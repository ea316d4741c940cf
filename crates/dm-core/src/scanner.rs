//! Directory scanner for discovering `.dm` mod scripts
//!
//! Walks caller-supplied roots only; locating the game's install or
//! workshop folders is the front end's job.

use crate::error::{Error, Result};
use crate::merge::ModSource;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A discovered mod script
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModFile {
    /// Full path to the file
    pub path: PathBuf,
    /// Stable mod name, derived from the file stem
    pub name: String,
}

/// Result of scanning directories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Root directories that were scanned
    pub roots: Vec<PathBuf>,
    /// Discovered mod files, sorted by name
    pub mods: Vec<ModFile>,
}

impl ScanResult {
    pub fn find_mod(&self, name: &str) -> Option<&ModFile> {
        self.mods.iter().find(|m| m.name == name)
    }

    pub fn mod_names(&self) -> Vec<&str> {
        self.mods.iter().map(|m| m.name.as_str()).collect()
    }
}

/// Scan one or more directories for `.dm` files
pub fn scan_mods<P: AsRef<Path>>(roots: &[P]) -> Result<ScanResult> {
    let mut mods = Vec::new();

    for root in roots {
        let root = root.as_ref();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "dm") {
                if let Some(name) = mod_name_from_path(path) {
                    mods.push(ModFile {
                        path: path.to_path_buf(),
                        name,
                    });
                }
            }
        }
    }

    mods.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));

    Ok(ScanResult {
        roots: roots.iter().map(|r| r.as_ref().to_path_buf()).collect(),
        mods,
    })
}

/// Load the script text for each discovered mod
pub fn load_sources(files: &[ModFile]) -> Result<Vec<ModSource>> {
    let mut sources = Vec::with_capacity(files.len());
    for file in files {
        let text = fs::read_to_string(&file.path).map_err(|e| Error::FileRead {
            path: file.path.clone(),
            source: e,
        })?;
        sources.push(ModSource::new(file.name.clone(), text));
    }
    Ok(sources)
}

/// Stable mod name from a script path
///
/// Examples:
/// - "mods/warhammer.dm" -> "warhammer"
/// - "Deep_Ones_v2.dm" -> "Deep_Ones_v2"
fn mod_name_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mod_name_from_path() {
        assert_eq!(
            mod_name_from_path(Path::new("mods/warhammer.dm")),
            Some("warhammer".to_string())
        );
        assert_eq!(
            mod_name_from_path(Path::new("Deep_Ones_v2.dm")),
            Some("Deep_Ones_v2".to_string())
        );
    }
}
