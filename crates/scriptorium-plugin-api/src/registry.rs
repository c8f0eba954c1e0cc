//! Plugin discovery from plugin root directories.
//!
//! Each immediate subdirectory of a root that contains a `manifest.toml` is a
//! plugin candidate. Candidates are validated and collected into a
//! [`PluginCatalog`]; anything malformed is reported as a [`ScanWarning`]
//! and left out.

use crate::catalog::PluginCatalog;
use crate::descriptor::PluginDescriptor;
use crate::manifest::{PluginManifest, MANIFEST_FILE_NAME};
use scriptorium_runtime::ErrorKind;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// A non-fatal problem found while scanning plugin roots.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanWarning {
    #[error("invalid manifest {}: {reason}", .path.display())]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("plugin '{id}' entry point {} is unusable: {reason}", .path.display())]
    EntryPointMissing {
        id: String,
        path: PathBuf,
        reason: String,
    },

    #[error("plugin '{id}' at {} replaced the one at {}", .by.display(), .replaced.display())]
    DuplicateId {
        id: String,
        replaced: PathBuf,
        by: PathBuf,
    },
}

impl ScanWarning {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanWarning::ManifestInvalid { .. } => ErrorKind::ManifestInvalid,
            ScanWarning::EntryPointMissing { .. } => ErrorKind::EntryPointMissing,
            ScanWarning::DuplicateId { .. } => ErrorKind::DuplicateId,
        }
    }
}

/// Scans plugin roots and builds catalogs.
///
/// The registry holds no state between scans; every call reads the disk
/// afresh and returns a new catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct PluginRegistry;

impl PluginRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Scan `roots` in order and build a catalog.
    ///
    /// Missing roots are skipped. When two plugins share an id, the one
    /// discovered later wins and a [`ScanWarning::DuplicateId`] is recorded.
    pub fn load_plugins_from_disk(&self, roots: &[PathBuf]) -> (PluginCatalog, Vec<ScanWarning>) {
        let mut catalog = PluginCatalog::new();
        let mut warnings = Vec::new();

        for root in roots {
            debug!("Scanning plugin root: {:?}", root);
            for candidate in candidates(root) {
                match load_candidate(&candidate) {
                    Ok(descriptor) => {
                        info!(
                            "Discovered plugin: {} v{} ({}) at {:?}",
                            descriptor.name, descriptor.version, descriptor.kind, candidate
                        );
                        let id = descriptor.id.clone();
                        if let Some(previous) = catalog.insert(descriptor) {
                            warnings.push(ScanWarning::DuplicateId {
                                id,
                                replaced: previous.root_dir,
                                by: candidate,
                            });
                        }
                    }
                    Err(warning) => warnings.push(warning),
                }
            }
        }

        for warning in &warnings {
            warn!("{}", warning);
        }
        info!(
            "Loaded {} plugins with {} warnings",
            catalog.len(),
            warnings.len()
        );

        (catalog, warnings)
    }
}

/// Plugin directories directly under `root`, in lexicographic order.
fn candidates(root: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Skipping plugin root {:?}: {}", root, e);
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| {
            let has_manifest = path.join(MANIFEST_FILE_NAME).is_file();
            if !has_manifest {
                debug!("Skipping {:?}: no {}", path, MANIFEST_FILE_NAME);
            }
            has_manifest
        })
        .collect();
    dirs.sort();
    dirs
}

fn load_candidate(dir: &Path) -> Result<PluginDescriptor, ScanWarning> {
    let manifest_path = dir.join(MANIFEST_FILE_NAME);
    let manifest =
        PluginManifest::from_file(&manifest_path).map_err(|e| ScanWarning::ManifestInvalid {
            path: manifest_path.clone(),
            reason: e.to_string(),
        })?;

    let descriptor = manifest.into_descriptor(dir);
    let entry = descriptor.entry_path();
    check_entry_point(&entry).map_err(|reason| ScanWarning::EntryPointMissing {
        id: descriptor.id.clone(),
        path: entry,
        reason,
    })?;

    Ok(descriptor)
}

/// An entry point must exist, be a regular file, and open for reading.
pub(crate) fn check_entry_point(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Err("file does not exist".to_string());
    }
    if !path.is_file() {
        return Err("not a regular file".to_string());
    }
    File::open(path).map(|_| ()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_plugin(root: &Path, dir: &str, id: &str, entry: Option<&str>) -> PathBuf {
        let plugin_dir = root.join(dir);
        std::fs::create_dir_all(&plugin_dir).unwrap();
        let manifest = format!(
            r#"
[plugin]
id = "{id}"
name = "Plugin {id}"
version = "0.1.0"
kind = "edit"
entry_point = "main.rhai"
"#
        );
        std::fs::write(plugin_dir.join(MANIFEST_FILE_NAME), manifest).unwrap();
        if let Some(source) = entry {
            std::fs::write(plugin_dir.join("main.rhai"), source).unwrap();
        }
        plugin_dir
    }

    #[test]
    fn test_scan_valid_plugins() {
        let temp_dir = TempDir::new().unwrap();
        create_plugin(temp_dir.path(), "a", "plugin-a", Some("1"));
        create_plugin(temp_dir.path(), "b", "plugin-b", Some("2"));
        std::fs::create_dir_all(temp_dir.path().join("not-a-plugin")).unwrap();

        let (catalog, warnings) =
            PluginRegistry::new().load_plugins_from_disk(&[temp_dir.path().to_path_buf()]);

        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
        assert_eq!(catalog.ids(), vec!["plugin-a", "plugin-b"]);
    }

    #[test]
    fn test_missing_entry_point_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        create_plugin(temp_dir.path(), "a", "plugin-a", None);

        let (catalog, warnings) =
            PluginRegistry::new().load_plugins_from_disk(&[temp_dir.path().to_path_buf()]);

        assert!(catalog.is_empty());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind(), ErrorKind::EntryPointMissing);
    }

    #[test]
    fn test_entry_point_directory_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let dir = create_plugin(temp_dir.path(), "a", "plugin-a", None);
        std::fs::create_dir_all(dir.join("main.rhai")).unwrap();

        assert!(check_entry_point(&dir.join("main.rhai")).is_err());
        let (catalog, warnings) =
            PluginRegistry::new().load_plugins_from_disk(&[temp_dir.path().to_path_buf()]);
        assert!(catalog.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_missing_root_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let (catalog, warnings) = PluginRegistry::new()
            .load_plugins_from_disk(&[temp_dir.path().join("does-not-exist")]);
        assert!(catalog.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_later_root_wins_on_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let bundled = temp_dir.path().join("bundled");
        let user = temp_dir.path().join("user");
        create_plugin(&bundled, "same", "same-id", Some("1"));
        let winner = create_plugin(&user, "same", "same-id", Some("2"));

        let (catalog, warnings) =
            PluginRegistry::new().load_plugins_from_disk(&[bundled.clone(), user]);

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.find_by_id("same-id").unwrap().root_dir, winner);
        assert_eq!(
            warnings,
            vec![ScanWarning::DuplicateId {
                id: "same-id".to_string(),
                replaced: bundled.join("same"),
                by: winner,
            }]
        );
    }
}
