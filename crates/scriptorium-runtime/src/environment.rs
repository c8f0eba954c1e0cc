//! Search-path configuration and platform roots for the embedded runtime.
//!
//! Two roots are derived from the installation layout:
//!
//! - the *launcher root*, where the application's own resources live
//!   (the executable's directory, or `Contents/Resources` inside a macOS
//!   app bundle)
//! - the *embedded root*, the bundled script library (`<launcher_root>/runtime`
//!   unless configured otherwise)
//!
//! The search path is ordered. Entries are appended at most once and are never
//! reordered.

use crate::error::{RuntimeError, RuntimeResult};
use std::path::{Path, PathBuf};

/// Directory under the launcher root holding the bundled script library.
pub const EMBEDDED_DIR_NAME: &str = "runtime";

/// Directory under the launcher root holding shared host-provided modules.
pub const LIBRARY_DIR_NAME: &str = "lib";

/// Search path and platform roots consumed by the embedded runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    search_path: Vec<PathBuf>,
    embedded_root: PathBuf,
    launcher_root: PathBuf,
}

impl RuntimeEnvironment {
    /// Create an environment with explicit roots and an empty search path.
    pub fn new(embedded_root: impl Into<PathBuf>, launcher_root: impl Into<PathBuf>) -> Self {
        Self {
            search_path: Vec::new(),
            embedded_root: embedded_root.into(),
            launcher_root: launcher_root.into(),
        }
    }

    /// Create an environment rooted at a launcher directory.
    pub fn for_launcher_root(launcher_root: impl Into<PathBuf>) -> Self {
        let launcher_root = launcher_root.into();
        Self::new(launcher_root.join(EMBEDDED_DIR_NAME), launcher_root)
    }

    /// Derive the roots from the location of the running executable.
    pub fn discover() -> RuntimeResult<Self> {
        let exe = std::env::current_exe()?;
        let launcher_root = launcher_root_for(&exe).ok_or_else(|| {
            RuntimeError::InvalidEnvironment(format!(
                "cannot derive launcher root from {}",
                exe.display()
            ))
        })?;
        Ok(Self::for_launcher_root(launcher_root))
    }

    pub fn embedded_root(&self) -> &Path {
        &self.embedded_root
    }

    pub fn launcher_root(&self) -> &Path {
        &self.launcher_root
    }

    /// Paths every runtime registers at startup, in order.
    pub fn base_search_paths(&self) -> Vec<PathBuf> {
        vec![
            self.embedded_root.clone(),
            self.launcher_root.join(LIBRARY_DIR_NAME),
        ]
    }

    /// Append a path unless it is already present.
    ///
    /// Returns `true` if the path was appended.
    pub fn add_path(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.contains(&path) {
            return false;
        }
        self.search_path.push(path);
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.search_path.iter().any(|p| p == path)
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    pub fn len(&self) -> usize {
        self.search_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.search_path.is_empty()
    }
}

/// Resolve the launcher root for an executable path.
///
/// Inside a macOS app bundle the executable sits in `Contents/MacOS` while
/// resources live in `Contents/Resources`.
pub fn launcher_root_for(exe: &Path) -> Option<PathBuf> {
    let exe_dir = exe.parent()?;

    let in_bundle = exe_dir.file_name().is_some_and(|n| n == "MacOS")
        && exe_dir
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|n| n == "Contents");

    if in_bundle {
        exe_dir.parent().map(|contents| contents.join("Resources"))
    } else {
        Some(exe_dir.to_path_buf())
    }
}
