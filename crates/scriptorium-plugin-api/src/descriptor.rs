//! Validated in-memory representation of one plugin.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which host workflow may invoke a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    /// Modifies the open document.
    Edit,
    /// Checks the document and reports problems.
    Validation,
    /// Brings external content into the document.
    Import,
    /// Produces artifacts from the document.
    Output,
    /// Anything else.
    Other,
}

impl PluginKind {
    pub const ALL: [PluginKind; 5] = [
        PluginKind::Edit,
        PluginKind::Validation,
        PluginKind::Import,
        PluginKind::Output,
        PluginKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginKind::Edit => "edit",
            PluginKind::Validation => "validation",
            PluginKind::Import => "import",
            PluginKind::Output => "output",
            PluginKind::Other => "other",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PluginKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown plugin kind '{}'", s))
    }
}

/// Identity and execution metadata for one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    /// Unique key within the catalog.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Version string.
    pub version: String,

    /// Workflow this plugin belongs to.
    pub kind: PluginKind,

    /// Directory containing the manifest and support files.
    pub root_dir: PathBuf,

    /// Entry script, relative to `root_dir`.
    pub entry_point: PathBuf,

    /// Disabled plugins stay in the catalog but cannot be launched.
    pub enabled: bool,

    /// Plugin description.
    pub description: Option<String>,

    /// Plugin author(s).
    pub authors: Vec<String>,

    /// Scripting engine the plugin targets.
    pub engine: String,

    /// Support subdirectories, relative to `root_dir`, added to the search path on launch.
    pub search_paths: Vec<PathBuf>,

    /// Manifest the descriptor was built from.
    pub manifest_path: PathBuf,
}

impl PluginDescriptor {
    /// Absolute path of the entry script.
    pub fn entry_path(&self) -> PathBuf {
        self.root_dir.join(&self.entry_point)
    }

    /// Absolute paths of the declared support directories.
    pub fn support_dirs(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.search_paths.iter().map(|p| self.root_dir.join(p))
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("validation".parse::<PluginKind>(), Ok(PluginKind::Validation));
        assert_eq!("Edit".parse::<PluginKind>(), Ok(PluginKind::Edit));
        assert!("theme".parse::<PluginKind>().is_err());
    }

    #[test]
    fn test_kind_display_matches_serde() {
        for kind in PluginKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }
}
