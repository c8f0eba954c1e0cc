//! Plugin manifest parsing.
//!
//! Each plugin has a `manifest.toml` file that describes its identity, kind
//! and entry script:
//!
//! ```toml
//! [plugin]
//! id = "wc"
//! name = "Word Count"
//! version = "1.0.0"
//! kind = "validation"
//! entry_point = "main.rhai"
//! search_paths = ["lib"]
//! ```
//!
//! The plugin root and its `search_paths` join one search path shared by all
//! plugins, and the first directory holding a module wins. Prefix module
//! names with the plugin id (`wc_text.rhai`, not `text.rhai`) so that another
//! plugin's module of the same name is never imported instead.

use crate::descriptor::{PluginDescriptor, PluginKind};
use crate::error::{PluginError, PluginResult};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// File name of a plugin manifest.
pub const MANIFEST_FILE_NAME: &str = "manifest.toml";

/// Engine plugins target unless they say otherwise.
pub const DEFAULT_ENGINE: &str = "rhai";

/// Plugin manifest structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin metadata.
    pub plugin: PluginMetadata,
}

/// Plugin metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginMetadata {
    /// Unique identifier for the plugin.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Version string.
    pub version: String,

    /// Workflow the plugin belongs to.
    pub kind: PluginKind,

    /// Entry script, relative to the plugin directory.
    pub entry_point: PathBuf,

    /// Plugin description.
    #[serde(default)]
    pub description: Option<String>,

    /// Plugin author(s).
    #[serde(default)]
    pub authors: Vec<String>,

    /// Scripting engine.
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Operating systems the plugin supports; empty means all.
    #[serde(default)]
    pub platforms: Vec<String>,

    /// Support subdirectories added to the search path on launch.
    ///
    /// The search path is shared, so modules in these directories need
    /// names unique across plugins.
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Initial enabled state.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_engine() -> String {
    DEFAULT_ENGINE.to_string()
}

fn default_enabled() -> bool {
    true
}

impl PluginManifest {
    /// Load a manifest from a TOML file.
    pub fn from_file(path: &Path) -> PluginResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a manifest from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> PluginResult<Self> {
        let manifest: PluginManifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest.
    fn validate(&self) -> PluginResult<()> {
        let plugin = &self.plugin;

        if plugin.id.trim().is_empty() {
            return Err(invalid("Plugin ID cannot be empty"));
        }

        if plugin.id.chars().any(char::is_whitespace) {
            return Err(invalid(format!(
                "Plugin ID '{}' cannot contain whitespace",
                plugin.id
            )));
        }

        if plugin.name.trim().is_empty() {
            return Err(invalid("Plugin name cannot be empty"));
        }

        if plugin.version.trim().is_empty() {
            return Err(invalid("Plugin version cannot be empty"));
        }

        if !plugin.engine.eq_ignore_ascii_case(DEFAULT_ENGINE) {
            return Err(invalid(format!(
                "Unsupported engine '{}', expected '{}'",
                plugin.engine, DEFAULT_ENGINE
            )));
        }

        if !self.supports_current_platform() {
            return Err(invalid(format!(
                "Plugin does not support {} (supports: {})",
                std::env::consts::OS,
                plugin.platforms.join(", ")
            )));
        }

        if plugin.entry_point.as_os_str().is_empty() {
            return Err(invalid("Entry point cannot be empty"));
        }
        check_relative("entry_point", &plugin.entry_point)?;

        for path in &plugin.search_paths {
            check_relative("search_paths", path)?;
        }

        Ok(())
    }

    /// Whether the current OS is in the manifest's platform list.
    pub fn supports_current_platform(&self) -> bool {
        let platforms = &self.plugin.platforms;
        platforms.is_empty()
            || platforms
                .iter()
                .any(|p| p.eq_ignore_ascii_case(std::env::consts::OS))
    }

    /// Build a descriptor for a plugin rooted at `root_dir`.
    ///
    /// The entry point is not checked here; see
    /// [`PluginRegistry`](crate::registry::PluginRegistry).
    pub fn into_descriptor(self, root_dir: &Path) -> PluginDescriptor {
        let plugin = self.plugin;
        PluginDescriptor {
            id: plugin.id,
            name: plugin.name,
            version: plugin.version,
            kind: plugin.kind,
            root_dir: root_dir.to_path_buf(),
            entry_point: plugin.entry_point,
            enabled: plugin.enabled,
            description: plugin.description,
            authors: plugin.authors,
            engine: plugin.engine,
            search_paths: plugin.search_paths,
            manifest_path: root_dir.join(MANIFEST_FILE_NAME),
        }
    }
}

fn invalid(message: impl Into<String>) -> PluginError {
    PluginError::InvalidManifest(message.into())
}

/// Plugin-relative paths must stay inside the plugin directory.
fn check_relative(field: &str, path: &Path) -> PluginResult<()> {
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(invalid(format!(
            "{} '{}' must be relative to the plugin directory",
            field,
            path.display()
        )));
    }
    Ok(())
}
