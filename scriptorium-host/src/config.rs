//! Configuration file loading and management
//!
//! This module handles loading and parsing the host configuration from
//! `$XDG_CONFIG_HOME/scriptorium/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.
//!
//! Two environment variables are read once, when the configuration is loaded:
//! `SCRIPTORIUM_PLUGIN_DIR` replaces the user plugin directory and
//! `SCRIPTORIUM_DEBUG_LOGFILE` sets the debug log file.

use anyhow::{Context, Result};
use scriptorium_runtime::{RuntimeConfig, RuntimeEnvironment};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Overrides the user plugin directory.
pub const PLUGIN_DIR_ENV: &str = "SCRIPTORIUM_PLUGIN_DIR";

/// Enables the debug log file.
pub const DEBUG_LOGFILE_ENV: &str = "SCRIPTORIUM_DEBUG_LOGFILE";

/// Directory under the launcher root holding bundled plugins.
pub const BUNDLED_PLUGINS_DIR: &str = "plugins";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Embedded runtime configuration
    #[serde(default)]
    pub runtime: RuntimeSection,
    /// Plugin discovery configuration
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Embedded runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeSection {
    /// Bundled script library
    /// If None, uses <launcher_root>/runtime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_root: Option<PathBuf>,
    /// Installation directory
    /// If None, derived from the executable location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launcher_root: Option<PathBuf>,
    /// Directories appended to the search path after the base paths
    pub extra_search_paths: Vec<PathBuf>,
    /// Maximum operations per script run, 0 for unlimited
    /// Default: 0
    pub max_operations: u64,
    /// Maximum function call nesting
    /// Default: 64
    pub max_call_levels: usize,
}

/// Plugin discovery configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PluginsConfig {
    /// Bundled plugin root
    /// If None, uses <launcher_root>/plugins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundled_dir: Option<PathBuf>,
    /// User plugin root
    /// If None, uses $XDG_DATA_HOME/scriptorium/plugins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_dir: Option<PathBuf>,
    /// Plugin ids kept disabled across rescans
    pub disabled: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub level: String,
    /// File receiving warnings and errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_log_file: Option<PathBuf>,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        let limits = RuntimeConfig::default();
        Self {
            embedded_root: None,
            launcher_root: None,
            extra_search_paths: Vec::new(),
            max_operations: limits.max_operations,
            max_call_levels: limits.max_call_levels,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            debug_log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from the specified path
    ///
    /// Environment overrides are applied before validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location
    ///
    /// If the configuration file doesn't exist, creates a default configuration
    /// file with documented comments.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Get the default configuration file path
    ///
    /// Returns `$XDG_CONFIG_HOME/scriptorium/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Create a default configuration file with documented comments
    fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    /// Generate the default configuration file content with comments
    fn default_config_content() -> String {
        r#"# Scriptorium Host Configuration

[runtime]
# Bundled script library shipped with the application
# If not specified, defaults to <launcher_root>/runtime
# embedded_root = "/opt/scriptorium/runtime"

# Installation directory
# If not specified, derived from the executable location
# launcher_root = "/opt/scriptorium"

# Extra directories searched by `import`, after the built-in ones
extra_search_paths = []

# Maximum operations per script run (0 = unlimited)
# Default: 0
max_operations = 0

# Maximum function call nesting
# Default: 64
max_call_levels = 64

[plugins]
# Bundled plugin directory
# If not specified, defaults to <launcher_root>/plugins
# bundled_dir = "/opt/scriptorium/plugins"

# User plugin directory
# If not specified, defaults to $XDG_DATA_HOME/scriptorium/plugins
# Overridden by SCRIPTORIUM_PLUGIN_DIR
# user_dir = "/home/me/scriptorium-plugins"

# Plugin ids that stay disabled across rescans
disabled = []

[logging]
# Log level: trace, debug, info, warn, error
# RUST_LOG takes precedence when set
# Default: "info"
level = "info"

# File receiving warnings and errors
# Overridden by SCRIPTORIUM_DEBUG_LOGFILE
# debug_log_file = "/tmp/scriptorium-debug.log"
"#
        .to_string()
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = non_empty(PLUGIN_DIR_ENV) {
            self.plugins.user_dir = Some(PathBuf::from(dir));
        }
        if let Some(file) = non_empty(DEBUG_LOGFILE_ENV) {
            self.logging.debug_log_file = Some(PathBuf::from(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                VALID_LOG_LEVELS.join(", ")
            );
        }

        if self.runtime.max_call_levels == 0 {
            anyhow::bail!("runtime.max_call_levels must be greater than 0");
        }

        if let Some(id) = self.plugins.disabled.iter().find(|id| id.trim().is_empty()) {
            anyhow::bail!("plugins.disabled contains an empty id: {:?}", id);
        }

        Ok(())
    }

    /// Limits for the embedded runtime
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            max_operations: self.runtime.max_operations,
            max_call_levels: self.runtime.max_call_levels,
        }
    }

    /// Build the runtime environment
    ///
    /// Configured roots win over the ones derived from the executable.
    pub fn environment(&self) -> Result<RuntimeEnvironment> {
        let launcher_root = match &self.runtime.launcher_root {
            Some(root) => root.clone(),
            None => RuntimeEnvironment::discover()
                .context("Failed to locate the launcher root")?
                .launcher_root()
                .to_path_buf(),
        };

        Ok(match &self.runtime.embedded_root {
            Some(embedded) => RuntimeEnvironment::new(embedded, launcher_root),
            None => RuntimeEnvironment::for_launcher_root(launcher_root),
        })
    }

    /// Plugin roots in scan order: bundled, then user
    pub fn plugin_roots(&self, environment: &RuntimeEnvironment) -> Result<Vec<PathBuf>> {
        let bundled = self
            .plugins
            .bundled_dir
            .clone()
            .unwrap_or_else(|| environment.launcher_root().join(BUNDLED_PLUGINS_DIR));

        let user = match &self.plugins.user_dir {
            Some(dir) => dir.clone(),
            None => project_dirs()?.data_dir().join("plugins"),
        };

        Ok(vec![bundled, user])
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "scriptorium", "scriptorium")
        .context("Failed to determine project directories")
}
