//! Error types for plugin management.

use scriptorium_runtime::RuntimeError;
use thiserror::Error;

/// Errors that can occur while loading or launching plugins.
#[derive(Error, Debug)]
pub enum PluginError {
    /// No plugin with this id in the catalog.
    #[error("Plugin not found: {0}")]
    NotFound(String),

    /// Failed to parse or validate a plugin manifest.
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// Entry script missing or unreadable.
    #[error("Entry point missing: {0}")]
    EntryPointMissing(String),

    /// Embedded runtime error.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for plugin operations.
pub type PluginResult<T> = std::result::Result<T, PluginError>;
