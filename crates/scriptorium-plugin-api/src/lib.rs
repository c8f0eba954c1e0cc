//! # scriptorium-plugin-api
//!
//! Plugin discovery, cataloging and launching for Scriptorium.
//!
//! A plugin is a directory holding a `manifest.toml` and a Rhai entry
//! script. This crate provides:
//!
//! - Manifest parsing and validation ([`PluginManifest`])
//! - Disk scanning into an in-memory [`PluginCatalog`] ([`PluginRegistry`])
//! - Plugin execution on the embedded runtime ([`PluginLauncher`])
//! - The host collaborator contract ([`HostBridge`]) and kind-specific
//!   payloads ([`PluginOutput`])

pub mod catalog;
pub mod descriptor;
pub mod error;
pub mod host;
pub mod launcher;
pub mod manifest;
pub mod registry;

pub use catalog::PluginCatalog;
pub use descriptor::{PluginDescriptor, PluginKind};
pub use error::{PluginError, PluginResult};
pub use host::{
    DefaultHostBridge, EditPayload, HostBridge, ImportPayload, LaunchContext, OutputPayload,
    PluginOutput, Severity, ValidationMessage, ValidationReport,
};
pub use launcher::{LaunchPhase, LaunchReport, PluginLauncher};
pub use manifest::{PluginManifest, MANIFEST_FILE_NAME};
pub use registry::{PluginRegistry, ScanWarning};
