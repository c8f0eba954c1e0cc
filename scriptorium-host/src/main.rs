//! # scriptorium-host
//!
//! Command-line host for Scriptorium plugins.
//!
//! On startup the host:
//! - Loads configuration (creating a documented default on first run)
//! - Initializes the embedded runtime and registers its search paths
//! - Scans the bundled and user plugin directories
//!
//! With no arguments it lists the catalog. With a plugin id as the first
//! argument it launches that plugin, passing any further arguments as the
//! selection, and prints the launch report as JSON.
//!
//! ## Running
//!
//! ```bash
//! # List plugins
//! cargo run --bin scriptorium-host
//!
//! # Launch the "wc" plugin on two files, with debug logging
//! RUST_LOG=debug cargo run --bin scriptorium-host -- wc Text/ch1.xhtml Text/ch2.xhtml
//! ```

use anyhow::{Context, Result};
use scriptorium_host::config::Config;
use scriptorium_host::logging;
use scriptorium_host::plugin::PluginManager;
use scriptorium_plugin_api::LaunchContext;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config, using defaults: {:#}", e);
            let mut cfg = Config::default();
            cfg.apply_env_overrides(|key| std::env::var(key).ok());
            cfg
        }
    };

    logging::init(&config.logging)?;
    info!("Starting scriptorium-host v{}", env!("CARGO_PKG_VERSION"));

    let manager = PluginManager::initialize(config)?;

    for warning in manager.warnings() {
        warn!("Plugin scan: {}", warning);
    }

    let catalog = manager.catalog();
    for plugin in catalog.list_all() {
        info!(
            "Plugin: {} v{} [{}] ({}) - {}",
            plugin.name,
            plugin.version,
            plugin.id,
            plugin.kind,
            if plugin.enabled { "enabled" } else { "disabled" }
        );
    }

    let mut args = std::env::args().skip(1);
    if let Some(plugin_id) = args.next() {
        let context = LaunchContext::new().with_selection(args);
        let report = manager.launch(&plugin_id, context)?.wait().await?;
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize launch report")?
        );
    }

    manager.shutdown()?;
    info!("Host stopped");
    Ok(())
}
