//! Plugin manager for discovering and launching Scriptorium plugins.

use super::queue::{LaunchObserver, LaunchQueue, LaunchTicket, Observers};
use crate::config::Config;
use anyhow::{Context, Result};
use scriptorium_plugin_api::{
    DefaultHostBridge, HostBridge, LaunchContext, PluginCatalog, PluginError, PluginLauncher,
    PluginRegistry, PluginResult, ScanWarning,
};
use scriptorium_runtime::{EmbeddedScriptRuntime, RuntimeError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Manager for Scriptorium plugins.
///
/// The plugin manager owns the embedded runtime handle, the current catalog
/// and the launch queue. All methods take `&self`, so a manager can be shared
/// behind an `Arc`.
pub struct PluginManager {
    runtime: Arc<EmbeddedScriptRuntime>,
    registry: PluginRegistry,
    roots: Vec<PathBuf>,
    catalog: RwLock<Arc<PluginCatalog>>,
    warnings: RwLock<Vec<ScanWarning>>,
    /// Enabled state forced by config or by `set_enabled`, re-applied on rescan.
    overrides: RwLock<HashMap<String, bool>>,
    observers: Observers,
    queue: Mutex<Option<LaunchQueue>>,
    unavailable: Arc<AtomicBool>,
}

impl PluginManager {
    /// Initialize the process runtime and load plugins.
    pub fn initialize(config: Config) -> Result<Self> {
        let environment = config.environment()?;
        let runtime = EmbeddedScriptRuntime::initialize(environment, config.runtime_config())
            .context("Failed to initialize the embedded runtime")?;
        Self::with_runtime(config, runtime)
    }

    /// Load plugins on an existing runtime.
    pub fn with_runtime(config: Config, runtime: Arc<EmbeddedScriptRuntime>) -> Result<Self> {
        Self::with_bridge(config, runtime, Arc::new(DefaultHostBridge))
    }

    /// Load plugins on an existing runtime with a custom host bridge.
    pub fn with_bridge(
        config: Config,
        runtime: Arc<EmbeddedScriptRuntime>,
        bridge: Arc<dyn HostBridge>,
    ) -> Result<Self> {
        let environment = runtime.environment();
        for path in environment
            .base_search_paths()
            .into_iter()
            .chain(config.runtime.extra_search_paths.iter().cloned())
        {
            runtime
                .add_search_path(&path)
                .with_context(|| format!("Failed to register search path {}", path.display()))?;
        }

        let roots = config.plugin_roots(&environment)?;
        info!("Plugin roots: {:?}", roots);

        let overrides = config
            .plugins
            .disabled
            .iter()
            .map(|id| (id.clone(), false))
            .collect();

        let observers: Observers = Arc::new(RwLock::new(Vec::new()));
        let unavailable = Arc::new(AtomicBool::new(false));
        let launcher = PluginLauncher::new(Arc::clone(&runtime), bridge);
        let queue = LaunchQueue::start(launcher, Arc::clone(&observers), Arc::clone(&unavailable))
            .context("Failed to start the launch worker")?;

        let manager = Self {
            runtime,
            registry: PluginRegistry::new(),
            roots,
            catalog: RwLock::new(Arc::new(PluginCatalog::new())),
            warnings: RwLock::new(Vec::new()),
            overrides: RwLock::new(overrides),
            observers,
            queue: Mutex::new(Some(queue)),
            unavailable,
        };
        manager.rescan();
        Ok(manager)
    }

    /// Rebuild the catalog from disk and swap it in.
    ///
    /// Launches already queued keep the catalog they were submitted with.
    pub fn rescan(&self) -> Vec<ScanWarning> {
        info!("Scanning plugins...");
        let (mut catalog, warnings) = self.registry.load_plugins_from_disk(&self.roots);

        for (id, enabled) in read(&self.overrides).iter() {
            if !catalog.set_enabled(id, *enabled) {
                debug!("Enabled-state override for unknown plugin '{}'", id);
            }
        }

        info!(
            "Catalog holds {} plugin(s), {} warning(s)",
            catalog.len(),
            warnings.len()
        );
        *write(&self.catalog) = Arc::new(catalog);
        *write(&self.warnings) = warnings.clone();
        warnings
    }

    /// Queue a launch of `plugin_id`.
    ///
    /// Unknown ids are rejected immediately. The returned ticket resolves
    /// once every launch queued before this one has finished.
    pub fn launch(&self, plugin_id: &str, context: LaunchContext) -> PluginResult<LaunchTicket> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PluginError::Runtime(RuntimeError::Unavailable(
                "embedded runtime is unavailable".to_string(),
            )));
        }

        let catalog = self.catalog();
        if catalog.find_by_id(plugin_id).is_none() {
            return Err(PluginError::NotFound(plugin_id.to_string()));
        }

        match lock(&self.queue).as_ref() {
            Some(queue) => queue.submit(catalog, plugin_id, context),
            None => Err(PluginError::Runtime(RuntimeError::Unavailable(
                "plugin manager is shut down".to_string(),
            ))),
        }
    }

    /// Stop the launch worker after queued launches drain, then shut the
    /// runtime down.
    pub fn shutdown(&self) -> PluginResult<()> {
        let Some(queue) = lock(&self.queue).take() else {
            return Ok(());
        };
        info!("Shutting down plugin manager...");
        queue.shutdown();

        if self.runtime.is_running() {
            self.runtime.shutdown()?;
        }
        Ok(())
    }

    /// Current catalog snapshot.
    pub fn catalog(&self) -> Arc<PluginCatalog> {
        Arc::clone(&read(&self.catalog))
    }

    /// Warnings from the most recent scan.
    pub fn warnings(&self) -> Vec<ScanWarning> {
        read(&self.warnings).clone()
    }

    /// Enable or disable a plugin. The choice survives rescans.
    ///
    /// Returns `false` if the id is not in the catalog.
    pub fn set_enabled(&self, plugin_id: &str, enabled: bool) -> bool {
        let mut catalog = write(&self.catalog);
        if !Arc::make_mut(&mut *catalog).set_enabled(plugin_id, enabled) {
            return false;
        }
        write(&self.overrides).insert(plugin_id.to_string(), enabled);
        info!(
            "Plugin '{}' {}",
            plugin_id,
            if enabled { "enabled" } else { "disabled" }
        );
        true
    }

    /// Register a launch observer.
    pub fn add_observer(&self, observer: Arc<dyn LaunchObserver>) {
        write(&self.observers).push(observer);
    }

    /// Terminate the running script and rebuild the interpreter.
    pub fn abort_running(&self) {
        self.runtime.abort();
    }

    /// Whether a launch has reported the runtime unavailable.
    pub fn is_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::SeqCst)
    }

    pub fn runtime(&self) -> &Arc<EmbeddedScriptRuntime> {
        &self.runtime
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Plugin manager shutdown failed: {}", e);
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
