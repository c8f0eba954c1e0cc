//! Module resolution against the runtime search path.
//!
//! `import "name"` is resolved by asking one file resolver per search-path
//! entry, in order; the first entry that has `name.rhai` wins. Each entry
//! caches the modules it compiles, so imported modules stay loaded for the
//! life of the interpreter.

use rhai::module_resolvers::FileModuleResolver;
use rhai::{Engine, EvalAltResult, Module, ModuleResolver, Position, Shared};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Handle shared between the interpreter and the resolver installed in its engine.
#[derive(Clone, Default)]
pub(crate) struct SearchPathResolver {
    entries: Arc<RwLock<Vec<(PathBuf, FileModuleResolver)>>>,
}

impl SearchPathResolver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Callers guarantee the path is not already present.
    pub(crate) fn push(&self, path: &Path) {
        let resolver = FileModuleResolver::new_with_path(path);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((path.to_path_buf(), resolver));
    }
}

impl ModuleResolver for SearchPathResolver {
    fn resolve(
        &self,
        engine: &Engine,
        _source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> Result<Shared<Module>, Box<EvalAltResult>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        for (_, resolver) in entries.iter() {
            // Resolve against the entry itself, not the importing script's directory.
            match resolver.resolve(engine, None, path, pos) {
                Ok(module) => return Ok(module),
                Err(err) if matches!(*err, EvalAltResult::ErrorModuleNotFound(..)) => continue,
                Err(err) => return Err(err),
            }
        }

        Err(EvalAltResult::ErrorModuleNotFound(path.to_string(), pos).into())
    }
}
