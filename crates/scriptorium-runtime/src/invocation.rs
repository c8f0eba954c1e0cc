//! Execution context handed to a script.
//!
//! A script sees a single `ctx` variable of type `Context`:
//!
//! ```text
//! ctx.args          // array of strings
//! ctx.params        // object map of named parameters
//! ctx.working_dir   // directory the plugin runs against
//! ctx.plugin        // label of the running plugin
//! ctx.is_cancelled()
//! ```

use rhai::{Array, Dynamic, Engine, Map};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the host and a running script.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The script decides when to honor it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a script receives besides its own source.
#[derive(Debug, Clone)]
pub struct ScriptInvocation {
    /// Label used in logs and exposed as `ctx.plugin`.
    pub label: String,

    /// Positional arguments.
    pub args: Vec<String>,

    /// Named parameters (a JSON object; other values are ignored).
    pub params: Value,

    /// Working directory for the run.
    pub working_dir: PathBuf,

    /// Cancellation flag polled by the script.
    pub cancel: CancellationFlag,
}

impl ScriptInvocation {
    pub fn new(label: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            args: Vec::new(),
            params: Value::Object(Default::default()),
            working_dir: working_dir.into(),
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

/// Script-visible view of a [`ScriptInvocation`].
#[derive(Debug, Clone)]
pub(crate) struct ScriptContext {
    label: String,
    args: Array,
    params: Map,
    working_dir: String,
    cancel: CancellationFlag,
}

impl ScriptContext {
    pub(crate) fn from_invocation(invocation: &ScriptInvocation) -> Self {
        let args = invocation
            .args
            .iter()
            .map(|a| Dynamic::from(a.clone()))
            .collect();

        let params = match &invocation.params {
            Value::Object(_) => rhai::serde::to_dynamic(&invocation.params)
                .ok()
                .and_then(|d| d.try_cast::<Map>())
                .unwrap_or_default(),
            _ => Map::new(),
        };

        Self {
            label: invocation.label.clone(),
            args,
            params,
            working_dir: invocation.working_dir.to_string_lossy().into_owned(),
            cancel: invocation.cancel.clone(),
        }
    }

    /// Register the `Context` type and its accessors.
    pub(crate) fn register(engine: &mut Engine) {
        engine
            .register_type_with_name::<ScriptContext>("Context")
            .register_get("plugin", |ctx: &mut ScriptContext| ctx.label.clone())
            .register_get("args", |ctx: &mut ScriptContext| ctx.args.clone())
            .register_get("params", |ctx: &mut ScriptContext| ctx.params.clone())
            .register_get("working_dir", |ctx: &mut ScriptContext| {
                ctx.working_dir.clone()
            })
            .register_fn("is_cancelled", |ctx: &mut ScriptContext| {
                ctx.cancel.is_cancelled()
            });
    }
}
