//! The process-wide embedded interpreter.
//!
//! [`EmbeddedScriptRuntime`] owns one Rhai engine together with a persistent
//! global scope. All access goes through a single mutex, so the runtime is
//! never re-entered: a second caller blocks until the running script
//! finishes, and search-path registration is serialized with execution.
//!
//! Lifecycle:
//!
//! ```text
//! initialize() / instance() ──> Running ──shutdown()──> ShutDown
//!                                 │  ▲
//!                          abort()│  │rebuilt in place
//!                                 ▼  │
//!                              (hung script)
//! ```
//!
//! Every use after shutdown is a programming error. It is logged and reported
//! as [`ErrorKind::RuntimeUnavailable`] instead of being ignored.

use crate::environment::RuntimeEnvironment;
use crate::error::{RuntimeError, RuntimeResult};
use crate::invocation::{ScriptContext, ScriptInvocation};
use crate::outcome::{ErrorKind, ExecutionOutcome};
use crate::resolver::SearchPathResolver;
use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Log target for output produced by plugin scripts.
pub const PLUGIN_LOG_TARGET: &str = "scriptorium::plugin";

/// Name of the context variable placed in the script scope.
const CONTEXT_VAR: &str = "ctx";

/// Value returned by the progress callback when a script is aborted.
const ABORT_TOKEN: &str = "aborted";

static PROCESS_RUNTIME: Mutex<Option<Arc<EmbeddedScriptRuntime>>> = Mutex::new(None);

/// Limits applied to every script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum operations per run; 0 means unlimited.
    pub max_operations: u64,

    /// Maximum function call nesting.
    pub max_call_levels: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_operations: 0,
            max_call_levels: 64,
        }
    }
}

/// Counters describing what the runtime has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    /// Scripts handed to the interpreter.
    pub executions: u64,

    /// Runs that ended in a runtime fault.
    pub faults: u64,

    /// Times the interpreter was torn down and rebuilt.
    pub resets: u64,
}

/// One interpreter instance and the state that survives between runs.
struct Interpreter {
    engine: Engine,
    scope: Scope<'static>,
    resolver: SearchPathResolver,
}

impl Interpreter {
    fn build(
        environment: &RuntimeEnvironment,
        config: &RuntimeConfig,
        abort: &Arc<AtomicBool>,
    ) -> Self {
        let mut engine = Engine::new();
        let resolver = SearchPathResolver::new();
        for path in environment.search_path() {
            resolver.push(path);
        }
        engine.set_module_resolver(resolver.clone());

        if config.max_operations > 0 {
            engine.set_max_operations(config.max_operations);
        }
        engine.set_max_call_levels(config.max_call_levels);

        let abort = Arc::clone(abort);
        engine.on_progress(move |_| {
            if abort.load(Ordering::SeqCst) {
                Some(Dynamic::from(ABORT_TOKEN))
            } else {
                None
            }
        });

        engine.on_print(|text| info!(target: PLUGIN_LOG_TARGET, "{}", text));
        engine.on_debug(|text, source, pos| {
            debug!(
                target: PLUGIN_LOG_TARGET,
                source = source.unwrap_or("<unknown>"),
                position = %pos,
                "{}",
                text
            )
        });

        engine.register_fn("now_millis", now_millis);
        ScriptContext::register(&mut engine);

        Self {
            engine,
            scope: Scope::new(),
            resolver,
        }
    }

    fn execute(&mut self, path: &Path, invocation: &ScriptInvocation) -> Result<Dynamic, String> {
        let ast = self
            .engine
            .compile_file(path.to_path_buf())
            .map_err(|err| describe(&err))?;

        // A previous script may have shadowed `ctx` or declared it constant.
        while self.scope.remove::<Dynamic>(CONTEXT_VAR).is_some() {}
        self.scope
            .push(CONTEXT_VAR, ScriptContext::from_invocation(invocation));

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &ast)
            .map_err(|err| describe(&err));

        // Top-level `let` always pushes; keep only the visible entry per name.
        self.scope = self.scope.clone_visible();
        result
    }
}

enum RuntimeState {
    Running(Box<Interpreter>),
    ShutDown,
}

struct Inner {
    state: RuntimeState,
    environment: RuntimeEnvironment,
    stats: RuntimeStats,
}

/// Process-scoped embedded script runtime.
pub struct EmbeddedScriptRuntime {
    inner: Mutex<Inner>,
    config: RuntimeConfig,
    abort: Arc<AtomicBool>,
}

impl EmbeddedScriptRuntime {
    /// Build a runtime that is not registered as the process instance.
    pub fn new(environment: RuntimeEnvironment, config: RuntimeConfig) -> RuntimeResult<Self> {
        let embedded_root = environment.embedded_root();
        if embedded_root.exists() && !embedded_root.is_dir() {
            return Err(RuntimeError::Unavailable(format!(
                "embedded root {} is not a directory",
                embedded_root.display()
            )));
        }
        if !embedded_root.exists() {
            warn!(
                "Embedded root {} does not exist; bundled modules will not resolve",
                embedded_root.display()
            );
        }

        let abort = Arc::new(AtomicBool::new(false));
        let interpreter = Interpreter::build(&environment, &config, &abort);

        info!(
            "Embedded runtime initialized (launcher root {})",
            environment.launcher_root().display()
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                state: RuntimeState::Running(Box::new(interpreter)),
                environment,
                stats: RuntimeStats::default(),
            }),
            config,
            abort,
        })
    }

    /// Install the process-wide runtime.
    ///
    /// Fails with [`RuntimeError::AlreadyInitialized`] while another process
    /// runtime is live.
    pub fn initialize(
        environment: RuntimeEnvironment,
        config: RuntimeConfig,
    ) -> RuntimeResult<Arc<Self>> {
        let mut slot = PROCESS_RUNTIME
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(RuntimeError::AlreadyInitialized);
        }

        let runtime = Arc::new(Self::new(environment, config)?);
        *slot = Some(Arc::clone(&runtime));
        Ok(runtime)
    }

    /// Return the process-wide runtime, initializing it on first use.
    pub fn instance() -> RuntimeResult<Arc<Self>> {
        let mut slot = PROCESS_RUNTIME
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(runtime) = slot.as_ref() {
            return Ok(Arc::clone(runtime));
        }

        let environment = RuntimeEnvironment::discover()
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        let runtime = Arc::new(Self::new(environment, RuntimeConfig::default())?);
        *slot = Some(Arc::clone(&runtime));
        Ok(runtime)
    }

    /// Append a directory to the module search path.
    ///
    /// Returns `Ok(false)` when the path was already registered.
    pub fn add_search_path(&self, path: impl AsRef<Path>) -> RuntimeResult<bool> {
        let path = path.as_ref();
        let mut inner = self.lock();
        let Inner {
            state, environment, ..
        } = &mut *inner;

        let RuntimeState::Running(interpreter) = state else {
            error!("add_search_path({}) called after shutdown", path.display());
            return Err(unavailable());
        };

        if !environment.add_path(path) {
            return Ok(false);
        }
        interpreter.resolver.push(path);
        debug!("Added {} to runtime search path", path.display());
        Ok(true)
    }

    /// Run a script with positional arguments.
    pub fn run_script(
        &self,
        path: impl AsRef<Path>,
        args: &[String],
        working_dir: impl AsRef<Path>,
    ) -> ExecutionOutcome {
        let path = path.as_ref();
        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let invocation =
            ScriptInvocation::new(label, working_dir.as_ref()).with_args(args.iter().cloned());
        self.run_invocation(path, &invocation)
    }

    /// Run a script with a full invocation context.
    ///
    /// Blocks while another script is running.
    pub fn run_invocation(&self, path: &Path, invocation: &ScriptInvocation) -> ExecutionOutcome {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let RuntimeState::Running(interpreter) = &mut inner.state else {
            error!("run_script({}) called after shutdown", path.display());
            return ExecutionOutcome::failure(
                ErrorKind::RuntimeUnavailable,
                unavailable().to_string(),
            );
        };

        if !invocation.working_dir().is_dir() {
            return ExecutionOutcome::failure(
                ErrorKind::RuntimeFault,
                format!(
                    "working directory {} does not exist",
                    invocation.working_dir().display()
                ),
            );
        }

        self.abort.store(false, Ordering::SeqCst);
        inner.stats.executions += 1;
        debug!(plugin = %invocation.label, "Running {}", path.display());

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            interpreter.execute(path, invocation)
        }));

        let outcome = match result {
            Ok(Ok(value)) => match rhai::serde::from_dynamic::<Value>(&value) {
                Ok(payload) => ExecutionOutcome::Success(payload),
                Err(err) => ExecutionOutcome::failure(
                    ErrorKind::RuntimeFault,
                    format!("script result is not serializable: {}", err),
                ),
            },
            Ok(Err(_)) if self.abort.load(Ordering::SeqCst) => {
                self.rebuild(inner);
                ExecutionOutcome::failure(
                    ErrorKind::RuntimeFault,
                    "script aborted; runtime reinitialized",
                )
            }
            Ok(Err(message)) => ExecutionOutcome::failure(ErrorKind::RuntimeFault, message),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(plugin = %invocation.label, "Interpreter panicked: {}", message);
                self.rebuild(inner);
                ExecutionOutcome::failure(
                    ErrorKind::RuntimeFault,
                    format!("interpreter panicked: {}", message),
                )
            }
        };

        if let ExecutionOutcome::Failure(_, message) = &outcome {
            inner.stats.faults += 1;
            warn!(plugin = %invocation.label, "Script {} failed: {}", path.display(), message);
        }
        self.abort.store(false, Ordering::SeqCst);

        outcome
    }

    /// Ask the running script to terminate.
    ///
    /// This is the recovery path for hung scripts: the interpreter is torn
    /// down and rebuilt once the script stops. Does not wait for the lock.
    pub fn abort(&self) {
        warn!("Abort requested for the running script");
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Release the interpreter. Valid exactly once.
    pub fn shutdown(&self) -> RuntimeResult<()> {
        {
            let mut inner = self.lock();
            if matches!(inner.state, RuntimeState::ShutDown) {
                error!("Embedded runtime shut down twice");
                return Err(unavailable());
            }
            inner.state = RuntimeState::ShutDown;
        }

        let mut slot = PROCESS_RUNTIME
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot
            .as_ref()
            .is_some_and(|runtime| std::ptr::eq(Arc::as_ptr(runtime), self))
        {
            *slot = None;
        }

        info!("Embedded runtime shut down");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lock().state, RuntimeState::Running(_))
    }

    /// Snapshot of the current search path.
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.lock().environment.search_path().to_vec()
    }

    /// Snapshot of the runtime environment.
    pub fn environment(&self) -> RuntimeEnvironment {
        self.lock().environment.clone()
    }

    pub fn stats(&self) -> RuntimeStats {
        self.lock().stats
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn rebuild(&self, inner: &mut Inner) {
        warn!("Rebuilding embedded interpreter");
        let interpreter = Interpreter::build(&inner.environment, &self.config, &self.abort);
        inner.state = RuntimeState::Running(Box::new(interpreter));
        inner.stats.resets += 1;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unavailable() -> RuntimeError {
    RuntimeError::Unavailable("embedded runtime has been shut down".to_string())
}

fn describe(err: &EvalAltResult) -> String {
    match err {
        EvalAltResult::ErrorTerminated(..) => ABORT_TOKEN.to_string(),
        other => other.to_string(),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runtime(dir: &TempDir) -> EmbeddedScriptRuntime {
        let env = RuntimeEnvironment::for_launcher_root(dir.path());
        EmbeddedScriptRuntime::new(env, RuntimeConfig::default()).unwrap()
    }

    fn scope_len(rt: &EmbeddedScriptRuntime) -> usize {
        match &rt.lock().state {
            RuntimeState::Running(interpreter) => interpreter.scope.len(),
            RuntimeState::ShutDown => 0,
        }
    }

    fn write_script(dir: &TempDir, name: &str, source: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, source).unwrap();
        path
    }

    #[test]
    fn test_run_script_returns_payload() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        let script = write_script(&dir, "main.rhai", r#"#{ count: ctx.args.len(), dir: ctx.working_dir }"#);

        let outcome = rt.run_script(&script, &["x".to_string()], dir.path());
        let payload = outcome.into_payload().unwrap();
        assert_eq!(payload["count"], 1);
        assert_eq!(payload["dir"], dir.path().to_string_lossy().to_string());
    }

    #[test]
    fn test_unit_result_is_null() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        let script = write_script(&dir, "main.rhai", "let x = 1;");

        let outcome = rt.run_script(&script, &[], dir.path());
        assert_eq!(outcome, ExecutionOutcome::Success(Value::Null));
    }

    #[test]
    fn test_parse_error_is_fault() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        let script = write_script(&dir, "main.rhai", "let = ;");

        let outcome = rt.run_script(&script, &[], dir.path());
        assert_eq!(outcome.error_kind(), Some(ErrorKind::RuntimeFault));
        assert_eq!(rt.stats().faults, 1);
    }

    #[test]
    fn test_missing_script_is_fault() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);

        let outcome = rt.run_script(dir.path().join("nope.rhai"), &[], dir.path());
        assert_eq!(outcome.error_kind(), Some(ErrorKind::RuntimeFault));
    }

    #[test]
    fn test_missing_working_dir_is_fault() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        let script = write_script(&dir, "main.rhai", "1");

        let outcome = rt.run_script(&script, &[], dir.path().join("gone"));
        assert_eq!(outcome.error_kind(), Some(ErrorKind::RuntimeFault));
        assert_eq!(rt.stats().executions, 0);
    }

    #[test]
    fn test_globals_persist_between_runs() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        let first = write_script(&dir, "first.rhai", "let shared_total = 40;");
        let second = write_script(&dir, "second.rhai", "shared_total + 2");

        assert!(rt.run_script(&first, &[], dir.path()).is_success());
        let outcome = rt.run_script(&second, &[], dir.path());
        assert_eq!(outcome, ExecutionOutcome::Success(Value::from(42)));
    }

    #[test]
    fn test_constant_ctx_does_not_leak_into_next_run() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        let hijack = write_script(&dir, "hijack.rhai", "const ctx = 1; 0");
        let normal = write_script(&dir, "normal.rhai", r#"ctx.plugin + " ok""#);

        assert!(rt.run_script(&hijack, &[], dir.path()).is_success());
        let outcome = rt.run_script(&normal, &[], dir.path());
        assert_eq!(outcome, ExecutionOutcome::Success(Value::from("normal ok")));

        let stats = rt.stats();
        assert_eq!(stats.faults, 0);
        assert_eq!(stats.resets, 0);
    }

    #[test]
    fn test_rerunning_script_keeps_scope_bounded() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        let script = write_script(&dir, "main.rhai", r#"let buf = "x"; let n = 1; n"#);

        assert!(rt.run_script(&script, &[], dir.path()).is_success());
        let baseline = scope_len(&rt);
        for _ in 0..200 {
            assert!(rt.run_script(&script, &[], dir.path()).is_success());
        }
        assert_eq!(scope_len(&rt), baseline);
        assert_eq!(baseline, 3);
    }

    #[test]
    fn test_add_search_path_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);

        assert!(rt.add_search_path(dir.path()).unwrap());
        assert!(!rt.add_search_path(dir.path()).unwrap());
        assert_eq!(rt.search_path().len(), 1);
    }

    #[test]
    fn test_operation_budget_is_fault() {
        let dir = TempDir::new().unwrap();
        let env = RuntimeEnvironment::for_launcher_root(dir.path());
        let config = RuntimeConfig {
            max_operations: 1_000,
            ..RuntimeConfig::default()
        };
        let rt = EmbeddedScriptRuntime::new(env, config).unwrap();
        let script = write_script(&dir, "spin.rhai", "loop { }");

        let outcome = rt.run_script(&script, &[], dir.path());
        assert_eq!(outcome.error_kind(), Some(ErrorKind::RuntimeFault));
    }

    #[test]
    fn test_use_after_shutdown_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir);
        let script = write_script(&dir, "main.rhai", "1");

        rt.shutdown().unwrap();
        assert!(!rt.is_running());

        let outcome = rt.run_script(&script, &[], dir.path());
        assert_eq!(outcome.error_kind(), Some(ErrorKind::RuntimeUnavailable));
        assert!(matches!(
            rt.add_search_path(dir.path()),
            Err(RuntimeError::Unavailable(_))
        ));
        assert!(matches!(rt.shutdown(), Err(RuntimeError::Unavailable(_))));
    }

    #[test]
    fn test_embedded_root_must_be_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("runtime");
        std::fs::write(&file, "not a dir").unwrap();
        let env = RuntimeEnvironment::new(&file, dir.path());

        let result = EmbeddedScriptRuntime::new(env, RuntimeConfig::default());
        assert!(matches!(result, Err(RuntimeError::Unavailable(_))));
    }
}
