//! # scriptorium-runtime
//!
//! Embedded scripting runtime for executing Scriptorium plugins.
//!
//! This crate provides:
//! - The process-wide embedded interpreter ([`EmbeddedScriptRuntime`])
//! - Search-path and platform-root configuration ([`RuntimeEnvironment`])
//! - Execution outcomes that never unwind into the host ([`ExecutionOutcome`])
//!
//! ## Runtime Port
//!
//! The host sees exactly four operations: initialize, add a search path, run a
//! script, shut down. Interpreter errors (parse errors, thrown exceptions,
//! panics) are translated into [`ExecutionOutcome::Failure`] inside this crate,
//! so no interpreter error type leaks past it.
//!
//! ## Concurrency
//!
//! The interpreter is not reentrant. Concurrent callers of
//! [`EmbeddedScriptRuntime::run_script`] block until the running script
//! finishes.

pub mod environment;
pub mod error;
pub mod interpreter;
pub mod invocation;
pub mod outcome;
mod resolver;

pub use environment::RuntimeEnvironment;
pub use error::{RuntimeError, RuntimeResult};
pub use interpreter::{EmbeddedScriptRuntime, RuntimeConfig, RuntimeStats, PLUGIN_LOG_TARGET};
pub use invocation::{CancellationFlag, ScriptInvocation};
pub use outcome::{ErrorKind, ExecutionOutcome};
