//! Plugin execution.
//!
//! A launch walks a fixed state machine:
//!
//! ```text
//! Idle -> Validating -> Configuring -> Executing -> Completed
//!              \             \             \
//!               +-------------+-------------+--> Failed
//! ```
//!
//! Every path ends in an [`ExecutionOutcome`]; failures are returned as-is
//! and never retried.

use crate::descriptor::{PluginDescriptor, PluginKind};
use crate::host::{HostBridge, LaunchContext, PluginOutput};
use crate::registry::check_entry_point;
use chrono::{DateTime, Utc};
use scriptorium_runtime::{EmbeddedScriptRuntime, ErrorKind, ExecutionOutcome, ScriptInvocation};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Stage of a single launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchPhase {
    Idle,
    Validating,
    Configuring,
    Executing,
    Completed,
    Failed,
}

impl LaunchPhase {
    /// Whether `next` is a legal successor of this phase.
    pub fn can_advance_to(self, next: LaunchPhase) -> bool {
        use LaunchPhase::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Configuring)
                | (Validating, Failed)
                | (Configuring, Executing)
                | (Configuring, Failed)
                | (Executing, Completed)
                | (Executing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LaunchPhase::Completed | LaunchPhase::Failed)
    }
}

/// Record of one launch.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchReport {
    pub launch_id: Uuid,
    pub plugin_id: String,
    pub kind: PluginKind,
    /// Phases visited, starting at [`LaunchPhase::Idle`].
    pub phases: Vec<LaunchPhase>,
    pub outcome: ExecutionOutcome<PluginOutput>,
    pub started_at: DateTime<Utc>,
    /// When the script started, if it got that far.
    pub executing_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
}

impl LaunchReport {
    pub fn final_phase(&self) -> LaunchPhase {
        self.phases.last().copied().unwrap_or(LaunchPhase::Idle)
    }
}

/// Runs plugins on an embedded runtime.
#[derive(Clone)]
pub struct PluginLauncher {
    runtime: Arc<EmbeddedScriptRuntime>,
    bridge: Arc<dyn HostBridge>,
}

impl PluginLauncher {
    pub fn new(runtime: Arc<EmbeddedScriptRuntime>, bridge: Arc<dyn HostBridge>) -> Self {
        Self { runtime, bridge }
    }

    pub fn runtime(&self) -> &Arc<EmbeddedScriptRuntime> {
        &self.runtime
    }

    /// Launch a plugin and return only its outcome.
    pub fn launch(
        &self,
        descriptor: &PluginDescriptor,
        context: &LaunchContext,
    ) -> ExecutionOutcome<PluginOutput> {
        self.run(descriptor, context).outcome
    }

    /// Launch a plugin and return the full report.
    pub fn run(&self, descriptor: &PluginDescriptor, context: &LaunchContext) -> LaunchReport {
        let launch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut phases = vec![LaunchPhase::Idle];
        let mut executing_at = None;

        let outcome = self.drive(descriptor, context, &mut phases, &mut executing_at);

        let terminal = if outcome.is_success() {
            LaunchPhase::Completed
        } else {
            LaunchPhase::Failed
        };
        advance(&mut phases, terminal);

        match &outcome {
            ExecutionOutcome::Success(_) => {
                info!(plugin = %descriptor.id, %launch_id, "Plugin completed")
            }
            ExecutionOutcome::Failure(kind, message) => {
                warn!(plugin = %descriptor.id, %launch_id, "Plugin failed ({}): {}", kind, message)
            }
        }

        LaunchReport {
            launch_id,
            plugin_id: descriptor.id.clone(),
            kind: descriptor.kind,
            phases,
            outcome,
            started_at,
            executing_at,
            finished_at: Utc::now(),
        }
    }

    fn drive(
        &self,
        descriptor: &PluginDescriptor,
        context: &LaunchContext,
        phases: &mut Vec<LaunchPhase>,
        executing_at: &mut Option<DateTime<Utc>>,
    ) -> ExecutionOutcome<PluginOutput> {
        advance(phases, LaunchPhase::Validating);
        if !descriptor.enabled {
            return ExecutionOutcome::failure(
                ErrorKind::Disabled,
                format!("plugin '{}' is disabled", descriptor.id),
            );
        }

        advance(phases, LaunchPhase::Configuring);
        if let Err(outcome) = self.configure(descriptor) {
            return outcome;
        }
        let args = self.bridge.launch_arguments(descriptor, context);

        advance(phases, LaunchPhase::Executing);
        *executing_at = Some(Utc::now());
        let invocation = ScriptInvocation::new(&descriptor.id, &descriptor.root_dir)
            .with_args(args)
            .with_params(Value::Object(context.params.clone()))
            .with_cancel(context.cancel.clone());

        self.runtime
            .run_invocation(&descriptor.entry_path(), &invocation)
            .and_then(|payload| match self.bridge.interpret(descriptor.kind, payload) {
                Ok(output) => ExecutionOutcome::Success(output),
                Err(message) => ExecutionOutcome::failure(ErrorKind::RuntimeFault, message),
            })
    }

    /// Re-check the entry point and register the plugin's search paths.
    fn configure(
        &self,
        descriptor: &PluginDescriptor,
    ) -> Result<(), ExecutionOutcome<PluginOutput>> {
        let entry = descriptor.entry_path();
        if let Err(reason) = check_entry_point(&entry) {
            return Err(ExecutionOutcome::failure(
                ErrorKind::EntryPointMissing,
                format!("{}: {}", entry.display(), reason),
            ));
        }

        let unavailable =
            |e: scriptorium_runtime::RuntimeError| ExecutionOutcome::failure(e.kind(), e.to_string());

        self.runtime
            .add_search_path(&descriptor.root_dir)
            .map_err(unavailable)?;

        for dir in descriptor.support_dirs() {
            if !dir.is_dir() {
                warn!(plugin = %descriptor.id, "Support directory {:?} not found, skipping", dir);
                continue;
            }
            self.runtime.add_search_path(&dir).map_err(unavailable)?;
        }

        debug!(plugin = %descriptor.id, "Configured search path");
        Ok(())
    }
}

fn advance(phases: &mut Vec<LaunchPhase>, next: LaunchPhase) {
    let current = phases.last().copied().unwrap_or(LaunchPhase::Idle);
    debug_assert!(
        current.can_advance_to(next),
        "illegal launch transition {:?} -> {:?}",
        current,
        next
    );
    phases.push(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DefaultHostBridge;
    use crate::manifest::PluginManifest;
    use scriptorium_runtime::{RuntimeConfig, RuntimeEnvironment};
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    fn plugin(root: &Path, id: &str, kind: &str, source: &str) -> PluginDescriptor {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("main.rhai"), source).unwrap();
        PluginManifest::from_str(&format!(
            r#"
[plugin]
id = "{id}"
name = "{id}"
version = "1.0.0"
kind = "{kind}"
entry_point = "main.rhai"
search_paths = ["lib"]
"#
        ))
        .unwrap()
        .into_descriptor(&dir)
    }

    fn launcher(root: &Path) -> PluginLauncher {
        let env = RuntimeEnvironment::for_launcher_root(root);
        let runtime = EmbeddedScriptRuntime::new(env, RuntimeConfig::default()).unwrap();
        PluginLauncher::new(Arc::new(runtime), Arc::new(DefaultHostBridge))
    }

    #[test]
    fn test_phase_transitions() {
        assert!(LaunchPhase::Idle.can_advance_to(LaunchPhase::Validating));
        assert!(LaunchPhase::Validating.can_advance_to(LaunchPhase::Failed));
        assert!(!LaunchPhase::Idle.can_advance_to(LaunchPhase::Executing));
        assert!(!LaunchPhase::Completed.can_advance_to(LaunchPhase::Failed));
        assert!(!LaunchPhase::Validating.can_advance_to(LaunchPhase::Completed));
        assert!(LaunchPhase::Failed.is_terminal());
        assert!(!LaunchPhase::Executing.is_terminal());
    }

    #[test]
    fn test_successful_launch_report() {
        let temp_dir = TempDir::new().unwrap();
        let descriptor = plugin(
            temp_dir.path(),
            "stamp",
            "other",
            r#"#{ plugin: ctx.plugin, args: ctx.args, mode: ctx.params.mode }"#,
        );
        let launcher = launcher(temp_dir.path());
        let context = LaunchContext::new()
            .with_document("/books/a.epub")
            .with_param("mode", "fast");

        let report = launcher.run(&descriptor, &context);

        assert_eq!(
            report.outcome,
            ExecutionOutcome::Success(PluginOutput::Other(json!({
                "plugin": "stamp",
                "args": ["/books/a.epub"],
                "mode": "fast"
            })))
        );
        assert_eq!(
            report.phases,
            vec![
                LaunchPhase::Idle,
                LaunchPhase::Validating,
                LaunchPhase::Configuring,
                LaunchPhase::Executing,
                LaunchPhase::Completed
            ]
        );
        assert!(report.executing_at.is_some());
        assert!(report.started_at <= report.finished_at);
        assert!(launcher
            .runtime()
            .search_path()
            .contains(&descriptor.root_dir));
    }

    #[test]
    fn test_disabled_plugin_not_executed() {
        let temp_dir = TempDir::new().unwrap();
        let mut descriptor = plugin(temp_dir.path(), "off", "edit", "1");
        descriptor.enabled = false;
        let launcher = launcher(temp_dir.path());
        let before = launcher.runtime().search_path();

        let report = launcher.run(&descriptor, &LaunchContext::new());

        assert_eq!(report.outcome.error_kind(), Some(ErrorKind::Disabled));
        assert_eq!(report.final_phase(), LaunchPhase::Failed);
        assert!(report.executing_at.is_none());
        assert_eq!(launcher.runtime().search_path(), before);
        assert_eq!(launcher.runtime().stats().executions, 0);
    }

    #[test]
    fn test_entry_removed_after_scan() {
        let temp_dir = TempDir::new().unwrap();
        let descriptor = plugin(temp_dir.path(), "gone", "edit", "1");
        std::fs::remove_file(descriptor.entry_path()).unwrap();

        let outcome = launcher(temp_dir.path()).launch(&descriptor, &LaunchContext::new());
        assert_eq!(outcome.error_kind(), Some(ErrorKind::EntryPointMissing));
    }

    #[test]
    fn test_payload_must_match_kind() {
        let temp_dir = TempDir::new().unwrap();
        let descriptor = plugin(temp_dir.path(), "bad-edit", "edit", r#""not a map""#);

        let outcome = launcher(temp_dir.path()).launch(&descriptor, &LaunchContext::new());
        assert_eq!(outcome.error_kind(), Some(ErrorKind::RuntimeFault));
    }

    #[test]
    fn test_support_dir_is_importable() {
        let temp_dir = TempDir::new().unwrap();
        let descriptor = plugin(
            temp_dir.path(),
            "fmt",
            "edit",
            r#"import "text" as t; #{ files: #{ "a.xhtml": t::shout("hi") } }"#,
        );
        let lib = descriptor.root_dir.join("lib");
        std::fs::create_dir_all(&lib).unwrap();
        std::fs::write(lib.join("text.rhai"), "fn shout(s) { s.to_upper() }").unwrap();

        let outcome = launcher(temp_dir.path()).launch(&descriptor, &LaunchContext::new());
        let Some(PluginOutput::Edit(edit)) = outcome.into_payload() else {
            panic!("expected edit output");
        };
        assert_eq!(edit.files["a.xhtml"], "HI");
    }

    #[test]
    fn test_module_names_are_shared_across_plugins() {
        let temp_dir = TempDir::new().unwrap();
        let script = r#"import "util" as u; import "NAME_util" as own; [u::who(), own::who()]"#;
        let alpha = plugin(temp_dir.path(), "alpha", "other", &script.replace("NAME", "alpha"));
        let beta = plugin(temp_dir.path(), "beta", "other", &script.replace("NAME", "beta"));
        for descriptor in [&alpha, &beta] {
            let id = &descriptor.id;
            std::fs::write(descriptor.root_dir.join("util.rhai"), format!(r#"fn who() {{ "{id}" }}"#))
                .unwrap();
            std::fs::write(
                descriptor.root_dir.join(format!("{id}_util.rhai")),
                format!(r#"fn who() {{ "{id}" }}"#),
            )
            .unwrap();
        }
        let launcher = launcher(temp_dir.path());

        let first = launcher.launch(&alpha, &LaunchContext::new());
        assert_eq!(
            first,
            ExecutionOutcome::Success(PluginOutput::Other(json!(["alpha", "alpha"])))
        );

        // The earlier plugin's root comes first on the search path.
        let second = launcher.launch(&beta, &LaunchContext::new());
        assert_eq!(
            second,
            ExecutionOutcome::Success(PluginOutput::Other(json!(["alpha", "beta"])))
        );
    }

    #[test]
    fn test_launch_after_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let descriptor = plugin(temp_dir.path(), "late", "other", "1");
        let launcher = launcher(temp_dir.path());
        launcher.runtime().shutdown().unwrap();

        let outcome = launcher.launch(&descriptor, &LaunchContext::new());
        assert_eq!(outcome.error_kind(), Some(ErrorKind::RuntimeUnavailable));
    }
}
