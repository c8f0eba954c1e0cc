//! Host collaborator contract.
//!
//! The launcher knows nothing about documents or editors. The host supplies
//! a [`HostBridge`] that turns a [`LaunchContext`] into script arguments and
//! turns a script's JSON payload into a [`PluginOutput`] it can apply.

use crate::descriptor::{PluginDescriptor, PluginKind};
use scriptorium_runtime::CancellationFlag;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What the user had open when they launched a plugin.
#[derive(Debug, Clone, Default)]
pub struct LaunchContext {
    /// The open document, if any.
    pub document: Option<PathBuf>,

    /// Selected items, typically document-relative hrefs.
    pub selection: Vec<String>,

    /// Named parameters exposed to the script as `ctx.params`.
    pub params: Map<String, Value>,

    /// Flag the script polls through `ctx.is_cancelled()`.
    pub cancel: CancellationFlag,
}

impl LaunchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, document: impl Into<PathBuf>) -> Self {
        self.document = Some(document.into());
        self
    }

    pub fn with_selection<I, S>(mut self, selection: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = selection.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Hooks the launcher calls into the host.
///
/// Launching a plugin adds its directories to the runtime's shared module
/// search path, so an `import` can resolve to another plugin's module of
/// the same name. Plugins should give their modules unique names.
pub trait HostBridge: Send + Sync {
    /// Resolve the positional arguments passed to the entry script.
    fn launch_arguments(&self, descriptor: &PluginDescriptor, context: &LaunchContext)
        -> Vec<String>;

    /// Interpret a successful payload for the plugin's kind.
    fn interpret(&self, kind: PluginKind, payload: Value) -> Result<PluginOutput, String> {
        PluginOutput::from_payload(kind, payload)
    }
}

/// Passes the document path followed by the selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHostBridge;

impl HostBridge for DefaultHostBridge {
    fn launch_arguments(
        &self,
        _descriptor: &PluginDescriptor,
        context: &LaunchContext,
    ) -> Vec<String> {
        context
            .document
            .iter()
            .map(|doc| doc.to_string_lossy().into_owned())
            .chain(context.selection.iter().cloned())
            .collect()
    }
}

/// Replacement file contents produced by an edit plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPayload {
    pub files: BTreeMap<String, String>,
}

/// New files produced by an import plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPayload {
    pub files: BTreeMap<String, String>,
}

/// Artifacts written by an output plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPayload {
    pub artifacts: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Result of a validation plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    #[serde(default)]
    pub messages: Vec<ValidationMessage>,
}

impl ValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationMessage> {
        self.messages
            .iter()
            .filter(|m| m.severity == Severity::Error)
    }
}

/// A plugin payload interpreted for its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum PluginOutput {
    Edit(EditPayload),
    Validation(ValidationReport),
    Import(ImportPayload),
    Output(OutputPayload),
    Other(Value),
}

impl PluginOutput {
    /// Check `payload` against the contract for `kind`.
    pub fn from_payload(kind: PluginKind, payload: Value) -> Result<Self, String> {
        fn parse<T: serde::de::DeserializeOwned>(
            kind: PluginKind,
            payload: Value,
        ) -> Result<T, String> {
            serde_json::from_value(payload)
                .map_err(|e| format!("{} plugin returned an unexpected payload: {}", kind, e))
        }

        Ok(match kind {
            PluginKind::Edit => PluginOutput::Edit(parse(kind, payload)?),
            PluginKind::Validation => PluginOutput::Validation(parse(kind, payload)?),
            PluginKind::Import => PluginOutput::Import(parse(kind, payload)?),
            PluginKind::Output => PluginOutput::Output(parse(kind, payload)?),
            PluginKind::Other => PluginOutput::Other(payload),
        })
    }

    pub fn kind(&self) -> PluginKind {
        match self {
            PluginOutput::Edit(_) => PluginKind::Edit,
            PluginOutput::Validation(_) => PluginKind::Validation,
            PluginOutput::Import(_) => PluginKind::Import,
            PluginOutput::Output(_) => PluginKind::Output,
            PluginOutput::Other(_) => PluginKind::Other,
        }
    }
}
