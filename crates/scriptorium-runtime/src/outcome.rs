//! Execution outcomes returned across the host/runtime boundary.
//!
//! Nothing a plugin does is allowed to unwind into the host. Every execution
//! path ends in an [`ExecutionOutcome`] value instead.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a scan-time or launch-time failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or incomplete plugin metadata.
    ManifestInvalid,
    /// Declared entry script absent or unreadable.
    EntryPointMissing,
    /// Two manifests declared the same id.
    DuplicateId,
    /// Launch attempted on a disabled plugin.
    Disabled,
    /// Interpreter-level failure while running plugin code.
    RuntimeFault,
    /// Runtime failed to initialize or was used after shutdown.
    RuntimeUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ManifestInvalid => "manifest_invalid",
            ErrorKind::EntryPointMissing => "entry_point_missing",
            ErrorKind::DuplicateId => "duplicate_id",
            ErrorKind::Disabled => "disabled",
            ErrorKind::RuntimeFault => "runtime_fault",
            ErrorKind::RuntimeUnavailable => "runtime_unavailable",
        }
    }

    /// Whether the host must stop issuing plugin operations.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::RuntimeUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one script execution or plugin launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome<T = serde_json::Value> {
    Success(T),
    Failure(ErrorKind, String),
}

impl<T> ExecutionOutcome<T> {
    /// Build a failure outcome.
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        ExecutionOutcome::Failure(kind, message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success(_))
    }

    /// Failure category, if this is a failure.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ExecutionOutcome::Success(_) => None,
            ExecutionOutcome::Failure(kind, _) => Some(*kind),
        }
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            ExecutionOutcome::Success(payload) => Some(payload),
            ExecutionOutcome::Failure(..) => None,
        }
    }

    pub fn into_payload(self) -> Option<T> {
        match self {
            ExecutionOutcome::Success(payload) => Some(payload),
            ExecutionOutcome::Failure(..) => None,
        }
    }

    /// Transform a successful payload, turning a rejected one into a failure.
    pub fn and_then<U, F>(self, f: F) -> ExecutionOutcome<U>
    where
        F: FnOnce(T) -> ExecutionOutcome<U>,
    {
        match self {
            ExecutionOutcome::Success(payload) => f(payload),
            ExecutionOutcome::Failure(kind, message) => ExecutionOutcome::Failure(kind, message),
        }
    }

    pub fn map<U, F>(self, f: F) -> ExecutionOutcome<U>
    where
        F: FnOnce(T) -> U,
    {
        self.and_then(|payload| ExecutionOutcome::Success(f(payload)))
    }
}
