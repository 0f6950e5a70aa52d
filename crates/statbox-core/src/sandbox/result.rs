//! The normalized outcome of one execution.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::diagnostic::ValidationOutcome;

/// Terminal failure states of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected by the validator; nothing ran.
    Validation,
    /// No zero-argument callable `run`.
    MissingEntryPoint,
    /// `run()` returned something that is not a JSON tree.
    NonSerializable,
    /// The program raised, or the worker itself failed.
    RuntimeError,
    /// The deadline expired and the worker was killed.
    Timeout,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Validation => write!(f, "validation"),
            FailureKind::MissingEntryPoint => write!(f, "missing_entry_point"),
            FailureKind::NonSerializable => write!(f, "non_serializable"),
            FailureKind::RuntimeError => write!(f, "runtime_error"),
            FailureKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// What the orchestrator gets back from every execution.
///
/// On success only `data` is set. On failure `error` is set, `traceback` is set
/// for runtime errors, and `failure_kind` names the terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub traceback: Option<String>,
    pub failure_kind: Option<FailureKind>,
}

impl ExecutionResult {
    pub fn succeeded(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            traceback: None,
            failure_kind: None,
        }
    }

    fn failed(kind: FailureKind, error: String, traceback: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            traceback,
            failure_kind: Some(kind),
        }
    }

    pub fn rejected(outcome: &ValidationOutcome) -> Self {
        Self::failed(FailureKind::Validation, outcome.summary(), None)
    }

    pub fn missing_entry_point() -> Self {
        Self::failed(
            FailureKind::MissingEntryPoint,
            "Code must define a callable run() function with no arguments".into(),
            None,
        )
    }

    pub fn not_serializable(detail: &str) -> Self {
        Self::failed(
            FailureKind::NonSerializable,
            format!("run() must return JSON-serializable data. Got error: {detail}"),
            None,
        )
    }

    pub fn runtime_error(message: impl Into<String>, traceback: Option<String>) -> Self {
        Self::failed(FailureKind::RuntimeError, message.into(), traceback)
    }

    pub fn timed_out(limit: Duration) -> Self {
        let unit = if limit == Duration::from_secs(1) {
            "second"
        } else {
            "seconds"
        };
        Self::failed(
            FailureKind::Timeout,
            format!(
                "Code execution timed out after {} {unit}",
                limit.as_secs_f64()
            ),
            None,
        )
    }

    /// Text to feed back into a repair prompt: the error, followed by the
    /// traceback when there is one.
    pub fn feedback(&self) -> String {
        let mut text = self
            .error
            .clone()
            .unwrap_or_else(|| "Unknown error".to_string());
        if let Some(tb) = &self.traceback {
            text.push('\n');
            text.push_str(tb);
        }
        text
    }
}
