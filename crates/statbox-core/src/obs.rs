//! Structured observability hooks for the execution lifecycle.
//!
//! Every execution runs inside a `statbox.execution` span tagged with a fresh
//! `execution_id`; the `emit_*` functions below log the lifecycle events inside
//! it. Each event carries an `event = "..."` field for filtering.

use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::sandbox::FailureKind;

/// Identity and span of a single execution.
///
/// # Example
///
/// ```ignore
/// let span = ExecutionSpan::new();
/// async { /* ... */ }.instrument(span.span()).await;
/// // events inside are tagged with execution_id
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionSpan {
    span: tracing::Span,
}

impl ExecutionSpan {
    /// Allocate a new execution id and its span.
    pub fn new() -> Self {
        let span = tracing::info_span!("statbox.execution", execution_id = %Uuid::new_v4());
        Self { span }
    }

    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }
}

impl Default for ExecutionSpan {
    fn default() -> Self {
        Self::new()
    }
}

/// Hex SHA-256 of a candidate program, used to correlate repeated attempts.
pub fn source_digest(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

/// Emit event: execution started.
pub fn emit_execution_started(source_digest: &str, source_bytes: usize, timeout: Duration) {
    info!(
        event = "execution.started",
        source_digest = %source_digest,
        source_bytes = source_bytes,
        timeout_ms = timeout.as_millis() as u64,
    );
}

/// Emit event: the worker finished importing the allow-listed modules.
pub fn emit_environment_ready(import_ms: u64) {
    debug!(event = "worker.environment_ready", import_ms = import_ms);
}

/// Emit event: the validator rejected the program.
pub fn emit_validation_rejected(diagnostics: usize, syntax_error: bool) {
    info!(
        event = "validation.rejected",
        diagnostics = diagnostics,
        syntax_error = syntax_error,
    );
}

/// Emit event: execution finished, successfully or not.
pub fn emit_execution_finished(duration_ms: u64, success: bool, failure_kind: Option<FailureKind>) {
    match failure_kind {
        Some(kind) => info!(
            event = "execution.finished",
            duration_ms = duration_ms,
            success = success,
            failure_kind = %kind,
        ),
        None => info!(
            event = "execution.finished",
            duration_ms = duration_ms,
            success = success,
        ),
    }
}

/// Emit event: the deadline expired and the worker was killed (warning level).
pub fn emit_worker_killed(timeout: Duration, kill_error: Option<&std::io::Error>) {
    match kill_error {
        Some(e) => warn!(
            event = "worker.killed",
            timeout_ms = timeout.as_millis() as u64,
            error = %e,
        ),
        None => warn!(event = "worker.killed", timeout_ms = timeout.as_millis() as u64),
    }
}

/// Emit event: the worker could not be run or spoke garbage (warning level).
pub fn emit_worker_failed(error: &dyn std::fmt::Display) {
    warn!(event = "worker.failed", error = %error);
}

/// Emit event: allow-listed modules missing from the interpreter (warning level).
pub fn emit_modules_unavailable(modules: &[String]) {
    warn!(event = "worker.modules_unavailable", modules = ?modules);
}

/// Emit event: program output, kept out of the result.
pub fn emit_program_output(stdout: &str, stderr: &str) {
    if !stdout.is_empty() {
        debug!(event = "program.stdout", output = %stdout);
    }
    if !stderr.is_empty() {
        debug!(event = "worker.stderr", output = %stderr);
    }
}
