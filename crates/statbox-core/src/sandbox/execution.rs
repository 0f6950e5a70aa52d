//! Execution controls: configuration, the validate-then-run gate, and the
//! wall-clock deadline around the worker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::diagnostic::ValidationOutcome;
use super::environment::ExecutionEnvironment;
use super::error::{SandboxError, SandboxResult};
use super::policy::SandboxPolicy;
use super::result::ExecutionResult;
use super::validator::Validator;
use super::worker::{self, WorkerLauncher, WorkerOutcome};
use crate::obs::{self, ExecutionSpan};

/// Environment variable overriding [`SandboxConfig::timeout_secs`].
pub const TIMEOUT_ENV: &str = "STATBOX_CODE_TIMEOUT_SECS";
/// Environment variable overriding [`SandboxConfig::python`].
pub const PYTHON_ENV: &str = "STATBOX_PYTHON";

/// Configuration for sandboxed execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxConfig {
    /// Wall-clock budget for one execution (seconds). It covers interpreter
    /// start-up and importing the allow-listed modules as well as the program
    /// itself; the import time is logged as `worker.environment_ready`.
    pub timeout_secs: u64,
    /// Interpreter used for workers; looked up on `PATH` if not absolute.
    pub python: String,
    /// Run workers in isolated mode (`-I`): no user site-packages, no
    /// `PYTHON*` variables, script directory not on `sys.path`.
    pub isolated: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            python: "python3".to_string(),
            isolated: true,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> SandboxResult<()> {
        if self.timeout_secs == 0 {
            return Err(SandboxError::InvalidConfig(
                "timeout_secs must be positive".into(),
            ));
        }
        if self.python.trim().is_empty() {
            return Err(SandboxError::InvalidConfig(
                "python interpreter must be named".into(),
            ));
        }
        Ok(())
    }

    /// Defaults overridden by `STATBOX_CODE_TIMEOUT_SECS` and `STATBOX_PYTHON`.
    pub fn from_env() -> SandboxResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> SandboxResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            config.timeout_secs = raw.trim().parse().map_err(|_| {
                SandboxError::InvalidConfig(format!(
                    "{TIMEOUT_ENV} must be a positive integer, got '{raw}'"
                ))
            })?;
        }
        if let Some(python) = lookup(PYTHON_ENV) {
            config.python = python;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Validates candidate programs and runs the accepted ones in a worker.
///
/// Cheap to clone and safe to share; every call builds its own environment
/// and worker, so concurrent calls do not interact.
#[derive(Debug, Clone)]
pub struct CodeExecutor {
    config: SandboxConfig,
    policy: Arc<SandboxPolicy>,
    validator: Validator,
    launcher: WorkerLauncher,
}

impl CodeExecutor {
    pub fn new(config: SandboxConfig, policy: Arc<SandboxPolicy>) -> SandboxResult<Self> {
        config.validate()?;
        policy.validate()?;
        Ok(Self {
            validator: Validator::new(Arc::clone(&policy)),
            launcher: WorkerLauncher::new(config.python.clone(), config.isolated),
            config,
            policy,
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Static validation only; never starts a worker.
    pub fn validate(&self, source: &str) -> ValidationOutcome {
        self.validator.validate(source)
    }

    /// Validate and execute `source` under the configured timeout.
    pub async fn execute(&self, source: &str) -> ExecutionResult {
        self.execute_with_timeout(source, self.config.timeout()).await
    }

    /// Validate and execute `source` under `timeout`.
    ///
    /// Always returns a result; every failure, including worker faults, is
    /// folded into it.
    pub async fn execute_with_timeout(&self, source: &str, timeout: Duration) -> ExecutionResult {
        let span = ExecutionSpan::new();
        async {
            let started = Instant::now();
            obs::emit_execution_started(&obs::source_digest(source), source.len(), timeout);

            let result = self.validate_and_run(source, timeout).await;

            obs::emit_execution_finished(
                started.elapsed().as_millis() as u64,
                result.success,
                result.failure_kind,
            );
            result
        }
        .instrument(span.span())
        .await
    }

    async fn validate_and_run(&self, source: &str, timeout: Duration) -> ExecutionResult {
        let outcome = self.validator.validate(source);
        if !outcome.is_valid() {
            obs::emit_validation_rejected(outcome.len(), outcome.is_syntax_error());
            return ExecutionResult::rejected(&outcome);
        }

        let environment = ExecutionEnvironment::fresh(&self.policy);
        match self.run_in_worker(source, &environment, timeout).await {
            Ok(result) => result,
            Err(e) => {
                obs::emit_worker_failed(&e);
                ExecutionResult::runtime_error(format!("Sandbox worker failed: {e}"), None)
            }
        }
    }

    async fn run_in_worker(
        &self,
        source: &str,
        environment: &ExecutionEnvironment,
        timeout: Duration,
    ) -> SandboxResult<ExecutionResult> {
        let request = worker::encode_request(source, environment)?;
        let scratch = tempfile::Builder::new().prefix("statbox-").tempdir()?;
        let mut child = self.launcher.spawn(scratch.path())?;

        let finished = tokio::time::timeout(timeout, worker::exchange(&mut child, request)).await;
        let exit = match finished {
            Ok(exit) => exit?,
            Err(_elapsed) => {
                let killed = child.kill().await;
                obs::emit_worker_killed(timeout, killed.as_ref().err());
                return Ok(ExecutionResult::timed_out(timeout));
            }
        };

        let stderr = String::from_utf8_lossy(&exit.stderr).into_owned();
        let report = exit.into_report()?;
        obs::emit_environment_ready(report.import_ms);
        obs::emit_program_output(&report.stdout, &stderr);
        if !report.unavailable_modules.is_empty() {
            obs::emit_modules_unavailable(&report.unavailable_modules);
        }

        Ok(match report.outcome {
            WorkerOutcome::Ok { json } => {
                ExecutionResult::succeeded(WorkerOutcome::decode_value(&json)?)
            }
            WorkerOutcome::MissingEntryPoint => ExecutionResult::missing_entry_point(),
            WorkerOutcome::NotSerializable { detail } => ExecutionResult::not_serializable(&detail),
            WorkerOutcome::RuntimeError { message, traceback } => {
                ExecutionResult::runtime_error(message, Some(traceback))
            }
        })
    }
}
