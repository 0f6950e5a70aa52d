//! Child-interpreter worker and its stdin/stdout protocol.
//!
//! Each execution runs in its own interpreter process. The request (source text
//! plus the serialized [`ExecutionEnvironment`]) is written to stdin as one JSON
//! document; the worker answers with one JSON report line on stdout. Anything
//! else the interpreter writes to stderr is kept for diagnostics only.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

use super::environment::ExecutionEnvironment;
use super::error::{SandboxError, SandboxResult};

/// Interpreter-side harness, run with `-c`.
const HARNESS: &str = include_str!("harness.py");

/// Longest stderr excerpt carried into a protocol error.
const STDERR_EXCERPT: usize = 2_000;

#[derive(Debug, Serialize)]
struct WorkerRequest<'a> {
    source: &'a str,
    environment: &'a ExecutionEnvironment,
}

/// How the candidate program ended inside the worker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerOutcome {
    /// `json` is the text the worker checked with its own encoder.
    Ok {
        json: String,
    },
    MissingEntryPoint,
    NotSerializable {
        detail: String,
    },
    RuntimeError {
        message: String,
        traceback: String,
    },
}

/// The single report line a worker writes before exiting.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkerReport {
    pub outcome: WorkerOutcome,
    /// Everything the candidate printed.
    #[serde(default)]
    pub stdout: String,
    /// Allow-listed modules that could not be imported in the worker.
    #[serde(default)]
    pub unavailable_modules: Vec<String>,
    /// Time spent importing the allow-listed modules, inside the deadline.
    #[serde(default)]
    pub import_ms: u64,
}

impl WorkerOutcome {
    /// Decode a successful return value without losing numeric precision.
    pub fn decode_value(json: &str) -> SandboxResult<serde_json::Value> {
        Ok(serde_json::from_str(json)?)
    }
}

impl WorkerReport {
    /// Parse the last non-empty line of the worker's stdout.
    pub fn parse(stdout: &[u8]) -> SandboxResult<Self> {
        let text = String::from_utf8_lossy(stdout);
        let line = text
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| SandboxError::WorkerProtocol("worker produced no report".into()))?;
        Ok(serde_json::from_str(line)?)
    }
}

/// Raw output of a worker that ran to completion.
#[derive(Debug)]
pub struct WorkerExit {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl WorkerExit {
    /// Decode the report, folding a missing or malformed one into a protocol
    /// error that carries the exit status and the tail of stderr.
    pub fn into_report(self) -> SandboxResult<WorkerReport> {
        WorkerReport::parse(&self.stdout).map_err(|e| {
            let detail = match e {
                SandboxError::WorkerProtocol(message) => message,
                other => other.to_string(),
            };
            let stderr = String::from_utf8_lossy(&self.stderr);
            let start = stderr
                .char_indices()
                .rev()
                .nth(STDERR_EXCERPT)
                .map_or(0, |(i, _)| i);
            SandboxError::WorkerProtocol(format!(
                "{detail} (worker {}): {}",
                self.status,
                stderr[start..].trim()
            ))
        })
    }
}

/// Launches worker processes.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    python: String,
    isolated: bool,
}

impl WorkerLauncher {
    pub fn new(python: impl Into<String>, isolated: bool) -> Self {
        Self {
            python: python.into(),
            isolated,
        }
    }

    /// Start a worker whose working and home directory is `scratch`.
    ///
    /// The child inherits nothing from the host environment except `PATH`, and
    /// is killed if its handle is dropped.
    pub fn spawn(&self, scratch: &Path) -> SandboxResult<Child> {
        let mut command = Command::new(&self.python);
        if self.isolated {
            command.arg("-I");
        }
        command
            .args(["-B", "-X", "utf8", "-c", HARNESS])
            .current_dir(scratch)
            .env_clear()
            .env("HOME", scratch)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }
        Ok(command.spawn()?)
    }
}

/// Encode the request a worker reads from stdin.
pub fn encode_request(source: &str, environment: &ExecutionEnvironment) -> SandboxResult<Vec<u8>> {
    Ok(serde_json::to_vec(&WorkerRequest {
        source,
        environment,
    })?)
}

/// Feed `request` to the worker and wait for it to exit.
///
/// Stdin is written while stdout and stderr are drained. The caller bounds
/// this with a deadline and kills the child when it expires.
pub async fn exchange(child: &mut Child, request: Vec<u8>) -> SandboxResult<WorkerExit> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| SandboxError::WorkerProtocol("worker stdin not captured".into()))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| SandboxError::WorkerProtocol("worker stdout not captured".into()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| SandboxError::WorkerProtocol("worker stderr not captured".into()))?;

    let write = async move {
        stdin.write_all(&request).await?;
        stdin.shutdown().await?;
        Ok::<(), std::io::Error>(())
    };

    let mut out = Vec::new();
    let mut err = Vec::new();
    let (written, read_out, read_err) = tokio::join!(
        write,
        stdout.read_to_end(&mut out),
        stderr.read_to_end(&mut err)
    );
    read_out?;
    read_err?;
    // A worker that dies early closes its stdin; its stderr says why.
    if let Err(e) = written {
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            return Err(e.into());
        }
    }

    let status = child.wait().await?;
    Ok(WorkerExit {
        status,
        stdout: out,
        stderr: err,
    })
}
