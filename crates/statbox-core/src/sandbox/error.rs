//! Error types for the sandbox module.
//!
//! These never cross [`CodeExecutor::execute`](super::CodeExecutor::execute);
//! the runner folds them into an [`ExecutionResult`](super::ExecutionResult).

/// Errors produced by the sandbox layer.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse sandbox policy: {0}")]
    PolicyParse(#[from] toml::de::Error),

    #[error("failed to render sandbox policy: {0}")]
    PolicyRender(#[from] toml::ser::Error),

    #[error("sandbox worker I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sandbox worker protocol error: {0}")]
    WorkerProtocol(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
