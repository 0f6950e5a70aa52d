//! statbox core library
//!
//! Validates model-generated analysis programs and executes the accepted ones
//! in a sandboxed, time-bounded worker.

pub mod obs;
pub mod sandbox;
pub mod telemetry;

pub use sandbox::{
    CodeExecutor, Diagnostic, ExecutionEnvironment, ExecutionResult, FailureKind, ModuleBinding,
    SandboxConfig, SandboxError, SandboxPolicy, SandboxResult, ValidationOutcome, Validator,
    ViolationKind,
};
pub use telemetry::init_tracing;
