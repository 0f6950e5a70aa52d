//! Sandbox: validation and time-bounded execution of candidate programs.
//!
//! A candidate program is checked by a static [`Validator`] against an
//! injected [`SandboxPolicy`]. Accepted programs run in a child interpreter
//! with a namespace built from a fresh [`ExecutionEnvironment`], under a
//! wall-clock deadline that kills the worker on expiry. Every outcome is
//! normalized into an [`ExecutionResult`].
//!
//! # Modules
//!
//! - [`policy`]      `SandboxPolicy`, `ModuleBinding`, `standard()`
//! - [`diagnostic`]  `Diagnostic`, `ViolationKind`, `ValidationOutcome`
//! - [`validator`]   `Validator` (tree-sitter walk, collects all violations)
//! - [`environment`] `ExecutionEnvironment` (per-call capability table)
//! - [`worker`]      child-interpreter launch and report protocol
//! - [`execution`]   `SandboxConfig`, `CodeExecutor`
//! - [`result`]      `ExecutionResult`, `FailureKind`
//! - [`error`]       `SandboxError` / `SandboxResult`

pub mod diagnostic;
pub mod environment;
pub mod error;
pub mod execution;
pub mod policy;
pub mod result;
pub mod validator;
pub mod worker;

pub use diagnostic::{Diagnostic, ValidationOutcome, ViolationKind};
pub use environment::{ExecutionEnvironment, ENTRY_POINT};
pub use error::{SandboxError, SandboxResult};
pub use execution::{CodeExecutor, SandboxConfig, PYTHON_ENV, TIMEOUT_ENV};
pub use policy::{ModuleBinding, SandboxPolicy};
pub use result::{ExecutionResult, FailureKind};
pub use validator::Validator;
