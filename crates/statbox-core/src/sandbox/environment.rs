//! The per-execution capability table handed to the worker.
//!
//! An [`ExecutionEnvironment`] is a plain value derived from the policy. The
//! worker materialises it into a fresh interpreter namespace, so nothing a
//! candidate program does to its namespace can outlive the call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::policy::{ModuleBinding, SandboxPolicy};

/// Name of the required zero-argument entry point.
pub const ENTRY_POINT: &str = "run";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionEnvironment {
    /// Built-in operations exposed through `__builtins__`.
    pub builtins: Vec<String>,
    /// Modules pre-bound in the namespace under each of their names.
    pub modules: Vec<ModuleBinding>,
    /// Import name (or alias) → real module. The worker's import hook resolves
    /// through this table and refuses anything missing from it.
    pub aliases: BTreeMap<String, String>,
    pub entry_point: String,
}

impl ExecutionEnvironment {
    /// Build a new environment from `policy`.
    pub fn fresh(policy: &SandboxPolicy) -> Self {
        let aliases = policy
            .allowed_import_names()
            .into_iter()
            .filter_map(|name| {
                policy
                    .resolve_import(name)
                    .map(|module| (name.to_string(), module.to_string()))
            })
            .collect();

        Self {
            builtins: policy.safe_builtins.iter().cloned().collect(),
            modules: policy.modules.clone(),
            aliases,
            entry_point: ENTRY_POINT.to_string(),
        }
    }
}
