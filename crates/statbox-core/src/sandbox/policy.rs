//! Sandbox policy: the allow-list of importable modules and the deny-lists
//! for call targets and attribute names.
//!
//! A policy is immutable once built and is injected into both the
//! [`Validator`](super::Validator) and the [`CodeExecutor`](super::CodeExecutor),
//! so a deployment (or a test) can swap it without touching either.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{SandboxError, SandboxResult};

/// A library module exposed to candidate programs, bound under one or more
/// names (the module's own name plus any conventional aliases).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleBinding {
    /// Importable module path, e.g. `polars`.
    pub module: String,
    /// Names the module may be imported and referenced as, e.g. `["polars", "pl"]`.
    pub names: Vec<String>,
}

impl ModuleBinding {
    /// Bind `module` under its own name plus `aliases`.
    pub fn new(module: &str, aliases: &[&str]) -> Self {
        let mut names = vec![module.to_string()];
        names.extend(aliases.iter().map(|a| a.to_string()));
        Self {
            module: module.to_string(),
            names,
        }
    }

    fn binds(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

/// Allow-list of imports plus deny-lists for calls and attributes.
///
/// Imports are allow-list-first: anything not named by a [`ModuleBinding`] is
/// rejected. Calls and attribute accesses are deny-list based, since that
/// surface cannot be enumerated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxPolicy {
    /// Bare or method-style call targets that are always rejected.
    pub forbidden_calls: BTreeSet<String>,
    /// Attribute names that are always rejected.
    pub forbidden_attributes: BTreeSet<String>,
    /// Built-in operations placed in the execution namespace.
    pub safe_builtins: BTreeSet<String>,
    /// Modules candidate programs may import.
    pub modules: Vec<ModuleBinding>,
}

const STANDARD_FORBIDDEN_CALLS: &[&str] = &[
    "eval",
    "exec",
    "open",
    "__import__",
    "compile",
    "globals",
    "locals",
    "vars",
    "dir",
    "getattr",
    "setattr",
    "delattr",
    "hasattr",
    "input",
    "breakpoint",
];

const STANDARD_FORBIDDEN_ATTRIBUTES: &[&str] = &[
    "__builtins__",
    "__code__",
    "__globals__",
    "__subclasses__",
    "__bases__",
    "__mro__",
    "__class__",
];

const STANDARD_SAFE_BUILTINS: &[&str] = &[
    // arithmetic and numeric conversion
    "abs",
    "divmod",
    "float",
    "int",
    "max",
    "min",
    "pow",
    "round",
    "sum",
    // containers
    "bool",
    "dict",
    "frozenset",
    "list",
    "set",
    "slice",
    "str",
    "tuple",
    // iteration
    "all",
    "any",
    "enumerate",
    "filter",
    "iter",
    "len",
    "map",
    "next",
    "range",
    "reversed",
    "sorted",
    "zip",
    // type predicates
    "isinstance",
    "issubclass",
    "type",
    // output
    "print",
    "repr",
    // class statements
    "__build_class__",
    // exception types, so `try`/`except` blocks resolve
    "ArithmeticError",
    "Exception",
    "IndexError",
    "KeyError",
    "LookupError",
    "RuntimeError",
    "StopIteration",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
];

impl SandboxPolicy {
    /// The standard policy for statistics programs.
    ///
    /// | Module      | Names                  |
    /// |-------------|------------------------|
    /// | nflreadpy   | `nflreadpy`, `nfl`     |
    /// | polars      | `polars`, `pl`         |
    /// | datetime    | `datetime`             |
    /// | math        | `math`                 |
    /// | statistics  | `statistics`           |
    /// | json        | `json`                 |
    /// | re          | `re`                   |
    pub fn standard() -> Self {
        let set = |items: &[&str]| -> BTreeSet<String> {
            items.iter().map(|s| s.to_string()).collect()
        };

        Self {
            forbidden_calls: set(STANDARD_FORBIDDEN_CALLS),
            forbidden_attributes: set(STANDARD_FORBIDDEN_ATTRIBUTES),
            safe_builtins: set(STANDARD_SAFE_BUILTINS),
            modules: vec![
                ModuleBinding::new("nflreadpy", &["nfl"]),
                ModuleBinding::new("polars", &["pl"]),
                ModuleBinding::new("datetime", &[]),
                ModuleBinding::new("math", &[]),
                ModuleBinding::new("statistics", &[]),
                ModuleBinding::new("json", &[]),
                ModuleBinding::new("re", &[]),
            ],
        }
    }

    /// Parse a policy from TOML and validate it.
    pub fn from_toml_str(input: &str) -> SandboxResult<Self> {
        let policy: Self = toml::from_str(input)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load a policy file from disk.
    pub fn load(path: &Path) -> SandboxResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Render the policy as TOML.
    pub fn to_toml_string(&self) -> SandboxResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// Check internal consistency.
    ///
    /// A built-in that is also a forbidden call target would make the two
    /// layers disagree, so it is rejected here rather than at execution time.
    pub fn validate(&self) -> SandboxResult<()> {
        if let Some(name) = self
            .safe_builtins
            .iter()
            .find(|b| self.forbidden_calls.contains(*b))
        {
            return Err(SandboxError::InvalidConfig(format!(
                "builtin '{name}' is both safe and forbidden"
            )));
        }

        for binding in &self.modules {
            if binding.module.is_empty() || binding.names.is_empty() {
                return Err(SandboxError::InvalidConfig(format!(
                    "module binding '{}' must name a module and at least one binding",
                    binding.module
                )));
            }
        }

        Ok(())
    }

    /// Returns `true` if the top-level package of `module_path` is allow-listed.
    pub fn allows_import(&self, module_path: &str) -> bool {
        let top = top_level(module_path);
        self.modules.iter().any(|m| m.binds(top))
    }

    /// The real module an import name (or alias) refers to.
    pub fn resolve_import(&self, name: &str) -> Option<&str> {
        self.modules
            .iter()
            .find(|m| m.binds(name))
            .map(|m| m.module.as_str())
    }

    /// Every name an import statement may mention, sorted.
    pub fn allowed_import_names(&self) -> BTreeSet<&str> {
        self.modules
            .iter()
            .flat_map(|m| m.names.iter().map(String::as_str))
            .collect()
    }

    pub fn is_forbidden_call(&self, name: &str) -> bool {
        self.forbidden_calls.contains(name)
    }

    pub fn is_forbidden_attribute(&self, name: &str) -> bool {
        self.forbidden_attributes.contains(name)
    }
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// `"os.path"` → `"os"`.
pub(crate) fn top_level(module_path: &str) -> &str {
    module_path.split('.').next().unwrap_or(module_path)
}
