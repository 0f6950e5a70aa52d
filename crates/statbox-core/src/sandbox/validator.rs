//! Static validation of candidate programs.
//!
//! The source is parsed with the tree-sitter Python grammar and every node of
//! the tree is visited in pre-order. Three node shapes are checked against the
//! [`SandboxPolicy`]:
//!
//! - `import x` / `from x import y`: the top-level package must be allow-listed.
//! - `f(...)` / `obj.f(...)`: `f` must not be a forbidden call target.
//! - `obj.attr`: `attr` must not be a forbidden attribute.
//!
//! The match is purely textual. It does not resolve names, so it catches a
//! model straying outside the intended surface, not a determined adversary.

use std::sync::Arc;

use tree_sitter::{Node, Parser, Tree};

use super::diagnostic::{Diagnostic, ValidationOutcome, ViolationKind};
use super::policy::SandboxPolicy;

/// Walks candidate programs and reports every policy violation in one pass.
#[derive(Debug, Clone)]
pub struct Validator {
    policy: Arc<SandboxPolicy>,
}

impl Validator {
    pub fn new(policy: Arc<SandboxPolicy>) -> Self {
        Self { policy }
    }

    /// A validator over [`SandboxPolicy::standard`].
    pub fn standard() -> Self {
        Self::new(Arc::new(SandboxPolicy::standard()))
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Validate `source`.
    ///
    /// A parse failure yields exactly one [`ViolationKind::Syntax`] diagnostic
    /// and no policy checks. Otherwise all violations are collected; the walk
    /// never stops early.
    pub fn validate(&self, source: &str) -> ValidationOutcome {
        let tree = match parse(source) {
            Ok(tree) => tree,
            Err(outcome) => return outcome,
        };

        let root = tree.root_node();
        if root.has_error() {
            return describe_syntax_error(root, source.as_bytes());
        }

        let mut outcome = ValidationOutcome::default();
        let src = source.as_bytes();
        let mut cursor = root.walk();

        loop {
            let node = cursor.node();
            if let Some(keyword) = legacy_statement(node) {
                return ValidationOutcome::syntax_error(
                    format!("'{keyword}' statement is not valid Python 3"),
                    line_of(node),
                );
            }
            self.inspect(node, src, &mut outcome);

            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return outcome;
                }
            }
        }
    }

    fn inspect(&self, node: Node<'_>, src: &[u8], outcome: &mut ValidationOutcome) {
        match node.kind() {
            "import_statement" => {
                let mut cursor = node.walk();
                for name in node.children_by_field_name("name", &mut cursor) {
                    let module = if name.kind() == "aliased_import" {
                        name.child_by_field_name("name").unwrap_or(name)
                    } else {
                        name
                    };
                    let path = text(module, src);
                    if !self.policy.allows_import(path) {
                        outcome.record(Diagnostic::new(
                            ViolationKind::Import,
                            path,
                            line_of(module),
                        ));
                    }
                }
            }
            "import_from_statement" => {
                if let Some(module) = node.child_by_field_name("module_name") {
                    let path = text(module, src);
                    // Relative imports have no package to resolve against.
                    let allowed =
                        module.kind() == "dotted_name" && self.policy.allows_import(path);
                    if !allowed {
                        outcome.record(Diagnostic::new(
                            ViolationKind::ImportFrom,
                            path,
                            line_of(module),
                        ));
                    }
                }
            }
            "future_import_statement" => {
                if !self.policy.allows_import("__future__") {
                    outcome.record(Diagnostic::new(
                        ViolationKind::ImportFrom,
                        "__future__",
                        line_of(node),
                    ));
                }
            }
            "call" => {
                let target = node.child_by_field_name("function").and_then(|f| match f.kind() {
                    "identifier" => Some(f),
                    "attribute" => f.child_by_field_name("attribute"),
                    _ => None,
                });
                if let Some(target) = target {
                    let name = text(target, src);
                    if self.policy.is_forbidden_call(name) {
                        outcome.record(Diagnostic::new(ViolationKind::Call, name, line_of(target)));
                    }
                }
            }
            "attribute" => {
                if let Some(attr) = node.child_by_field_name("attribute") {
                    let name = text(attr, src);
                    if self.policy.is_forbidden_attribute(name) {
                        outcome.record(Diagnostic::new(
                            ViolationKind::Attribute,
                            name,
                            line_of(attr),
                        ));
                    }
                }
            }
            _ => {}
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::standard()
    }
}

fn parse(source: &str) -> Result<Tree, ValidationOutcome> {
    let mut parser = Parser::new();
    let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
    parser
        .set_language(&language)
        .map_err(|e| ValidationOutcome::syntax_error(format!("grammar unavailable: {e}"), 1))?;
    parser
        .parse(source, None)
        .ok_or_else(|| ValidationOutcome::syntax_error("parser produced no tree", 1))
}

/// Report the first `ERROR` or `MISSING` node in document order.
fn describe_syntax_error(root: Node<'_>, src: &[u8]) -> ValidationOutcome {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_missing() {
            return ValidationOutcome::syntax_error(
                format!("expected '{}'", node.kind()),
                line_of(node),
            );
        }
        if node.is_error() {
            let snippet: String = text(node, src)
                .lines()
                .next()
                .unwrap_or_default()
                .chars()
                .take(40)
                .collect();
            return ValidationOutcome::syntax_error(
                format!("invalid syntax near '{}'", snippet.trim()),
                line_of(node),
            );
        }

        // Only descend into subtrees that contain the error.
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return ValidationOutcome::syntax_error("invalid syntax", 1);
            }
        }
    }
}

/// Python 2 statement forms the grammar still accepts.
fn legacy_statement(node: Node<'_>) -> Option<&'static str> {
    match node.kind() {
        "exec_statement" => Some("exec"),
        "print_statement" => Some("print"),
        _ => None,
    }
}

fn text<'a>(node: Node<'_>, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or_default()
}

fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}
