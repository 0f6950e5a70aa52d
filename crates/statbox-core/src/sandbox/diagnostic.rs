//! Validation diagnostics and the accumulated validation outcome.

use serde::{Deserialize, Serialize};

/// What a diagnostic objects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The source does not parse. Always the only diagnostic in its outcome.
    Syntax,
    /// `import x` where `x` is not allow-listed.
    Import,
    /// `from x import y` where `x` is not allow-listed.
    ImportFrom,
    /// Call whose target matches the forbidden-call list.
    Call,
    /// Attribute access matching the forbidden-attribute list.
    Attribute,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::Syntax => write!(f, "syntax"),
            ViolationKind::Import => write!(f, "import"),
            ViolationKind::ImportFrom => write!(f, "import_from"),
            ViolationKind::Call => write!(f, "call"),
            ViolationKind::Attribute => write!(f, "attribute"),
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: ViolationKind,
    /// The offending module, call target or attribute name; for syntax errors,
    /// a description of the parse failure.
    pub subject: String,
    /// 1-based source line.
    pub line: usize,
}

impl Diagnostic {
    pub fn new(kind: ViolationKind, subject: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            subject: subject.into(),
            line,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ViolationKind::Syntax => write!(f, "Syntax error in code: {}", self.subject)?,
            ViolationKind::Import => write!(f, "Import of '{}' is not allowed", self.subject)?,
            ViolationKind::ImportFrom => {
                write!(f, "Import from '{}' is not allowed", self.subject)?
            }
            ViolationKind::Call => write!(f, "Call to '{}' is not allowed", self.subject)?,
            ViolationKind::Attribute => write!(f, "Access to '{}' is not allowed", self.subject)?,
        }
        write!(f, " (line {})", self.line)
    }
}

/// Ordered, duplicate-free set of diagnostics. Empty means the program is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    diagnostics: Vec<Diagnostic>,
}

impl ValidationOutcome {
    /// An outcome holding a single syntax error.
    pub fn syntax_error(description: impl Into<String>, line: usize) -> Self {
        Self {
            diagnostics: vec![Diagnostic::new(ViolationKind::Syntax, description, line)],
        }
    }

    /// Record a diagnostic, keeping first-seen order. Exact repeats are dropped.
    pub fn record(&mut self, diagnostic: Diagnostic) {
        if !self.diagnostics.contains(&diagnostic) {
            self.diagnostics.push(diagnostic);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn is_syntax_error(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.kind == ViolationKind::Syntax)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Rendered diagnostics, in order.
    pub fn messages(&self) -> Vec<String> {
        self.diagnostics.iter().map(ToString::to_string).collect()
    }

    /// The single message a rejected program is reported with.
    ///
    /// Syntax errors are reported on their own; policy violations are listed
    /// under a `Code validation failed:` header, one per line.
    pub fn summary(&self) -> String {
        if self.is_syntax_error() {
            return self.messages().join("\n");
        }
        let mut out = String::from("Code validation failed:");
        for message in self.messages() {
            out.push_str("\n  - ");
            out.push_str(&message);
        }
        out
    }
}
