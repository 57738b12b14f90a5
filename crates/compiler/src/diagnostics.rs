//! Compiler diagnostics
//!
//! Compile-time errors are accumulated per file where possible and
//! rendered as human-readable lines:
//!
//! ```text
//! <file>:<line>:<col>: <kind>: <message>
//! ```
//!
//! The `kind` is a dotted identifier from a fixed taxonomy
//! (`lex.*`, `parse.*`, `resolve.*`, `type.*`, `codegen.*`).

use crate::token::{FileId, Span};
use std::path::PathBuf;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic with position and kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted kind, e.g. `parse.unexpected_token`
    pub kind: String,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(kind: impl Into<String>, message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Error,
            kind: kind.into(),
            message: message.into(),
            span,
        }
    }

    pub fn warning(kind: impl Into<String>, message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            kind: kind.into(),
            message: message.into(),
            span,
        }
    }
}

/// Maps `FileId`s back to paths for rendering.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<PathBuf>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap { files: Vec::new() }
    }

    pub fn add(&mut self, path: PathBuf) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(path);
        id
    }

    pub fn path(&self, id: FileId) -> Option<&PathBuf> {
        self.files.get(id.0 as usize)
    }

    pub fn display(&self, id: FileId) -> String {
        self.path(id)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string())
    }
}

/// Render one diagnostic in the `<file>:<line>:<col>: <kind>: <message>`
/// form.
pub fn format_diagnostic(diag: &Diagnostic, sources: &SourceMap) -> String {
    format!(
        "{}:{}:{}: {}: {}",
        sources.display(diag.span.file),
        diag.span.line,
        diag.span.column,
        diag.kind,
        diag.message
    )
}

/// Render a batch, one diagnostic per line, errors and warnings in the
/// order they were produced.
pub fn format_diagnostics(diags: &[Diagnostic], sources: &SourceMap) -> String {
    let mut out = String::new();
    for diag in diags {
        out.push_str(&format_diagnostic(diag, sources));
        out.push('\n');
    }
    out
}

/// True when any diagnostic in the batch is an error (warnings alone do
/// not block the next phase).
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.severity == Severity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_diagnostic_line() {
        let mut sources = SourceMap::new();
        let file = sources.add(PathBuf::from("main.droe"));
        let diag = Diagnostic::error(
            "parse.unexpected_token",
            "expected 'to' after variable name",
            Span::new(file, 3, 12),
        );
        assert_eq!(
            format_diagnostic(&diag, &sources),
            "main.droe:3:12: parse.unexpected_token: expected 'to' after variable name"
        );
    }

    #[test]
    fn test_has_errors_ignores_warnings() {
        let span = Span::default();
        let warnings = vec![Diagnostic::warning("type.unused", "unused variable", span)];
        assert!(!has_errors(&warnings));
        let mixed = vec![
            Diagnostic::warning("type.unused", "unused variable", span),
            Diagnostic::error("type.unknown_identifier", "unknown name", span),
        ];
        assert!(has_errors(&mixed));
    }
}
