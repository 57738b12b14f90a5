//! Droe Compiler Library
//!
//! Front end and bytecode emitter for the Droe language: lexer,
//! recursive-descent parser, include resolver, symbol/type checker, and
//! the emitter that lowers the checked AST to a self-contained bytecode
//! artifact.
//!
//! Phases are gated: the first error in a phase prevents entry into the
//! next one, so downstream phases never run on a broken AST. Diagnostics
//! accumulate within each phase.

pub mod ast;
pub mod backend;
pub mod checker;
pub mod config;
pub mod diagnostics;
pub mod emitter;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod token;
pub mod types;

pub use ast::Program;
pub use backend::{Backend, BytecodeBackend, GeneratedOutput};
pub use checker::{check_program, Signatures};
pub use config::{CompilerConfig, DEFAULT_TARGET};
pub use diagnostics::{format_diagnostics, has_errors, Diagnostic, SourceMap, Severity};
pub use emitter::emit_program;
pub use lexer::Lexer;
pub use parser::Parser;
pub use resolver::Resolver;
pub use types::Ty;

use droe_core::Metadata;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// A failed compilation: the accumulated diagnostics plus the source map
/// needed to render them.
#[derive(Debug)]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
    pub sources: SourceMap,
}

impl CompileError {
    /// Render all diagnostics, one per line.
    pub fn render(&self) -> String {
        format_diagnostics(&self.diagnostics, &self.sources)
    }
}

/// A successful compilation.
#[derive(Debug)]
pub struct CompileOutput {
    pub output: GeneratedOutput,
    pub sources: SourceMap,
    /// Warnings that did not block compilation
    pub warnings: Vec<Diagnostic>,
}

/// Compile a source file through the full pipeline: parse, resolve
/// includes, check, and generate for the selected target.
pub fn compile_file(path: &Path, config: &CompilerConfig) -> Result<CompileOutput, CompileError> {
    let mut sources = SourceMap::new();
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let file = sources.add(path.to_path_buf());
            return Err(CompileError {
                diagnostics: vec![Diagnostic::error(
                    "resolve.unknown_module",
                    format!("cannot read '{}': {}", path.display(), e),
                    token::Span::new(file, 1, 1),
                )],
                sources,
            });
        }
    };
    compile_text(&source, path, config, sources, true)
}

/// Compile source text attributed to `path`. Includes resolve relative
/// to that path when `resolve_includes` is set; tests compiling inline
/// snippets pass `false`.
pub fn compile_source(
    source: &str,
    path: &Path,
    config: &CompilerConfig,
) -> Result<CompileOutput, CompileError> {
    compile_text(source, path, config, SourceMap::new(), false)
}

fn compile_text(
    source: &str,
    path: &Path,
    config: &CompilerConfig,
    mut sources: SourceMap,
    resolve_includes: bool,
) -> Result<CompileOutput, CompileError> {
    let file = sources.add(path.to_path_buf());

    // Lex + parse (lex diagnostics ride along with the parser's)
    let (program, parse_diags) = Parser::new(source, file).parse();
    let (mut warnings, errors): (Vec<_>, Vec<_>) = parse_diags
        .into_iter()
        .partition(|d| d.severity == Severity::Warning);
    if !errors.is_empty() {
        return Err(CompileError {
            diagnostics: errors,
            sources,
        });
    }

    // Resolve includes
    let program = if resolve_includes {
        let mut resolver = match &config.include_root {
            Some(root) => Resolver::new(Some(root.clone())),
            None => Resolver::from_env(),
        };
        let (merged, resolve_diags) = resolver.resolve(path, program, &mut sources);
        let (resolve_warnings, resolve_errors): (Vec<_>, Vec<_>) = resolve_diags
            .into_iter()
            .partition(|d| d.severity == Severity::Warning);
        warnings.extend(resolve_warnings);
        if !resolve_errors.is_empty() {
            return Err(CompileError {
                diagnostics: resolve_errors,
                sources,
            });
        }
        merged
    } else {
        program
    };

    // Check
    let (sigs, check_diags) = check_program(&program);
    let (check_warnings, check_errors): (Vec<_>, Vec<_>) = check_diags
        .into_iter()
        .partition(|d| d.severity == Severity::Warning);
    warnings.extend(check_warnings);
    if !check_errors.is_empty() {
        return Err(CompileError {
            diagnostics: check_errors,
            sources,
        });
    }

    // Generate
    let target = config.effective_target(program.meta("target")).to_string();
    let backend = match config.backend(&target) {
        Some(b) => b,
        None => {
            return Err(CompileError {
                diagnostics: vec![Diagnostic::error(
                    "codegen.internal",
                    format!("no back end registered for target '{}'", target),
                    token::Span::new(file, 1, 1),
                )],
                sources,
            })
        }
    };
    let metadata = Metadata {
        source_file: path.display().to_string(),
        compiler_version: env!("CARGO_PKG_VERSION").to_string(),
        created_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0),
    };
    match backend.generate(&program, &sigs, metadata) {
        Ok(output) => Ok(CompileOutput {
            output,
            sources,
            warnings,
        }),
        Err(diagnostics) => Err(CompileError {
            diagnostics,
            sources,
        }),
    }
}
