//! Back-end capability interface
//!
//! A back end turns a checked program into either a bytecode artifact or
//! text for another ecosystem. The bytecode back end is the privileged
//! implementation here; alternative text generators plug in through the
//! same trait and share the AST.

use crate::ast::Program;
use crate::checker::Signatures;
use crate::diagnostics::Diagnostic;
use crate::emitter::emit_program;
use droe_core::{Artifact, Metadata};

/// What a back end produces.
#[derive(Debug)]
pub enum GeneratedOutput {
    Artifact(Artifact),
    Text(String),
}

pub trait Backend {
    /// Target name used for selection (`--target <name>` or `@target`).
    fn name(&self) -> &str;

    /// Lower a checked program.
    fn generate(
        &self,
        program: &Program,
        sigs: &Signatures,
        metadata: Metadata,
    ) -> Result<GeneratedOutput, Vec<Diagnostic>>;

    /// Extension for generated files, without the dot.
    fn file_extension(&self) -> &str;

    /// Support libraries a host must link for this target.
    fn runtime_libs(&self) -> &[&str];
}

/// The bytecode back end: emits the artifact the VM executes.
pub struct BytecodeBackend;

impl Backend for BytecodeBackend {
    fn name(&self) -> &str {
        "bytecode"
    }

    fn generate(
        &self,
        program: &Program,
        sigs: &Signatures,
        metadata: Metadata,
    ) -> Result<GeneratedOutput, Vec<Diagnostic>> {
        emit_program(program, sigs, metadata).map(GeneratedOutput::Artifact)
    }

    fn file_extension(&self) -> &str {
        "drbc"
    }

    fn runtime_libs(&self) -> &[&str] {
        &["droe-runtime"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::check_program;
    use crate::parser::Parser;
    use crate::token::FileId;

    #[test]
    fn test_bytecode_backend_generates_artifact() {
        let (program, _) = Parser::new("display \"hi\"\n", FileId(0)).parse();
        let (sigs, diags) = check_program(&program);
        assert!(diags.is_empty());
        let output = BytecodeBackend
            .generate(
                &program,
                &sigs,
                Metadata {
                    source_file: "t.droe".to_string(),
                    compiler_version: "test".to_string(),
                    created_at: 0,
                },
            )
            .expect("generation failed");
        match output {
            GeneratedOutput::Artifact(artifact) => {
                assert!(!artifact.instructions.is_empty());
            }
            GeneratedOutput::Text(_) => panic!("expected an artifact"),
        }
    }

    #[test]
    fn test_backend_surface() {
        assert_eq!(BytecodeBackend.name(), "bytecode");
        assert_eq!(BytecodeBackend.file_extension(), "drbc");
        assert_eq!(BytecodeBackend.runtime_libs(), &["droe-runtime"]);
    }
}
