//! Compilation context
//!
//! An explicit configuration value threaded through parse -> resolve ->
//! check -> emit; there is no global target state. Back ends register
//! into the context at construction, and target selection picks one by
//! name at compile time.

use crate::backend::{Backend, BytecodeBackend};
use std::path::PathBuf;

/// Name of the default (privileged) back end.
pub const DEFAULT_TARGET: &str = "bytecode";

pub struct CompilerConfig {
    /// Include search root; overrides `DROE_HOME` when set
    pub include_root: Option<PathBuf>,
    /// Selected back end; `None` defers to the program's `@target`
    /// metadata, then to the default
    pub target: Option<String>,
    backends: Vec<Box<dyn Backend>>,
}

impl CompilerConfig {
    /// A context with the bytecode back end registered.
    pub fn new() -> Self {
        CompilerConfig {
            include_root: None,
            target: None,
            backends: vec![Box::new(BytecodeBackend)],
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_include_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.include_root = Some(root.into());
        self
    }

    /// Register an additional back end. A back end with an existing name
    /// replaces the earlier registration.
    pub fn with_backend(mut self, backend: Box<dyn Backend>) -> Self {
        self.backends.retain(|b| b.name() != backend.name());
        self.backends.push(backend);
        self
    }

    pub fn backend(&self, name: &str) -> Option<&dyn Backend> {
        self.backends
            .iter()
            .find(|b| b.name() == name)
            .map(|b| b.as_ref())
    }

    /// Resolve the effective target: explicit config, then the program's
    /// `@target` metadata, then the default.
    pub fn effective_target<'a>(&'a self, program_target: Option<&'a str>) -> &'a str {
        self.target
            .as_deref()
            .or(program_target)
            .unwrap_or(DEFAULT_TARGET)
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_bytecode_backend() {
        let config = CompilerConfig::new();
        assert!(config.backend("bytecode").is_some());
        assert!(config.backend("html").is_none());
    }

    #[test]
    fn test_target_resolution_order() {
        let config = CompilerConfig::new();
        assert_eq!(config.effective_target(None), "bytecode");
        assert_eq!(config.effective_target(Some("html")), "html");
        let config = config.with_target("bytecode");
        assert_eq!(config.effective_target(Some("html")), "bytecode");
    }
}
