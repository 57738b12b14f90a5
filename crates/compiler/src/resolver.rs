//! Include resolver for Droe
//!
//! Resolves `@include <Name> from "<path>"` declarations, loads and
//! parses included files, and grafts their contents into the root
//! program as module nodes.
//!
//! - Paths resolve relative to the including file, or under `DROE_HOME`
//!   when that is set.
//! - Files are included at most once (canonical-path dedupe).
//! - Cycles are detected with the active include stack, reported once,
//!   and broken.

use crate::ast::{Program, Stmt};
use crate::diagnostics::{Diagnostic, SourceMap};
use crate::parser::Parser;
use crate::token::Span;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub struct Resolver {
    /// Canonical paths already included (prevents double-include)
    included: HashSet<PathBuf>,
    /// Active include stack for cycle detection
    stack: Vec<PathBuf>,
    /// Include search root (`DROE_HOME`), if configured
    home: Option<PathBuf>,
}

impl Resolver {
    pub fn new(home: Option<PathBuf>) -> Self {
        Resolver {
            included: HashSet::new(),
            stack: Vec::new(),
            home,
        }
    }

    /// Build a resolver honoring the `DROE_HOME` environment variable.
    pub fn from_env() -> Self {
        let home = std::env::var("DROE_HOME")
            .ok()
            .map(PathBuf::from)
            .filter(|p| p.is_dir());
        Resolver::new(home)
    }

    /// Expand all includes of an already-parsed root program. Returns
    /// the merged program plus any diagnostics; include failures do not
    /// abort resolution of sibling includes.
    pub fn resolve(
        &mut self,
        source_path: &Path,
        program: Program,
        sources: &mut SourceMap,
    ) -> (Program, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        if let Ok(canonical) = source_path.canonicalize() {
            self.included.insert(canonical.clone());
            self.stack.push(canonical);
        }
        let merged = self.resolve_into(source_path, program, sources, &mut diagnostics);
        self.stack.pop();
        (merged, diagnostics)
    }

    fn resolve_into(
        &mut self,
        source_path: &Path,
        mut program: Program,
        sources: &mut SourceMap,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Program {
        let source_dir = source_path.parent().unwrap_or(Path::new("."));
        let includes = std::mem::take(&mut program.includes);
        for include in includes {
            let path = match self.locate(&include.path, source_dir) {
                Some(p) => p,
                None => {
                    diagnostics.push(Diagnostic::error(
                        "resolve.unknown_module",
                        format!(
                            "include '{}' not found (looked for '{}.droe' next to the including file{})",
                            include.name,
                            include.path,
                            if self.home.is_some() {
                                " and under DROE_HOME"
                            } else {
                                ""
                            }
                        ),
                        include.span,
                    ));
                    continue;
                }
            };

            let canonical = match path.canonicalize() {
                Ok(c) => c,
                Err(e) => {
                    diagnostics.push(Diagnostic::error(
                        "resolve.unknown_module",
                        format!("cannot resolve include '{}': {}", include.path, e),
                        include.span,
                    ));
                    continue;
                }
            };

            // A file on the active stack means the includes form a cycle;
            // report once and break the cycle by skipping it.
            if self.stack.contains(&canonical) {
                diagnostics.push(Diagnostic::error(
                    "resolve.include_cycle",
                    format!("include cycle through '{}'", include.name),
                    include.span,
                ));
                continue;
            }
            // Diamond includes are fine: only the first occurrence loads.
            if self.included.contains(&canonical) {
                continue;
            }
            self.included.insert(canonical.clone());

            let text = match std::fs::read_to_string(&path) {
                Ok(t) => t,
                Err(e) => {
                    diagnostics.push(Diagnostic::error(
                        "resolve.unknown_module",
                        format!("cannot read '{}': {}", path.display(), e),
                        include.span,
                    ));
                    continue;
                }
            };

            let file = sources.add(canonical.clone());
            let (included, mut parse_diags) = Parser::new(&text, file).parse();
            diagnostics.append(&mut parse_diags);

            self.stack.push(canonical);
            let included = self.resolve_into(&path, included, sources, diagnostics);
            self.stack.pop();

            program
                .body
                .push(graft_as_module(&include.name, included, include.span));
        }
        program
    }

    /// Locate `<path>.droe` relative to the including file, falling back
    /// to the `DROE_HOME` search root.
    fn locate(&self, rel: &str, source_dir: &Path) -> Option<PathBuf> {
        let file_name = format!("{}.droe", rel);
        let local = source_dir.join(&file_name);
        if local.is_file() {
            return Some(local);
        }
        if let Some(home) = &self.home {
            let under_home = home.join(&file_name);
            if under_home.is_file() {
                return Some(under_home);
            }
        }
        None
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new(None)
    }
}

/// Graft an included file into the root program. A file whose body is a
/// single module with the expected name lands as-is; anything else is
/// wrapped in a module named by the include declaration.
fn graft_as_module(name: &str, included: Program, span: Span) -> Stmt {
    if included.body.len() == 1 {
        if let Stmt::Module {
            name: module_name, ..
        } = &included.body[0]
        {
            if module_name == name {
                return included.body.into_iter().next().expect("len checked");
            }
        }
    }
    Stmt::Module {
        name: name.to_string(),
        body: included.body,
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::has_errors;
    use crate::token::FileId;
    use std::fs;
    use tempfile::tempdir;

    fn parse_root(source: &str, sources: &mut SourceMap, path: &Path) -> Program {
        let file = sources.add(path.to_path_buf());
        assert_eq!(file, FileId(0));
        let (program, diags) = Parser::new(source, file).parse();
        assert!(!has_errors(&diags), "parse errors: {:?}", diags);
        program
    }

    #[test]
    fn test_include_grafts_module() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("utils.droe"),
            "module Utils\n  action identity with n which is int gives int\n    give n\n  end action\nend module\n",
        )
        .unwrap();
        let main_path = dir.path().join("main.droe");
        fs::write(&main_path, "@include Utils from \"utils\"\nset x to 1\n").unwrap();

        let mut sources = SourceMap::new();
        let program = parse_root(
            &fs::read_to_string(&main_path).unwrap(),
            &mut sources,
            &main_path,
        );
        let mut resolver = Resolver::new(None);
        let (merged, diags) = resolver.resolve(&main_path, program, &mut sources);

        assert!(!has_errors(&diags), "diags: {:?}", diags);
        assert!(merged.includes.is_empty());
        assert!(merged
            .body
            .iter()
            .any(|s| matches!(s, Stmt::Module { name, .. } if name == "Utils")));
    }

    #[test]
    fn test_plain_file_wrapped_in_module() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("helpers.droe"),
            "action triple with n which is int gives int\n  give n times 3\nend action\n",
        )
        .unwrap();
        let main_path = dir.path().join("main.droe");
        fs::write(&main_path, "@include Helpers from \"helpers\"\n").unwrap();

        let mut sources = SourceMap::new();
        let program = parse_root(
            &fs::read_to_string(&main_path).unwrap(),
            &mut sources,
            &main_path,
        );
        let mut resolver = Resolver::new(None);
        let (merged, diags) = resolver.resolve(&main_path, program, &mut sources);

        assert!(!has_errors(&diags));
        match &merged.body[0] {
            Stmt::Module { name, body, .. } => {
                assert_eq!(name, "Helpers");
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected wrapped module, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_include_reported() {
        let dir = tempdir().unwrap();
        let main_path = dir.path().join("main.droe");
        fs::write(&main_path, "@include Nope from \"missing\"\n").unwrap();

        let mut sources = SourceMap::new();
        let program = parse_root(
            &fs::read_to_string(&main_path).unwrap(),
            &mut sources,
            &main_path,
        );
        let mut resolver = Resolver::new(None);
        let (_, diags) = resolver.resolve(&main_path, program, &mut sources);
        assert!(diags.iter().any(|d| d.kind == "resolve.unknown_module"));
    }

    #[test]
    fn test_include_cycle_reported_once() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("a.droe"),
            "@include B from \"b\"\nset a to 1\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("b.droe"),
            "@include A from \"a\"\nset b to 2\n",
        )
        .unwrap();
        let a_path = dir.path().join("a.droe");

        let mut sources = SourceMap::new();
        let program = parse_root(
            &fs::read_to_string(&a_path).unwrap(),
            &mut sources,
            &a_path,
        );
        let mut resolver = Resolver::new(None);
        let (_, diags) = resolver.resolve(&a_path, program, &mut sources);
        let cycles: Vec<_> = diags
            .iter()
            .filter(|d| d.kind == "resolve.include_cycle")
            .collect();
        assert_eq!(cycles.len(), 1, "cycle reported exactly once: {:?}", diags);
    }

    #[test]
    fn test_diamond_include_loads_once() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("shared.droe"), "set shared to 1\n").unwrap();
        fs::write(
            dir.path().join("left.droe"),
            "@include Shared from \"shared\"\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("right.droe"),
            "@include Shared from \"shared\"\n",
        )
        .unwrap();
        let main_path = dir.path().join("main.droe");
        fs::write(
            &main_path,
            "@include Left from \"left\"\n@include Right from \"right\"\n",
        )
        .unwrap();

        let mut sources = SourceMap::new();
        let program = parse_root(
            &fs::read_to_string(&main_path).unwrap(),
            &mut sources,
            &main_path,
        );
        let mut resolver = Resolver::new(None);
        let (merged, diags) = resolver.resolve(&main_path, program, &mut sources);
        assert!(!has_errors(&diags), "diags: {:?}", diags);

        fn count_modules(body: &[Stmt], name: &str) -> usize {
            body.iter()
                .map(|s| match s {
                    Stmt::Module {
                        name: n, body: b, ..
                    } => (if n == name { 1 } else { 0 }) + count_modules(b, name),
                    _ => 0,
                })
                .sum()
        }
        assert_eq!(count_modules(&merged.body, "Shared"), 1);
    }

    #[test]
    #[serial_test::serial]
    fn test_droe_home_search_root() {
        let home = tempdir().unwrap();
        fs::write(home.path().join("stdlib.droe"), "set lib to 1\n").unwrap();
        let dir = tempdir().unwrap();
        let main_path = dir.path().join("main.droe");
        fs::write(&main_path, "@include Stdlib from \"stdlib\"\n").unwrap();

        let mut sources = SourceMap::new();
        let program = parse_root(
            &fs::read_to_string(&main_path).unwrap(),
            &mut sources,
            &main_path,
        );
        let mut resolver = Resolver::new(Some(home.path().to_path_buf()));
        let (merged, diags) = resolver.resolve(&main_path, program, &mut sources);
        assert!(!has_errors(&diags), "diags: {:?}", diags);
        assert!(matches!(&merged.body[0], Stmt::Module { name, .. } if name == "Stdlib"));
    }
}
