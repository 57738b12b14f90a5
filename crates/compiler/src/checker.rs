//! Symbol and type checker for Droe
//!
//! Two passes per program: the first collects all top-level names (data
//! types, actions, tasks, modules, endpoints, UI fragments), the second
//! visits bodies with a scoped symbol table. Errors accumulate; the
//! checker keeps going after each one so a single run reports as much as
//! possible.

use crate::ast::{
    ActionDef, Annotation, BinOp, Expr, Program, ServeDef, Stmt, TextPart, UiKind, UiNode, UnOp,
};
use crate::diagnostics::Diagnostic;
use crate::token::Span;
use crate::types::{pattern_applies, Ty};
use droe_core::schema::DbOpCode;
use std::collections::HashMap;

/// Name of the implicit module holding top-level actions.
pub const ROOT_MODULE: &str = "main";

/// Synthesized record type backing `call ... into <name>` results.
pub const HTTP_RESPONSE_RECORD: &str = "http_response";

/// A record type collected in pass one.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordInfo {
    pub name: String,
    pub fields: Vec<(String, Ty, Vec<Annotation>)>,
    pub span: Span,
}

impl RecordInfo {
    pub fn field_ty(&self, name: &str) -> Option<&Ty> {
        self.fields
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, t, _)| t)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _, _)| n == name)
    }
}

/// An action signature collected in pass one.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSig {
    pub name: String,
    pub params: Vec<(String, Ty)>,
    pub returns: Option<Ty>,
    pub is_task: bool,
}

/// A module's callable surface.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModuleSig {
    pub name: String,
    pub actions: Vec<ActionSig>,
}

impl ModuleSig {
    pub fn action(&self, name: &str) -> Option<&ActionSig> {
        self.actions.iter().find(|a| a.name == name)
    }
}

/// Everything pass one learns about a program; shared with the emitter
/// so typing decisions are made once.
#[derive(Debug, Clone, Default)]
pub struct Signatures {
    pub records: Vec<RecordInfo>,
    /// Index 0 is always the root module
    pub modules: Vec<ModuleSig>,
    /// Fragment name -> declared slot names
    pub fragments: HashMap<String, Vec<String>>,
    /// One synthesized request record per endpoint, in declaration order
    pub request_records: Vec<String>,
    pub has_http_call: bool,
}

impl Signatures {
    pub fn record(&self, name: &str) -> Option<&RecordInfo> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn record_index(&self, name: &str) -> Option<usize> {
        self.records.iter().position(|r| r.name == name)
    }

    pub fn module(&self, name: &str) -> Option<(usize, &ModuleSig)> {
        self.modules
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name)
    }

    /// Collect top-level names. The returned diagnostics cover duplicate
    /// definitions; unknown references wait for pass two.
    pub fn collect(program: &Program) -> (Signatures, Vec<Diagnostic>) {
        let mut sigs = Signatures::default();
        let mut diagnostics = Vec::new();
        sigs.modules.push(ModuleSig {
            name: ROOT_MODULE.to_string(),
            actions: Vec::new(),
        });
        let mut endpoint_count = 0usize;
        collect_scope(
            program.body.as_slice(),
            0,
            &mut sigs,
            &mut diagnostics,
            &mut endpoint_count,
        );
        if sigs.has_http_call && sigs.record(HTTP_RESPONSE_RECORD).is_none() {
            sigs.records.push(RecordInfo {
                name: HTTP_RESPONSE_RECORD.to_string(),
                fields: vec![
                    ("status".to_string(), Ty::Int, Vec::new()),
                    ("body".to_string(), Ty::Text, Vec::new()),
                ],
                span: Span::default(),
            });
        }
        (sigs, diagnostics)
    }
}

fn collect_scope(
    body: &[Stmt],
    module_index: usize,
    sigs: &mut Signatures,
    diagnostics: &mut Vec<Diagnostic>,
    endpoint_count: &mut usize,
) {
    for stmt in body {
        match stmt {
            Stmt::Module { name, body, span } => {
                if module_index != 0 {
                    diagnostics.push(Diagnostic::error(
                        "resolve.duplicate_definition",
                        format!("module '{}' cannot be nested inside another module", name),
                        *span,
                    ));
                    continue;
                }
                if sigs.modules.iter().any(|m| m.name == *name) {
                    diagnostics.push(Diagnostic::error(
                        "resolve.duplicate_definition",
                        format!("module '{}' is defined more than once", name),
                        *span,
                    ));
                    continue;
                }
                sigs.modules.push(ModuleSig {
                    name: name.clone(),
                    actions: Vec::new(),
                });
                let inner = sigs.modules.len() - 1;
                collect_scope(body, inner, sigs, diagnostics, endpoint_count);
            }
            Stmt::Action(def) => {
                let module = &mut sigs.modules[module_index];
                if module.action(&def.name).is_some() {
                    diagnostics.push(Diagnostic::error(
                        "resolve.duplicate_definition",
                        format!(
                            "action '{}' is defined more than once in module '{}'",
                            def.name, module.name
                        ),
                        def.span,
                    ));
                    continue;
                }
                module.actions.push(ActionSig {
                    name: def.name.clone(),
                    params: def
                        .params
                        .iter()
                        .map(|p| (p.name.clone(), p.ty.clone()))
                        .collect(),
                    returns: def.returns.clone(),
                    is_task: def.is_task,
                });
            }
            Stmt::Data(def) => {
                if sigs.record(&def.name).is_some() {
                    diagnostics.push(Diagnostic::error(
                        "resolve.duplicate_definition",
                        format!("data '{}' is defined more than once", def.name),
                        def.span,
                    ));
                    continue;
                }
                sigs.records.push(RecordInfo {
                    name: def.name.clone(),
                    fields: def
                        .fields
                        .iter()
                        .map(|f| (f.name.clone(), f.ty.clone(), f.annotations.clone()))
                        .collect(),
                    span: def.span,
                });
            }
            Stmt::Serve(def) => {
                let record_name = format!("request${}", *endpoint_count);
                *endpoint_count += 1;
                let mut fields: Vec<(String, Ty, Vec<Annotation>)> = def
                    .path_params
                    .iter()
                    .map(|p| (p.clone(), Ty::Text, Vec::new()))
                    .collect();
                fields.push(("body".to_string(), Ty::Text, Vec::new()));
                sigs.records.push(RecordInfo {
                    name: record_name.clone(),
                    fields,
                    span: def.span,
                });
                sigs.request_records.push(record_name);
                // Handler bodies may issue outbound calls too
                scan_for_http_calls(&def.body, sigs);
            }
            Stmt::Ui(node) => {
                if node.kind == UiKind::Fragment {
                    if let Some(name) = &node.name {
                        let slots = collect_slot_names(node);
                        sigs.fragments.insert(name.clone(), slots);
                    }
                }
            }
            Stmt::HttpCall { .. } => sigs.has_http_call = true,
            Stmt::When { arms, otherwise, .. } => {
                for (_, body) in arms {
                    scan_for_http_calls(body, sigs);
                }
                if let Some(body) = otherwise {
                    scan_for_http_calls(body, sigs);
                }
            }
            Stmt::While { body, .. } | Stmt::ForEach { body, .. } => {
                scan_for_http_calls(body, sigs)
            }
            _ => {}
        }
    }
}

fn scan_for_http_calls(body: &[Stmt], sigs: &mut Signatures) {
    for stmt in body {
        match stmt {
            Stmt::HttpCall { .. } => sigs.has_http_call = true,
            Stmt::When { arms, otherwise, .. } => {
                for (_, b) in arms {
                    scan_for_http_calls(b, sigs);
                }
                if let Some(b) = otherwise {
                    scan_for_http_calls(b, sigs);
                }
            }
            Stmt::While { body, .. } | Stmt::ForEach { body, .. } => {
                scan_for_http_calls(body, sigs)
            }
            Stmt::Action(def) => scan_for_http_calls(&def.body, sigs),
            Stmt::Module { body, .. } => scan_for_http_calls(body, sigs),
            _ => {}
        }
    }
}

fn collect_slot_names(node: &UiNode) -> Vec<String> {
    let mut slots = Vec::new();
    for child in &node.children {
        if child.kind == UiKind::Slot {
            if let Some(name) = &child.name {
                slots.push(name.clone());
            }
        }
        slots.extend(collect_slot_names(child));
    }
    slots
}

/// Where a name lives; the emitter maps these to load/store variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Global,
    Local,
}

/// A lexical scope stack. Globals occupy the outermost scope; each
/// action body and nested block pushes a scope.
#[derive(Debug, Default)]
struct Scopes {
    stack: Vec<HashMap<String, Ty>>,
}

impl Scopes {
    fn push(&mut self) {
        self.stack.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    fn declare(&mut self, name: &str, ty: Ty) {
        if let Some(top) = self.stack.last_mut() {
            top.insert(name.to_string(), ty);
        }
    }

    fn lookup(&self, name: &str) -> Option<&Ty> {
        self.stack.iter().rev().find_map(|scope| scope.get(name))
    }
}

/// What kind of body is being checked; gates `give` and `respond`.
#[derive(Debug, Clone, PartialEq)]
enum BodyKind {
    TopLevel,
    Action { returns: Option<Ty>, is_task: bool },
    Handler,
}

pub struct Checker<'a> {
    sigs: &'a Signatures,
    scopes: Scopes,
    diagnostics: Vec<Diagnostic>,
    /// Index into `sigs.request_records`, advanced per endpoint
    endpoint_cursor: usize,
    /// Module whose body is being checked; unqualified calls resolve
    /// here first, then in the root module
    current_module: usize,
}

/// Run both passes. Returns the collected signatures (for the emitter)
/// and all diagnostics.
pub fn check_program(program: &Program) -> (Signatures, Vec<Diagnostic>) {
    let (sigs, mut diagnostics) = Signatures::collect(program);
    let mut checker = Checker {
        sigs: &sigs,
        scopes: Scopes::default(),
        diagnostics: Vec::new(),
        endpoint_cursor: 0,
        current_module: 0,
    };
    checker.scopes.push(); // global scope
    checker.check_body(&program.body, &BodyKind::TopLevel, true);
    diagnostics.extend(checker.diagnostics);
    (sigs, diagnostics)
}

impl<'a> Checker<'a> {
    fn error(&mut self, kind: &str, message: impl Into<String>, span: Span) {
        self.diagnostics
            .push(Diagnostic::error(kind, message.into(), span));
    }

    /// `decl_ok` is true only in declaration position (a file or module
    /// body); declarations inside control-flow blocks are rejected.
    fn check_body(&mut self, body: &[Stmt], kind: &BodyKind, decl_ok: bool) {
        for stmt in body {
            self.check_stmt(stmt, kind, decl_ok);
        }
    }

    fn decl_position(&mut self, what: &str, name: &str, span: Span, decl_ok: bool) -> bool {
        if decl_ok {
            return true;
        }
        self.error(
            "parse.unexpected_token",
            format!(
                "{} '{}' must be declared at top level or inside a module",
                what, name
            ),
            span,
        );
        false
    }

    fn check_stmt(&mut self, stmt: &Stmt, kind: &BodyKind, decl_ok: bool) {
        match stmt {
            Stmt::Display { expr, .. } => {
                if let Some(ty) = self.type_of(expr) {
                    if matches!(ty, Ty::Record(_)) {
                        self.error(
                            "type.incompatible_assignment",
                            "records cannot be displayed directly; display a field instead",
                            expr.span(),
                        );
                    }
                }
            }
            Stmt::Set {
                name,
                declared,
                value,
                span,
            } => self.check_set(name, declared.as_ref(), value, *span),
            Stmt::When {
                arms, otherwise, ..
            } => {
                for (cond, body) in arms {
                    self.expect_flag(cond);
                    self.scopes.push();
                    self.check_body(body, kind, false);
                    self.scopes.pop();
                }
                if let Some(body) = otherwise {
                    self.scopes.push();
                    self.check_body(body, kind, false);
                    self.scopes.pop();
                }
            }
            Stmt::While { cond, body, .. } => {
                self.expect_flag(cond);
                self.scopes.push();
                self.check_body(body, kind, false);
                self.scopes.pop();
            }
            Stmt::ForEach {
                var,
                iterable,
                body,
                span,
            } => {
                let elem = match self.type_of(iterable) {
                    Some(ty) => match ty.element() {
                        Some(e) => Some(e),
                        None => {
                            self.error(
                                "type.incompatible_assignment",
                                format!("'for each' needs a collection or text, found {}", ty),
                                *span,
                            );
                            None
                        }
                    },
                    None => None,
                };
                self.scopes.push();
                self.scopes.declare(var, elem.unwrap_or(Ty::Text));
                self.check_body(body, kind, false);
                self.scopes.pop();
            }
            Stmt::Action(def) => {
                let what = if def.is_task { "task" } else { "action" };
                if self.decl_position(what, &def.name, def.span, decl_ok) {
                    self.check_action(def);
                }
            }
            Stmt::Give { value, span } => match kind {
                BodyKind::Action { returns, is_task } => {
                    match (returns, value) {
                        (Some(expected), Some(expr)) => {
                            if let Some(actual) = self.type_of(expr) {
                                if !expected.accepts(&actual) {
                                    self.error(
                                        "type.incompatible_assignment",
                                        format!("'give' produces {} but the action gives {}", actual, expected),
                                        *span,
                                    );
                                }
                            }
                        }
                        (Some(expected), None) => self.error(
                            "type.incompatible_assignment",
                            format!("'give' needs a value of type {}", expected),
                            *span,
                        ),
                        (None, Some(_)) if *is_task => self.error(
                            "type.incompatible_assignment",
                            "a task cannot give a value",
                            *span,
                        ),
                        _ => {}
                    }
                }
                _ => self.error(
                    "type.incompatible_assignment",
                    "'give' is only allowed inside an action or task",
                    *span,
                ),
            },
            Stmt::Module { name, body, span } => {
                if !self.decl_position("module", name, *span, decl_ok) {
                    return;
                }
                // Module-level bindings get their own scope, so the same
                // unqualified name is legal in two different modules
                let previous = self.current_module;
                if let Some((index, _)) = self.sigs.module(name) {
                    self.current_module = index;
                }
                self.scopes.push();
                self.check_body(body, &BodyKind::TopLevel, true);
                self.scopes.pop();
                self.current_module = previous;
            }
            Stmt::Data(def) => {
                if self.decl_position("data", &def.name, def.span, decl_ok) {
                    self.check_data(def);
                }
            }
            Stmt::Db {
                op,
                entity,
                fields,
                filter,
                sets,
                into,
                span,
            } => self.check_db(*op, entity, fields, filter.as_ref(), sets, into.as_deref(), *span),
            Stmt::Serve(def) => {
                if self.decl_position("endpoint", &def.path, def.span, decl_ok) {
                    self.check_serve(def);
                }
            }
            Stmt::Respond { status, body, span } => {
                if !matches!(kind, BodyKind::Handler) {
                    self.error(
                        "type.incompatible_assignment",
                        "'respond' is only allowed inside a 'serve' handler",
                        *span,
                    );
                }
                self.expect_type(status, &Ty::Int, "the respond status");
                if let Some(body) = body {
                    self.expect_type(body, &Ty::Text, "the respond body");
                }
            }
            Stmt::HttpCall { call, into, .. } => {
                self.check_expr(call);
                if let Some(name) = into {
                    self.scopes
                        .declare(name, Ty::Record(HTTP_RESPONSE_RECORD.to_string()));
                }
            }
            Stmt::Invoke { call, span } => {
                if let Some(ty) = self.type_of(call) {
                    // An expression statement that silently drops a value
                    // usually means a forgotten `set ... from`
                    self.diagnostics.push(Diagnostic::warning(
                        "type.discarded_value",
                        format!("result of type {} is discarded", ty),
                        *span,
                    ));
                }
            }
            Stmt::Ui(node) => self.check_ui(node, false),
        }
    }

    /// Type a `set` initializer. A bare collection literal adopts the
    /// declared (or existing) collection type, so `[]` can initialize a
    /// `list of int` and `[1, 2]` can initialize a `group of int`.
    fn initializer_ty(&mut self, target: Option<&Ty>, value: &Expr) -> Option<Ty> {
        if let (Some(want), Expr::Collection { elements, .. }) = (target, value) {
            if want.is_collection() {
                let elem = want.element().expect("collections have an element type");
                for element in elements {
                    if let Some(actual) = self.type_of(element) {
                        if !elem.accepts(&actual) {
                            self.error(
                                "type.incompatible_assignment",
                                format!("collection of {} cannot hold {}", elem, actual),
                                element.span(),
                            );
                        }
                    }
                }
                return Some(want.clone());
            }
        }
        self.type_of(value)
    }

    fn check_set(&mut self, name: &str, declared: Option<&Ty>, value: &Expr, span: Span) {
        let existing = self.scopes.lookup(name).cloned();
        let target = declared.or(existing.as_ref());
        let target = target.cloned();
        let value_ty = self.initializer_ty(target.as_ref(), value);
        match existing {
            Some(existing) => {
                // Reassignment: declared annotations are not repeated
                if declared.is_some() {
                    self.error(
                        "type.incompatible_assignment",
                        format!("'{}' is already declared; drop the type annotation", name),
                        span,
                    );
                }
                if let Some(vt) = value_ty {
                    if !existing.accepts(&vt) {
                        self.error(
                            "type.incompatible_assignment",
                            format!("cannot assign {} to '{}' of type {}", vt, name, existing),
                            span,
                        );
                    }
                }
            }
            None => {
                let ty = match (declared, value_ty) {
                    (Some(decl), Some(vt)) => {
                        if !decl.accepts(&vt) {
                            self.error(
                                "type.incompatible_assignment",
                                format!("cannot initialize {} '{}' from {}", decl, name, vt),
                                span,
                            );
                        }
                        decl.clone()
                    }
                    (Some(decl), None) => decl.clone(),
                    (None, Some(vt)) => vt,
                    (None, None) => return,
                };
                if let Ty::Record(record) = &ty {
                    if self.sigs.record(record).is_none() && !record.starts_with("request$") {
                        self.error(
                            "type.unknown_identifier",
                            format!("unknown type '{}'", record),
                            span,
                        );
                    }
                }
                self.scopes.declare(name, ty);
            }
        }
    }

    fn check_action(&mut self, def: &ActionDef) {
        self.scopes.push();
        for param in &def.params {
            self.scopes.declare(&param.name, param.ty.clone());
        }
        let kind = BodyKind::Action {
            returns: def.returns.clone(),
            is_task: def.is_task,
        };
        self.check_body(&def.body, &kind, false);
        // A value-returning action must end every path in `give`; the
        // simple rule used here is that at least one `give` exists.
        if def.returns.is_some() && !body_has_give(&def.body) {
            self.error(
                "type.incompatible_assignment",
                format!("action '{}' gives {} but has no 'give'", def.name, def.returns.as_ref().expect("checked")),
                def.span,
            );
        }
        self.scopes.pop();
    }

    fn check_data(&mut self, def: &crate::ast::DataDef) {
        let mut seen = std::collections::HashSet::new();
        for field in &def.fields {
            if !seen.insert(&field.name) {
                self.error(
                    "resolve.duplicate_definition",
                    format!("field '{}' appears twice in data '{}'", field.name, def.name),
                    field.span,
                );
            }
            if let Ty::Record(name) = &field.ty {
                if self.sigs.record(name).is_none() {
                    self.error(
                        "type.unknown_identifier",
                        format!("unknown type '{}' for field '{}'", name, field.name),
                        field.span,
                    );
                }
            }
            for annotation in &field.annotations {
                if let Annotation::Default(expr) = annotation {
                    if let Some(ty) = self.type_of(expr) {
                        if !field.ty.accepts(&ty) {
                            self.error(
                                "type.incompatible_assignment",
                                format!(
                                    "default for '{}' is {} but the field is {}",
                                    field.name, ty, field.ty
                                ),
                                field.span,
                            );
                        }
                    }
                }
            }
        }
    }

    fn check_db(
        &mut self,
        op: DbOpCode,
        entity: &str,
        fields: &[(String, Expr)],
        filter: Option<&(String, Expr)>,
        sets: &[(String, Expr)],
        into: Option<&str>,
        span: Span,
    ) {
        let record = match self.sigs.record(entity) {
            Some(r) => r.clone(),
            None => {
                self.error(
                    "type.unknown_identifier",
                    format!("unknown data type '{}'", entity),
                    span,
                );
                return;
            }
        };
        for (field, expr) in fields.iter().chain(sets.iter()) {
            match record.field_ty(field) {
                Some(expected) => {
                    if let Some(actual) = self.type_of(expr) {
                        if !expected.accepts(&actual) {
                            self.error(
                                "type.incompatible_assignment",
                                format!(
                                    "field '{}' of '{}' is {} but the value is {}",
                                    field, entity, expected, actual
                                ),
                                expr.span(),
                            );
                        }
                    }
                }
                None => self.error(
                    "type.unknown_identifier",
                    format!("'{}' has no field '{}'", entity, field),
                    expr.span(),
                ),
            }
        }
        if let Some((field, expr)) = filter {
            if record.field_ty(field).is_none() {
                self.error(
                    "type.unknown_identifier",
                    format!("'{}' has no field '{}'", entity, field),
                    span,
                );
            }
            self.check_expr(expr);
        }
        if let Some(name) = into {
            let ty = match op {
                DbOpCode::Find | DbOpCode::Create => Ty::Record(entity.to_string()),
                DbOpCode::FindAll => Ty::ListOf(Box::new(Ty::Record(entity.to_string()))),
                DbOpCode::Update | DbOpCode::Delete => Ty::Int,
            };
            self.scopes.declare(name, ty);
        }
    }

    fn check_serve(&mut self, def: &ServeDef) {
        let record_name = self
            .sigs
            .request_records
            .get(self.endpoint_cursor)
            .cloned()
            .unwrap_or_else(|| "request$0".to_string());
        self.endpoint_cursor += 1;

        self.scopes.push();
        self.scopes.declare("request", Ty::Record(record_name));
        // Path parameters are also visible unqualified
        for param in &def.path_params {
            self.scopes.declare(param, Ty::Text);
        }
        self.check_body(&def.body, &BodyKind::Handler, false);
        self.scopes.pop();
    }

    fn check_ui(&mut self, node: &UiNode, inside_block: bool) {
        match node.kind {
            UiKind::Screen | UiKind::Layout => {
                for child in &node.children {
                    self.check_ui(child, true);
                }
            }
            UiKind::Fragment => {
                if inside_block {
                    // Instantiation inside a screen: the fragment must be
                    // declared, and filled slots must exist on it.
                    let name = node.name.clone().unwrap_or_default();
                    match self.sigs.fragments.get(&name) {
                        Some(slots) => {
                            let slots = slots.clone();
                            for child in &node.children {
                                if child.kind == UiKind::Slot {
                                    let slot =
                                        child.name.clone().unwrap_or_default();
                                    if !slots.contains(&slot) {
                                        self.error(
                                            "type.unknown_identifier",
                                            format!(
                                                "fragment '{}' has no slot '{}'",
                                                name, slot
                                            ),
                                            child.span,
                                        );
                                    }
                                }
                                self.check_ui(child, true);
                            }
                        }
                        None => self.error(
                            "type.unknown_identifier",
                            format!("unknown fragment '{}'", name),
                            node.span,
                        ),
                    }
                } else {
                    for child in &node.children {
                        self.check_ui(child, true);
                    }
                }
            }
            UiKind::Slot => {
                for child in &node.children {
                    self.check_ui(child, true);
                }
            }
            UiKind::Title | UiKind::Text | UiKind::Button => {
                if let Some(value) = &node.value {
                    self.expect_type(value, &Ty::Text, node.kind.as_str());
                }
            }
            UiKind::Input => {}
        }
    }

    // =====================================================================
    // Expressions
    // =====================================================================

    /// Check an expression for errors, discarding the type.
    fn check_expr(&mut self, expr: &Expr) {
        let _ = self.type_of(expr);
    }

    fn expect_flag(&mut self, expr: &Expr) {
        self.expect_type(expr, &Ty::Flag, "the condition");
    }

    fn expect_type(&mut self, expr: &Expr, expected: &Ty, what: &str) {
        if let Some(actual) = self.type_of(expr) {
            if !expected.accepts(&actual) {
                self.error(
                    "type.incompatible_assignment",
                    format!("{} must be {}, found {}", what, expected, actual),
                    expr.span(),
                );
            }
        }
    }

    /// Type an expression, recording diagnostics for anything unsound.
    /// `None` means the type could not be established (an error was
    /// already reported).
    fn type_of(&mut self, expr: &Expr) -> Option<Ty> {
        match expr {
            Expr::IntLit { .. } => Some(Ty::Int),
            Expr::DecimalLit { .. } => Some(Ty::Decimal),
            Expr::FlagLit { .. } => Some(Ty::Flag),
            Expr::TextLit { parts, .. } => {
                for part in parts {
                    if let TextPart::Expr(inner) = part {
                        if let Some(ty) = self.type_of(inner) {
                            if matches!(ty, Ty::Record(_)) {
                                self.error(
                                    "type.incompatible_assignment",
                                    "records have no display rule; interpolate a field instead",
                                    inner.span(),
                                );
                            }
                        }
                    }
                }
                Some(Ty::Text)
            }
            Expr::Ident { name, span } => match self.scopes.lookup(name) {
                Some(ty) => Some(ty.clone()),
                None => {
                    self.error(
                        "type.unknown_identifier",
                        format!("unknown identifier '{}'", name),
                        *span,
                    );
                    None
                }
            },
            Expr::Property {
                object,
                field,
                span,
            } => {
                let obj_ty = self.type_of(object)?;
                match &obj_ty {
                    Ty::Record(record_name) => {
                        match self.sigs.record(record_name).and_then(|r| r.field_ty(field)) {
                            Some(ty) => Some(ty.clone()),
                            None => {
                                self.error(
                                    "type.unknown_identifier",
                                    format!("'{}' has no field '{}'", record_name, field),
                                    *span,
                                );
                                None
                            }
                        }
                    }
                    other => {
                        self.error(
                            "type.incompatible_assignment",
                            format!("{} has no fields", other),
                            *span,
                        );
                        None
                    }
                }
            }
            Expr::Binary { op, lhs, rhs, span } => {
                let lt = self.type_of(lhs)?;
                let rt = self.type_of(rhs)?;
                self.binary_type(*op, &lt, &rt, *span)
            }
            Expr::Unary { op, operand, span } => {
                let ty = self.type_of(operand)?;
                match op {
                    UnOp::Neg => {
                        if ty.is_numeric() {
                            Some(ty)
                        } else {
                            self.error(
                                "type.incompatible_assignment",
                                format!("'minus' needs a numeric operand, found {}", ty),
                                *span,
                            );
                            None
                        }
                    }
                    UnOp::Not => {
                        if ty == Ty::Flag {
                            Some(Ty::Flag)
                        } else {
                            self.error(
                                "type.incompatible_assignment",
                                format!("'not' needs a flag operand, found {}", ty),
                                *span,
                            );
                            None
                        }
                    }
                    UnOp::IsEmpty | UnOp::IsNotEmpty => {
                        if ty.is_collection() || ty == Ty::Text {
                            Some(Ty::Flag)
                        } else {
                            self.error(
                                "type.incompatible_assignment",
                                format!("'is empty' applies to collections and text, found {}", ty),
                                *span,
                            );
                            None
                        }
                    }
                }
            }
            Expr::Collection { elements, span } => {
                let mut elem_ty: Option<Ty> = None;
                for element in elements {
                    if let Some(ty) = self.type_of(element) {
                        match &elem_ty {
                            None => elem_ty = Some(ty),
                            Some(existing) if *existing == ty => {}
                            Some(existing) => {
                                self.error(
                                    "type.incompatible_assignment",
                                    format!(
                                        "collection elements must share one type; found {} and {}",
                                        existing, ty
                                    ),
                                    *span,
                                );
                                return None;
                            }
                        }
                    }
                }
                Some(Ty::ListOf(Box::new(elem_ty.unwrap_or(Ty::Text))))
            }
            Expr::FormatExpr {
                operand,
                pattern,
                span,
            } => {
                let ty = self.type_of(operand)?;
                if !pattern_applies(&ty, pattern) {
                    self.error(
                        "type.bad_format_pattern",
                        format!("pattern \"{}\" does not apply to {}", pattern, ty),
                        *span,
                    );
                }
                Some(Ty::Text)
            }
            Expr::Invoke {
                module,
                action,
                args,
                span,
            } => {
                let sig = match module {
                    Some(module_name) => match self.sigs.module(module_name) {
                        Some((_, m)) => m.action(action).cloned(),
                        None => {
                            self.error(
                                "resolve.unknown_module",
                                format!("unknown module '{}'", module_name),
                                *span,
                            );
                            return None;
                        }
                    },
                    // Unqualified: enclosing module first, then root
                    None => self.sigs.modules[self.current_module]
                        .action(action)
                        .or_else(|| self.sigs.modules[0].action(action))
                        .cloned(),
                };
                let sig = match sig {
                    Some(s) => s,
                    None => {
                        let scope = module.as_deref().unwrap_or(ROOT_MODULE);
                        self.error(
                            "type.unknown_identifier",
                            format!("module '{}' has no action '{}'", scope, action),
                            *span,
                        );
                        return None;
                    }
                };
                if args.len() != sig.params.len() {
                    self.error(
                        "type.arity_mismatch",
                        format!(
                            "'{}' takes {} argument(s) but {} were given",
                            action,
                            sig.params.len(),
                            args.len()
                        ),
                        *span,
                    );
                    return sig.returns.clone();
                }
                for (arg, (pname, pty)) in args.iter().zip(&sig.params) {
                    if let Some(at) = self.type_of(arg) {
                        if !pty.accepts(&at) {
                            self.error(
                                "type.incompatible_assignment",
                                format!(
                                    "argument '{}' of '{}' is {} but the value is {}",
                                    pname, action, pty, at
                                ),
                                arg.span(),
                            );
                        }
                    }
                }
                sig.returns.clone()
            }
            Expr::HttpCall {
                url, body, headers, ..
            } => {
                self.expect_type(url, &Ty::Text, "the call target");
                if let Some(body) = body {
                    self.expect_type(body, &Ty::Text, "the call body");
                }
                for (_, value) in headers {
                    self.expect_type(value, &Ty::Text, "the header value");
                }
                Some(Ty::Record(HTTP_RESPONSE_RECORD.to_string()))
            }
        }
    }

    /// Result type of a binary operation; reports the error and returns
    /// `None` when the operands do not fit the operator.
    fn binary_type(&mut self, op: BinOp, lhs: &Ty, rhs: &Ty, span: Span) -> Option<Ty> {
        match op {
            BinOp::And | BinOp::Or => {
                if *lhs == Ty::Flag && *rhs == Ty::Flag {
                    Some(Ty::Flag)
                } else {
                    self.error(
                        "type.incompatible_assignment",
                        format!("'{}' needs flag operands, found {} and {}", op.as_str(), lhs, rhs),
                        span,
                    );
                    None
                }
            }
            BinOp::Eq | BinOp::Ne => {
                if lhs == rhs
                    || (lhs.is_numeric() && rhs.is_numeric())
                    || lhs.accepts(rhs)
                    || rhs.accepts(lhs)
                {
                    Some(Ty::Flag)
                } else {
                    self.error(
                        "type.incompatible_assignment",
                        format!("cannot compare {} with {}", lhs, rhs),
                        span,
                    );
                    None
                }
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                if lhs.is_numeric() && rhs.is_numeric() {
                    Some(Ty::Flag)
                } else {
                    self.error(
                        "type.incompatible_assignment",
                        format!(
                            "'{}' needs numeric operands, found {} and {}",
                            op.as_str(),
                            lhs,
                            rhs
                        ),
                        span,
                    );
                    None
                }
            }
            BinOp::Add if *lhs == Ty::Text && *rhs == Ty::Text => Some(Ty::Text),
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                if lhs.is_numeric() && rhs.is_numeric() {
                    // Mixed int/decimal promotes to decimal
                    if *lhs == Ty::Decimal || *rhs == Ty::Decimal {
                        Some(Ty::Decimal)
                    } else {
                        Some(Ty::Int)
                    }
                } else {
                    self.error(
                        "type.incompatible_assignment",
                        format!(
                            "'{}' needs numeric operands, found {} and {}",
                            op.as_str(),
                            lhs,
                            rhs
                        ),
                        span,
                    );
                    None
                }
            }
        }
    }
}

fn body_has_give(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| match stmt {
        Stmt::Give { value: Some(_), .. } => true,
        Stmt::When { arms, otherwise, .. } => {
            arms.iter().any(|(_, b)| body_has_give(b))
                || otherwise.as_ref().map(|b| body_has_give(b)).unwrap_or(false)
        }
        Stmt::While { body, .. } | Stmt::ForEach { body, .. } => body_has_give(body),
        _ => false,
    })
}
