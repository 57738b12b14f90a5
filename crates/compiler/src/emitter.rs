//! Bytecode emitter for Droe
//!
//! Lowers a checked program to the shared instruction set plus a constant
//! pool and the artifact tables. The layout of the emitted stream:
//!
//! 1. A registration prologue (`DefineData`, `DefineEndpoint`) so the
//!    host can read the registries after `Vm::init`.
//! 2. The top-level program body, ending in `Halt`.
//! 3. Action bodies, each `EnterFrame ... LeaveFrame/Return`.
//! 4. Endpoint handler bodies, each ending in `EndHandler`.
//!
//! Jump targets are absolute instruction indices, patched after the
//! target position is known. `codegen.*` diagnostics never fire on a
//! type-checked program; any occurrence is a compiler bug surfaced as an
//! internal error.

use crate::ast::{
    ActionDef, BinOp, Expr, Program, ServeDef, Stmt, TextPart, UiNode, UnOp,
};
use crate::checker::{ActionSig, Signatures, HTTP_RESPONSE_RECORD};
use crate::diagnostics::Diagnostic;
use crate::token::Span;
use crate::types::Ty;
use droe_core::constant::Constant;
use droe_core::instruction::{HostFn, Instruction};
use droe_core::schema::{
    ActionEntry, DbOpCode, EndpointEntry, FieldAnnotation, FieldSchema, ModuleEntry, ParamEntry,
    RecordSchema, TypeTag,
};
use droe_core::{Artifact, Metadata};
use std::collections::HashMap;

/// Schema name for the opaque records UI trees compile into.
pub const UI_ELEMENT_RECORD: &str = "ui_element";

/// Where a resolved variable lives.
#[derive(Debug, Clone)]
struct Var {
    slot: u16,
    ty: Ty,
    is_global: bool,
}

/// Per-frame emission state for action and handler bodies.
struct FrameCtx {
    next_local: u16,
}

pub struct Emitter<'a> {
    sigs: &'a Signatures,
    constants: Vec<Constant>,
    instructions: Vec<Instruction>,
    schemas: Vec<RecordSchema>,
    modules: Vec<ModuleEntry>,
    endpoints: Vec<EndpointEntry>,
    scopes: Vec<HashMap<String, Var>>,
    frame: Option<FrameCtx>,
    next_global: u16,
    current_module: usize,
    /// Deferred bodies: (module index, action definition)
    pending_actions: Vec<(usize, ActionDef)>,
    /// Deferred handlers: (endpoint index, definition)
    pending_handlers: Vec<(usize, ServeDef)>,
    endpoint_cursor: usize,
    ui_counter: usize,
    diagnostics: Vec<Diagnostic>,
}

/// Lower a checked program into an artifact.
pub fn emit_program(
    program: &Program,
    sigs: &Signatures,
    metadata: Metadata,
) -> Result<Artifact, Vec<Diagnostic>> {
    let mut emitter = Emitter::new(sigs);
    emitter.run(program);
    if emitter.diagnostics.is_empty() {
        Ok(Artifact {
            metadata,
            constants: emitter.constants,
            record_schemas: emitter.schemas,
            modules: emitter.modules,
            endpoints: emitter.endpoints,
            instructions: emitter.instructions,
        })
    } else {
        Err(emitter.diagnostics)
    }
}

impl<'a> Emitter<'a> {
    fn new(sigs: &'a Signatures) -> Self {
        Emitter {
            sigs,
            constants: Vec::new(),
            instructions: Vec::new(),
            schemas: Vec::new(),
            modules: Vec::new(),
            endpoints: Vec::new(),
            scopes: vec![HashMap::new()],
            frame: None,
            next_global: 0,
            current_module: 0,
            pending_actions: Vec::new(),
            pending_handlers: Vec::new(),
            endpoint_cursor: 0,
            ui_counter: 0,
            diagnostics: Vec::new(),
        }
    }

    fn run(&mut self, program: &Program) {
        self.build_schemas(program);
        self.build_module_table();
        self.collect_endpoints(program);

        // Registration prologue
        for index in 0..self.schemas.len() {
            self.emit(Instruction::DefineData(index as u16));
        }
        for index in 0..self.endpoints.len() {
            self.emit(Instruction::DefineEndpoint(index as u16));
        }

        // Main program flow
        self.emit_body(&program.body);
        self.emit(Instruction::Halt);

        // Deferred action bodies
        let pending = std::mem::take(&mut self.pending_actions);
        for (module_index, def) in &pending {
            self.emit_action_body(*module_index, def);
        }

        // Deferred endpoint handlers
        let handlers = std::mem::take(&mut self.pending_handlers);
        for (endpoint_index, def) in &handlers {
            self.emit_handler_body(*endpoint_index, def);
        }
    }

    // =====================================================================
    // Tables
    // =====================================================================

    fn build_schemas(&mut self, program: &Program) {
        for record in &self.sigs.records {
            let fields = record
                .fields
                .iter()
                .map(|(name, ty, annotations)| FieldSchema {
                    name: name.clone(),
                    ty: ty.to_tag(),
                    annotations: annotations
                        .iter()
                        .map(|a| match a {
                            crate::ast::Annotation::Key => FieldAnnotation::Key,
                            crate::ast::Annotation::Auto => FieldAnnotation::Auto,
                            crate::ast::Annotation::Required => FieldAnnotation::Required,
                            crate::ast::Annotation::Optional => FieldAnnotation::Optional,
                            crate::ast::Annotation::Unique => FieldAnnotation::Unique,
                            crate::ast::Annotation::Default(expr) => {
                                FieldAnnotation::Default(render_literal(expr))
                            }
                        })
                        .collect(),
                })
                .collect();
            self.schemas.push(RecordSchema {
                name: record.name.clone(),
                fields,
            });
        }
        if program_has_ui(&program.body) {
            self.schemas.push(RecordSchema {
                name: UI_ELEMENT_RECORD.to_string(),
                fields: vec![
                    FieldSchema {
                        name: "kind".to_string(),
                        ty: TypeTag::Text,
                        annotations: vec![],
                    },
                    FieldSchema {
                        name: "name".to_string(),
                        ty: TypeTag::Text,
                        annotations: vec![],
                    },
                    FieldSchema {
                        name: "value".to_string(),
                        ty: TypeTag::Text,
                        annotations: vec![],
                    },
                    FieldSchema {
                        name: "children".to_string(),
                        ty: TypeTag::ListOf(Box::new(TypeTag::Record(
                            UI_ELEMENT_RECORD.to_string(),
                        ))),
                        annotations: vec![],
                    },
                ],
            });
        }
    }

    fn build_module_table(&mut self) {
        for module in &self.sigs.modules {
            self.modules.push(ModuleEntry {
                name: module.name.clone(),
                actions: module
                    .actions
                    .iter()
                    .map(|a| ActionEntry {
                        name: a.name.clone(),
                        params: a
                            .params
                            .iter()
                            .map(|(n, t)| ParamEntry {
                                name: n.clone(),
                                ty: t.to_tag(),
                            })
                            .collect(),
                        returns: a.returns.as_ref().map(|t| t.to_tag()),
                        entry: 0,
                        locals: 0,
                    })
                    .collect(),
            });
        }
    }

    fn collect_endpoints(&mut self, program: &Program) {
        fn walk(body: &[Stmt], endpoints: &mut Vec<EndpointEntry>) {
            for stmt in body {
                match stmt {
                    Stmt::Serve(def) => endpoints.push(EndpointEntry {
                        method: def.method,
                        path_template: def.path.clone(),
                        path_params: def.path_params.clone(),
                        handler_entry: 0,
                    }),
                    Stmt::Module { body, .. } => walk(body, endpoints),
                    _ => {}
                }
            }
        }
        walk(&program.body, &mut self.endpoints);
    }

    // =====================================================================
    // Statements
    // =====================================================================

    fn emit_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.emit_stmt(stmt);
        }
    }

    fn emit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Display { expr, .. } => {
                self.emit_expr(expr, None);
                self.emit(Instruction::Display);
            }
            Stmt::Set {
                name,
                declared,
                value,
                span,
            } => self.emit_set(name, declared.as_ref(), value, *span),
            Stmt::When {
                arms, otherwise, ..
            } => {
                let mut exits = Vec::new();
                for (cond, body) in arms {
                    self.emit_expr(cond, None);
                    let skip = self.emit(Instruction::JumpIfFalse(0));
                    self.push_scope();
                    self.emit_body(body);
                    self.pop_scope();
                    exits.push(self.emit(Instruction::Jump(0)));
                    self.patch(skip, self.next_index());
                }
                if let Some(body) = otherwise {
                    self.push_scope();
                    self.emit_body(body);
                    self.pop_scope();
                }
                let end = self.next_index();
                for exit in exits {
                    self.patch(exit, end);
                }
            }
            Stmt::While { cond, body, .. } => {
                let head = self.next_index();
                self.emit_expr(cond, None);
                let exit = self.emit(Instruction::JumpIfFalse(0));
                self.push_scope();
                self.emit_body(body);
                self.pop_scope();
                self.emit(Instruction::Jump(head));
                self.patch(exit, self.next_index());
            }
            Stmt::ForEach {
                var,
                iterable,
                body,
                span,
            } => {
                let elem = self
                    .ty_of(iterable)
                    .element()
                    .unwrap_or(Ty::Text);
                self.emit_expr(iterable, None);
                self.emit(Instruction::IterBegin);
                let head = self.next_index();
                let next = self.emit(Instruction::IterNext(0));
                self.push_scope();
                let slot = self.declare(var, elem, *span);
                self.emit_store(&slot);
                self.emit_body(body);
                self.pop_scope();
                self.emit(Instruction::Jump(head));
                self.patch(next, self.next_index());
            }
            Stmt::Action(def) => {
                self.pending_actions.push((self.current_module, def.clone()));
            }
            Stmt::Give { value, span: _ } => {
                if let Some(value) = value {
                    self.emit_expr(value, None);
                }
                self.emit(Instruction::LeaveFrame);
                self.emit(Instruction::Return);
            }
            Stmt::Module { name, body, .. } => {
                let previous = self.current_module;
                if let Some((index, _)) = self.sigs.module(name) {
                    self.current_module = index;
                }
                self.push_scope();
                self.emit_body(body);
                self.pop_scope();
                self.current_module = previous;
            }
            Stmt::Data(_) => {
                // Schemas are registered in the prologue; no body code
            }
            Stmt::Db {
                op,
                entity,
                fields,
                filter,
                sets,
                into,
                span,
            } => self.emit_db(*op, entity, fields, filter.as_ref(), sets, into.as_deref(), *span),
            Stmt::Serve(def) => {
                let endpoint_index = self.endpoint_cursor;
                self.endpoint_cursor += 1;
                self.pending_handlers.push((endpoint_index, def.clone()));
            }
            Stmt::Respond { status, body, .. } => {
                self.emit_expr(status, None);
                match body {
                    Some(body) => {
                        self.emit_expr(body, None);
                    }
                    None => {
                        let empty = self.intern(Constant::Text(String::new()));
                        self.emit(Instruction::PushConst(empty));
                    }
                }
                self.emit(Instruction::HostCall {
                    func: HostFn::Respond,
                    args: 2,
                });
            }
            Stmt::HttpCall { call, into, span } => {
                self.emit_expr(call, None);
                match into {
                    Some(name) => {
                        let var = self.declare_or_lookup(
                            name,
                            Ty::Record(HTTP_RESPONSE_RECORD.to_string()),
                            *span,
                        );
                        self.emit_store(&var);
                    }
                    None => {
                        self.emit(Instruction::Pop);
                    }
                }
            }
            Stmt::Invoke { call, .. } => {
                self.emit_expr(call, None);
                // Task calls push nothing; any other result is discarded
                if self.invoke_pushes_value(call) {
                    self.emit(Instruction::Pop);
                }
            }
            Stmt::Ui(node) => self.emit_ui_root(node),
        }
    }

    fn invoke_pushes_value(&self, call: &Expr) -> bool {
        match call {
            Expr::Invoke { module, action, .. } => self
                .resolve_action(module.as_deref(), action)
                .map(|(_, _, sig)| sig.returns.is_some())
                .unwrap_or(false),
            _ => true,
        }
    }

    fn emit_set(&mut self, name: &str, declared: Option<&Ty>, value: &Expr, span: Span) {
        match self.lookup(name) {
            Some(var) => {
                let want = var.ty.clone();
                self.emit_expr(value, Some(&want));
                self.emit_store(&var);
            }
            None => {
                let ty = declared
                    .cloned()
                    .unwrap_or_else(|| self.ty_of(value));
                self.emit_expr(value, Some(&ty));
                let var = self.declare(name, ty, span);
                self.emit_store(&var);
            }
        }
    }

    fn emit_db(
        &mut self,
        op: DbOpCode,
        entity: &str,
        fields: &[(String, Expr)],
        filter: Option<&(String, Expr)>,
        sets: &[(String, Expr)],
        into: Option<&str>,
        span: Span,
    ) {
        let schema_index = match self.schemas.iter().position(|s| s.name == entity) {
            Some(i) => i as u16,
            None => {
                self.internal(format!("db entity '{}' missing from schema table", entity), span);
                return;
            }
        };
        let mut preds = 0u8;
        if let Some((field, value)) = filter {
            let name_const = self.intern(Constant::Text(field.clone()));
            self.emit(Instruction::PushConst(name_const));
            self.emit_expr(value, None);
            preds += 1;
        }
        // `update` writes its `set` pairs, everything else its `with` pairs
        let pairs = if op == DbOpCode::Update { sets } else { fields };
        for (field, value) in pairs {
            let name_const = self.intern(Constant::Text(field.clone()));
            self.emit(Instruction::PushConst(name_const));
            self.emit_expr(value, None);
        }
        self.emit(Instruction::DatabaseOp {
            op,
            entity: schema_index,
            preds,
            fields: pairs.len() as u8,
        });
        match into {
            Some(name) => {
                let ty = match op {
                    DbOpCode::Find | DbOpCode::Create => Ty::Record(entity.to_string()),
                    DbOpCode::FindAll => Ty::ListOf(Box::new(Ty::Record(entity.to_string()))),
                    DbOpCode::Update | DbOpCode::Delete => Ty::Int,
                };
                let var = self.declare_or_lookup(name, ty, span);
                self.emit_store(&var);
            }
            None => {
                self.emit(Instruction::Pop);
            }
        }
    }

    // =====================================================================
    // Deferred bodies
    // =====================================================================

    fn emit_action_body(&mut self, module_index: usize, def: &ActionDef) {
        let entry = self.next_index();
        let enter = self.emit(Instruction::EnterFrame(0));

        let previous_module = self.current_module;
        self.current_module = module_index;
        self.push_scope();
        self.frame = Some(FrameCtx { next_local: 0 });

        // Parameters occupy slots 0..n-1; `Call` fills them
        for param in &def.params {
            self.declare(&param.name, param.ty.clone(), param.span);
        }
        self.emit_body(&def.body);
        // Fall-through return for tasks and paths without `give`
        self.emit(Instruction::LeaveFrame);
        self.emit(Instruction::Return);

        let locals = self.frame.as_ref().map(|f| f.next_local).unwrap_or(0);
        self.frame = None;
        self.pop_scope();
        self.current_module = previous_module;

        self.instructions[enter] = Instruction::EnterFrame(locals);
        if let Some(action_index) = self.modules[module_index]
            .actions
            .iter()
            .position(|a| a.name == def.name)
        {
            let action = &mut self.modules[module_index].actions[action_index];
            action.entry = entry as u32;
            action.locals = locals;
        } else {
            self.internal(
                format!("action '{}' missing from module table", def.name),
                def.span,
            );
        }
    }

    fn emit_handler_body(&mut self, endpoint_index: usize, def: &ServeDef) {
        if endpoint_index >= self.endpoints.len() {
            self.internal(
                format!("endpoint {} missing from endpoint table", endpoint_index),
                def.span,
            );
            return;
        }
        let entry = self.next_index();
        let enter = self.emit(Instruction::EnterFrame(0));

        self.push_scope();
        self.frame = Some(FrameCtx { next_local: 0 });

        // Slot 0 holds the implicit request record
        let request_record = self
            .sigs
            .request_records
            .get(endpoint_index)
            .cloned()
            .unwrap_or_else(|| "request$0".to_string());
        let request = self.declare(
            "request",
            Ty::Record(request_record.clone()),
            def.span,
        );
        debug_assert_eq!(request.slot, 0);

        // Path parameters are bound from the request record into their
        // own locals so handlers can use them unqualified
        for param in &def.path_params {
            let var = self.declare(param, Ty::Text, def.span);
            self.emit(Instruction::LoadLocal(0));
            let field_index = self
                .schemas
                .iter()
                .find(|s| s.name == request_record)
                .and_then(|s| s.field_index(param))
                .unwrap_or(0);
            self.emit(Instruction::GetField(field_index as u16));
            self.emit_store(&var);
        }

        self.emit_body(&def.body);
        self.emit(Instruction::EndHandler);

        let locals = self.frame.as_ref().map(|f| f.next_local).unwrap_or(0);
        self.frame = None;
        self.pop_scope();

        self.instructions[enter] = Instruction::EnterFrame(locals);
        self.endpoints[endpoint_index].handler_entry = entry as u32;
    }

    // =====================================================================
    // UI lowering: opaque record trees stored in globals
    // =====================================================================

    fn emit_ui_root(&mut self, node: &UiNode) {
        self.emit_ui_node(node);
        let global_name = match &node.name {
            Some(name) => format!("ui${}", name),
            None => {
                let n = self.ui_counter;
                self.ui_counter += 1;
                format!("ui$layout${}", n)
            }
        };
        let var = self.declare_or_lookup(
            &global_name,
            Ty::Record(UI_ELEMENT_RECORD.to_string()),
            node.span,
        );
        self.emit_store(&var);
    }

    fn emit_ui_node(&mut self, node: &UiNode) {
        let schema_index = match self
            .schemas
            .iter()
            .position(|s| s.name == UI_ELEMENT_RECORD)
        {
            Some(i) => i as u16,
            None => {
                self.internal("ui schema missing from schema table", node.span);
                return;
            }
        };
        let kind = self.intern(Constant::Text(node.kind.as_str().to_string()));
        self.emit(Instruction::PushConst(kind));
        let name = self.intern(Constant::Text(node.name.clone().unwrap_or_default()));
        self.emit(Instruction::PushConst(name));
        match &node.value {
            Some(value) => {
                self.emit_expr(value, None);
            }
            None => {
                let empty = self.intern(Constant::Text(String::new()));
                self.emit(Instruction::PushConst(empty));
            }
        }
        for child in &node.children {
            self.emit_ui_node(child);
        }
        self.emit(Instruction::MakeList(node.children.len() as u16));
        self.emit(Instruction::MakeRecord {
            schema: schema_index,
            fields: 4,
        });
    }

    // =====================================================================
    // Expressions
    // =====================================================================

    /// Emit an expression; `want` guides collection construction (list
    /// vs. group). Returns the type left on the stack.
    fn emit_expr(&mut self, expr: &Expr, want: Option<&Ty>) -> Ty {
        match expr {
            Expr::IntLit { value, .. } => {
                let index = self.intern(Constant::Int(*value));
                self.emit(Instruction::PushConst(index));
                Ty::Int
            }
            Expr::DecimalLit { value, .. } => {
                let index = self.intern(Constant::Decimal(*value));
                self.emit(Instruction::PushConst(index));
                Ty::Decimal
            }
            Expr::FlagLit { value, .. } => {
                let index = self.intern(Constant::Flag(*value));
                self.emit(Instruction::PushConst(index));
                Ty::Flag
            }
            Expr::TextLit { parts, span } => {
                match parts.as_slice() {
                    [TextPart::Lit(text)] => {
                        let index = self.intern(Constant::Text(text.clone()));
                        self.emit(Instruction::PushConst(index));
                    }
                    parts => {
                        for part in parts {
                            match part {
                                TextPart::Lit(text) => {
                                    let index = self.intern(Constant::Text(text.clone()));
                                    self.emit(Instruction::PushConst(index));
                                }
                                TextPart::Expr(inner) => {
                                    self.emit_expr(inner, None);
                                }
                            }
                        }
                        if parts.len() > u16::MAX as usize {
                            self.internal("interpolation is too long", *span);
                        }
                        self.emit(Instruction::Interp(parts.len() as u16));
                    }
                }
                Ty::Text
            }
            Expr::Ident { name, span } => match self.lookup(name) {
                Some(var) => {
                    self.emit_load(&var);
                    var.ty
                }
                None => {
                    self.internal(format!("unresolved identifier '{}'", name), *span);
                    Ty::Text
                }
            },
            Expr::Property {
                object,
                field,
                span,
            } => {
                let obj_ty = self.emit_expr(object, None);
                match &obj_ty {
                    Ty::Record(record) => {
                        let field_info = self
                            .schemas
                            .iter()
                            .find(|s| s.name == *record)
                            .and_then(|s| {
                                s.field_index(field).map(|i| (i, s.fields[i].ty.clone()))
                            });
                        match field_info {
                            Some((index, tag)) => {
                                self.emit(Instruction::GetField(index as u16));
                                Ty::from_tag(&tag)
                            }
                            None => {
                                self.internal(
                                    format!("unresolved field '{}.{}'", record, field),
                                    *span,
                                );
                                Ty::Text
                            }
                        }
                    }
                    other => {
                        self.internal(format!("field access on {}", other), *span);
                        Ty::Text
                    }
                }
            }
            Expr::Binary { op, lhs, rhs, span } => self.emit_binary(*op, lhs, rhs, *span),
            Expr::Unary { op, operand, .. } => match op {
                UnOp::Neg => {
                    let ty = self.emit_expr(operand, None);
                    self.emit(Instruction::Neg);
                    ty
                }
                UnOp::Not => {
                    self.emit_expr(operand, None);
                    self.emit(Instruction::Not);
                    Ty::Flag
                }
                UnOp::IsEmpty | UnOp::IsNotEmpty => {
                    let ty = self.emit_expr(operand, None);
                    match ty {
                        Ty::GroupOf(_) => self.emit(Instruction::MakeGroup(0)),
                        Ty::ListOf(_) => self.emit(Instruction::MakeList(0)),
                        _ => {
                            let empty = self.intern(Constant::Text(String::new()));
                            self.emit(Instruction::PushConst(empty))
                        }
                    };
                    self.emit(Instruction::Eq);
                    if *op == UnOp::IsNotEmpty {
                        self.emit(Instruction::Not);
                    }
                    Ty::Flag
                }
            },
            Expr::Collection { elements, .. } => {
                let elem_want = want.and_then(|t| t.element());
                let mut elem_ty = elem_want.clone();
                for element in elements {
                    let ty = self.emit_expr(element, elem_want.as_ref());
                    elem_ty.get_or_insert(ty);
                }
                let count = elements.len() as u16;
                match want {
                    Some(Ty::GroupOf(_)) => {
                        self.emit(Instruction::MakeGroup(count));
                        Ty::GroupOf(Box::new(elem_ty.unwrap_or(Ty::Text)))
                    }
                    _ => {
                        self.emit(Instruction::MakeList(count));
                        Ty::ListOf(Box::new(elem_ty.unwrap_or(Ty::Text)))
                    }
                }
            }
            Expr::FormatExpr {
                operand, pattern, ..
            } => {
                self.emit_expr(operand, None);
                let index = self.intern(Constant::Pattern(pattern.clone()));
                self.emit(Instruction::Format(index));
                Ty::Text
            }
            Expr::Invoke {
                module,
                action,
                args,
                span,
            } => {
                match self.resolve_action(module.as_deref(), action) {
                    Some((module_index, action_index, sig)) => {
                        let params: Vec<Ty> =
                            sig.params.iter().map(|(_, t)| t.clone()).collect();
                        let returns = sig.returns.clone();
                        for (arg, pty) in args.iter().zip(params.iter()) {
                            self.emit_expr(arg, Some(pty));
                        }
                        self.emit(Instruction::Call {
                            module: module_index as u16,
                            action: action_index as u16,
                            args: args.len() as u8,
                        });
                        returns.unwrap_or(Ty::Flag)
                    }
                    None => {
                        self.internal(format!("unresolved action '{}'", action), *span);
                        Ty::Text
                    }
                }
            }
            Expr::HttpCall {
                url,
                method,
                body,
                headers,
                ..
            } => {
                self.emit_expr(url, None);
                let method_const =
                    self.intern(Constant::Text(method.as_str().to_string()));
                self.emit(Instruction::PushConst(method_const));
                match body {
                    Some(body) => {
                        self.emit_expr(body, None);
                    }
                    None => {
                        let empty = self.intern(Constant::Text(String::new()));
                        self.emit(Instruction::PushConst(empty));
                    }
                }
                for (name, value) in headers {
                    let name_const = self.intern(Constant::Text(name.clone()));
                    self.emit(Instruction::PushConst(name_const));
                    self.emit_expr(value, None);
                }
                self.emit(Instruction::MakeList((headers.len() * 2) as u16));
                self.emit(Instruction::HostCall {
                    func: HostFn::HttpRequest,
                    args: 4,
                });
                Ty::Record(HTTP_RESPONSE_RECORD.to_string())
            }
        }
    }

    fn emit_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, span: Span) -> Ty {
        // Short-circuit logic leaves exactly one flag on the stack
        match op {
            BinOp::And => {
                self.emit_expr(lhs, None);
                self.emit(Instruction::Dup);
                let short = self.emit(Instruction::JumpIfFalse(0));
                self.emit(Instruction::Pop);
                self.emit_expr(rhs, None);
                self.patch(short, self.next_index());
                return Ty::Flag;
            }
            BinOp::Or => {
                self.emit_expr(lhs, None);
                self.emit(Instruction::Dup);
                let short = self.emit(Instruction::JumpIfTrue(0));
                self.emit(Instruction::Pop);
                self.emit_expr(rhs, None);
                self.patch(short, self.next_index());
                return Ty::Flag;
            }
            _ => {}
        }

        let lt = self.ty_of(lhs);
        let rt = self.ty_of(rhs);

        // Text concatenation uses `plus`
        if op == BinOp::Add && lt == Ty::Text && rt == Ty::Text {
            self.emit_expr(lhs, None);
            self.emit_expr(rhs, None);
            self.emit(Instruction::Concat);
            return Ty::Text;
        }

        // Mixed int/decimal promotes to decimal: the emitter selects the
        // `D` variants and the VM scales the int operand by 100.
        let decimal = lt == Ty::Decimal || rt == Ty::Decimal;
        self.emit_expr(lhs, None);
        self.emit_expr(rhs, None);

        match op {
            BinOp::Eq => {
                self.emit(Instruction::Eq);
                Ty::Flag
            }
            BinOp::Ne => {
                self.emit(Instruction::Ne);
                Ty::Flag
            }
            BinOp::Lt => {
                self.emit(Instruction::Lt);
                Ty::Flag
            }
            BinOp::Le => {
                self.emit(Instruction::Le);
                Ty::Flag
            }
            BinOp::Gt => {
                self.emit(Instruction::Gt);
                Ty::Flag
            }
            BinOp::Ge => {
                self.emit(Instruction::Ge);
                Ty::Flag
            }
            BinOp::Add => {
                self.emit(if decimal { Instruction::AddD } else { Instruction::AddI });
                if decimal { Ty::Decimal } else { Ty::Int }
            }
            BinOp::Sub => {
                self.emit(if decimal { Instruction::SubD } else { Instruction::SubI });
                if decimal { Ty::Decimal } else { Ty::Int }
            }
            BinOp::Mul => {
                self.emit(if decimal { Instruction::MulD } else { Instruction::MulI });
                if decimal { Ty::Decimal } else { Ty::Int }
            }
            BinOp::Div => {
                self.emit(if decimal { Instruction::DivD } else { Instruction::DivI });
                if decimal { Ty::Decimal } else { Ty::Int }
            }
            BinOp::And | BinOp::Or => {
                self.internal("logic handled above", span);
                Ty::Flag
            }
        }
    }

    /// Pure type computation mirroring the checker's rules. The program
    /// is already checked, so failures here are internal errors reported
    /// at emission sites.
    fn ty_of(&self, expr: &Expr) -> Ty {
        match expr {
            Expr::IntLit { .. } => Ty::Int,
            Expr::DecimalLit { .. } => Ty::Decimal,
            Expr::FlagLit { .. } => Ty::Flag,
            Expr::TextLit { .. } => Ty::Text,
            Expr::Ident { name, .. } => self
                .lookup(name)
                .map(|v| v.ty)
                .unwrap_or(Ty::Text),
            Expr::Property { object, field, .. } => {
                if let Ty::Record(record) = self.ty_of(object) {
                    self.schemas
                        .iter()
                        .find(|s| s.name == record)
                        .and_then(|s| s.field_index(field).map(|i| s.fields[i].ty.clone()))
                        .map(|tag| Ty::from_tag(&tag))
                        .unwrap_or(Ty::Text)
                } else {
                    Ty::Text
                }
            }
            Expr::Binary { op, lhs, rhs, .. } => match op {
                BinOp::And | BinOp::Or => Ty::Flag,
                op if op.is_comparison() => Ty::Flag,
                BinOp::Add if self.ty_of(lhs) == Ty::Text => Ty::Text,
                _ => {
                    if self.ty_of(lhs) == Ty::Decimal || self.ty_of(rhs) == Ty::Decimal {
                        Ty::Decimal
                    } else {
                        Ty::Int
                    }
                }
            },
            Expr::Unary { op, operand, .. } => match op {
                UnOp::Neg => self.ty_of(operand),
                _ => Ty::Flag,
            },
            Expr::Collection { elements, .. } => Ty::ListOf(Box::new(
                elements
                    .first()
                    .map(|e| self.ty_of(e))
                    .unwrap_or(Ty::Text),
            )),
            Expr::FormatExpr { .. } => Ty::Text,
            Expr::Invoke { module, action, .. } => self
                .resolve_action(module.as_deref(), action)
                .and_then(|(_, _, sig)| sig.returns)
                .unwrap_or(Ty::Flag),
            Expr::HttpCall { .. } => Ty::Record(HTTP_RESPONSE_RECORD.to_string()),
        }
    }

    fn resolve_action(
        &self,
        module: Option<&str>,
        action: &str,
    ) -> Option<(usize, usize, ActionSig)> {
        match module {
            Some(name) => {
                let (index, sig) = self.sigs.module(name)?;
                let action_index = sig.actions.iter().position(|a| a.name == action)?;
                Some((index, action_index, sig.actions[action_index].clone()))
            }
            None => {
                let current = &self.sigs.modules[self.current_module];
                if let Some(i) = current.actions.iter().position(|a| a.name == action) {
                    return Some((self.current_module, i, current.actions[i].clone()));
                }
                let root = &self.sigs.modules[0];
                let i = root.actions.iter().position(|a| a.name == action)?;
                Some((0, i, root.actions[i].clone()))
            }
        }
    }

    // =====================================================================
    // Scope and slot bookkeeping
    // =====================================================================

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn lookup(&self, name: &str) -> Option<Var> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
    }

    fn declare(&mut self, name: &str, ty: Ty, _span: Span) -> Var {
        let var = match &mut self.frame {
            Some(frame) => {
                let slot = frame.next_local;
                frame.next_local += 1;
                Var {
                    slot,
                    ty,
                    is_global: false,
                }
            }
            None => {
                let slot = self.next_global;
                self.next_global += 1;
                Var {
                    slot,
                    ty,
                    is_global: true,
                }
            }
        };
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), var.clone());
        }
        var
    }

    fn declare_or_lookup(&mut self, name: &str, ty: Ty, span: Span) -> Var {
        match self.lookup(name) {
            Some(var) => var,
            None => self.declare(name, ty, span),
        }
    }

    fn emit_load(&mut self, var: &Var) {
        self.emit(if var.is_global {
            Instruction::LoadGlobal(var.slot)
        } else {
            Instruction::LoadLocal(var.slot)
        });
    }

    fn emit_store(&mut self, var: &Var) {
        self.emit(if var.is_global {
            Instruction::StoreGlobal(var.slot)
        } else {
            Instruction::StoreLocal(var.slot)
        });
    }

    // =====================================================================
    // Instruction plumbing
    // =====================================================================

    fn emit(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    fn next_index(&self) -> u32 {
        self.instructions.len() as u32
    }

    fn patch(&mut self, at: usize, target: u32) {
        if !self.instructions[at].is_jump() {
            let description = format!("{:?}", self.instructions[at]);
            self.internal(
                format!("patch target {} is not a jump: {}", at, description),
                Span::default(),
            );
            return;
        }
        match &mut self.instructions[at] {
            Instruction::Jump(t)
            | Instruction::JumpIfFalse(t)
            | Instruction::JumpIfTrue(t)
            | Instruction::IterNext(t) => *t = target,
            _ => unreachable!("is_jump covers every jump variant"),
        }
    }

    fn intern(&mut self, constant: Constant) -> u32 {
        if let Some(index) = self.constants.iter().position(|c| *c == constant) {
            return index as u32;
        }
        self.constants.push(constant);
        (self.constants.len() - 1) as u32
    }

    fn internal(&mut self, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::error(
            "codegen.internal",
            format!("internal: {}", message.into()),
            span,
        ));
    }
}

fn program_has_ui(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| match stmt {
        Stmt::Ui(_) => true,
        Stmt::Module { body, .. } => program_has_ui(body),
        _ => false,
    })
}

/// Render a literal default value to its text form for the schema table.
fn render_literal(expr: &Expr) -> String {
    match expr {
        Expr::IntLit { value, .. } => value.to_string(),
        Expr::DecimalLit { value, .. } => droe_core::constant::decimal_to_string(*value),
        Expr::FlagLit { value, .. } => value.to_string(),
        Expr::TextLit { parts, .. } => parts
            .iter()
            .map(|p| match p {
                TextPart::Lit(s) => s.clone(),
                TextPart::Expr(_) => String::new(),
            })
            .collect(),
        _ => String::new(),
    }
}
