//! The Droe virtual machine
//!
//! A stack interpreter over the shared instruction set: one operand
//! stack, a frame stack for action and handler calls, a global store,
//! and the endpoint/data registries populated by the `Define*` prologue.
//!
//! # Numeric semantics
//!
//! Integer arithmetic is checked; overflow past 32 bits raises
//! `runtime.overflow` rather than wrapping. The decimal variants work on
//! the scaled (x100) representation and keep its invariant: `a * b`
//! computes `round(a*b / 100)` and `a / b` computes `round(a*100 / b)`.
//! An int operand reaching a decimal instruction is the compiler's
//! mixed-type promotion; it is scaled by 100 on entry.
//!
//! # Cancellation
//!
//! The host may set the cancel token between any two instructions. The
//! dispatch loop checks it per instruction, drops the frame stack, and
//! reports a cancelled status; `db_op` is never issued after the flag is
//! seen, so no partial writes are committed.

use crate::error::{ErrorKind, ExitStatus, RuntimeError};
use crate::format::apply_pattern;
use crate::host::{DbResult, Host};
use crate::registry::match_endpoint;
use crate::value::Value;
use droe_core::instruction::{HostFn, Instruction};
use droe_core::schema::{EndpointEntry, HttpMethod, RecordSchema};
use droe_core::Artifact;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Outcome of an endpoint invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResponse {
    Response { status: i32, body: String },
    Cancelled,
}

/// Status and body a handler falls through to when it never responds.
const NO_CONTENT: (i32, String) = (204, String::new());

struct Frame {
    /// Return address; `usize::MAX` marks the synthetic frame an
    /// invocation starts with
    ret: usize,
    locals: Vec<Value>,
}

struct IterState {
    items: Vec<Value>,
    pos: usize,
}

enum Outcome {
    Halted,
    HandlerDone,
    /// The synthetic invoke frame returned
    Finished,
    Cancelled,
}

pub struct Vm {
    artifact: Artifact,
    globals: Vec<Value>,
    registered_data: Vec<u16>,
    registered_endpoints: Vec<u16>,
    cancel: Arc<AtomicBool>,
}

impl Vm {
    pub fn new(artifact: Artifact) -> Self {
        Vm {
            artifact,
            globals: Vec::new(),
            registered_data: Vec::new(),
            registered_endpoints: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Token the host may set from another thread to request a
    /// cooperative stop.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Registered data models, readable without locking once `init`
    /// returns.
    pub fn data_models(&self) -> Vec<&RecordSchema> {
        self.registered_data
            .iter()
            .filter_map(|&i| self.artifact.record_schemas.get(i as usize))
            .collect()
    }

    /// Registered endpoints, readable without locking once `init`
    /// returns.
    pub fn endpoints(&self) -> Vec<&EndpointEntry> {
        self.registered_endpoints
            .iter()
            .filter_map(|&i| self.artifact.endpoints.get(i as usize))
            .collect()
    }

    /// Run the program from the top: the registration prologue, then the
    /// main body through `Halt`.
    pub fn init(&mut self, host: &mut dyn Host) -> Result<ExitStatus, RuntimeError> {
        debug!(
            instructions = self.artifact.instructions.len(),
            "vm init"
        );
        match self.execute(0, None, host) {
            Ok((Outcome::Cancelled, _)) => Ok(ExitStatus::Cancelled),
            Ok(_) => Ok(ExitStatus::Halted),
            Err(e) => {
                host.fail(e.kind.as_str(), &e.message, e.at);
                Err(e)
            }
        }
    }

    /// Invoke an endpoint handler with a prepared request record.
    pub fn invoke(
        &mut self,
        handler_entry: u32,
        request: Value,
        host: &mut dyn Host,
    ) -> Result<HandlerResponse, RuntimeError> {
        let frame = Frame {
            ret: usize::MAX,
            locals: vec![request],
        };
        match self.execute(handler_entry as usize, Some(frame), host) {
            Ok((Outcome::Cancelled, _)) => Ok(HandlerResponse::Cancelled),
            Ok((_, response)) => {
                let (status, body) = response.unwrap_or(NO_CONTENT);
                Ok(HandlerResponse::Response { status, body })
            }
            Err(e) => {
                host.fail(e.kind.as_str(), &e.message, e.at);
                Err(e)
            }
        }
    }

    /// Match a request against the endpoint registry, bind path
    /// parameters and body into the request record, and run the handler.
    pub fn invoke_path(
        &mut self,
        method: HttpMethod,
        path: &str,
        body: &str,
        host: &mut dyn Host,
    ) -> Result<HandlerResponse, RuntimeError> {
        let endpoints = self.endpoints();
        let matched = match match_endpoint(
            &endpoints.iter().map(|e| (*e).clone()).collect::<Vec<_>>(),
            method,
            path,
        ) {
            Some(m) => (m.index, m.params),
            None => {
                return Err(RuntimeError::new(
                    ErrorKind::UnknownEndpoint,
                    format!("no endpoint matches {} {}", method, path),
                    0,
                ))
            }
        };
        let (endpoint_index, params) = matched;
        let entry = self.registered_endpoints[endpoint_index];
        let handler_entry = self.artifact.endpoints[entry as usize].handler_entry;
        let request = self.build_request(entry as usize, &params, body)?;
        self.invoke(handler_entry, request, host)
    }

    /// Build the implicit request record for an endpoint: path params in
    /// schema order, then the body.
    fn build_request(
        &self,
        endpoint_index: usize,
        params: &[(String, String)],
        body: &str,
    ) -> Result<Value, RuntimeError> {
        let schema_name = format!("request${}", endpoint_index);
        let schema_index = self
            .artifact
            .record_schemas
            .iter()
            .position(|s| s.name == schema_name)
            .ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::HostError,
                    format!("request schema '{}' missing from artifact", schema_name),
                    0,
                )
            })?;
        let schema = &self.artifact.record_schemas[schema_index];
        let fields = schema
            .fields
            .iter()
            .map(|field| {
                if field.name == "body" {
                    Value::text(body)
                } else {
                    params
                        .iter()
                        .find(|(name, _)| *name == field.name)
                        .map(|(_, value)| Value::text(value.clone()))
                        .unwrap_or_else(|| Value::text(""))
                }
            })
            .collect();
        Ok(Value::Record {
            schema: schema_index as u16,
            fields: Arc::new(fields),
        })
    }

    // =====================================================================
    // Dispatch loop
    // =====================================================================

    fn execute(
        &mut self,
        start: usize,
        initial_frame: Option<Frame>,
        host: &mut dyn Host,
    ) -> Result<(Outcome, Option<(i32, String)>), RuntimeError> {
        let mut pc = start;
        let mut stack: Vec<Value> = Vec::new();
        let mut frames: Vec<Frame> = initial_frame.into_iter().collect();
        let mut iters: Vec<IterState> = Vec::new();
        let mut response: Option<(i32, String)> = None;

        // `at` names the faulting instruction at each expansion site
        macro_rules! err {
            ($at:expr, $kind:expr, $($arg:tt)*) => {
                return Err(RuntimeError::new($kind, format!($($arg)*), $at))
            };
        }

        loop {
            if self.cancel.load(Ordering::Relaxed) {
                // Drop the frame stack; nothing partial is committed
                frames.clear();
                return Ok((Outcome::Cancelled, response));
            }
            let at = pc;
            let instruction = match self.artifact.instructions.get(pc) {
                Some(i) => i.clone(),
                None => err!(at, ErrorKind::HostError, "program counter {} out of range", pc),
            };
            pc += 1;

            match instruction {
                Instruction::PushConst(index) => {
                    let constant = self
                        .artifact
                        .constants
                        .get(index as usize)
                        .ok_or_else(|| {
                            RuntimeError::new(
                                ErrorKind::HostError,
                                format!("constant {} out of range", index),
                                at,
                            )
                        })?;
                    stack.push(Value::from_constant(constant));
                }
                Instruction::Pop => {
                    pop(&mut stack, at)?;
                }
                Instruction::Dup => {
                    let top = peek(&stack, at)?.clone();
                    stack.push(top);
                }

                Instruction::LoadLocal(slot) => {
                    let frame = current_frame(&frames, at)?;
                    let value = frame.locals.get(slot as usize).cloned().ok_or_else(|| {
                        RuntimeError::new(
                            ErrorKind::HostError,
                            format!("local slot {} out of range", slot),
                            at,
                        )
                    })?;
                    stack.push(value);
                }
                Instruction::StoreLocal(slot) => {
                    let value = pop(&mut stack, at)?;
                    let frame = current_frame_mut(&mut frames, at)?;
                    let slot = slot as usize;
                    if frame.locals.len() <= slot {
                        frame.locals.resize(slot + 1, Value::uninit());
                    }
                    frame.locals[slot] = value;
                }
                Instruction::LoadGlobal(slot) => {
                    let value = self
                        .globals
                        .get(slot as usize)
                        .cloned()
                        .unwrap_or_else(Value::uninit);
                    stack.push(value);
                }
                Instruction::StoreGlobal(slot) => {
                    let value = pop(&mut stack, at)?;
                    let slot = slot as usize;
                    if self.globals.len() <= slot {
                        self.globals.resize(slot + 1, Value::uninit());
                    }
                    self.globals[slot] = value;
                }

                Instruction::AddI => int_bin(&mut stack, at, i32::checked_add)?,
                Instruction::SubI => int_bin(&mut stack, at, i32::checked_sub)?,
                Instruction::MulI => int_bin(&mut stack, at, i32::checked_mul)?,
                Instruction::DivI => {
                    let b = pop_int(&mut stack, at)?;
                    let a = pop_int(&mut stack, at)?;
                    if b == 0 {
                        err!(at, ErrorKind::DivZero, "division by zero");
                    }
                    match a.checked_div(b) {
                        Some(v) => stack.push(Value::Int(v)),
                        None => err!(at, ErrorKind::Overflow, "int division overflow"),
                    }
                }

                Instruction::AddD => decimal_bin(&mut stack, at, |a, b| a.checked_add(b))?,
                Instruction::SubD => decimal_bin(&mut stack, at, |a, b| a.checked_sub(b))?,
                Instruction::MulD => {
                    let b = pop_scaled(&mut stack, at)?;
                    let a = pop_scaled(&mut stack, at)?;
                    let product = i128::from(a) * i128::from(b);
                    let scaled = div_round(product, 100);
                    push_scaled(&mut stack, scaled, at)?;
                }
                Instruction::DivD => {
                    let b = pop_scaled(&mut stack, at)?;
                    let a = pop_scaled(&mut stack, at)?;
                    if b == 0 {
                        err!(at, ErrorKind::DivZero, "division by zero");
                    }
                    let scaled = div_round(i128::from(a) * 100, i128::from(b));
                    push_scaled(&mut stack, scaled, at)?;
                }

                Instruction::Neg => match pop(&mut stack, at)? {
                    Value::Int(v) => match v.checked_neg() {
                        Some(n) => stack.push(Value::Int(n)),
                        None => err!(at, ErrorKind::Overflow, "int negation overflow"),
                    },
                    Value::Decimal(v) => match v.checked_neg() {
                        Some(n) => stack.push(Value::Decimal(n)),
                        None => err!(at, ErrorKind::Overflow, "decimal negation overflow"),
                    },
                    other => err!(at, ErrorKind::BadCast, "cannot negate {}", other.type_name()),
                },

                Instruction::Eq => {
                    let b = pop(&mut stack, at)?;
                    let a = pop(&mut stack, at)?;
                    stack.push(Value::Flag(a == b));
                }
                Instruction::Ne => {
                    let b = pop(&mut stack, at)?;
                    let a = pop(&mut stack, at)?;
                    stack.push(Value::Flag(a != b));
                }
                Instruction::Lt => numeric_cmp(&mut stack, at, |o| o.is_lt())?,
                Instruction::Le => numeric_cmp(&mut stack, at, |o| o.is_le())?,
                Instruction::Gt => numeric_cmp(&mut stack, at, |o| o.is_gt())?,
                Instruction::Ge => numeric_cmp(&mut stack, at, |o| o.is_ge())?,

                Instruction::And => flag_bin(&mut stack, at, |a, b| a && b)?,
                Instruction::Or => flag_bin(&mut stack, at, |a, b| a || b)?,
                Instruction::Not => {
                    let value = pop_flag(&mut stack, at)?;
                    stack.push(Value::Flag(!value));
                }

                Instruction::Jump(target) => pc = target as usize,
                Instruction::JumpIfFalse(target) => {
                    if !pop_flag(&mut stack, at)? {
                        pc = target as usize;
                    }
                }
                Instruction::JumpIfTrue(target) => {
                    if pop_flag(&mut stack, at)? {
                        pc = target as usize;
                    }
                }

                Instruction::Concat => {
                    let b = pop_text(&mut stack, at)?;
                    let a = pop_text(&mut stack, at)?;
                    stack.push(Value::text(format!("{}{}", a, b)));
                }
                Instruction::Interp(count) => {
                    let mut parts = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        parts.push(pop(&mut stack, at)?.display());
                    }
                    parts.reverse();
                    stack.push(Value::text(parts.concat()));
                }
                Instruction::Format(index) => {
                    let pattern = match self.artifact.constants.get(index as usize) {
                        Some(droe_core::Constant::Pattern(p)) => p.clone(),
                        _ => err!(at, ErrorKind::HostError, "format pattern {} missing", index),
                    };
                    let value = pop(&mut stack, at)?;
                    let rendered = apply_pattern(&value, &pattern, at)?;
                    stack.push(Value::text(rendered));
                }

                Instruction::MakeList(count) => {
                    let items = pop_many(&mut stack, count as usize, at)?;
                    stack.push(Value::List(Arc::new(items)));
                }
                Instruction::MakeGroup(count) => {
                    let items = pop_many(&mut stack, count as usize, at)?;
                    stack.push(Value::Group(Arc::new(items)));
                }
                Instruction::IterBegin => {
                    let items = match pop(&mut stack, at)? {
                        Value::List(items) | Value::Group(items) => items.as_ref().clone(),
                        Value::Text(s) => s
                            .chars()
                            .map(|c| Value::text(c.to_string()))
                            .collect(),
                        other => err!(
                            at,
                            ErrorKind::BadCast,
                            "cannot iterate {}",
                            other.type_name()
                        ),
                    };
                    iters.push(IterState { items, pos: 0 });
                }
                Instruction::IterNext(exit) => {
                    let iter = match iters.last_mut() {
                        Some(i) => i,
                        None => err!(at, ErrorKind::HostError, "iterator stack underflow"),
                    };
                    if iter.pos < iter.items.len() {
                        let item = iter.items[iter.pos].clone();
                        iter.pos += 1;
                        stack.push(item);
                    } else {
                        iters.pop();
                        pc = exit as usize;
                    }
                }
                Instruction::Index => {
                    let index = pop_int(&mut stack, at)?;
                    let value = pop(&mut stack, at)?;
                    let item = match &value {
                        Value::List(items) | Value::Group(items) => {
                            items.get(index as usize).cloned()
                        }
                        Value::Text(s) => s
                            .chars()
                            .nth(index as usize)
                            .map(|c| Value::text(c.to_string())),
                        other => err!(
                            at,
                            ErrorKind::BadCast,
                            "cannot index {}",
                            other.type_name()
                        ),
                    };
                    match item {
                        Some(v) => stack.push(v),
                        None => err!(at, ErrorKind::BadCast, "index {} out of range", index),
                    }
                }

                Instruction::MakeRecord { schema, fields } => {
                    let values = pop_many(&mut stack, fields as usize, at)?;
                    stack.push(Value::Record {
                        schema,
                        fields: Arc::new(values),
                    });
                }
                Instruction::GetField(index) => match pop(&mut stack, at)? {
                    Value::Record { fields, .. } => match fields.get(index as usize) {
                        Some(v) => stack.push(v.clone()),
                        None => err!(at, ErrorKind::BadCast, "field {} out of range", index),
                    },
                    other => err!(
                        at,
                        ErrorKind::BadCast,
                        "field access on {}",
                        other.type_name()
                    ),
                },
                Instruction::SetField(index) => {
                    let value = pop(&mut stack, at)?;
                    match pop(&mut stack, at)? {
                        Value::Record { schema, fields } => {
                            let mut values = fields.as_ref().clone();
                            match values.get_mut(index as usize) {
                                Some(slot) => *slot = value,
                                None => err!(at, ErrorKind::BadCast, "field {} out of range", index),
                            }
                            stack.push(Value::Record {
                                schema,
                                fields: Arc::new(values),
                            });
                        }
                        other => err!(
                            at,
                            ErrorKind::BadCast,
                            "field update on {}",
                            other.type_name()
                        ),
                    }
                }

                Instruction::Call {
                    module,
                    action,
                    args,
                } => {
                    let entry = match self.artifact.action(module, action) {
                        Some(e) => e.entry as usize,
                        None => err!(
                            at,
                            ErrorKind::HostError,
                            "call target ({}, {}) out of range",
                            module,
                            action
                        ),
                    };
                    let mut locals = vec![Value::uninit(); args as usize];
                    for slot in (0..args as usize).rev() {
                        locals[slot] = pop(&mut stack, at)?;
                    }
                    frames.push(Frame { ret: pc, locals });
                    pc = entry;
                }
                Instruction::Return => {
                    let frame = match frames.pop() {
                        Some(f) => f,
                        None => err!(at, ErrorKind::HostError, "return without a frame"),
                    };
                    if frame.ret == usize::MAX {
                        return Ok((Outcome::Finished, response));
                    }
                    pc = frame.ret;
                }
                Instruction::EnterFrame(locals) => {
                    let frame = current_frame_mut(&mut frames, at)?;
                    if frame.locals.len() < locals as usize {
                        frame.locals.resize(locals as usize, Value::uninit());
                    }
                }
                Instruction::LeaveFrame => {
                    let frame = current_frame_mut(&mut frames, at)?;
                    frame.locals.clear();
                }

                Instruction::Display => {
                    let value = pop(&mut stack, at)?;
                    host.print_line(&value.display());
                }
                Instruction::HostCall { func, args } => {
                    self.host_call(func, args, &mut stack, &mut response, host, at)?;
                }

                Instruction::DefineData(index) => {
                    self.registered_data.push(index);
                }
                Instruction::DefineEndpoint(index) => {
                    self.registered_endpoints.push(index);
                }
                Instruction::EndHandler => {
                    return Ok((Outcome::HandlerDone, response));
                }

                Instruction::DatabaseOp {
                    op,
                    entity,
                    preds,
                    fields,
                } => {
                    let field_pairs = pop_pairs(&mut stack, fields as usize, at)?;
                    let pred_pairs = pop_pairs(&mut stack, preds as usize, at)?;
                    let schema = match self.artifact.record_schemas.get(entity as usize) {
                        Some(s) => s.clone(),
                        None => err!(at, ErrorKind::HostError, "entity {} out of range", entity),
                    };
                    debug!(op = op.as_str(), entity = %schema.name, "database op");
                    let result = host
                        .db_op(op, entity, &schema, &pred_pairs, &field_pairs)
                        .map_err(|message| {
                            RuntimeError::new(ErrorKind::HostError, message, at)
                        })?;
                    stack.push(match result {
                        DbResult::One(value) => value,
                        DbResult::Many(values) => Value::List(Arc::new(values)),
                        DbResult::Count(count) => Value::Int(count),
                    });
                }

                Instruction::Halt => {
                    return Ok((Outcome::Halted, response));
                }
            }
        }
    }

    fn host_call(
        &mut self,
        func: HostFn,
        _args: u8,
        stack: &mut Vec<Value>,
        response: &mut Option<(i32, String)>,
        host: &mut dyn Host,
        at: usize,
    ) -> Result<(), RuntimeError> {
        match func {
            HostFn::Print => {
                let value = pop(stack, at)?;
                host.print(&value.display());
            }
            HostFn::PrintLine => {
                let value = pop(stack, at)?;
                host.print_line(&value.display());
            }
            HostFn::Now => {
                let now = host.now();
                stack.push(Value::text(crate::host::epoch_to_date(now)));
            }
            HostFn::Uuid => {
                let id = host.uuid();
                stack.push(Value::text(id));
            }
            HostFn::HttpRequest => {
                let headers_list = pop(stack, at)?;
                let body = pop_text(stack, at)?;
                let method = pop_text(stack, at)?;
                let url = pop_text(stack, at)?;
                let headers = match headers_list {
                    Value::List(items) => {
                        let mut pairs = Vec::new();
                        let mut iter = items.iter();
                        while let (Some(name), Some(value)) = (iter.next(), iter.next()) {
                            pairs.push((name.display(), value.display()));
                        }
                        pairs
                    }
                    other => {
                        return Err(RuntimeError::new(
                            ErrorKind::BadCast,
                            format!("headers must be a list, found {}", other.type_name()),
                            at,
                        ))
                    }
                };
                debug!(url = %url, method = %method, "host http request");
                let reply = host
                    .http_request(&url, &method, &body, &headers)
                    .map_err(|message| RuntimeError::new(ErrorKind::HostError, message, at))?;
                let schema = self
                    .artifact
                    .record_schemas
                    .iter()
                    .position(|s| s.name == "http_response")
                    .ok_or_else(|| {
                        RuntimeError::new(
                            ErrorKind::HostError,
                            "http_response schema missing from artifact",
                            at,
                        )
                    })?;
                stack.push(Value::Record {
                    schema: schema as u16,
                    fields: Arc::new(vec![
                        Value::Int(reply.status),
                        Value::text(reply.body),
                    ]),
                });
            }
            HostFn::Respond => {
                let body = pop_text(stack, at)?;
                let status = pop_int(stack, at)?;
                *response = Some((status, body));
            }
        }
        Ok(())
    }
}

// =========================================================================
// Stack helpers
// =========================================================================

fn pop(stack: &mut Vec<Value>, at: usize) -> Result<Value, RuntimeError> {
    stack
        .pop()
        .ok_or_else(|| RuntimeError::new(ErrorKind::HostError, "operand stack underflow", at))
}

fn peek<'a>(stack: &'a [Value], at: usize) -> Result<&'a Value, RuntimeError> {
    stack
        .last()
        .ok_or_else(|| RuntimeError::new(ErrorKind::HostError, "operand stack underflow", at))
}

fn pop_many(stack: &mut Vec<Value>, count: usize, at: usize) -> Result<Vec<Value>, RuntimeError> {
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(pop(stack, at)?);
    }
    items.reverse();
    Ok(items)
}

/// Pop `count` name/value pairs pushed as `name, value` per pair.
fn pop_pairs(
    stack: &mut Vec<Value>,
    count: usize,
    at: usize,
) -> Result<Vec<(String, Value)>, RuntimeError> {
    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count {
        let value = pop(stack, at)?;
        let name = pop_text(stack, at)?;
        pairs.push((name, value));
    }
    pairs.reverse();
    Ok(pairs)
}

fn pop_int(stack: &mut Vec<Value>, at: usize) -> Result<i32, RuntimeError> {
    match pop(stack, at)? {
        Value::Int(v) => Ok(v),
        other => Err(RuntimeError::new(
            ErrorKind::BadCast,
            format!("expected int, found {}", other.type_name()),
            at,
        )),
    }
}

fn pop_flag(stack: &mut Vec<Value>, at: usize) -> Result<bool, RuntimeError> {
    match pop(stack, at)? {
        Value::Flag(v) => Ok(v),
        other => Err(RuntimeError::new(
            ErrorKind::BadCast,
            format!("expected flag, found {}", other.type_name()),
            at,
        )),
    }
}

fn pop_text(stack: &mut Vec<Value>, at: usize) -> Result<String, RuntimeError> {
    match pop(stack, at)? {
        Value::Text(s) => Ok(s.to_string()),
        other => Err(RuntimeError::new(
            ErrorKind::BadCast,
            format!("expected text, found {}", other.type_name()),
            at,
        )),
    }
}

/// Pop a numeric operand as the scaled decimal representation. Int
/// operands are the compiler's promotion and scale by 100 here.
fn pop_scaled(stack: &mut Vec<Value>, at: usize) -> Result<i64, RuntimeError> {
    match pop(stack, at)? {
        Value::Decimal(v) => Ok(v),
        Value::Int(v) => Ok(i64::from(v) * 100),
        other => Err(RuntimeError::new(
            ErrorKind::BadCast,
            format!("expected a number, found {}", other.type_name()),
            at,
        )),
    }
}

fn push_scaled(stack: &mut Vec<Value>, scaled: i128, at: usize) -> Result<(), RuntimeError> {
    if scaled < i128::from(i64::MIN) || scaled > i128::from(i64::MAX) {
        return Err(RuntimeError::new(
            ErrorKind::Overflow,
            "decimal overflow",
            at,
        ));
    }
    stack.push(Value::Decimal(scaled as i64));
    Ok(())
}

/// Round to nearest, ties away from zero.
fn div_round(n: i128, d: i128) -> i128 {
    let q = n / d;
    let r = n % d;
    if r.abs() * 2 >= d.abs() {
        q + if (n < 0) == (d < 0) { 1 } else { -1 }
    } else {
        q
    }
}

fn int_bin(
    stack: &mut Vec<Value>,
    at: usize,
    op: fn(i32, i32) -> Option<i32>,
) -> Result<(), RuntimeError> {
    let b = pop_int(stack, at)?;
    let a = pop_int(stack, at)?;
    match op(a, b) {
        Some(v) => {
            stack.push(Value::Int(v));
            Ok(())
        }
        None => Err(RuntimeError::new(
            ErrorKind::Overflow,
            "int arithmetic overflow",
            at,
        )),
    }
}

fn decimal_bin(
    stack: &mut Vec<Value>,
    at: usize,
    op: fn(i64, i64) -> Option<i64>,
) -> Result<(), RuntimeError> {
    let b = pop_scaled(stack, at)?;
    let a = pop_scaled(stack, at)?;
    match op(a, b) {
        Some(v) => {
            stack.push(Value::Decimal(v));
            Ok(())
        }
        None => Err(RuntimeError::new(
            ErrorKind::Overflow,
            "decimal arithmetic overflow",
            at,
        )),
    }
}

fn numeric_cmp(
    stack: &mut Vec<Value>,
    at: usize,
    test: fn(std::cmp::Ordering) -> bool,
) -> Result<(), RuntimeError> {
    let b = pop_scaled(stack, at)?;
    let a = pop_scaled(stack, at)?;
    stack.push(Value::Flag(test(a.cmp(&b))));
    Ok(())
}

fn flag_bin(
    stack: &mut Vec<Value>,
    at: usize,
    op: fn(bool, bool) -> bool,
) -> Result<(), RuntimeError> {
    let b = pop_flag(stack, at)?;
    let a = pop_flag(stack, at)?;
    stack.push(Value::Flag(op(a, b)));
    Ok(())
}

fn current_frame<'a>(frames: &'a [Frame], at: usize) -> Result<&'a Frame, RuntimeError> {
    frames
        .last()
        .ok_or_else(|| RuntimeError::new(ErrorKind::HostError, "no active frame", at))
}

fn current_frame_mut<'a>(
    frames: &'a mut Vec<Frame>,
    at: usize,
) -> Result<&'a mut Frame, RuntimeError> {
    frames
        .last_mut()
        .ok_or_else(|| RuntimeError::new(ErrorKind::HostError, "no active frame", at))
}
