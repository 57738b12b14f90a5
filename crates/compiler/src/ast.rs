//! Abstract syntax tree for Droe
//!
//! Tagged variants with exhaustive matching; every node carries a source
//! span. AST nodes are owned by their compilation unit; the resolver may
//! graft included modules into the root program node.

use crate::token::Span;
use crate::types::Ty;
use droe_core::schema::{DbOpCode, HttpMethod};

/// One piece of an interpolated text literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TextPart {
    Lit(String),
    Expr(Box<Expr>),
}

/// Binary operators, in source spelling order of precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::Eq => "equals",
            BinOp::Ne => "does not equal",
            BinOp::Lt => "is less than",
            BinOp::Le => "is less than or equal to",
            BinOp::Gt => "is greater than",
            BinOp::Ge => "is greater than or equal to",
            BinOp::Add => "plus",
            BinOp::Sub => "minus",
            BinOp::Mul => "times",
            BinOp::Div => "divided by",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Unary `minus`
    Neg,
    /// Logical `not`
    Not,
    /// Postfix `is empty`
    IsEmpty,
    /// Postfix `is not empty`
    IsNotEmpty,
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit {
        value: i32,
        span: Span,
    },
    /// Scaled by 100
    DecimalLit {
        value: i64,
        span: Span,
    },
    /// Interpolated text; a plain literal is a single `Lit` part
    TextLit {
        parts: Vec<TextPart>,
        span: Span,
    },
    FlagLit {
        value: bool,
        span: Span,
    },
    Ident {
        name: String,
        span: Span,
    },
    /// `object.field`
    Property {
        object: Box<Expr>,
        field: String,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        span: Span,
    },
    /// `[e1, e2, ...]`; list or group is decided by the declared type
    Collection {
        elements: Vec<Expr>,
        span: Span,
    },
    /// `format <expr> as "<pattern>"`
    FormatExpr {
        operand: Box<Expr>,
        pattern: String,
        span: Span,
    },
    /// Action invocation `name with a, b` or `module.action with a, b`
    Invoke {
        module: Option<String>,
        action: String,
        args: Vec<Expr>,
        span: Span,
    },
    /// Outbound HTTP call
    HttpCall {
        url: Box<Expr>,
        method: HttpMethod,
        body: Option<Box<Expr>>,
        headers: Vec<(String, Expr)>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::IntLit { span, .. }
            | Expr::DecimalLit { span, .. }
            | Expr::TextLit { span, .. }
            | Expr::FlagLit { span, .. }
            | Expr::Ident { span, .. }
            | Expr::Property { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Collection { span, .. }
            | Expr::FormatExpr { span, .. }
            | Expr::Invoke { span, .. }
            | Expr::HttpCall { span, .. } => *span,
        }
    }
}

/// Field annotation as written in a `data` block.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Key,
    Auto,
    Required,
    Optional,
    Unique,
    Default(Expr),
}

/// One field of a data definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: Ty,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

/// `data <Name> ... end data`
#[derive(Debug, Clone, PartialEq)]
pub struct DataDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub span: Span,
}

/// One declared parameter of an action.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
    pub span: Span,
}

/// `action`/`task` definition. A task is an action whose signature lacks
/// `gives`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Option<Ty>,
    pub body: Vec<Stmt>,
    pub is_task: bool,
    pub span: Span,
}

/// `serve <METHOD> <path> ... end serve`
#[derive(Debug, Clone, PartialEq)]
pub struct ServeDef {
    pub method: HttpMethod,
    pub path: String,
    /// `:param` names in segment order
    pub path_params: Vec<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// Kinds of UI node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiKind {
    Screen,
    Fragment,
    Slot,
    Layout,
    Title,
    Text,
    Input,
    Button,
}

impl UiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UiKind::Screen => "screen",
            UiKind::Fragment => "fragment",
            UiKind::Slot => "slot",
            UiKind::Layout => "layout",
            UiKind::Title => "title",
            UiKind::Text => "text",
            UiKind::Input => "input",
            UiKind::Button => "button",
        }
    }
}

/// A UI element; block kinds carry children, leaf kinds carry a value.
#[derive(Debug, Clone, PartialEq)]
pub struct UiNode {
    pub kind: UiKind,
    /// Screen/fragment/slot name, or the fragment a screen instantiates
    pub name: Option<String>,
    pub value: Option<Expr>,
    pub children: Vec<UiNode>,
    pub span: Span,
}

/// Statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Display {
        expr: Expr,
        span: Span,
    },
    /// `set name [which is T] to expr` or `set name ... from action with
    /// args`; declaration vs. reassignment is decided by the checker
    Set {
        name: String,
        declared: Option<Ty>,
        value: Expr,
        span: Span,
    },
    /// `when ... then ... (otherwise when ...)* [otherwise ...] end when`
    When {
        arms: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Option<Vec<Stmt>>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    ForEach {
        var: String,
        iterable: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    Action(ActionDef),
    /// `give [expr]`
    Give {
        value: Option<Expr>,
        span: Span,
    },
    Module {
        name: String,
        body: Vec<Stmt>,
        span: Span,
    },
    Data(DataDef),
    /// `db <op> <Entity> [with ...] [where field equals expr] [set ...]
    /// [into name]`
    Db {
        op: DbOpCode,
        entity: String,
        fields: Vec<(String, Expr)>,
        filter: Option<(String, Expr)>,
        sets: Vec<(String, Expr)>,
        into: Option<String>,
        span: Span,
    },
    Serve(ServeDef),
    /// `respond <status> [with <expr>]`, only inside handlers
    Respond {
        status: Expr,
        body: Option<Expr>,
        span: Span,
    },
    /// `call ... into name`
    HttpCall {
        call: Expr,
        into: Option<String>,
        span: Span,
    },
    /// Bare invocation used for task calls
    Invoke {
        call: Expr,
        span: Span,
    },
    Ui(UiNode),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Display { span, .. }
            | Stmt::Set { span, .. }
            | Stmt::When { span, .. }
            | Stmt::While { span, .. }
            | Stmt::ForEach { span, .. }
            | Stmt::Give { span, .. }
            | Stmt::Module { span, .. }
            | Stmt::Db { span, .. }
            | Stmt::Respond { span, .. }
            | Stmt::HttpCall { span, .. }
            | Stmt::Invoke { span, .. } => *span,
            Stmt::Action(def) => def.span,
            Stmt::Data(def) => def.span,
            Stmt::Serve(def) => def.span,
            Stmt::Ui(node) => node.span,
        }
    }
}

/// `@include <Name> from "<path>"`
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeDecl {
    pub name: String,
    pub path: String,
    pub span: Span,
}

/// A parsed compilation unit: metadata annotations followed by module
/// and/or statement nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// `@key value` pairs in file order; recognized keys are `target`,
    /// `name`, `description`, `package`, free-form keys are preserved
    pub metadata: Vec<(String, String)>,
    pub includes: Vec<IncludeDecl>,
    pub body: Vec<Stmt>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    /// Metadata value for a key, if present.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
