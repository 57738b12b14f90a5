//! Tokens for Droe source
//!
//! Tokens exist only during a parse; the parser consumes the stream and
//! never exposes them. Every token carries a source position (file id,
//! line, column), with lines 1-based for user display.

/// Identifies a source file within a compilation; index into the
/// compilation's file table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileId(pub u32);

/// Source position of a token or AST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub file: FileId,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl Span {
    pub fn new(file: FileId, line: u32, column: u32) -> Self {
        Span { file, line, column }
    }
}

/// Reserved words, including the multi-word operator keywords the lexer
/// scans as single tokens (longest match first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    // Declarations and statements
    Set,
    To,
    Which,
    Is,
    Are,
    From,
    With,
    Display,
    When,
    Then,
    Otherwise,
    While,
    In,
    Action,
    Task,
    Gives,
    Give,
    Module,
    Data,
    Serve,
    Respond,
    Call,
    Method,
    Using,
    Headers,
    Into,
    Db,
    Create,
    Find,
    Update,
    Delete,
    Where,
    Format,
    As,
    Screen,
    Fragment,
    Slot,
    Layout,

    // Operators and literal words
    And,
    Or,
    Not,
    Plus,
    Minus,
    Times,
    Equals,
    True,
    False,

    // Multi-word keywords (scanned as single tokens)
    DividedBy,
    ForEach,
    OtherwiseWhen,
    FindAll,
    IsGreaterThanOrEqualTo,
    IsLessThanOrEqualTo,
    IsGreaterThan,
    IsLessThan,
    IsNotEmpty,
    IsEmpty,
    IsNot,
    DoesNotEqual,
    EndWhen,
    EndWhile,
    EndFor,
    EndAction,
    EndTask,
    EndData,
    EndModule,
    EndFragment,
    EndScreen,
    EndSlot,
    EndServe,
    EndHeaders,
    EndLayout,
}

impl Keyword {
    /// The source spelling, used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Set => "set",
            Keyword::To => "to",
            Keyword::Which => "which",
            Keyword::Is => "is",
            Keyword::Are => "are",
            Keyword::From => "from",
            Keyword::With => "with",
            Keyword::Display => "display",
            Keyword::When => "when",
            Keyword::Then => "then",
            Keyword::Otherwise => "otherwise",
            Keyword::While => "while",
            Keyword::In => "in",
            Keyword::Action => "action",
            Keyword::Task => "task",
            Keyword::Gives => "gives",
            Keyword::Give => "give",
            Keyword::Module => "module",
            Keyword::Data => "data",
            Keyword::Serve => "serve",
            Keyword::Respond => "respond",
            Keyword::Call => "call",
            Keyword::Method => "method",
            Keyword::Using => "using",
            Keyword::Headers => "headers",
            Keyword::Into => "into",
            Keyword::Db => "db",
            Keyword::Create => "create",
            Keyword::Find => "find",
            Keyword::Update => "update",
            Keyword::Delete => "delete",
            Keyword::Where => "where",
            Keyword::Format => "format",
            Keyword::As => "as",
            Keyword::Screen => "screen",
            Keyword::Fragment => "fragment",
            Keyword::Slot => "slot",
            Keyword::Layout => "layout",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Not => "not",
            Keyword::Plus => "plus",
            Keyword::Minus => "minus",
            Keyword::Times => "times",
            Keyword::Equals => "equals",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::DividedBy => "divided by",
            Keyword::ForEach => "for each",
            Keyword::OtherwiseWhen => "otherwise when",
            Keyword::FindAll => "find all",
            Keyword::IsGreaterThanOrEqualTo => "is greater than or equal to",
            Keyword::IsLessThanOrEqualTo => "is less than or equal to",
            Keyword::IsGreaterThan => "is greater than",
            Keyword::IsLessThan => "is less than",
            Keyword::IsNotEmpty => "is not empty",
            Keyword::IsEmpty => "is empty",
            Keyword::IsNot => "is not",
            Keyword::DoesNotEqual => "does not equal",
            Keyword::EndWhen => "end when",
            Keyword::EndWhile => "end while",
            Keyword::EndFor => "end for",
            Keyword::EndAction => "end action",
            Keyword::EndTask => "end task",
            Keyword::EndData => "end data",
            Keyword::EndModule => "end module",
            Keyword::EndFragment => "end fragment",
            Keyword::EndScreen => "end screen",
            Keyword::EndSlot => "end slot",
            Keyword::EndServe => "end serve",
            Keyword::EndHeaders => "end headers",
            Keyword::EndLayout => "end layout",
        }
    }
}

/// A piece of a text literal: either a literal chunk or an interpolation
/// chunk (the raw expression text between `[` and `]`, re-lexed by the
/// parser).
#[derive(Debug, Clone, PartialEq)]
pub enum TextPiece {
    Lit(String),
    /// Expression source and the column where it starts (for diagnostics)
    Interp(String, u32),
}

/// Token kinds; a closed enumeration of keywords, punctuation, and
/// literal classes.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    IntLit(i32),
    /// Scaled decimal literal (value x 100)
    DecimalLit(i64),
    /// Text literal with interpolation sub-tokens
    TextLit(Vec<TextPiece>),
    Ident(String),
    Keyword(Keyword),
    /// `@key value` metadata line (value verbatim); `@include` is lexed
    /// as ordinary tokens instead so the resolver sees its parts
    Meta { key: String, value: String },
    /// `@include` introducer
    AtInclude,
    /// URL-style path literal such as `/users/:id`
    PathLit(String),
    LParen,
    RParen,
    /// Collection literal delimiters (inside string literals the same
    /// characters mark interpolation instead)
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Newline,
    Eof,
}

/// A token with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }

    /// Human-readable description for "unexpected token" diagnostics.
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::IntLit(v) => format!("int literal '{}'", v),
            TokenKind::DecimalLit(v) => {
                format!("decimal literal '{}'", droe_core::constant::decimal_to_string(*v))
            }
            TokenKind::TextLit(_) => "text literal".to_string(),
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Keyword(kw) => format!("'{}'", kw.as_str()),
            TokenKind::Meta { key, .. } => format!("metadata '@{}'", key),
            TokenKind::AtInclude => "'@include'".to_string(),
            TokenKind::PathLit(p) => format!("path '{}'", p),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Eof => "end of file".to_string(),
        }
    }
}
