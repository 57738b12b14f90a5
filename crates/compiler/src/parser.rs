//! Recursive-descent parser for Droe
//!
//! Statements terminate at newlines; blocks close with matching
//! `end <kind>` keywords. Expression parsing is classic precedence
//! climbing, lowest to highest: `or` < `and` < `not` < comparisons <
//! `plus`/`minus` < `times`/`divided by` < unary `minus` < postfix
//! property access. Parentheses override precedence.
//!
//! On a failed production the parser records a diagnostic, synchronizes
//! to the next statement boundary, and continues, so a single file
//! yields a list of errors rather than stopping at the first.

use crate::ast::{
    ActionDef, Annotation, BinOp, DataDef, Expr, FieldDef, IncludeDecl, Param, Program, ServeDef,
    Stmt, TextPart, UiKind, UiNode, UnOp,
};
use crate::diagnostics::Diagnostic;
use crate::lexer::Lexer;
use crate::token::{FileId, Keyword, Span, TextPiece, Token, TokenKind};
use crate::types::Ty;
use droe_core::schema::{DbOpCode, HttpMethod};

/// Internal error type: the diagnostic has already been recorded; the
/// value only signals "synchronize and move on".
struct Abort;

type PResult<T> = Result<T, Abort>;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: FileId,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    pub fn new(source: &str, file: FileId) -> Self {
        let (tokens, diagnostics) = Lexer::new(source, file).tokenize();
        Parser {
            tokens,
            pos: 0,
            file,
            diagnostics,
        }
    }

    /// Parse a whole compilation unit. Always returns the program built
    /// so far along with accumulated diagnostics.
    pub fn parse(mut self) -> (Program, Vec<Diagnostic>) {
        let mut program = Program::new();

        self.skip_newlines();
        // Metadata annotations come first
        loop {
            match self.peek_kind().clone() {
                TokenKind::Meta { key, value } => {
                    self.bump();
                    program.metadata.push((key, value));
                    self.skip_newlines();
                }
                TokenKind::AtInclude => {
                    match self.parse_include() {
                        Ok(inc) => program.includes.push(inc),
                        Err(Abort) => self.synchronize(),
                    }
                    self.skip_newlines();
                }
                _ => break,
            }
        }

        while !self.at_eof() {
            self.skip_newlines();
            if self.at_eof() {
                break;
            }
            // Late includes are still accepted (resolved the same way)
            if matches!(self.peek_kind(), TokenKind::AtInclude) {
                match self.parse_include() {
                    Ok(inc) => program.includes.push(inc),
                    Err(Abort) => self.synchronize(),
                }
                continue;
            }
            match self.parse_statement() {
                Ok(stmt) => program.body.push(stmt),
                Err(Abort) => self.synchronize(),
            }
        }

        (program, self.diagnostics)
    }

    // =====================================================================
    // Statements
    // =====================================================================

    fn parse_statement(&mut self) -> PResult<Stmt> {
        let span = self.here();
        match self.peek_kind().clone() {
            TokenKind::Keyword(kw) => match kw {
                Keyword::Display => self.parse_display(),
                Keyword::Set => self.parse_set(),
                Keyword::When => self.parse_when(),
                Keyword::While => self.parse_while(),
                Keyword::ForEach => self.parse_for_each(),
                Keyword::Action => self.parse_action(false),
                Keyword::Task => self.parse_action(true),
                Keyword::Give => self.parse_give(),
                Keyword::Module => self.parse_module(),
                Keyword::Data => self.parse_data(),
                Keyword::Serve => self.parse_serve(),
                Keyword::Respond => self.parse_respond(),
                Keyword::Call => self.parse_http_call(),
                Keyword::Db => self.parse_db(),
                Keyword::Screen => self.parse_ui_block(UiKind::Screen, Keyword::EndScreen),
                Keyword::Fragment => self.parse_ui_block(UiKind::Fragment, Keyword::EndFragment),
                Keyword::Layout => self.parse_ui_block(UiKind::Layout, Keyword::EndLayout),
                other => {
                    self.error_here(
                        "parse.unexpected_token",
                        format!("'{}' cannot start a statement", other.as_str()),
                    );
                    Err(Abort)
                }
            },
            TokenKind::Ident(_) => self.parse_invoke_statement(),
            _ => {
                let desc = self.peek().describe();
                self.diagnostics.push(Diagnostic::error(
                    "parse.unexpected_token",
                    format!("expected a statement, found {}", desc),
                    span,
                ));
                Err(Abort)
            }
        }
    }

    fn parse_display(&mut self) -> PResult<Stmt> {
        let span = self.here();
        self.bump(); // display
        let expr = self.parse_expr()?;
        self.expect_terminator()?;
        Ok(Stmt::Display { expr, span })
    }

    /// `set <name> [which is <type> | which are <collection-type>] to
    /// <expr>` or `set <name> ... from <action> [with <args>]`.
    fn parse_set(&mut self) -> PResult<Stmt> {
        let span = self.here();
        self.bump(); // set
        let name = self.expect_ident("a variable name after 'set'")?;

        let declared = if self.eat_kw(Keyword::Which) {
            if self.eat_kw(Keyword::Is) {
                Some(self.parse_type()?)
            } else if self.eat_kw(Keyword::Are) {
                let ty = self.parse_type()?;
                if !ty.is_collection() {
                    self.error_here(
                        "parse.unexpected_token",
                        "'which are' takes a collection type ('list of ...' or 'group of ...')",
                    );
                    return Err(Abort);
                }
                Some(ty)
            } else {
                self.error_here(
                    "parse.unexpected_token",
                    "expected 'is' or 'are' after 'which'",
                );
                return Err(Abort);
            }
        } else {
            None
        };

        if self.eat_kw(Keyword::To) {
            let value = self.parse_expr()?;
            self.expect_terminator()?;
            return Ok(Stmt::Set {
                name,
                declared,
                value,
                span,
            });
        }
        if self.eat_kw(Keyword::From) {
            let value = self.parse_invocation()?;
            self.expect_terminator()?;
            return Ok(Stmt::Set {
                name,
                declared,
                value,
                span,
            });
        }
        self.error_here(
            "parse.unexpected_token",
            format!("expected 'to' or 'from' in 'set {}'", name),
        );
        Err(Abort)
    }

    /// `when <c> then <stmt>` (single line) or the block chain closed by
    /// `end when`.
    fn parse_when(&mut self) -> PResult<Stmt> {
        let span = self.here();
        self.bump(); // when
        let first_cond = self.parse_expr()?;
        self.expect_kw(Keyword::Then, "expected 'then' after the condition")?;

        // Single-line form: a statement follows on the same line
        if !matches!(self.peek_kind(), TokenKind::Newline) {
            let stmt = self.parse_statement()?;
            return Ok(Stmt::When {
                arms: vec![(first_cond, vec![stmt])],
                otherwise: None,
                span,
            });
        }

        let mut arms = Vec::new();
        let mut otherwise = None;
        let first_body = self.parse_block(&[
            Keyword::OtherwiseWhen,
            Keyword::Otherwise,
            Keyword::EndWhen,
        ])?;
        arms.push((first_cond, first_body));

        loop {
            if self.eat_kw(Keyword::OtherwiseWhen) {
                let cond = self.parse_expr()?;
                self.expect_kw(Keyword::Then, "expected 'then' after the condition")?;
                let body = self.parse_block(&[
                    Keyword::OtherwiseWhen,
                    Keyword::Otherwise,
                    Keyword::EndWhen,
                ])?;
                arms.push((cond, body));
                continue;
            }
            if self.eat_kw(Keyword::Otherwise) {
                otherwise = Some(self.parse_block(&[Keyword::EndWhen])?);
            }
            self.expect_kw(Keyword::EndWhen, "expected 'end when' to close the chain")?;
            self.expect_terminator()?;
            break;
        }

        Ok(Stmt::When {
            arms,
            otherwise,
            span,
        })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let span = self.here();
        self.bump(); // while
        let cond = self.parse_expr()?;
        let body = self.parse_block(&[Keyword::EndWhile])?;
        self.expect_kw(Keyword::EndWhile, "expected 'end while' to close the loop")?;
        self.expect_terminator()?;
        Ok(Stmt::While { cond, body, span })
    }

    fn parse_for_each(&mut self) -> PResult<Stmt> {
        let span = self.here();
        self.bump(); // for each
        let var = self.expect_ident("a loop variable after 'for each'")?;
        self.expect_kw(Keyword::In, "expected 'in' after the loop variable")?;
        let iterable = self.parse_expr()?;
        let body = self.parse_block(&[Keyword::EndFor])?;
        self.expect_kw(Keyword::EndFor, "expected 'end for' to close the loop")?;
        self.expect_terminator()?;
        Ok(Stmt::ForEach {
            var,
            iterable,
            body,
            span,
        })
    }

    /// `action <name> [with p which is T (, q which is T)*] [gives T]`
    fn parse_action(&mut self, is_task: bool) -> PResult<Stmt> {
        let span = self.here();
        self.bump(); // action | task
        let name = self.expect_ident(if is_task {
            "a task name after 'task'"
        } else {
            "an action name after 'action'"
        })?;

        let mut params = Vec::new();
        if self.eat_kw(Keyword::With) {
            loop {
                let pspan = self.here();
                let pname = self.expect_ident("a parameter name")?;
                self.expect_kw(Keyword::Which, "expected 'which is <type>' after the parameter")?;
                if !self.eat_kw(Keyword::Is) && !self.eat_kw(Keyword::Are) {
                    self.error_here("parse.unexpected_token", "expected 'is' or 'are' after 'which'");
                    return Err(Abort);
                }
                let ty = self.parse_type()?;
                params.push(Param {
                    name: pname,
                    ty,
                    span: pspan,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }

        let returns = if self.eat_kw(Keyword::Gives) {
            if is_task {
                self.error_here("parse.unexpected_token", "a task cannot declare 'gives'");
                return Err(Abort);
            }
            Some(self.parse_type()?)
        } else {
            None
        };

        let close = if is_task { Keyword::EndTask } else { Keyword::EndAction };
        let body = self.parse_block(&[close])?;
        self.expect_kw(close, format!("expected '{}' to close '{}'", close.as_str(), name))?;
        self.expect_terminator()?;

        Ok(Stmt::Action(ActionDef {
            name,
            params,
            returns,
            body,
            is_task,
            span,
        }))
    }

    fn parse_give(&mut self) -> PResult<Stmt> {
        let span = self.here();
        self.bump(); // give
        let value = if matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Eof) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_terminator()?;
        Ok(Stmt::Give { value, span })
    }

    fn parse_module(&mut self) -> PResult<Stmt> {
        let span = self.here();
        self.bump(); // module
        let name = self.expect_ident("a module name after 'module'")?;
        let body = self.parse_block(&[Keyword::EndModule])?;
        self.expect_kw(
            Keyword::EndModule,
            format!("expected 'end module' to close module '{}'", name),
        )?;
        self.expect_terminator()?;
        Ok(Stmt::Module { name, body, span })
    }

    /// `data <Name>` with one `<field> is <type> [annotation]*` per line.
    fn parse_data(&mut self) -> PResult<Stmt> {
        let span = self.here();
        self.bump(); // data
        let name = self.expect_ident("a record name after 'data'")?;
        self.expect_terminator()?;

        let mut fields = Vec::new();
        loop {
            self.skip_newlines();
            if self.check_kw(Keyword::EndData) || self.at_eof() {
                break;
            }
            let fspan = self.here();
            let fname = self.expect_ident("a field name")?;
            self.expect_kw(Keyword::Is, format!("expected 'is' after field '{}'", fname))?;
            let ty = self.parse_type()?;
            let mut annotations = Vec::new();
            while !matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Eof) {
                annotations.push(self.parse_annotation()?);
            }
            fields.push(FieldDef {
                name: fname,
                ty,
                annotations,
                span: fspan,
            });
        }
        self.expect_kw(
            Keyword::EndData,
            format!("expected 'end data' to close data '{}'", name),
        )?;
        self.expect_terminator()?;
        Ok(Stmt::Data(DataDef { name, fields, span }))
    }

    fn parse_annotation(&mut self) -> PResult<Annotation> {
        let word = self.expect_ident("a field annotation")?;
        match word.as_str() {
            "key" => Ok(Annotation::Key),
            "auto" => Ok(Annotation::Auto),
            "required" => Ok(Annotation::Required),
            "optional" => Ok(Annotation::Optional),
            "unique" => Ok(Annotation::Unique),
            "default" => {
                let value = self.parse_primary()?;
                Ok(Annotation::Default(value))
            }
            other => {
                self.error_here(
                    "parse.unexpected_token",
                    format!(
                        "unknown annotation '{}' (expected key, auto, required, optional, unique, or default)",
                        other
                    ),
                );
                Err(Abort)
            }
        }
    }

    /// `serve <METHOD> <path> ... end serve`
    fn parse_serve(&mut self) -> PResult<Stmt> {
        let span = self.here();
        self.bump(); // serve
        let method = self.parse_http_method()?;
        let path = match self.peek_kind().clone() {
            TokenKind::PathLit(p) => {
                self.bump();
                p
            }
            _ => {
                self.error_here("parse.unexpected_token", "expected a path like /users/:id");
                return Err(Abort);
            }
        };
        let path_params = path
            .split('/')
            .filter_map(|seg| seg.strip_prefix(':'))
            .map(|s| s.to_string())
            .collect();

        let body = self.parse_block(&[Keyword::EndServe])?;
        self.expect_kw(Keyword::EndServe, "expected 'end serve' to close the endpoint")?;
        self.expect_terminator()?;
        Ok(Stmt::Serve(ServeDef {
            method,
            path,
            path_params,
            body,
            span,
        }))
    }

    fn parse_respond(&mut self) -> PResult<Stmt> {
        let span = self.here();
        self.bump(); // respond
        let status = self.parse_expr()?;
        let body = if self.eat_kw(Keyword::With) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect_terminator()?;
        Ok(Stmt::Respond { status, body, span })
    }

    /// `call <url> method <METHOD> [with <body>] [using headers ... end
    /// headers] into <name>`
    fn parse_http_call(&mut self) -> PResult<Stmt> {
        let span = self.here();
        self.bump(); // call
        let url = self.parse_expr()?;
        self.expect_kw(Keyword::Method, "expected 'method' after the call target")?;
        let method = self.parse_http_method()?;
        let body = if self.eat_kw(Keyword::With) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        let mut headers = Vec::new();
        if self.eat_kw(Keyword::Using) {
            self.expect_kw(Keyword::Headers, "expected 'headers' after 'using'")?;
            self.expect_terminator()?;
            loop {
                self.skip_newlines();
                if self.check_kw(Keyword::EndHeaders) || self.at_eof() {
                    break;
                }
                let name = match self.peek_kind().clone() {
                    TokenKind::TextLit(pieces) => {
                        self.bump();
                        text_pieces_to_plain(&pieces)
                    }
                    TokenKind::Ident(name) => {
                        self.bump();
                        name
                    }
                    _ => {
                        self.error_here("parse.unexpected_token", "expected a header name");
                        return Err(Abort);
                    }
                };
                self.expect(TokenKind::Colon, "expected ':' after the header name")?;
                let value = self.parse_expr()?;
                headers.push((name, value));
            }
            self.expect_kw(Keyword::EndHeaders, "expected 'end headers'")?;
        }

        let into = if self.eat_kw(Keyword::Into) {
            Some(self.expect_ident("a variable name after 'into'")?)
        } else {
            None
        };
        self.expect_terminator()?;

        Ok(Stmt::HttpCall {
            call: Expr::HttpCall {
                url: Box::new(url),
                method,
                body,
                headers,
                span,
            },
            into,
            span,
        })
    }

    /// `db create|find|find all|update|delete <Entity> ...`
    fn parse_db(&mut self) -> PResult<Stmt> {
        let span = self.here();
        self.bump(); // db
        let op = if self.eat_kw(Keyword::Create) {
            DbOpCode::Create
        } else if self.eat_kw(Keyword::FindAll) {
            DbOpCode::FindAll
        } else if self.eat_kw(Keyword::Find) {
            DbOpCode::Find
        } else if self.eat_kw(Keyword::Update) {
            DbOpCode::Update
        } else if self.eat_kw(Keyword::Delete) {
            DbOpCode::Delete
        } else {
            self.error_here(
                "parse.unexpected_token",
                "expected create, find, find all, update, or delete after 'db'",
            );
            return Err(Abort);
        };
        let entity = self.expect_ident("an entity name")?;

        let mut fields = Vec::new();
        if self.eat_kw(Keyword::With) {
            fields = self.parse_field_assignments()?;
        }

        let filter = if self.eat_kw(Keyword::Where) {
            let field = self.expect_ident("a field name after 'where'")?;
            self.expect_kw(Keyword::Equals, "expected 'equals' in the 'where' clause")?;
            let value = self.parse_expr()?;
            Some((field, value))
        } else {
            None
        };

        let mut sets = Vec::new();
        if self.eat_kw(Keyword::Set) {
            sets = self.parse_field_assignments()?;
        }

        let into = if self.eat_kw(Keyword::Into) {
            Some(self.expect_ident("a variable name after 'into'")?)
        } else {
            None
        };
        self.expect_terminator()?;

        Ok(Stmt::Db {
            op,
            entity,
            fields,
            filter,
            sets,
            into,
            span,
        })
    }

    /// An HTTP method word. `delete` doubles as a db keyword, so both
    /// identifier and keyword spellings are accepted.
    fn parse_http_method(&mut self) -> PResult<HttpMethod> {
        let word = match self.peek_kind().clone() {
            TokenKind::Ident(w) => {
                self.bump();
                w
            }
            TokenKind::Keyword(Keyword::Delete) => {
                self.bump();
                "DELETE".to_string()
            }
            _ => {
                self.error_here(
                    "parse.unexpected_token",
                    "expected an HTTP method (GET, POST, PUT, or DELETE)",
                );
                return Err(Abort);
            }
        };
        match HttpMethod::parse(&word) {
            Some(m) => Ok(m),
            None => {
                self.error_here(
                    "parse.unexpected_token",
                    format!("unknown HTTP method '{}' (expected GET, POST, PUT, or DELETE)", word),
                );
                Err(Abort)
            }
        }
    }

    /// Comma-separated `<field> is <expr>` pairs.
    fn parse_field_assignments(&mut self) -> PResult<Vec<(String, Expr)>> {
        let mut out = Vec::new();
        loop {
            let field = self.expect_ident("a field name")?;
            self.expect_kw(Keyword::Is, format!("expected 'is' after field '{}'", field))?;
            let value = self.parse_expr()?;
            out.push((field, value));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(out)
    }

    /// Bare invocation statement, used for task calls:
    /// `name [with args]` or `module.action [with args]`.
    fn parse_invoke_statement(&mut self) -> PResult<Stmt> {
        let span = self.here();
        let call = self.parse_invocation()?;
        self.expect_terminator()?;
        Ok(Stmt::Invoke { call, span })
    }

    /// `<name>[.<action>] [with <expr> (, <expr>)*]`
    fn parse_invocation(&mut self) -> PResult<Expr> {
        let span = self.here();
        let first = self.expect_ident("an action name")?;
        let (module, action) = if self.eat(TokenKind::Dot) {
            let action = self.expect_ident("an action name after '.'")?;
            (Some(first), action)
        } else {
            (None, first)
        };
        let mut args = Vec::new();
        if self.eat_kw(Keyword::With) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        Ok(Expr::Invoke {
            module,
            action,
            args,
            span,
        })
    }

    // =====================================================================
    // UI blocks
    // =====================================================================

    fn parse_ui_block(&mut self, kind: UiKind, close: Keyword) -> PResult<Stmt> {
        let node = self.parse_ui_node(kind, close)?;
        Ok(Stmt::Ui(node))
    }

    fn parse_ui_node(&mut self, kind: UiKind, close: Keyword) -> PResult<UiNode> {
        let span = self.here();
        self.bump(); // screen | fragment | slot | layout
        let name = match self.peek_kind().clone() {
            TokenKind::Ident(n) => {
                self.bump();
                Some(n)
            }
            _ => None,
        };
        if name.is_none() && matches!(kind, UiKind::Screen | UiKind::Fragment | UiKind::Slot) {
            self.error_here(
                "parse.unexpected_token",
                format!("expected a name after '{}'", kind.as_str()),
            );
            return Err(Abort);
        }
        self.expect_terminator()?;

        let mut children = Vec::new();
        loop {
            self.skip_newlines();
            if self.check_kw(close) || self.at_eof() {
                break;
            }
            children.push(self.parse_ui_child()?);
        }
        self.expect_kw(close, format!("expected '{}'", close.as_str()))?;
        self.expect_terminator()?;

        Ok(UiNode {
            kind,
            name,
            value: None,
            children,
            span,
        })
    }

    fn parse_ui_child(&mut self) -> PResult<UiNode> {
        let span = self.here();
        match self.peek_kind().clone() {
            TokenKind::Keyword(Keyword::Slot) => self.parse_ui_node(UiKind::Slot, Keyword::EndSlot),
            TokenKind::Keyword(Keyword::Fragment) => {
                self.parse_ui_node(UiKind::Fragment, Keyword::EndFragment)
            }
            TokenKind::Keyword(Keyword::Layout) => {
                self.parse_ui_node(UiKind::Layout, Keyword::EndLayout)
            }
            TokenKind::Ident(word) => match word.as_str() {
                "title" | "text" | "button" => {
                    self.bump();
                    let kind = match word.as_str() {
                        "title" => UiKind::Title,
                        "text" => UiKind::Text,
                        _ => UiKind::Button,
                    };
                    let value = self.parse_expr()?;
                    self.expect_terminator()?;
                    Ok(UiNode {
                        kind,
                        name: None,
                        value: Some(value),
                        children: Vec::new(),
                        span,
                    })
                }
                "input" => {
                    self.bump();
                    let name = self.expect_ident("an input name")?;
                    self.expect_terminator()?;
                    Ok(UiNode {
                        kind: UiKind::Input,
                        name: Some(name),
                        value: None,
                        children: Vec::new(),
                        span,
                    })
                }
                other => {
                    self.error_here(
                        "parse.unexpected_token",
                        format!(
                            "'{}' is not a UI element (expected title, text, input, button, slot, fragment, or layout)",
                            other
                        ),
                    );
                    Err(Abort)
                }
            },
            _ => {
                self.error_here("parse.unexpected_token", "expected a UI element");
                Err(Abort)
            }
        }
    }

    // =====================================================================
    // Includes and types
    // =====================================================================

    /// `@include <Name> from "<path>"`
    fn parse_include(&mut self) -> PResult<IncludeDecl> {
        let span = self.here();
        self.bump(); // @include
        let name = self.expect_ident("a module name after '@include'")?;
        self.expect_kw(Keyword::From, "expected 'from' after the module name")?;
        let path = match self.peek_kind().clone() {
            TokenKind::TextLit(pieces) => {
                self.bump();
                text_pieces_to_plain(&pieces)
            }
            _ => {
                self.error_here("parse.unexpected_token", "expected a quoted include path");
                return Err(Abort);
            }
        };
        self.expect_terminator()?;
        Ok(IncludeDecl { name, path, span })
    }

    /// `int | decimal | text | flag | date | file | list of T | group of
    /// T | <RecordName>`; `number` is a legacy alias for `int`.
    fn parse_type(&mut self) -> PResult<Ty> {
        let word = self.expect_ident("a type name")?;
        match word.as_str() {
            "list" | "group" => {
                // `list of T` / `group of T`
                let of = self.expect_ident("'of' in the collection type")?;
                if of != "of" {
                    self.error_here(
                        "parse.unexpected_token",
                        format!("expected 'of' after '{}'", word),
                    );
                    return Err(Abort);
                }
                let elem = self.parse_type()?;
                Ok(if word == "list" {
                    Ty::ListOf(Box::new(elem))
                } else {
                    Ty::GroupOf(Box::new(elem))
                })
            }
            _ => Ok(Ty::from_name(&word).unwrap_or(Ty::Record(word))),
        }
    }

    // =====================================================================
    // Expressions
    // =====================================================================

    pub(crate) fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.check_kw(Keyword::Or) {
            let span = self.here();
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.check_kw(Keyword::And) {
            let span = self.here();
            self.bump();
            let rhs = self.parse_not()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> PResult<Expr> {
        if self.check_kw(Keyword::Not) {
            let span = self.here();
            self.bump();
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnOp::Not,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let lhs = self.parse_additive()?;
        let span = self.here();
        let op = match self.peek_kind() {
            TokenKind::Keyword(Keyword::Equals) | TokenKind::Keyword(Keyword::Is) => BinOp::Eq,
            TokenKind::Keyword(Keyword::DoesNotEqual) | TokenKind::Keyword(Keyword::IsNot) => {
                BinOp::Ne
            }
            TokenKind::Keyword(Keyword::IsLessThan) => BinOp::Lt,
            TokenKind::Keyword(Keyword::IsLessThanOrEqualTo) => BinOp::Le,
            TokenKind::Keyword(Keyword::IsGreaterThan) => BinOp::Gt,
            TokenKind::Keyword(Keyword::IsGreaterThanOrEqualTo) => BinOp::Ge,
            TokenKind::Keyword(Keyword::IsEmpty) => {
                self.bump();
                return Ok(Expr::Unary {
                    op: UnOp::IsEmpty,
                    operand: Box::new(lhs),
                    span,
                });
            }
            TokenKind::Keyword(Keyword::IsNotEmpty) => {
                self.bump();
                return Ok(Expr::Unary {
                    op: UnOp::IsNotEmpty,
                    operand: Box::new(lhs),
                    span,
                });
            }
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span,
        })
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Keyword(Keyword::Plus) => BinOp::Add,
                TokenKind::Keyword(Keyword::Minus) => BinOp::Sub,
                _ => break,
            };
            let span = self.here();
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Keyword(Keyword::Times) => BinOp::Mul,
                TokenKind::Keyword(Keyword::DividedBy) => BinOp::Div,
                _ => break,
            };
            let span = self.here();
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        if self.check_kw(Keyword::Minus) {
            let span = self.here();
            self.bump();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Neg,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        while self.check(TokenKind::Dot) {
            let span = self.here();
            self.bump();
            let field = self.expect_ident("a field name after '.'")?;
            expr = Expr::Property {
                object: Box::new(expr),
                field,
                span,
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let span = self.here();
        match self.peek_kind().clone() {
            TokenKind::IntLit(value) => {
                self.bump();
                Ok(Expr::IntLit { value, span })
            }
            TokenKind::DecimalLit(value) => {
                self.bump();
                Ok(Expr::DecimalLit { value, span })
            }
            TokenKind::TextLit(pieces) => {
                self.bump();
                self.text_literal(&pieces, span)
            }
            TokenKind::Keyword(Keyword::True) => {
                self.bump();
                Ok(Expr::FlagLit { value: true, span })
            }
            TokenKind::Keyword(Keyword::False) => {
                self.bump();
                Ok(Expr::FlagLit { value: false, span })
            }
            TokenKind::Keyword(Keyword::Format) => {
                self.bump();
                let operand = self.parse_postfix()?;
                self.expect_kw(Keyword::As, "expected 'as' in the format expression")?;
                let pattern = match self.peek_kind().clone() {
                    TokenKind::TextLit(pieces) => {
                        self.bump();
                        text_pieces_to_plain(&pieces)
                    }
                    _ => {
                        self.error_here(
                            "parse.unexpected_token",
                            "expected a quoted format pattern after 'as'",
                        );
                        return Err(Abort);
                    }
                };
                Ok(Expr::FormatExpr {
                    operand: Box::new(operand),
                    pattern,
                    span,
                })
            }
            TokenKind::Ident(name) => {
                self.bump();
                Ok(Expr::Ident { name, span })
            }
            TokenKind::Keyword(Keyword::Call) => {
                // HTTP call in expression position (the statement form
                // handles `into` binding)
                self.error_here(
                    "parse.unexpected_token",
                    "'call' is a statement; use 'call ... into <name>' and read the variable",
                );
                Err(Abort)
            }
            TokenKind::LParen => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen, "expected ')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.bump();
                let mut elements = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        elements.push(self.parse_expr()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket, "expected ']' to close the collection")?;
                Ok(Expr::Collection { elements, span })
            }
            other => {
                self.diagnostics.push(Diagnostic::error(
                    "parse.unexpected_token",
                    format!(
                        "expected an expression, found {}",
                        Token::new(other, span).describe()
                    ),
                    span,
                ));
                Err(Abort)
            }
        }
    }

    /// Build a text literal expression, re-parsing interpolation chunks.
    fn text_literal(&mut self, pieces: &[TextPiece], span: Span) -> PResult<Expr> {
        let mut parts = Vec::new();
        for piece in pieces {
            match piece {
                TextPiece::Lit(s) => parts.push(TextPart::Lit(s.clone())),
                TextPiece::Interp(src, _col) => {
                    let sub = Parser::new(src, self.file);
                    let (expr, diags) = sub.parse_embedded_expr(span);
                    self.diagnostics.extend(diags);
                    match expr {
                        Some(e) => parts.push(TextPart::Expr(Box::new(e))),
                        None => return Err(Abort),
                    }
                }
            }
        }
        Ok(Expr::TextLit { parts, span })
    }

    /// Parse a standalone expression (an interpolation chunk). The chunk
    /// inherits the span of its enclosing string for diagnostics.
    fn parse_embedded_expr(mut self, span: Span) -> (Option<Expr>, Vec<Diagnostic>) {
        let parsed = self.parse_expr();
        let trailing = !matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Eof
        );
        let mut diags = self.diagnostics;
        // Re-anchor chunk diagnostics at the enclosing string's position
        for d in &mut diags {
            d.span = span;
        }
        match parsed {
            Ok(expr) => {
                if trailing {
                    diags.push(Diagnostic::error(
                        "parse.trailing_content",
                        "trailing content after the interpolated expression",
                        span,
                    ));
                    return (None, diags);
                }
                (Some(expr), diags)
            }
            Err(Abort) => (None, diags),
        }
    }

    // =====================================================================
    // Token helpers
    // =====================================================================

    /// Parse statements until one of the closing keywords is next (not
    /// consumed). Reports a missing-end diagnostic at EOF.
    fn parse_block(&mut self, closers: &[Keyword]) -> PResult<Vec<Stmt>> {
        self.expect_terminator()?;
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if closers.iter().any(|&c| self.check_kw(c)) {
                return Ok(body);
            }
            if self.at_eof() {
                let names: Vec<&str> = closers.iter().map(|c| c.as_str()).collect();
                self.error_here(
                    "parse.missing_end",
                    format!("missing '{}' before end of file", names.join("' or '")),
                );
                return Err(Abort);
            }
            match self.parse_statement() {
                Ok(stmt) => body.push(stmt),
                Err(Abort) => self.synchronize(),
            }
        }
    }

    /// Skip to the next statement boundary after a parse error.
    fn synchronize(&mut self) {
        while !self.at_eof() {
            if matches!(self.peek_kind(), TokenKind::Newline) {
                self.bump();
                return;
            }
            self.bump();
        }
    }

    fn here(&self) -> Span {
        self.peek().span
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn bump(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek_kind(), TokenKind::Newline) {
            self.bump();
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        *self.peek_kind() == kind
    }

    fn check_kw(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        if self.check_kw(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, message: impl Into<String>) -> PResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            self.error_here("parse.unexpected_token", message.into());
            Err(Abort)
        }
    }

    fn expect_kw(&mut self, kw: Keyword, message: impl Into<String>) -> PResult<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            let kind = if matches!(
                kw,
                Keyword::EndWhen
                    | Keyword::EndWhile
                    | Keyword::EndFor
                    | Keyword::EndAction
                    | Keyword::EndTask
                    | Keyword::EndData
                    | Keyword::EndModule
                    | Keyword::EndFragment
                    | Keyword::EndScreen
                    | Keyword::EndSlot
                    | Keyword::EndServe
                    | Keyword::EndHeaders
                    | Keyword::EndLayout
            ) {
                "parse.missing_end"
            } else {
                "parse.unexpected_token"
            };
            self.error_here(kind, message.into());
            Err(Abort)
        }
    }

    fn expect_ident(&mut self, what: &str) -> PResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(name)
            }
            other => {
                let span = self.here();
                self.diagnostics.push(Diagnostic::error(
                    "parse.unexpected_token",
                    format!("expected {}, found {}", what, Token::new(other, span).describe()),
                    span,
                ));
                Err(Abort)
            }
        }
    }

    /// Statements end at a newline (or EOF).
    fn expect_terminator(&mut self) -> PResult<()> {
        match self.peek_kind() {
            TokenKind::Newline => {
                self.bump();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => {
                let desc = self.peek().describe();
                self.error_here(
                    "parse.trailing_content",
                    format!("unexpected {} after the statement", desc),
                );
                Err(Abort)
            }
        }
    }

    fn error_here(&mut self, kind: &str, message: impl Into<String>) {
        let span = self.here();
        self.diagnostics
            .push(Diagnostic::error(kind, message.into(), span));
    }
}

fn text_pieces_to_plain(pieces: &[TextPiece]) -> String {
    pieces
        .iter()
        .map(|p| match p {
            TextPiece::Lit(s) => s.as_str(),
            TextPiece::Interp(s, _) => s.as_str(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::has_errors;

    fn parse_ok(source: &str) -> Program {
        let (program, diags) = Parser::new(source, FileId(0)).parse();
        assert!(!has_errors(&diags), "unexpected errors: {:?}", diags);
        program
    }

    fn parse_err(source: &str) -> Vec<Diagnostic> {
        let (_, diags) = Parser::new(source, FileId(0)).parse();
        assert!(has_errors(&diags), "expected errors, got none");
        diags
    }

    #[test]
    fn test_parse_display() {
        let program = parse_ok("display \"Hello, World!\"\n");
        assert_eq!(program.body.len(), 1);
        match &program.body[0] {
            Stmt::Display { expr, .. } => match expr {
                Expr::TextLit { parts, .. } => {
                    assert_eq!(parts, &vec![TextPart::Lit("Hello, World!".to_string())]);
                }
                other => panic!("expected text literal, got {:?}", other),
            },
            other => panic!("expected display, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_set_with_type() {
        let program = parse_ok("set price which is decimal to 1234.56\n");
        match &program.body[0] {
            Stmt::Set {
                name,
                declared,
                value,
                ..
            } => {
                assert_eq!(name, "price");
                assert_eq!(declared, &Some(Ty::Decimal));
                assert_eq!(
                    value,
                    &Expr::DecimalLit {
                        value: 123456,
                        span: value.span()
                    }
                );
            }
            other => panic!("expected set, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_set_collection_type() {
        let program = parse_ok("set xs which are list of int to [1, 2, 3]\n");
        match &program.body[0] {
            Stmt::Set { declared, value, .. } => {
                assert_eq!(declared, &Some(Ty::ListOf(Box::new(Ty::Int))));
                assert!(matches!(value, Expr::Collection { elements, .. } if elements.len() == 3));
            }
            other => panic!("expected set, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_set_from_action() {
        let program = parse_ok("set s which is int from add with 10, 5\n");
        match &program.body[0] {
            Stmt::Set { value, .. } => match value {
                Expr::Invoke { module, action, args, .. } => {
                    assert!(module.is_none());
                    assert_eq!(action, "add");
                    assert_eq!(args.len(), 2);
                }
                other => panic!("expected invoke, got {:?}", other),
            },
            other => panic!("expected set, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let program = parse_ok("set x to 1 plus 2 times 3\n");
        match &program.body[0] {
            Stmt::Set { value, .. } => match value {
                Expr::Binary { op: BinOp::Add, rhs, .. } => {
                    assert!(matches!(**rhs, Expr::Binary { op: BinOp::Mul, .. }));
                }
                other => panic!("expected plus at the top, got {:?}", other),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_precedence_comparison_over_and() {
        let program = parse_ok("set ok to a is less than 3 and b is greater than 1\n");
        match &program.body[0] {
            Stmt::Set { value, .. } => {
                assert!(matches!(value, Expr::Binary { op: BinOp::And, .. }));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parens_override_precedence() {
        let program = parse_ok("set x to (1 plus 2) times 3\n");
        match &program.body[0] {
            Stmt::Set { value, .. } => {
                assert!(matches!(value, Expr::Binary { op: BinOp::Mul, .. }));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_while_loop() {
        let source = "set counter to 1\nwhile counter is less than or equal to 3\n  display counter\n  set counter to counter plus 1\nend while\n";
        let program = parse_ok(source);
        assert_eq!(program.body.len(), 2);
        match &program.body[1] {
            Stmt::While { cond, body, .. } => {
                assert!(matches!(cond, Expr::Binary { op: BinOp::Le, .. }));
                assert_eq!(body.len(), 2);
            }
            other => panic!("expected while, got {:?}", other),
        }
    }

    #[test]
    fn test_when_chain() {
        let source = "when score is greater than or equal to 90 then\n  display \"A\"\notherwise when score is greater than or equal to 80 then\n  display \"B\"\notherwise\n  display \"F\"\nend when\n";
        let program = parse_ok(source);
        match &program.body[0] {
            Stmt::When { arms, otherwise, .. } => {
                assert_eq!(arms.len(), 2);
                assert!(otherwise.is_some());
            }
            other => panic!("expected when, got {:?}", other),
        }
    }

    #[test]
    fn test_single_line_when() {
        let program = parse_ok("when done then display \"yes\"\n");
        match &program.body[0] {
            Stmt::When { arms, otherwise, .. } => {
                assert_eq!(arms.len(), 1);
                assert_eq!(arms[0].1.len(), 1);
                assert!(otherwise.is_none());
            }
            other => panic!("expected when, got {:?}", other),
        }
    }

    #[test]
    fn test_for_each() {
        let program = parse_ok("for each item in items\n  display item\nend for\n");
        match &program.body[0] {
            Stmt::ForEach { var, body, .. } => {
                assert_eq!(var, "item");
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected for each, got {:?}", other),
        }
    }

    #[test]
    fn test_action_definition() {
        let source = "action add with a which is int, b which is int gives int\n  give a plus b\nend action\n";
        let program = parse_ok(source);
        match &program.body[0] {
            Stmt::Action(def) => {
                assert_eq!(def.name, "add");
                assert_eq!(def.params.len(), 2);
                assert_eq!(def.returns, Some(Ty::Int));
                assert!(!def.is_task);
                assert!(matches!(def.body[0], Stmt::Give { .. }));
            }
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_task_cannot_give_type() {
        let diags = parse_err("task log with m which is text gives int\nend task\n");
        assert!(diags.iter().any(|d| d.kind == "parse.unexpected_token"));
    }

    #[test]
    fn test_module_with_action() {
        let source = "module math\n  action double with n which is int gives int\n    give n times 2\n  end action\nend module\n";
        let program = parse_ok(source);
        match &program.body[0] {
            Stmt::Module { name, body, .. } => {
                assert_eq!(name, "math");
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected module, got {:?}", other),
        }
    }

    #[test]
    fn test_qualified_invocation() {
        let program = parse_ok("set x which is int from math.double with 4\n");
        match &program.body[0] {
            Stmt::Set { value, .. } => match value {
                Expr::Invoke { module, action, .. } => {
                    assert_eq!(module.as_deref(), Some("math"));
                    assert_eq!(action, "double");
                }
                other => panic!("expected invoke, got {:?}", other),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_data_definition() {
        let source = "data User\n  id is text key auto\n  name is text required\n  age is int optional\nend data\n";
        let program = parse_ok(source);
        match &program.body[0] {
            Stmt::Data(def) => {
                assert_eq!(def.name, "User");
                assert_eq!(def.fields.len(), 3);
                assert_eq!(
                    def.fields[0].annotations,
                    vec![Annotation::Key, Annotation::Auto]
                );
            }
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[test]
    fn test_data_default_annotation() {
        let source = "data Config\n  retries is int default 3\nend data\n";
        let program = parse_ok(source);
        match &program.body[0] {
            Stmt::Data(def) => {
                assert!(matches!(
                    def.fields[0].annotations[0],
                    Annotation::Default(Expr::IntLit { value: 3, .. })
                ));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_serve_endpoint() {
        let source = "serve get /users/:id\n  respond 200 with \"user-\" plus id\nend serve\n";
        let program = parse_ok(source);
        match &program.body[0] {
            Stmt::Serve(def) => {
                assert_eq!(def.method, HttpMethod::Get);
                assert_eq!(def.path, "/users/:id");
                assert_eq!(def.path_params, vec!["id".to_string()]);
                assert!(matches!(def.body[0], Stmt::Respond { .. }));
            }
            other => panic!("expected serve, got {:?}", other),
        }
    }

    #[test]
    fn test_http_call() {
        let source = "call \"https://api.example.com/users\" method GET using headers\n  \"Accept\": \"application/json\"\nend headers into result\n";
        let program = parse_ok(source);
        match &program.body[0] {
            Stmt::HttpCall { call, into, .. } => {
                assert_eq!(into.as_deref(), Some("result"));
                match call {
                    Expr::HttpCall { method, headers, .. } => {
                        assert_eq!(*method, HttpMethod::Get);
                        assert_eq!(headers.len(), 1);
                        assert_eq!(headers[0].0, "Accept");
                    }
                    other => panic!("expected http call, got {:?}", other),
                }
            }
            other => panic!("expected call statement, got {:?}", other),
        }
    }

    #[test]
    fn test_db_statements() {
        let program = parse_ok("db create User with name is \"Ada\", age is 36\n");
        match &program.body[0] {
            Stmt::Db { op, entity, fields, .. } => {
                assert_eq!(*op, DbOpCode::Create);
                assert_eq!(entity, "User");
                assert_eq!(fields.len(), 2);
            }
            other => panic!("expected db, got {:?}", other),
        }

        let program = parse_ok("db find all User into users\n");
        match &program.body[0] {
            Stmt::Db { op, into, .. } => {
                assert_eq!(*op, DbOpCode::FindAll);
                assert_eq!(into.as_deref(), Some("users"));
            }
            _ => unreachable!(),
        }

        let program = parse_ok("db update User where id equals uid set name is \"Grace\"\n");
        match &program.body[0] {
            Stmt::Db { op, filter, sets, .. } => {
                assert_eq!(*op, DbOpCode::Update);
                assert!(filter.is_some());
                assert_eq!(sets.len(), 1);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_ui_screen_with_fragment() {
        let source = "fragment Header\n  slot title_area\n    text \"default\"\n  end slot\nend fragment\nscreen Home\n  fragment Header\n    slot title_area\n      title \"Welcome\"\n    end slot\n  end fragment\n  button \"Save\"\nend screen\n";
        let program = parse_ok(source);
        assert_eq!(program.body.len(), 2);
        match &program.body[1] {
            Stmt::Ui(node) => {
                assert_eq!(node.kind, UiKind::Screen);
                assert_eq!(node.name.as_deref(), Some("Home"));
                assert_eq!(node.children.len(), 2);
                assert_eq!(node.children[0].kind, UiKind::Fragment);
            }
            other => panic!("expected ui, got {:?}", other),
        }
    }

    #[test]
    fn test_metadata_and_include() {
        let source = "@name Demo App\n@target bytecode\n@include Utils from \"lib/utils\"\nset x to 1\n";
        let program = parse_ok(source);
        assert_eq!(program.meta("name"), Some("Demo App"));
        assert_eq!(program.meta("target"), Some("bytecode"));
        assert_eq!(program.includes.len(), 1);
        assert_eq!(program.includes[0].name, "Utils");
        assert_eq!(program.includes[0].path, "lib/utils");
    }

    #[test]
    fn test_interpolated_string_parses_expression() {
        let program = parse_ok("display \"Grade: [grade] - nice\"\n");
        match &program.body[0] {
            Stmt::Display { expr, .. } => match expr {
                Expr::TextLit { parts, .. } => {
                    assert_eq!(parts.len(), 3);
                    assert!(matches!(&parts[1], TextPart::Expr(e)
                        if matches!(**e, Expr::Ident { ref name, .. } if name == "grade")));
                }
                other => panic!("expected interpolation, got {:?}", other),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_missing_end_reported() {
        let diags = parse_err("while x is less than 3\n  display x\n");
        assert!(diags.iter().any(|d| d.kind == "parse.missing_end"));
    }

    #[test]
    fn test_error_recovery_collects_multiple_errors() {
        let source = "set to 1\nset x to 2\nset to 3\n";
        let (program, diags) = Parser::new(source, FileId(0)).parse();
        // Both bad lines produce an error; the good line still parses
        assert!(diags.iter().filter(|d| d.kind.starts_with("parse.")).count() >= 2);
        assert_eq!(program.body.len(), 1);
    }

    #[test]
    fn test_trailing_content_reported() {
        let diags = parse_err("display 1 2\n");
        assert!(diags.iter().any(|d| d.kind == "parse.trailing_content"));
    }

    #[test]
    fn test_unary_minus_and_not() {
        let program = parse_ok("set x to minus 4 plus 2\nset y to not done\n");
        match &program.body[0] {
            Stmt::Set { value, .. } => match value {
                Expr::Binary { op: BinOp::Add, lhs, .. } => {
                    assert!(matches!(**lhs, Expr::Unary { op: UnOp::Neg, .. }));
                }
                other => panic!("expected add, got {:?}", other),
            },
            _ => unreachable!(),
        }
        match &program.body[1] {
            Stmt::Set { value, .. } => {
                assert!(matches!(value, Expr::Unary { op: UnOp::Not, .. }));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_is_empty_postfix() {
        let program = parse_ok("when items is empty then display \"none\"\n");
        match &program.body[0] {
            Stmt::When { arms, .. } => {
                assert!(matches!(&arms[0].0, Expr::Unary { op: UnOp::IsEmpty, .. }));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_property_access() {
        let program = parse_ok("display request.body\n");
        match &program.body[0] {
            Stmt::Display { expr, .. } => {
                assert!(matches!(expr, Expr::Property { field, .. } if field == "body"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_bare_task_invocation() {
        let program = parse_ok("log_message with \"hi\"\n");
        match &program.body[0] {
            Stmt::Invoke { call, .. } => {
                assert!(matches!(call, Expr::Invoke { action, .. } if action == "log_message"));
            }
            other => panic!("expected invoke, got {:?}", other),
        }
    }
}
