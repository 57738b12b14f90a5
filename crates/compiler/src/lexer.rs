//! Lexer for Droe source
//!
//! Consumes UTF-8 text and produces a token stream with source positions.
//! Multi-word operator keywords (`is greater than or equal to`,
//! `divided by`, `end when`, ...) are scanned longest-match-first as
//! single tokens. Interpolation markers `[` ... `]` appear only inside
//! string literals and are captured as sub-pieces of the text token;
//! outside strings, brackets delimit collection literals.
//!
//! Lexing never aborts: malformed input produces `lex.*` diagnostics and
//! the lexer continues, so one file yields a full list of errors.

use crate::diagnostics::Diagnostic;
use crate::token::{FileId, Keyword, Span, TextPiece, Token, TokenKind};

/// Multi-word keywords ordered longest first so greedy matching is
/// correct by construction.
const MULTI_WORD: &[(&[&str], Keyword)] = &[
    (
        &["is", "greater", "than", "or", "equal", "to"],
        Keyword::IsGreaterThanOrEqualTo,
    ),
    (
        &["is", "less", "than", "or", "equal", "to"],
        Keyword::IsLessThanOrEqualTo,
    ),
    (&["is", "greater", "than"], Keyword::IsGreaterThan),
    (&["is", "less", "than"], Keyword::IsLessThan),
    (&["is", "not", "empty"], Keyword::IsNotEmpty),
    (&["does", "not", "equal"], Keyword::DoesNotEqual),
    (&["is", "empty"], Keyword::IsEmpty),
    (&["is", "not"], Keyword::IsNot),
    (&["divided", "by"], Keyword::DividedBy),
    (&["for", "each"], Keyword::ForEach),
    (&["otherwise", "when"], Keyword::OtherwiseWhen),
    (&["find", "all"], Keyword::FindAll),
    (&["end", "when"], Keyword::EndWhen),
    (&["end", "while"], Keyword::EndWhile),
    (&["end", "for"], Keyword::EndFor),
    (&["end", "action"], Keyword::EndAction),
    (&["end", "task"], Keyword::EndTask),
    (&["end", "data"], Keyword::EndData),
    (&["end", "module"], Keyword::EndModule),
    (&["end", "fragment"], Keyword::EndFragment),
    (&["end", "screen"], Keyword::EndScreen),
    (&["end", "slot"], Keyword::EndSlot),
    (&["end", "serve"], Keyword::EndServe),
    (&["end", "headers"], Keyword::EndHeaders),
    (&["end", "layout"], Keyword::EndLayout),
];

/// Single-word keyword lookup.
fn single_keyword(word: &str) -> Option<Keyword> {
    let kw = match word {
        "set" => Keyword::Set,
        "to" => Keyword::To,
        "which" => Keyword::Which,
        "is" => Keyword::Is,
        "are" => Keyword::Are,
        "from" => Keyword::From,
        "with" => Keyword::With,
        "display" => Keyword::Display,
        "when" => Keyword::When,
        "then" => Keyword::Then,
        "otherwise" => Keyword::Otherwise,
        "while" => Keyword::While,
        "in" => Keyword::In,
        "action" => Keyword::Action,
        "task" => Keyword::Task,
        "gives" => Keyword::Gives,
        "give" => Keyword::Give,
        "module" => Keyword::Module,
        "data" => Keyword::Data,
        "serve" => Keyword::Serve,
        "respond" => Keyword::Respond,
        "call" => Keyword::Call,
        "method" => Keyword::Method,
        "using" => Keyword::Using,
        "headers" => Keyword::Headers,
        "into" => Keyword::Into,
        "db" => Keyword::Db,
        "create" => Keyword::Create,
        "find" => Keyword::Find,
        "update" => Keyword::Update,
        "delete" => Keyword::Delete,
        "where" => Keyword::Where,
        "format" => Keyword::Format,
        "as" => Keyword::As,
        "screen" => Keyword::Screen,
        "fragment" => Keyword::Fragment,
        "slot" => Keyword::Slot,
        "layout" => Keyword::Layout,
        "and" => Keyword::And,
        "or" => Keyword::Or,
        "not" => Keyword::Not,
        "plus" => Keyword::Plus,
        "minus" => Keyword::Minus,
        "times" => Keyword::Times,
        "equals" => Keyword::Equals,
        "true" => Keyword::True,
        "false" => Keyword::False,
        _ => return None,
    };
    Some(kw)
}

pub struct Lexer<'a> {
    source: &'a [u8],
    file: FileId,
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file: FileId) -> Self {
        Lexer {
            source: source.as_bytes(),
            file,
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Tokenize the whole input. Always returns the tokens it managed to
    /// produce together with any diagnostics.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<Diagnostic>) {
        while !self.at_end() {
            self.scan_token();
        }
        let span = self.here();
        // Guarantee a trailing statement terminator before Eof so the
        // parser never special-cases a missing final newline.
        if !matches!(
            self.tokens.last().map(|t| &t.kind),
            Some(TokenKind::Newline) | None
        ) {
            self.tokens.push(Token::new(TokenKind::Newline, span));
        }
        self.tokens.push(Token::new(TokenKind::Eof, span));
        (self.tokens, self.diagnostics)
    }

    fn scan_token(&mut self) {
        let c = self.peek();
        match c {
            b' ' | b'\t' | b'\r' => {
                self.bump();
            }
            b'\n' => {
                let span = self.here();
                self.bump();
                // Collapse runs of blank lines into one terminator
                if !matches!(self.tokens.last().map(|t| &t.kind), Some(TokenKind::Newline)) {
                    self.tokens.push(Token::new(TokenKind::Newline, span));
                }
            }
            b'/' => self.scan_slash(),
            b'"' | b'\'' => self.scan_string(c),
            b'-' => {
                if self.peek_at(1).is_ascii_digit() {
                    self.scan_number();
                } else {
                    let span = self.here();
                    self.bump();
                    self.diagnostics.push(Diagnostic::error(
                        "lex.invalid_char",
                        "unexpected '-' (write 'minus' for subtraction and negation)",
                        span,
                    ));
                }
            }
            b'0'..=b'9' => self.scan_number(),
            b'@' => self.scan_metadata(),
            b'(' => self.punct(TokenKind::LParen),
            b')' => self.punct(TokenKind::RParen),
            b',' => self.punct(TokenKind::Comma),
            b'.' => self.punct(TokenKind::Dot),
            b':' => self.punct(TokenKind::Colon),
            b'[' => self.punct(TokenKind::LBracket),
            b']' => self.punct(TokenKind::RBracket),
            c if c.is_ascii_alphabetic() || c == b'_' => self.scan_word(),
            other => {
                let span = self.here();
                self.bump();
                self.diagnostics.push(Diagnostic::error(
                    "lex.invalid_char",
                    format!("invalid character '{}'", other as char),
                    span,
                ));
            }
        }
    }

    /// `/` starts a comment (`//`, `/*`) or a URL-style path literal
    /// (`/users/:id`).
    fn scan_slash(&mut self) {
        match self.peek_at(1) {
            b'/' => {
                while !self.at_end() && self.peek() != b'\n' {
                    self.bump();
                }
            }
            b'*' => self.scan_block_comment(),
            _ => self.scan_path(),
        }
    }

    fn scan_block_comment(&mut self) {
        let start = self.here();
        self.bump(); // '/'
        self.bump(); // '*'
        loop {
            if self.at_end() {
                self.diagnostics.push(Diagnostic::error(
                    "lex.unterminated_comment",
                    "block comment is never closed",
                    start,
                ));
                return;
            }
            if self.peek() == b'*' && self.peek_at(1) == b'/' {
                self.bump();
                self.bump();
                return;
            }
            self.bump();
        }
    }

    fn scan_path(&mut self) {
        let span = self.here();
        let start = self.pos;
        while !self.at_end() && !self.peek().is_ascii_whitespace() {
            self.bump();
        }
        let path = std::str::from_utf8(&self.source[start..self.pos])
            .unwrap_or("/")
            .to_string();
        self.tokens.push(Token::new(TokenKind::PathLit(path), span));
    }

    /// `@include ...` continues as ordinary tokens; any other `@key`
    /// captures the rest of the line verbatim as the metadata value.
    fn scan_metadata(&mut self) {
        let span = self.here();
        self.bump(); // '@'
        let start = self.pos;
        while !self.at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == b'_') {
            self.bump();
        }
        let key = std::str::from_utf8(&self.source[start..self.pos])
            .unwrap_or("")
            .to_string();
        if key.is_empty() {
            self.diagnostics.push(Diagnostic::error(
                "lex.invalid_char",
                "expected a metadata key after '@'",
                span,
            ));
            return;
        }
        if key == "include" {
            self.tokens.push(Token::new(TokenKind::AtInclude, span));
            return;
        }
        let value_start = self.pos;
        while !self.at_end() && self.peek() != b'\n' {
            self.bump();
        }
        let value = std::str::from_utf8(&self.source[value_start..self.pos])
            .unwrap_or("")
            .trim()
            .to_string();
        self.tokens
            .push(Token::new(TokenKind::Meta { key, value }, span));
    }

    fn scan_number(&mut self) {
        let span = self.here();
        let start = self.pos;
        if self.peek() == b'-' {
            self.bump();
        }
        while !self.at_end() && self.peek().is_ascii_digit() {
            self.bump();
        }
        let mut is_decimal = false;
        if !self.at_end() && self.peek() == b'.' && self.peek_at(1).is_ascii_digit() {
            is_decimal = true;
            self.bump();
            while !self.at_end() && self.peek().is_ascii_digit() {
                self.bump();
            }
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap_or("0");
        if is_decimal {
            match parse_scaled_decimal(text) {
                Some(scaled) => self
                    .tokens
                    .push(Token::new(TokenKind::DecimalLit(scaled), span)),
                None => self.diagnostics.push(Diagnostic::error(
                    "lex.overflow",
                    format!("decimal literal '{}' does not fit a 64-bit scaled value", text),
                    span,
                )),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) if v >= i32::MIN as i64 && v <= i32::MAX as i64 => self
                    .tokens
                    .push(Token::new(TokenKind::IntLit(v as i32), span)),
                _ => self.diagnostics.push(Diagnostic::error(
                    "lex.overflow",
                    format!("int literal '{}' does not fit 32 bits", text),
                    span,
                )),
            }
        }
    }

    fn scan_string(&mut self, quote: u8) {
        let span = self.here();
        self.bump(); // opening quote
        let mut pieces: Vec<TextPiece> = Vec::new();
        let mut current = String::new();
        loop {
            if self.at_end() || self.peek() == b'\n' {
                self.diagnostics.push(Diagnostic::error(
                    "lex.unterminated_string",
                    "string literal is missing its closing quote",
                    span,
                ));
                return;
            }
            let c = self.peek();
            if c == quote {
                self.bump();
                break;
            }
            if c == b'\\' {
                self.bump();
                let escaped = if self.at_end() { 0 } else { self.peek() };
                match escaped {
                    b'n' => current.push('\n'),
                    b't' => current.push('\t'),
                    b'\\' => current.push('\\'),
                    b'"' => current.push('"'),
                    b'\'' => current.push('\''),
                    other => {
                        self.diagnostics.push(Diagnostic::error(
                            "lex.bad_escape",
                            format!(
                                "unknown escape sequence '\\{}' (supported: \\n \\t \\\\ \\\" \\')",
                                other as char
                            ),
                            self.here(),
                        ));
                    }
                }
                if !self.at_end() {
                    self.bump();
                }
                continue;
            }
            if c == b'[' {
                // Interpolation chunk: capture the expression text for the
                // parser to re-lex.
                if !current.is_empty() {
                    pieces.push(TextPiece::Lit(std::mem::take(&mut current)));
                }
                self.bump();
                let expr_col = self.column;
                let expr_start = self.pos;
                let mut depth = 1usize;
                while !self.at_end() && self.peek() != b'\n' {
                    match self.peek() {
                        b'[' => depth += 1,
                        b']' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    self.bump();
                }
                if depth != 0 {
                    self.diagnostics.push(Diagnostic::error(
                        "lex.unterminated_string",
                        "interpolation is missing its closing ']'",
                        span,
                    ));
                    return;
                }
                let expr = std::str::from_utf8(&self.source[expr_start..self.pos])
                    .unwrap_or("")
                    .to_string();
                self.bump(); // ']'
                pieces.push(TextPiece::Interp(expr, expr_col));
                continue;
            }
            // Multi-byte UTF-8 sequences pass through untouched
            let ch_len = utf8_len(c);
            let end = (self.pos + ch_len).min(self.source.len());
            if let Ok(s) = std::str::from_utf8(&self.source[self.pos..end]) {
                current.push_str(s);
            }
            for _ in 0..ch_len {
                if !self.at_end() {
                    self.bump();
                }
            }
        }
        if !current.is_empty() || pieces.is_empty() {
            pieces.push(TextPiece::Lit(current));
        }
        self.tokens.push(Token::new(TokenKind::TextLit(pieces), span));
    }

    fn scan_word(&mut self) {
        let span = self.here();
        let first = self.read_word();

        // Longest-match-first: try to extend this word into a multi-word
        // keyword by peeking whole words ahead.
        if MULTI_WORD.iter().any(|(words, _)| words[0] == first) {
            let mut best: Option<(Keyword, usize)> = None;
            for (words, kw) in MULTI_WORD {
                if words[0] != first {
                    continue;
                }
                if let Some(consumed) = self.peek_words_match(&words[1..]) {
                    if best.map(|(_, len)| consumed > len).unwrap_or(true) {
                        best = Some((*kw, consumed));
                    }
                }
            }
            if let Some((kw, consumed)) = best {
                for _ in 0..consumed {
                    self.bump();
                }
                self.tokens.push(Token::new(TokenKind::Keyword(kw), span));
                return;
            }
        }

        let kind = match single_keyword(&first) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(first),
        };
        self.tokens.push(Token::new(kind, span));
    }

    /// Check whether the upcoming input consists of exactly the given
    /// words separated by spaces/tabs. Returns the byte count to consume
    /// on success.
    fn peek_words_match(&self, words: &[&str]) -> Option<usize> {
        let mut offset = 0usize;
        for word in words {
            // At least one blank between words
            let mut saw_space = false;
            while matches!(self.peek_at(offset), b' ' | b'\t') {
                saw_space = true;
                offset += 1;
            }
            if !saw_space {
                return None;
            }
            for expected in word.bytes() {
                if self.peek_at(offset) != expected {
                    return None;
                }
                offset += 1;
            }
            // The match must end at a word boundary
            let next = self.peek_at(offset);
            if next.is_ascii_alphanumeric() || next == b'_' {
                return None;
            }
        }
        Some(offset)
    }

    fn read_word(&mut self) -> String {
        let start = self.pos;
        while !self.at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == b'_') {
            self.bump();
        }
        std::str::from_utf8(&self.source[start..self.pos])
            .unwrap_or("")
            .to_string()
    }

    fn punct(&mut self, kind: TokenKind) {
        let span = self.here();
        self.bump();
        self.tokens.push(Token::new(kind, span));
    }

    fn here(&self) -> Span {
        Span::new(self.file, self.line, self.column)
    }

    fn peek(&self) -> u8 {
        self.source.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.source.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn bump(&mut self) {
        if let Some(&c) = self.source.get(self.pos) {
            self.pos += 1;
            if c == b'\n' {
                self.line += 1;
                self.column = 1;
            } else if c & 0xC0 != 0x80 {
                // Count characters, not continuation bytes
                self.column += 1;
            }
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b & 0xE0 == 0xC0 => 2,
        b if b & 0xF0 == 0xE0 => 3,
        _ => 4,
    }
}

/// Parse `digits.digits` into the scale-100 representation, rounding any
/// digits beyond the second fractional place.
fn parse_scaled_decimal(text: &str) -> Option<i64> {
    let negative = text.starts_with('-');
    let body = text.strip_prefix('-').unwrap_or(text);
    let (int_part, frac_part) = body.split_once('.')?;
    let whole: i128 = int_part.parse().ok()?;
    let mut frac: i128 = 0;
    let mut digits = frac_part.bytes();
    for _ in 0..2 {
        frac = frac * 10
            + digits
                .next()
                .map(|d| (d - b'0') as i128)
                .unwrap_or(0);
    }
    if let Some(next) = digits.next() {
        if next >= b'5' {
            frac += 1;
        }
    }
    let mut scaled = whole.checked_mul(100)?.checked_add(frac)?;
    if negative {
        scaled = -scaled;
    }
    if scaled >= i64::MIN as i128 && scaled <= i64::MAX as i128 {
        Some(scaled as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
        Lexer::new(source, FileId(0)).tokenize()
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, diags) = lex(source);
        assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_multi_word_longest_match() {
        let kinds = kinds("counter is greater than or equal to 3");
        assert_eq!(
            kinds[..3],
            [
                TokenKind::Ident("counter".to_string()),
                TokenKind::Keyword(Keyword::IsGreaterThanOrEqualTo),
                TokenKind::IntLit(3),
            ]
        );
    }

    #[test]
    fn test_shorter_multi_word_still_matches() {
        let kinds1 = kinds("x is greater than 1");
        assert_eq!(kinds1[1], TokenKind::Keyword(Keyword::IsGreaterThan));
        let kinds2 = kinds("x is not y");
        assert_eq!(kinds2[1], TokenKind::Keyword(Keyword::IsNot));
        let kinds3 = kinds("xs is empty");
        assert_eq!(kinds3[1], TokenKind::Keyword(Keyword::IsEmpty));
    }

    #[test]
    fn test_multi_word_requires_word_boundary() {
        // "is greater thanx" must not lex as "is greater than"
        let (tokens, _) = lex("a is greater thanx");
        assert_eq!(tokens[1].kind, TokenKind::Keyword(Keyword::Is));
        assert_eq!(tokens[2].kind, TokenKind::Ident("greater".to_string()));
    }

    #[test]
    fn test_end_keywords() {
        assert_eq!(kinds("end while")[0], TokenKind::Keyword(Keyword::EndWhile));
        assert_eq!(kinds("end action")[0], TokenKind::Keyword(Keyword::EndAction));
        assert_eq!(kinds("end when")[0], TokenKind::Keyword(Keyword::EndWhen));
    }

    #[test]
    fn test_divided_by() {
        let kinds = kinds("a divided by b");
        assert_eq!(kinds[1], TokenKind::Keyword(Keyword::DividedBy));
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(kinds("42")[0], TokenKind::IntLit(42));
        assert_eq!(kinds("-7")[0], TokenKind::IntLit(-7));
        assert_eq!(kinds("1234.56")[0], TokenKind::DecimalLit(123456));
        assert_eq!(kinds("3.1")[0], TokenKind::DecimalLit(310));
        assert_eq!(kinds("-0.45")[0], TokenKind::DecimalLit(-45));
    }

    #[test]
    fn test_int_overflow_reported() {
        let (_, diags) = lex("2147483648");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, "lex.overflow");
    }

    #[test]
    fn test_decimal_rounds_extra_digits() {
        assert_eq!(kinds("1.005")[0], TokenKind::DecimalLit(101));
        assert_eq!(kinds("1.004")[0], TokenKind::DecimalLit(100));
    }

    #[test]
    fn test_string_with_escapes() {
        let kinds = kinds(r#""line\none\ttab \"q\" done""#);
        match &kinds[0] {
            TokenKind::TextLit(pieces) => {
                assert_eq!(
                    pieces,
                    &vec![TextPiece::Lit("line\none\ttab \"q\" done".to_string())]
                );
            }
            other => panic!("expected text literal, got {:?}", other),
        }
    }

    #[test]
    fn test_single_quoted_string() {
        let kinds = kinds("'hello'");
        assert_eq!(
            kinds[0],
            TokenKind::TextLit(vec![TextPiece::Lit("hello".to_string())])
        );
    }

    #[test]
    fn test_interpolation_pieces() {
        let kinds = kinds(r#""total: [price] end""#);
        match &kinds[0] {
            TokenKind::TextLit(pieces) => {
                assert_eq!(pieces.len(), 3);
                assert_eq!(pieces[0], TextPiece::Lit("total: ".to_string()));
                assert!(matches!(&pieces[1], TextPiece::Interp(e, _) if e == "price"));
                assert_eq!(pieces[2], TextPiece::Lit(" end".to_string()));
            }
            other => panic!("expected text literal, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_string() {
        let (_, diags) = lex("\"oops");
        assert_eq!(diags[0].kind, "lex.unterminated_string");
    }

    #[test]
    fn test_comments_are_skipped() {
        let kinds = kinds("42 // trailing\n/* block\nspans lines */ 7");
        assert_eq!(kinds[0], TokenKind::IntLit(42));
        assert!(kinds.contains(&TokenKind::IntLit(7)));
    }

    #[test]
    fn test_unterminated_block_comment() {
        let (_, diags) = lex("/* never closed");
        assert_eq!(diags[0].kind, "lex.unterminated_comment");
    }

    #[test]
    fn test_path_literal() {
        let kinds = kinds("serve get /users/:id");
        assert_eq!(kinds[0], TokenKind::Keyword(Keyword::Serve));
        assert_eq!(kinds[1], TokenKind::Ident("get".to_string()));
        assert_eq!(kinds[2], TokenKind::PathLit("/users/:id".to_string()));
    }

    #[test]
    fn test_metadata_line() {
        let kinds = kinds("@name My Application\n");
        assert_eq!(
            kinds[0],
            TokenKind::Meta {
                key: "name".to_string(),
                value: "My Application".to_string()
            }
        );
    }

    #[test]
    fn test_include_lexes_as_tokens() {
        let kinds = kinds("@include Utils from \"lib/utils\"");
        assert_eq!(kinds[0], TokenKind::AtInclude);
        assert_eq!(kinds[1], TokenKind::Ident("Utils".to_string()));
        assert_eq!(kinds[2], TokenKind::Keyword(Keyword::From));
    }

    #[test]
    fn test_newlines_collapse() {
        let kinds = kinds("1\n\n\n2");
        assert_eq!(
            kinds,
            vec![
                TokenKind::IntLit(1),
                TokenKind::Newline,
                TokenKind::IntLit(2),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_positions_are_one_based() {
        let (tokens, _) = lex("set x to 1");
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[0].span.column, 1);
        assert_eq!(tokens[1].span.column, 5);
    }

    #[test]
    fn test_invalid_character() {
        let (_, diags) = lex("set x to %");
        assert_eq!(diags[0].kind, "lex.invalid_char");
    }
}
