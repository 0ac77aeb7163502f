use crate::config::Config;
use crate::error::{CrunchError, Span};
use crate::number::Number;
use std::ops::Deref;

/// Operator subkinds. Parentheses and the statement separator are listed so
/// every punctuation token maps onto exactly one operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Plus,
    Minus,
    Asterisk,
    Slash,
    Backslash,
    Caret,
    Super0,
    Super1,
    Super2,
    Super3,
    Super4,
    Super5,
    Super6,
    Super7,
    Super8,
    Super9,
    LeftPar,
    RightPar,
    Semicolon,
    Exclamation,
    Equal,
    Modulo,
    LeftShift,
    RightShift,
    Ampersand,
    Pipe,
    RightArrow,
}

impl Op {
    /// Digit value of a superscript exponent operator.
    pub fn superscript_digit(self) -> Option<u32> {
        let digit = match self {
            Op::Super0 => 0,
            Op::Super1 => 1,
            Op::Super2 => 2,
            Op::Super3 => 3,
            Op::Super4 => 4,
            Op::Super5 => 5,
            Op::Super6 => 6,
            Op::Super7 => 7,
            Op::Super8 => 8,
            Op::Super9 => 9,
            _ => return None,
        };
        Some(digit)
    }

    fn from_superscript(c: char) -> Option<Op> {
        let op = match c {
            '⁰' => Op::Super0,
            '¹' => Op::Super1,
            '²' => Op::Super2,
            '³' => Op::Super3,
            '⁴' => Op::Super4,
            '⁵' => Op::Super5,
            '⁶' => Op::Super6,
            '⁷' => Op::Super7,
            '⁸' => Op::Super8,
            '⁹' => Op::Super9,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Only used by [`Token::null`].
    Unknown,
    Number,
    Identifier,
    /// Operand that is neither a literal nor a name, e.g. the degree sign.
    Abstract,
    Operator(Op),
    OpenParen,
    CloseParen,
    /// Function-argument separator.
    Separator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: String, span: Span) -> Self {
        Self { kind, text, span }
    }

    /// The "no token" sentinel.
    pub fn null() -> Self {
        Self::new(TokenKind::Unknown, String::new(), Span::new(0, 0))
    }

    pub fn is_null(&self) -> bool {
        self.kind == TokenKind::Unknown
    }

    pub fn pos(&self) -> usize {
        self.span.start
    }

    pub fn is_number(&self) -> bool {
        self.kind == TokenKind::Number
    }

    pub fn is_identifier(&self) -> bool {
        self.kind == TokenKind::Identifier
    }

    pub fn is_operand(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Number | TokenKind::Identifier | TokenKind::Abstract
        )
    }

    pub fn is_operator(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Operator(_)
                | TokenKind::OpenParen
                | TokenKind::CloseParen
                | TokenKind::Separator
        )
    }

    pub fn as_operator(&self) -> Option<Op> {
        match self.kind {
            TokenKind::Operator(op) => Some(op),
            TokenKind::OpenParen => Some(Op::LeftPar),
            TokenKind::CloseParen => Some(Op::RightPar),
            _ => None,
        }
    }

    pub fn is_op(&self, op: Op) -> bool {
        self.as_operator() == Some(op)
    }

    /// Unit name carried by a conversion token (`->unit`), if any.
    pub fn unit(&self) -> Option<&str> {
        if !self.is_op(Op::RightArrow) {
            return None;
        }
        self.text.strip_prefix("->").filter(|unit| !unit.is_empty())
    }

    /// Human readable name used in diagnostics.
    pub fn description(&self) -> String {
        match self.kind {
            TokenKind::Unknown => "end of input".to_string(),
            TokenKind::Number => format!("number '{}'", self.text),
            TokenKind::Identifier => format!("identifier '{}'", self.text),
            _ => format!("'{}'", self.text),
        }
    }
}

/// Scanned token sequence. Keeps the source it came from so the compiler can
/// slice out function bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct Tokens {
    tokens: Vec<Token>,
    source: String,
    radix: char,
    valid: bool,
    error: Option<CrunchError>,
}

impl Tokens {
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// First lexical error, present whenever the sequence is invalid.
    pub fn error(&self) -> Option<&CrunchError> {
        self.error.as_ref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Decimal mark the literals were scanned with.
    pub fn radix(&self) -> char {
        self.radix
    }

    /// Offset just past the last token, or the source length when empty.
    pub fn end_pos(&self) -> usize {
        self.tokens
            .last()
            .map(|t| t.span.end)
            .unwrap_or_else(|| self.source.chars().count())
    }

    /// Source text between two character offsets.
    pub fn source_slice(&self, start: usize, end: usize) -> String {
        self.source
            .chars()
            .skip(start)
            .take(end.saturating_sub(start))
            .collect()
    }
}

impl Deref for Tokens {
    type Target = [Token];

    fn deref(&self) -> &[Token] {
        &self.tokens
    }
}

/// Scans `source` into tokens. Pure: usable for highlighting and validation
/// without touching evaluator state.
pub fn scan(source: &str, config: &Config) -> Tokens {
    Lexer::new(source, config).scan_tokens()
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: Vec<char>,
    config: &'a Config,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    error: Option<CrunchError>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, config: &'a Config) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            config,
            tokens: Vec::new(),
            start: 0,
            current: 0,
            error: None,
        }
    }

    pub fn scan_tokens(mut self) -> Tokens {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token();
        }

        Tokens {
            tokens: self.tokens,
            source: self.source.to_string(),
            radix: self.config.radix.as_char(),
            valid: self.error.is_none(),
            error: self.error,
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }

    fn scan_token(&mut self) {
        let c = self.advance();

        match c {
            c if c.is_whitespace() => {}
            '(' => self.add_token(TokenKind::OpenParen),
            ')' => self.add_token(TokenKind::CloseParen),
            c if c.is_ascii_digit() => self.number(),
            c if self.config.is_radix_char(c) && self.peek().is_ascii_digit() => self.number(),
            c if self.config.is_separator_char(c) => self.add_token(TokenKind::Separator),
            '#' if self.peek().is_ascii_hexdigit() => self.prefixed_number(),
            '+' => self.add_operator(Op::Plus),
            '-' | '−' => {
                if self.match_char('>') {
                    self.conversion();
                } else {
                    self.add_operator(Op::Minus);
                }
            }
            '→' => self.conversion(),
            '*' => {
                let op = if self.match_char('*') {
                    Op::Caret
                } else {
                    Op::Asterisk
                };
                self.add_operator(op);
            }
            '×' | '·' | '⋅' => self.add_operator(Op::Asterisk),
            '/' | '÷' => self.add_operator(Op::Slash),
            '\\' => self.add_operator(Op::Backslash),
            '^' => self.add_operator(Op::Caret),
            '!' => self.add_operator(Op::Exclamation),
            '=' => self.add_operator(Op::Equal),
            '%' => self.add_operator(Op::Modulo),
            '&' => self.add_operator(Op::Ampersand),
            '|' => self.add_operator(Op::Pipe),
            ';' => self.add_operator(Op::Semicolon),
            '<' | '>' => {
                if self.match_char(c) {
                    let op = if c == '<' {
                        Op::LeftShift
                    } else {
                        Op::RightShift
                    };
                    self.add_operator(op);
                } else {
                    self.invalid(format!("Unexpected character: '{}'", c));
                }
            }
            '°' => self.add_token(TokenKind::Abstract),
            c if Op::from_superscript(c).is_some() => {
                if let Some(op) = Op::from_superscript(c) {
                    self.add_operator(op);
                }
            }
            c if is_identifier_start(c) => self.identifier(),
            _ => self.invalid(format!("Unexpected character: '{}'", c)),
        }
    }

    fn advance(&mut self) -> char {
        let c = self.peek();
        if !self.is_at_end() {
            self.current += 1;
        }
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            false
        } else {
            self.current += 1;
            true
        }
    }

    fn peek(&self) -> char {
        self.peek_at(0)
    }

    fn peek_next(&self) -> char {
        self.peek_at(1)
    }

    fn peek_at(&self, offset: usize) -> char {
        self.chars.get(self.current + offset).copied().unwrap_or('\0')
    }

    fn text(&self) -> String {
        self.chars[self.start..self.current].iter().collect()
    }

    fn number(&mut self) {
        let first = self.chars[self.start];
        if first == '0' && matches!(self.peek(), 'x' | 'X' | 'b' | 'B' | 'o' | 'O') {
            self.advance();
            self.prefixed_number();
            return;
        }

        let mut radix_count = usize::from(self.config.is_radix_char(first));
        self.digits_and_radix(&mut radix_count);

        let sign_then_digit = matches!(self.peek_next(), '+' | '-') && self.peek_at(2).is_ascii_digit();
        if matches!(self.peek(), 'e' | 'E') && (self.peek_next().is_ascii_digit() || sign_then_digit) {
            self.advance();
            if matches!(self.peek(), '+' | '-') {
                self.advance();
            }
            self.digits_and_radix(&mut radix_count);
        }

        self.finish_number(radix_count > 1);
    }

    fn digits_and_radix(&mut self, radix_count: &mut usize) {
        loop {
            let c = self.peek();
            if c.is_ascii_digit() {
                self.advance();
            } else if self.config.is_radix_char(c) {
                *radix_count += 1;
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Digits after `0x`, `0b`, `0o` or `#`; validated by base in
    /// [`Lexer::finish_number`].
    fn prefixed_number(&mut self) {
        while self.peek().is_ascii_alphanumeric() {
            self.advance();
        }
        self.finish_number(false);
    }

    fn finish_number(&mut self, malformed: bool) {
        let text = self.text();
        if malformed || Number::parse_literal(&text, self.config.radix.as_char()).is_none() {
            self.invalid(format!("Invalid number: {}", text));
        }
        self.add_token_with_content(TokenKind::Number, text);
    }

    fn identifier(&mut self) {
        while is_identifier_part(self.peek()) {
            self.advance();
        }

        match self.text().as_str() {
            "in" => self.conversion(),
            "mod" => self.add_operator(Op::Modulo),
            _ => self.add_token(TokenKind::Identifier),
        }
    }

    /// Conversion arrow (`->`, `→` or `in`). Absorbs the unit name that
    /// follows, producing a single `->unit` token.
    fn conversion(&mut self) {
        let arrow_end = self.current;
        while self.peek().is_whitespace() {
            self.advance();
        }

        if is_identifier_start(self.peek()) {
            let unit_start = self.current;
            while is_identifier_part(self.peek()) {
                self.advance();
            }
            let unit: String = self.chars[unit_start..self.current].iter().collect();
            self.add_token_with_content(TokenKind::Operator(Op::RightArrow), format!("->{}", unit));
        } else {
            self.current = arrow_end;
            self.add_token_with_content(TokenKind::Operator(Op::RightArrow), "->".to_string());
        }
    }

    fn invalid(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(CrunchError::lex_error(
                Span::new(self.start, self.current.max(self.start + 1)),
                message,
            ));
        }
    }

    fn add_operator(&mut self, op: Op) {
        self.add_token(TokenKind::Operator(op));
    }

    fn add_token(&mut self, kind: TokenKind) {
        let text = self.text();
        self.add_token_with_content(kind, text);
    }

    fn add_token_with_content(&mut self, kind: TokenKind, text: String) {
        self.tokens
            .push(Token::new(kind, text, Span::new(self.start, self.current)));
    }
}

fn is_identifier_start(c: char) -> bool {
    (c.is_alphabetic() || c == '_' || c == '$') && Op::from_superscript(c).is_none()
}

fn is_identifier_part(c: char) -> bool {
    (c.is_alphanumeric() || c == '_' || c == '$') && Op::from_superscript(c).is_none()
}
