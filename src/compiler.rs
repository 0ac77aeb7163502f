use crate::error::{CrunchError, Span};
use crate::lexer::{Op, Token, TokenKind, Tokens};
use crate::number::Number;
use crate::program::{Opcode, Program, Statement};
use crate::symbols::UserFunction;
use std::f64::consts::PI;

/// Parenthesis and unary nesting allowed before compilation gives up.
const MAX_NESTING: usize = 128;

/// Compiles a full input: statements separated by `;`, each a plain
/// expression, a variable assignment or a function definition.
pub fn compile(tokens: &Tokens) -> Result<Program, CrunchError> {
    Compiler::new(tokens)?.compile_statements()
}

/// Compiles a single expression, as used for user-function bodies.
/// Assignments and statement separators are rejected.
pub fn compile_expression(tokens: &Tokens) -> Result<Program, CrunchError> {
    let mut compiler = Compiler::new(tokens)?;
    compiler.expression_statement(0, tokens.len())?;
    compiler.program.statements.push(Statement::Expression);
    Ok(compiler.program)
}

pub struct Compiler<'a> {
    tokens: &'a Tokens,
    current: usize,
    end: usize,
    nesting: usize,
    program: Program,
    null: Token,
}

impl<'a> Compiler<'a> {
    pub fn new(tokens: &'a Tokens) -> Result<Self, CrunchError> {
        if !tokens.valid() {
            return Err(tokens.error().cloned().unwrap_or_else(|| {
                CrunchError::lex_error(Span::single(0), "Invalid expression".to_string())
            }));
        }
        if tokens.is_empty() {
            return Err(CrunchError::compile_error(
                Span::single(0),
                "Empty expression".to_string(),
            ));
        }

        Ok(Self {
            tokens,
            current: 0,
            end: tokens.len(),
            nesting: 0,
            program: Program::default(),
            null: Token::null(),
        })
    }

    pub fn compile_statements(mut self) -> Result<Program, CrunchError> {
        let boundaries = self.statement_boundaries();
        let mut start = 0;

        for (i, &end) in boundaries.iter().enumerate() {
            if start == end {
                let span = self
                    .tokens
                    .get(end)
                    .or_else(|| self.tokens.get(start.saturating_sub(1)))
                    .map(|t| t.span.clone())
                    .unwrap_or_else(|| Span::single(0));
                return Err(CrunchError::compile_error_with_help(
                    span,
                    "Expected expression before ';'".to_string(),
                    "';' separates statements and must have an expression on both sides.".to_string(),
                ));
            }
            if i > 0 {
                self.program.emit(Opcode::Sep);
            }
            self.statement(start, end)?;
            start = end + 1;
        }

        Ok(self.program)
    }

    /// Indices of the top-level `;` tokens, followed by the token count.
    fn statement_boundaries(&self) -> Vec<usize> {
        let mut depth = 0usize;
        let mut boundaries = Vec::new();
        for (i, token) in self.tokens.iter().enumerate() {
            match token.kind {
                TokenKind::OpenParen => depth += 1,
                TokenKind::CloseParen => depth = depth.saturating_sub(1),
                TokenKind::Operator(Op::Semicolon) if depth == 0 => boundaries.push(i),
                _ => {}
            }
        }
        boundaries.push(self.tokens.len());
        boundaries
    }

    fn statement(&mut self, start: usize, end: usize) -> Result<(), CrunchError> {
        let tokens = self.tokens;
        let equal = (start..end).find(|&i| tokens[i].is_op(Op::Equal));

        let Some(equal) = equal else {
            self.expression_statement(start, end)?;
            self.program.statements.push(Statement::Expression);
            return Ok(());
        };

        let target = &tokens[start..equal];
        let equal_token = &tokens[equal];

        if equal + 1 == end {
            return Err(CrunchError::compile_error_with_help(
                equal_token.span.clone(),
                "Expected expression after '='".to_string(),
                "Assignments need a value: 'x = 1' or 'f(x) = x * 2'.".to_string(),
            ));
        }

        match target {
            [name] if name.is_identifier() => {
                self.expression_statement(equal + 1, end)?;
                let id = self.program.add_identifier(&name.text);
                self.program.emit(Opcode::Assign(id));
                self.program
                    .statements
                    .push(Statement::VariableAssignment(name.text.clone()));
                Ok(())
            }
            [name, open, rest @ ..] if name.is_identifier() && open.kind == TokenKind::OpenParen => {
                let parameters = Self::parameters(open, rest, equal_token)?;
                // The body must be a well-formed expression on its own.
                let saved = std::mem::take(&mut self.program);
                let checked = self.expression_statement(equal + 1, end);
                self.program = saved;
                checked?;

                let body_start = tokens[equal + 1].pos();
                let body_end = tokens[end - 1].span.end;
                let body = tokens.source_slice(body_start, body_end);
                let function = UserFunction::new(&name.text, parameters, &body);
                let index = self.program.add_definition(function);
                self.program.emit(Opcode::Define(index));
                self.program
                    .statements
                    .push(Statement::FunctionDefinition(name.text.clone()));
                Ok(())
            }
            _ => Err(CrunchError::compile_error_with_help(
                equal_token.span.clone(),
                "Invalid assignment target".to_string(),
                "Only names and function signatures can be assigned to. Examples: 'x = 10' or 'f(x, y) = x * y'".to_string(),
            )),
        }
    }

    /// Parses `p1, p2, ...)` following the `(` of a definition.
    fn parameters(open: &Token, rest: &[Token], equal: &Token) -> Result<Vec<String>, CrunchError> {
        let Some((close, inner)) = rest.split_last() else {
            return Err(Self::unmatched_open(open));
        };
        if close.kind != TokenKind::CloseParen {
            return Err(CrunchError::compile_error_with_help(
                equal.span.clone(),
                "Invalid assignment target".to_string(),
                "A function definition looks like 'f(x, y) = x * y'.".to_string(),
            ));
        }
        if inner.is_empty() {
            return Err(CrunchError::compile_error_with_help(
                close.span.clone(),
                "Function definition needs at least one parameter".to_string(),
                "Declare parameters between the parentheses: 'f(x) = x * 2'.".to_string(),
            ));
        }

        let mut parameters: Vec<String> = Vec::new();
        for (i, token) in inner.iter().enumerate() {
            let expect_name = i % 2 == 0;
            let is_separator =
                token.kind == TokenKind::Separator || token.is_op(Op::Semicolon);
            if expect_name {
                if !token.is_identifier() {
                    return Err(CrunchError::compile_error(
                        token.span.clone(),
                        format!("Expected parameter name, found {}", token.description()),
                    ));
                }
                if parameters.contains(&token.text) {
                    return Err(CrunchError::compile_error(
                        token.span.clone(),
                        format!("Duplicate parameter '{}'", token.text),
                    ));
                }
                parameters.push(token.text.clone());
            } else if !is_separator {
                return Err(CrunchError::compile_error(
                    token.span.clone(),
                    format!("Expected ',' between parameters, found {}", token.description()),
                ));
            }
        }
        if inner.len() % 2 == 0 {
            // Trailing separator.
            return Err(CrunchError::compile_error(
                close.span.clone(),
                "Expected parameter name before ')'".to_string(),
            ));
        }

        Ok(parameters)
    }

    /// Compiles tokens `start..end` as one expression; every token must be
    /// consumed.
    fn expression_statement(&mut self, start: usize, end: usize) -> Result<(), CrunchError> {
        self.current = start;
        self.end = end;
        self.conversion()?;

        if !self.is_at_end() {
            let token = self.peek().clone();
            return Err(match token.kind {
                TokenKind::CloseParen => Self::unmatched_close(&token),
                _ => CrunchError::compile_error(
                    token.span.clone(),
                    format!("Unexpected {}", token.description()),
                ),
            });
        }
        Ok(())
    }

    fn conversion(&mut self) -> Result<(), CrunchError> {
        self.additive()?;

        while self.check_op(Op::RightArrow) {
            let arrow = self.advance().clone();
            let Some(unit) = arrow.unit() else {
                return Err(CrunchError::compile_error_with_help(
                    arrow.span.clone(),
                    "Expected a unit after conversion operator".to_string(),
                    "Write the target unit after 'in' or '->', e.g. '3 foot in meter'.".to_string(),
                ));
            };
            let id = self.program.add_identifier(unit);
            self.program.emit(Opcode::Convert(id));
        }

        Ok(())
    }

    fn additive(&mut self) -> Result<(), CrunchError> {
        self.bitwise()?;

        while let Some(op) = self.match_ops(&[Op::Plus, Op::Minus]) {
            self.operand_after(&op, Self::bitwise)?;
            self.program.emit(match op.as_operator() {
                Some(Op::Plus) => Opcode::Add,
                _ => Opcode::Sub,
            });
        }

        Ok(())
    }

    fn bitwise(&mut self) -> Result<(), CrunchError> {
        self.shift()?;

        while let Some(op) = self.match_ops(&[Op::Ampersand, Op::Pipe]) {
            self.operand_after(&op, Self::shift)?;
            self.program.emit(match op.as_operator() {
                Some(Op::Ampersand) => Opcode::BitAnd,
                _ => Opcode::BitOr,
            });
        }

        Ok(())
    }

    fn shift(&mut self) -> Result<(), CrunchError> {
        self.multiplicative()?;

        while let Some(op) = self.match_ops(&[Op::LeftShift, Op::RightShift]) {
            self.operand_after(&op, Self::multiplicative)?;
            self.program.emit(match op.as_operator() {
                Some(Op::LeftShift) => Opcode::Shl,
                _ => Opcode::Shr,
            });
        }

        Ok(())
    }

    /// Explicit `* / \ mod` and implicit multiplication share this tier and
    /// associate left: `1/2m` is `(1/2)*m`.
    fn multiplicative(&mut self) -> Result<(), CrunchError> {
        self.unary()?;

        loop {
            if let Some(op) =
                self.match_ops(&[Op::Asterisk, Op::Slash, Op::Backslash, Op::Modulo])
            {
                self.operand_after(&op, Self::unary)?;
                self.program.emit(match op.as_operator() {
                    Some(Op::Asterisk) => Opcode::Mul,
                    Some(Op::Slash) => Opcode::Div,
                    Some(Op::Backslash) => Opcode::IntDiv,
                    _ => Opcode::Mod,
                });
            } else if self.starts_operand() {
                self.unary()?;
                self.program.emit(Opcode::Mul);
            } else {
                break;
            }
        }

        Ok(())
    }

    fn unary(&mut self) -> Result<(), CrunchError> {
        if let Some(op) = self.match_ops(&[Op::Minus, Op::Plus]) {
            self.enter(&op)?;
            self.operand_after(&op, Self::unary)?;
            self.nesting -= 1;
            if op.is_op(Op::Minus) {
                self.program.emit(Opcode::Neg);
            }
            return Ok(());
        }

        self.power()
    }

    /// `^` is right-associative and its right operand may carry a sign, so
    /// `2^3^2` is `2^(3^2)` and `2^-1` is a half.
    fn power(&mut self) -> Result<(), CrunchError> {
        self.postfix()?;

        if let Some(op) = self.match_ops(&[Op::Caret]) {
            self.enter(&op)?;
            self.operand_after(&op, Self::unary)?;
            self.nesting -= 1;
            self.program.emit(Opcode::Pow);
        }

        Ok(())
    }

    /// Factorial and superscript exponents. A run of superscript digits is
    /// one exponent: `x²³` is `x^23`.
    fn postfix(&mut self) -> Result<(), CrunchError> {
        self.primary()?;

        loop {
            if self.match_ops(&[Op::Exclamation]).is_some() {
                self.program.emit(Opcode::Fact);
            } else if let Some(digit) = self.superscript_digit() {
                let mut exponent = f64::from(digit);
                self.advance();
                while let Some(digit) = self.superscript_digit() {
                    exponent = exponent * 10.0 + f64::from(digit);
                    self.advance();
                }
                let index = self.program.add_constant(Number::new(exponent));
                self.program.emit(Opcode::Push(index));
                self.program.emit(Opcode::Pow);
            } else {
                break;
            }
        }

        Ok(())
    }

    fn primary(&mut self) -> Result<(), CrunchError> {
        if self.is_at_end() {
            return Err(CrunchError::compile_error_with_help(
                self.end_span(),
                "Unexpected end of expression".to_string(),
                "Expected a number, a name or a parenthesized expression here.".to_string(),
            ));
        }

        let token = self.advance().clone();

        match token.kind {
            TokenKind::Number => {
                let value = Number::parse_literal(&token.text, self.tokens.radix()).ok_or_else(|| {
                    CrunchError::compile_error(token.span.clone(), format!("Invalid number: {}", token.text))
                })?;
                let index = self.program.add_constant(value);
                self.program.emit(Opcode::Push(index));
                Ok(())
            }
            TokenKind::Abstract => {
                // The degree sign: one degree in radians.
                let index = self.program.add_constant(Number::new(PI / 180.0));
                self.program.emit(Opcode::Push(index));
                Ok(())
            }
            TokenKind::Identifier => {
                if self.check(TokenKind::OpenParen) {
                    let open = self.advance().clone();
                    self.call(&token, &open)
                } else {
                    let id = self.program.add_identifier(&token.text);
                    self.program.emit(Opcode::Load(id));
                    Ok(())
                }
            }
            TokenKind::OpenParen => {
                if self.check(TokenKind::CloseParen) {
                    return Err(CrunchError::compile_error_with_help(
                        Span::new(token.span.start, self.peek().span.end),
                        "Empty parentheses are not allowed".to_string(),
                        "Parentheses must contain an expression.".to_string(),
                    ));
                }
                self.enter(&token)?;
                self.conversion()?;
                self.nesting -= 1;
                self.close_paren(&token)
            }
            TokenKind::CloseParen => Err(Self::unmatched_close(&token)),
            _ => Err(CrunchError::compile_error_with_help(
                token.span.clone(),
                format!("Expected expression, found {}", token.description()),
                "Expected a number, a name or a parenthesized expression here.".to_string(),
            )),
        }
    }

    /// Argument list of a call; `(` already consumed. Arity is checked at
    /// execution time.
    fn call(&mut self, name: &Token, open: &Token) -> Result<(), CrunchError> {
        let mut argc = 0;

        if !self.check(TokenKind::CloseParen) {
            self.enter(open)?;
            loop {
                self.conversion()?;
                argc += 1;
                if self.check(TokenKind::Separator) || self.check_op(Op::Semicolon) {
                    self.advance();
                } else {
                    break;
                }
            }
            self.nesting -= 1;
        }

        self.close_paren(open)?;
        let id = self.program.add_identifier(&name.text);
        self.program.emit(Opcode::Call { name: id, argc });
        Ok(())
    }

    fn close_paren(&mut self, open: &Token) -> Result<(), CrunchError> {
        if self.check(TokenKind::CloseParen) {
            self.advance();
            return Ok(());
        }
        if self.is_at_end() {
            return Err(Self::unmatched_open(open));
        }
        let token = self.peek();
        Err(CrunchError::compile_error_with_help(
            token.span.clone(),
            format!("Expected ')', found {}", token.description()),
            "Separate function arguments with ','.".to_string(),
        ))
    }

    /// Compiles the right operand of `op`, turning a missing operand into an
    /// error that names the operator.
    fn operand_after(
        &mut self,
        op: &Token,
        operand: fn(&mut Self) -> Result<(), CrunchError>,
    ) -> Result<(), CrunchError> {
        if self.is_at_end() {
            return Err(CrunchError::compile_error_with_help(
                op.span.clone(),
                format!("Expected expression after '{}'", op.text),
                "Operators need an operand on both sides.".to_string(),
            ));
        }
        operand(self)
    }

    fn enter(&mut self, token: &Token) -> Result<(), CrunchError> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(CrunchError::compile_error(
                token.span.clone(),
                "Expression is nested too deeply".to_string(),
            ));
        }
        Ok(())
    }

    fn unmatched_open(open: &Token) -> CrunchError {
        CrunchError::compile_error_with_help(
            open.span.clone(),
            "Unmatched '('".to_string(),
            "Every opening parenthesis '(' must have a matching closing parenthesis ')'.".to_string(),
        )
    }

    fn unmatched_close(close: &Token) -> CrunchError {
        CrunchError::compile_error_with_help(
            close.span.clone(),
            "Unmatched ')'".to_string(),
            "Found ')' without matching '('. Check for unbalanced parentheses.".to_string(),
        )
    }

    fn superscript_digit(&self) -> Option<u32> {
        if self.is_at_end() {
            return None;
        }
        self.peek().as_operator().and_then(Op::superscript_digit)
    }

    /// Whether the next token begins an operand, which means an implicit
    /// multiplication when it follows a complete operand.
    fn starts_operand(&self) -> bool {
        !self.is_at_end() && (self.peek().is_operand() || self.check(TokenKind::OpenParen))
    }

    fn match_ops(&mut self, ops: &[Op]) -> Option<Token> {
        if ops.iter().any(|op| self.check_op(*op)) {
            Some(self.advance().clone())
        } else {
            None
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().kind == kind
    }

    fn check_op(&self, op: Op) -> bool {
        !self.is_at_end() && self.peek().is_op(op)
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.end
    }

    fn peek(&self) -> &Token {
        if self.is_at_end() {
            &self.null
        } else {
            &self.tokens[self.current]
        }
    }

    fn previous(&self) -> &Token {
        self.current
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .unwrap_or(&self.null)
    }

    fn end_span(&self) -> Span {
        let end = if self.end > 0 {
            self.tokens[self.end - 1].span.end
        } else {
            self.tokens.end_pos()
        };
        Span::single(end)
    }
}
