use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Character range in the expression text. Offsets count characters, not
/// bytes, so they line up with what the user typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LexError,
    CompileError,
    RuntimeError,
    /// Executor invariant broken: a compiler or executor bug, not bad input.
    InternalError,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct CrunchError {
    pub kind: ErrorKind,
    pub span: Span,
    pub message: String,
    pub help: Option<String>,
}

impl CrunchError {
    pub fn new(kind: ErrorKind, span: Span, message: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: None,
        }
    }

    pub fn new_with_help(kind: ErrorKind, span: Span, message: String, help: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: Some(help),
        }
    }

    pub fn lex_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::LexError, span, message)
    }

    pub fn compile_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::CompileError, span, message)
    }

    pub fn compile_error_with_help(span: Span, message: String, help: String) -> Self {
        Self::new_with_help(ErrorKind::CompileError, span, message, help)
    }

    pub fn runtime_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::RuntimeError, span, message)
    }

    pub fn internal_error(message: String) -> Self {
        Self::new_with_help(
            ErrorKind::InternalError,
            Span::single(0),
            message,
            "This is a bug in the evaluator, not a problem with the expression.".to_string(),
        )
    }

    /// Source position of the offending token.
    pub fn position(&self) -> usize {
        self.span.start
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let filename = filename.unwrap_or("<repl>");

        let color = match self.kind {
            ErrorKind::LexError => Color::Red,
            ErrorKind::CompileError => Color::Yellow,
            ErrorKind::RuntimeError => Color::Magenta,
            ErrorKind::InternalError => Color::Blue,
        };

        let kind_str = match self.kind {
            ErrorKind::LexError => "Lexical Error",
            ErrorKind::CompileError => "Compile Error",
            ErrorKind::RuntimeError => "Runtime Error",
            ErrorKind::InternalError => "Internal Error",
        };

        // Clamp so an error at end of input still gets a visible label.
        let len = source.chars().count();
        let start = self.span.start.min(len);
        let end = self.span.end.min(len.max(start + 1));

        let mut report_builder = Report::build(ReportKind::Error, filename, start)
            .with_message(format!("{}: {}", kind_str.fg(color), self.message))
            .with_label(
                Label::new((filename, start..end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        if let Some(ref help_text) = self.help {
            report_builder =
                report_builder.with_note(format!("{}: {}", "help".fg(Color::Cyan), help_text));
        }

        if let Err(err) = report_builder
            .finish()
            .eprint((filename, Source::from(source)))
        {
            tracing::warn!("failed to print diagnostic: {}", err);
        }
    }
}

/// Domain and lookup failures carried inside an error-tagged [`Number`].
///
/// [`Number`]: crate::number::Number
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("{function}: argument out of range")]
    OutOfDomain { function: String },
    #[error("{function}: expected {expected}, got {got}")]
    InvalidArgumentCount {
        function: String,
        expected: String,
        got: usize,
    },
    #[error("unknown variable: {0}")]
    UnknownVariable(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("{0} is not a function")]
    NotAFunction(String),
    #[error("{0}: function body does not compile")]
    InvalidDefinition(String),
    #[error("evaluation too deep")]
    TooDeep,
    #[error("numeric overflow")]
    Overflow,
    #[error("{operation}: integer operands required")]
    IntegerRequired { operation: &'static str },
    #[error("result is undefined")]
    Undefined,
}
