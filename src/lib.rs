// Crunch Expression Engine Library
//
// Scans, compiles and evaluates calculator expressions: implicit
// multiplication, unit conversion, user variables and user functions,
// with diagnostics that point at the offending character.

// Public modules
pub mod compiler;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod format;
pub mod functions;
pub mod lexer;
pub mod number;
pub mod program;
pub mod repl;
pub mod runner;
pub mod symbols;

// Re-export commonly used items
pub use compiler::compile;
pub use config::{AngleMode, Config, RadixChar};
pub use error::{CrunchError, ErrorKind, NumError, Span};
pub use evaluator::Evaluator;
pub use format::{format_number, DisplayMode};
pub use lexer::{scan, Token, TokenKind, Tokens};
pub use number::Number;
pub use program::{Opcode, Program};
pub use symbols::{UserFunction, Variable, VariableKind};

// Re-export main functions
pub use repl::start as start_repl;
pub use runner::run;
