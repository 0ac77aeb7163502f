use crate::compiler;
use crate::config::Config;
use crate::error::{CrunchError, Span};
use crate::executor::{Executor, ProgramCache};
use crate::functions;
use crate::lexer::{self, TokenKind, Tokens};
use crate::number::Number;
use crate::program::{Program, Statement};
use crate::symbols::{SymbolTable, UserFunction, Variable, VariableKind, ANS};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Compilation state of the current expression.
#[derive(Debug)]
enum State {
    /// Expression changed since the last compile.
    Dirty,
    /// Nothing but whitespace to compile.
    Empty,
    Compiled(Program),
    Failed(CrunchError),
}

/// One calculation session: the current expression, its compiled program,
/// and the variables and user functions it runs against.
///
/// ```
/// use crunch::Evaluator;
///
/// let mut evaluator = Evaluator::new();
/// evaluator.set_expression("x = 2 + 3");
/// assert_eq!(evaluator.eval().unwrap().value(), 5.0);
/// evaluator.set_expression("2x");
/// assert_eq!(evaluator.eval().unwrap().value(), 10.0);
/// ```
#[derive(Debug)]
pub struct Evaluator {
    config: Config,
    symbols: SymbolTable,
    cache: ProgramCache,
    expression: String,
    state: State,
    /// Last runtime error, cleared when the expression changes.
    runtime_error: Option<CrunchError>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            symbols: SymbolTable::new(),
            cache: ProgramCache::new(),
            expression: String::new(),
            state: State::Dirty,
            runtime_error: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replaces the configuration. The current expression is recompiled on
    /// next use, since the radix character changes how it scans.
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
        self.cache.clear();
        self.invalidate();
    }

    /// Stores `expression` without compiling it.
    pub fn set_expression(&mut self, expression: &str) {
        if self.expression != expression {
            self.expression = expression.to_string();
            self.invalidate();
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Compiles the current expression if needed. An empty expression is
    /// never valid but has no error either.
    pub fn is_valid(&mut self) -> bool {
        self.ensure_compiled();
        matches!(self.state, State::Compiled(_))
    }

    /// Current compile or runtime error.
    pub fn error(&mut self) -> Option<&CrunchError> {
        self.ensure_compiled();
        match &self.state {
            State::Failed(err) => Some(err),
            State::Compiled(_) => self.runtime_error.as_ref(),
            State::Dirty | State::Empty => None,
        }
    }

    /// Error text of [`Evaluator::error`], empty when there is none.
    pub fn error_message(&mut self) -> String {
        self.error().map(|e| e.message.clone()).unwrap_or_default()
    }

    /// Scans `text` with the session's configuration.
    pub fn scan(&self, text: &str) -> Tokens {
        lexer::scan(text, &self.config)
    }

    /// Tokens of the current expression.
    pub fn tokens(&self) -> Tokens {
        self.scan(&self.expression)
    }

    /// Evaluates the current expression, applying assignments and
    /// definitions to the session.
    ///
    /// Lexical, compile and internal errors are returned as `Err`. Domain
    /// errors come back as an error-tagged `Number` and are also reported
    /// through [`Evaluator::error`].
    pub fn eval(&mut self) -> Result<Number, CrunchError> {
        self.execute(true)
    }

    /// Evaluates without touching the variable or function tables.
    pub fn eval_no_assign(&mut self) -> Result<Number, CrunchError> {
        self.execute(false)
    }

    /// Like [`Evaluator::eval`], then stores the result in `ans` unless it
    /// is an error or the expression only defines a function.
    pub fn eval_update_ans(&mut self) -> Result<Number, CrunchError> {
        let result = self.eval()?;
        if !result.is_error() && !self.is_user_function_assign() {
            debug!("ans = {}", result);
            self.symbols.set_variable(ANS, result.clone(), VariableKind::BuiltIn);
        }
        Ok(result)
    }

    /// True when the current expression's last statement defines a function.
    pub fn is_user_function_assign(&mut self) -> bool {
        self.ensure_compiled();
        match &self.state {
            State::Compiled(program) => program.is_user_function_assign(),
            _ => false,
        }
    }

    /// Names the current expression calls.
    pub fn functions_in_use(&mut self) -> BTreeSet<String> {
        self.ensure_compiled();
        match &self.state {
            State::Compiled(program) => program.functions_in_use(),
            _ => BTreeSet::new(),
        }
    }

    /// Compiled form of the current expression, or the reason there is none.
    pub fn dump(&mut self) -> String {
        self.ensure_compiled();
        match &self.state {
            State::Compiled(program) => program.dump(),
            State::Failed(err) => format!("error: {}\n", err),
            State::Dirty | State::Empty => String::new(),
        }
    }

    /// Repairs common slips in `text`: surrounding whitespace, a trailing
    /// `=`, and missing closing parentheses.
    pub fn auto_fix(&self, text: &str) -> String {
        let mut fixed = text.trim().to_string();
        while fixed.ends_with('=') {
            fixed.pop();
            fixed.truncate(fixed.trim_end().len());
        }

        let mut open = 0usize;
        for token in self.scan(&fixed).iter() {
            match token.kind {
                TokenKind::OpenParen => open += 1,
                TokenKind::CloseParen => open = open.saturating_sub(1),
                _ => {}
            }
        }
        fixed.push_str(&")".repeat(open));
        fixed
    }

    /// Clears the expression and every user-defined name, and restores the
    /// built-ins. `ans` keeps its value.
    pub fn reset(&mut self) {
        self.expression.clear();
        self.invalidate();
        self.cache.clear();
        self.symbols.unset_all_user_defined_variables();
        self.symbols.unset_all_user_functions();
        self.symbols.initialize_builtin_variables();
    }

    pub fn get_variable(&self, name: &str) -> Option<Variable> {
        self.symbols.variable(name).cloned()
    }

    pub fn get_variables(&self) -> Vec<Variable> {
        self.symbols.variables().to_vec()
    }

    pub fn get_user_defined_variables(&self) -> Vec<Variable> {
        self.symbols
            .variables()
            .iter()
            .filter(|v| !v.is_builtin())
            .cloned()
            .collect()
    }

    pub fn get_user_defined_variables_plus_ans(&self) -> Vec<Variable> {
        self.symbols
            .variables()
            .iter()
            .filter(|v| !v.is_builtin() || v.identifier == ANS)
            .cloned()
            .collect()
    }

    pub fn set_variable(&mut self, name: &str, value: Number, kind: VariableKind) {
        self.symbols.set_variable(name, value, kind);
    }

    /// Returns whether `name` was removed. Built-ins need `force_builtin`.
    pub fn unset_variable(&mut self, name: &str, force_builtin: bool) -> bool {
        self.symbols.unset_variable(name, force_builtin)
    }

    pub fn unset_all_user_defined_variables(&mut self) {
        self.symbols.unset_all_user_defined_variables();
    }

    pub fn is_builtin_variable(&self, name: &str) -> bool {
        self.symbols.is_builtin_variable(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.symbols.has_variable(name)
    }

    pub fn initialize_builtin_variables(&mut self) {
        self.symbols.initialize_builtin_variables();
    }

    pub fn get_user_functions(&self) -> Vec<UserFunction> {
        self.symbols.user_functions().to_vec()
    }

    pub fn get_user_function(&self, name: &str) -> Option<UserFunction> {
        self.symbols.user_function(name).cloned()
    }

    pub fn set_user_function(&mut self, function: UserFunction) {
        self.symbols.set_user_function(function);
    }

    pub fn unset_user_function(&mut self, name: &str) -> bool {
        self.cache.remove(name);
        self.symbols.unset_user_function(name)
    }

    /// Number of user-function bodies currently compiled.
    pub fn cached_function_count(&self) -> usize {
        self.cache.len()
    }

    pub fn unset_all_user_functions(&mut self) {
        self.symbols.unset_all_user_functions();
        self.cache.clear();
    }

    pub fn has_user_function(&self, name: &str) -> bool {
        self.symbols.has_user_function(name)
    }

    fn invalidate(&mut self) {
        self.state = State::Dirty;
        self.runtime_error = None;
    }

    fn ensure_compiled(&mut self) {
        if !matches!(self.state, State::Dirty) {
            return;
        }
        if self.expression.trim().is_empty() {
            self.state = State::Empty;
            return;
        }

        let tokens = self.tokens();
        self.state = match compiler::compile(&tokens).and_then(|p| self.check_targets(&tokens, p)) {
            Ok(program) => {
                debug!("compiled {:?} into {} instructions", self.expression, program.codes.len());
                State::Compiled(program)
            }
            Err(err) => {
                debug!("{:?} does not compile: {}", self.expression, err);
                State::Failed(err)
            }
        };
    }

    /// Built-in names cannot be assigned to or redefined.
    fn check_targets(&self, tokens: &Tokens, program: Program) -> Result<Program, CrunchError> {
        for statement in &program.statements {
            let name = match statement {
                Statement::VariableAssignment(name) | Statement::FunctionDefinition(name) => name,
                Statement::Expression => continue,
            };
            if self.symbols.is_builtin_variable(name) || functions::find(name).is_some() {
                let span = tokens
                    .iter()
                    .find(|t| t.is_identifier() && t.text == *name)
                    .map(|t| t.span.clone())
                    .unwrap_or_else(|| Span::single(0));
                return Err(CrunchError::compile_error_with_help(
                    span,
                    format!("Cannot assign to built-in '{}'", name),
                    "Choose a name that is not a built-in variable or function.".to_string(),
                ));
            }
        }
        Ok(program)
    }

    fn execute(&mut self, apply_assignments: bool) -> Result<Number, CrunchError> {
        self.ensure_compiled();
        self.runtime_error = None;

        let program = match &self.state {
            State::Compiled(program) => program,
            State::Failed(err) => return Err(err.clone()),
            State::Empty => {
                return Err(CrunchError::compile_error(Span::single(0), "Empty expression".to_string()))
            }
            State::Dirty => {
                return Err(CrunchError::internal_error("expression was not compiled".to_string()))
            }
        };

        let mut executor = Executor::new(&mut self.symbols, &mut self.cache, &self.config);
        if !apply_assignments {
            executor = executor.preview();
        }
        let result = executor.execute(program);

        match &result {
            Ok(value) => {
                if let Some(err) = value.error() {
                    let end = self.expression.chars().count();
                    self.runtime_error = Some(CrunchError::runtime_error(
                        Span::new(0, end.max(1)),
                        err.to_string(),
                    ));
                }
            }
            Err(err) => warn!("evaluation of {:?} failed: {}", self.expression, err),
        }
        result
    }
}
