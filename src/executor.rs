use crate::compiler;
use crate::config::{Config, MAX_DEPTH_LIMIT};
use crate::error::{CrunchError, NumError};
use crate::lexer;
use crate::number::Number;
use crate::program::{Opcode, Program};
use crate::symbols::{Resolved, SymbolTable, UserFunction, VariableKind};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Compiled user-function bodies, keyed by function name. An entry is only
/// reused while the stored body text matches the current definition.
#[derive(Debug, Default)]
pub struct ProgramCache {
    entries: HashMap<String, CachedBody>,
}

#[derive(Debug)]
struct CachedBody {
    body: String,
    program: Option<Rc<Program>>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops the compiled body of `name`, if any.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Program for `function`, compiling its body when the cache is empty or
    /// stale. `None` when the body does not compile.
    fn program_for(&mut self, function: &UserFunction, config: &Config) -> Option<Rc<Program>> {
        if let Some(cached) = self.entries.get(&function.name) {
            if cached.body == function.body {
                return cached.program.clone();
            }
        }

        let tokens = lexer::scan(&function.body, config);
        let program = match compiler::compile_expression(&tokens) {
            Ok(program) => Some(Rc::new(program)),
            Err(err) => {
                debug!("body of {} does not compile: {}", function.name, err);
                None
            }
        };
        debug!("compiled body of {}", function.name);
        self.entries.insert(
            function.name.clone(),
            CachedBody {
                body: function.body.clone(),
                program: program.clone(),
            },
        );
        program
    }
}

/// Assignments and definitions made while previewing. Shadows the tables for
/// the rest of the evaluation and is then discarded.
#[derive(Debug, Default)]
struct Overlay {
    variables: Vec<(String, Number)>,
    functions: Vec<UserFunction>,
}

impl Overlay {
    fn variable(&self, name: &str) -> Option<&Number> {
        self.variables.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn function(&self, name: &str) -> Option<&UserFunction> {
        self.functions.iter().rev().find(|f| f.name == name)
    }
}

/// Stack machine running a [`Program`] against a symbol table.
pub struct Executor<'s> {
    symbols: &'s mut SymbolTable,
    cache: &'s mut ProgramCache,
    config: &'s Config,
    apply_assignments: bool,
    overlay: Overlay,
    depth: usize,
}

impl<'s> Executor<'s> {
    pub fn new(symbols: &'s mut SymbolTable, cache: &'s mut ProgramCache, config: &'s Config) -> Self {
        Self {
            symbols,
            cache,
            config,
            apply_assignments: true,
            overlay: Overlay::default(),
            depth: 0,
        }
    }

    /// Preview mode: assignments and definitions are visible to later
    /// statements of the same program but leave the tables untouched.
    pub fn preview(mut self) -> Self {
        self.apply_assignments = false;
        self
    }

    pub fn execute(&mut self, program: &Program) -> Result<Number, CrunchError> {
        self.run(program, &[])
    }

    fn run(&mut self, program: &Program, locals: &[(String, Number)]) -> Result<Number, CrunchError> {
        let mut stack: Vec<Number> = Vec::with_capacity(program.codes.len());

        for (index, code) in program.codes.iter().enumerate() {
            trace!("{:>3}: {}", index, code);

            if stack.len() < code.pops() {
                return Err(self.internal(format!(
                    "stack underflow at instruction {} ({})",
                    index, code
                )));
            }

            match code {
                Opcode::Push(i) => {
                    let value = program.constants.get(*i).cloned().ok_or_else(|| {
                        self.internal(format!("constant #{} out of range", i))
                    })?;
                    stack.push(value);
                }
                Opcode::Load(i) => {
                    let name = self.identifier(program, *i)?;
                    stack.push(self.load(name, locals));
                }
                Opcode::Call { name, argc } => {
                    let name = self.identifier(program, *name)?;
                    let args = stack.split_off(stack.len() - argc);
                    let result = self.call(name, &args)?;
                    stack.push(result);
                }
                Opcode::Neg => {
                    let operand = pop(&mut stack);
                    stack.push(-operand);
                }
                Opcode::Fact => {
                    let operand = pop(&mut stack);
                    stack.push(operand.factorial());
                }
                Opcode::Convert(i) => {
                    let unit_name = self.identifier(program, *i)?;
                    let value = pop(&mut stack);
                    let unit = self.load(unit_name, locals);
                    stack.push(value / unit);
                }
                Opcode::Assign(i) => {
                    let name = self.identifier(program, *i)?;
                    let value = stack.last().cloned().unwrap_or_default();
                    self.assign(name, value);
                }
                Opcode::Define(i) => {
                    let function = program.definitions.get(*i).cloned().ok_or_else(|| {
                        self.internal(format!("definition #{} out of range", i))
                    })?;
                    self.define(function);
                    stack.push(Number::zero());
                }
                Opcode::Sep => {
                    pop(&mut stack);
                }
                binary => {
                    let right = pop(&mut stack);
                    let left = pop(&mut stack);
                    stack.push(apply_binary(binary, left, right));
                }
            }
        }

        match stack.len() {
            1 => Ok(pop(&mut stack)),
            n => Err(self.internal(format!(
                "program finished with {} values on the stack, expected 1",
                n
            ))),
        }
    }

    fn identifier<'p>(&self, program: &'p Program, index: usize) -> Result<&'p str, CrunchError> {
        program
            .identifiers
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| self.internal(format!("identifier #{} out of range", index)))
    }

    /// Parameters, then preview assignments, then the variable table.
    fn load(&self, name: &str, locals: &[(String, Number)]) -> Number {
        if let Some((_, value)) = locals.iter().find(|(n, _)| n == name) {
            return value.clone();
        }
        if let Some(value) = self.overlay.variable(name) {
            return value.clone();
        }
        match self.symbols.resolve_variable(name) {
            Resolved::BuiltInVariable(v) | Resolved::UserVariable(v) => v.value.clone(),
            _ => Number::from_error(NumError::UnknownVariable(name.to_string())),
        }
    }

    fn call(&mut self, name: &str, args: &[Number]) -> Result<Number, CrunchError> {
        if let Some(function) = self.overlay.function(name) {
            if !matches!(self.symbols.resolve_call(name), Resolved::BuiltInFunction(_)) {
                let function = function.clone();
                return self.call_user_function(&function, args);
            }
        }

        match self.symbols.resolve_call(name) {
            Resolved::BuiltInFunction(builtin) => Ok(builtin.call(args, self.config.angle)),
            Resolved::UserFunction(function) => {
                let function = function.clone();
                self.call_user_function(&function, args)
            }
            Resolved::BuiltInVariable(_) | Resolved::UserVariable(_) => {
                Ok(Number::from_error(NumError::NotAFunction(name.to_string())))
            }
            Resolved::Unresolved => {
                if self.overlay.variable(name).is_some() {
                    Ok(Number::from_error(NumError::NotAFunction(name.to_string())))
                } else {
                    Ok(Number::from_error(NumError::UnknownFunction(name.to_string())))
                }
            }
        }
    }

    fn call_user_function(&mut self, function: &UserFunction, args: &[Number]) -> Result<Number, CrunchError> {
        if args.len() != function.parameters.len() {
            let n = function.parameters.len();
            return Ok(Number::from_error(NumError::InvalidArgumentCount {
                function: function.name.clone(),
                expected: format!("{} {}", n, if n == 1 { "argument" } else { "arguments" }),
                got: args.len(),
            }));
        }
        if let Some(poisoned) = args.iter().find(|a| a.is_error()) {
            return Ok(poisoned.clone());
        }
        let max_depth = self.config.max_depth.min(MAX_DEPTH_LIMIT);
        if self.depth >= max_depth {
            warn!("call depth limit {} reached in {}", max_depth, function.name);
            return Ok(Number::from_error(NumError::TooDeep));
        }

        let Some(program) = self.cache.program_for(function, self.config) else {
            return Ok(Number::from_error(NumError::InvalidDefinition(function.name.clone())));
        };

        let locals: Vec<(String, Number)> = function
            .parameters
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();

        self.depth += 1;
        let result = self.run(&program, &locals);
        self.depth -= 1;
        result
    }

    /// Error values are never stored.
    fn assign(&mut self, name: &str, value: Number) {
        if value.is_error() {
            debug!("not assigning {}: {}", name, value);
            return;
        }
        if self.apply_assignments {
            debug!("{} = {}", name, value);
            self.symbols.set_variable(name, value, VariableKind::UserDefined);
        } else {
            self.overlay.variables.push((name.to_string(), value));
        }
    }

    fn define(&mut self, function: UserFunction) {
        if self.apply_assignments {
            debug!("defining {}", function);
            self.symbols.set_user_function(function);
        } else {
            self.overlay.functions.push(function);
        }
    }

    fn internal(&self, message: String) -> CrunchError {
        warn!("internal error: {}", message);
        CrunchError::internal_error(message)
    }
}

/// Stack length is checked against [`Opcode::pops`] before dispatch.
fn pop(stack: &mut Vec<Number>) -> Number {
    stack.pop().unwrap_or_default()
}

fn apply_binary(code: &Opcode, left: Number, right: Number) -> Number {
    match code {
        Opcode::Add => left + right,
        Opcode::Sub => left - right,
        Opcode::Mul => left * right,
        Opcode::Div => left / right,
        Opcode::IntDiv => left.int_div(right),
        Opcode::Mod => left % right,
        Opcode::Pow => left.pow(right),
        Opcode::Shl => left.shl(right),
        Opcode::Shr => left.shr(right),
        Opcode::BitAnd => left.bit_and(right),
        Opcode::BitOr => left.bit_or(right),
        _ => Number::from_error(NumError::Undefined),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lexer::scan;

    fn run(source: &str, symbols: &mut SymbolTable) -> Result<Number, CrunchError> {
        let config = Config::default();
        let program = compiler::compile(&scan(source, &config)).expect(source);
        let mut cache = ProgramCache::new();
        Executor::new(symbols, &mut cache, &config).execute(&program)
    }

    #[test]
    fn residual_values_are_an_internal_error() {
        let mut symbols = SymbolTable::new();
        let mut cache = ProgramCache::new();
        let config = Config::default();
        let mut program = Program::default();
        let one = program.add_constant(Number::new(1.0));
        program.emit(Opcode::Push(one));
        program.emit(Opcode::Push(one));
        let err = Executor::new(&mut symbols, &mut cache, &config)
            .execute(&program)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InternalError);
    }

    #[test]
    fn underflow_is_an_internal_error() {
        let mut symbols = SymbolTable::new();
        let mut cache = ProgramCache::new();
        let config = Config::default();
        let mut program = Program::default();
        program.emit(Opcode::Add);
        let err = Executor::new(&mut symbols, &mut cache, &config)
            .execute(&program)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InternalError);
        assert!(err.message.contains("underflow"));
    }

    #[test]
    fn empty_program_is_an_internal_error() {
        let mut symbols = SymbolTable::new();
        let mut cache = ProgramCache::new();
        let config = Config::default();
        let result = Executor::new(&mut symbols, &mut cache, &config).execute(&Program::default());
        assert!(result.is_err());
    }

    #[test]
    fn errors_poison_only_their_statement() {
        let mut symbols = SymbolTable::new();
        let value = run("a = 1/0; b = 2; b + 1", &mut symbols).unwrap();
        assert_eq!(value, Number::new(3.0));
        assert!(!symbols.has_variable("a"));
        assert_eq!(symbols.variable("b").map(|v| v.value.clone()), Some(Number::new(2.0)));
    }

    #[test]
    fn parameters_shadow_without_mutating() {
        let mut symbols = SymbolTable::new();
        symbols.set_variable("x", Number::new(100.0), VariableKind::UserDefined);
        let value = run("f(x) = x + 1; f(1)", &mut symbols).unwrap();
        assert_eq!(value, Number::new(2.0));
        assert_eq!(symbols.variable("x").map(|v| v.value.clone()), Some(Number::new(100.0)));
    }

    #[test]
    fn call_errors_name_the_callee() {
        let mut symbols = SymbolTable::new();
        let value = run("nope(1)", &mut symbols).unwrap();
        assert_eq!(value.error(), Some(&NumError::UnknownFunction("nope".into())));
        let value = run("pi(1)", &mut symbols).unwrap();
        assert_eq!(value.error(), Some(&NumError::NotAFunction("pi".into())));
        let value = run("sqrt(1, 2)", &mut symbols).unwrap();
        assert!(matches!(value.error(), Some(NumError::InvalidArgumentCount { .. })));
    }

    #[test]
    fn unbounded_recursion_is_reported() {
        let mut symbols = SymbolTable::new();
        let value = run("f(x) = f(x + 1); f(0)", &mut symbols).unwrap();
        assert_eq!(value.error(), Some(&NumError::TooDeep));
    }

    #[test]
    fn preview_leaves_tables_untouched() {
        let mut symbols = SymbolTable::new();
        let config = Config::default();
        let program = compiler::compile(&scan("y = 4; g(t) = t * y; g(2)", &config)).unwrap();
        let mut cache = ProgramCache::new();
        let value = Executor::new(&mut symbols, &mut cache, &config)
            .preview()
            .execute(&program)
            .unwrap();
        assert_eq!(value, Number::new(8.0));
        assert!(!symbols.has_variable("y"));
        assert!(!symbols.has_user_function("g"));
    }

    #[test]
    fn stale_bodies_are_recompiled() {
        let mut symbols = SymbolTable::new();
        let mut cache = ProgramCache::new();
        let config = Config::default();
        let first = compiler::compile(&scan("f(x) = x * 2; f(3)", &config)).unwrap();
        let second = compiler::compile(&scan("f(x) = x * 3; f(3)", &config)).unwrap();
        let mut executor = Executor::new(&mut symbols, &mut cache, &config);
        assert_eq!(executor.execute(&first).unwrap(), Number::new(6.0));
        assert_eq!(executor.execute(&second).unwrap(), Number::new(9.0));
    }
}
