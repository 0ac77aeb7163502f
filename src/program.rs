use crate::number::Number;
use crate::symbols::UserFunction;
use std::collections::BTreeSet;
use std::fmt::{self, Write};

/// One instruction of a compiled program. Operands index into the pools of
/// the owning [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Push a constant-pool value.
    Push(usize),
    /// Push the value of a named variable.
    Load(usize),
    /// Call a named function with the top `argc` values as arguments.
    Call { name: usize, argc: usize },
    Neg,
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
    Pow,
    Fact,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    /// Divide by the value of the named unit.
    Convert(usize),
    /// Store the top value into the named variable, leaving it on the stack.
    Assign(usize),
    /// Register a definition-pool function and push zero.
    Define(usize),
    /// End of a statement: drop its value.
    Sep,
}

impl Opcode {
    /// Values consumed from the stack.
    pub fn pops(&self) -> usize {
        match self {
            Opcode::Push(_) | Opcode::Load(_) | Opcode::Define(_) => 0,
            Opcode::Neg | Opcode::Fact | Opcode::Convert(_) | Opcode::Sep => 1,
            Opcode::Assign(_) => 1,
            Opcode::Call { argc, .. } => *argc,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Expression,
    VariableAssignment(String),
    FunctionDefinition(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub codes: Vec<Opcode>,
    pub constants: Vec<Number>,
    pub identifiers: Vec<String>,
    pub definitions: Vec<UserFunction>,
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn add_constant(&mut self, value: Number) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub fn add_identifier(&mut self, name: &str) -> usize {
        if let Some(index) = self.identifiers.iter().position(|id| id == name) {
            return index;
        }
        self.identifiers.push(name.to_string());
        self.identifiers.len() - 1
    }

    pub fn add_definition(&mut self, function: UserFunction) -> usize {
        self.definitions.push(function);
        self.definitions.len() - 1
    }

    pub fn emit(&mut self, code: Opcode) {
        self.codes.push(code);
    }

    pub fn identifier(&self, index: usize) -> &str {
        self.identifiers.get(index).map(String::as_str).unwrap_or("?")
    }

    /// True when the last statement defines a user function.
    pub fn is_user_function_assign(&self) -> bool {
        matches!(self.statements.last(), Some(Statement::FunctionDefinition(_)))
    }

    /// Names called by this program.
    pub fn functions_in_use(&self) -> BTreeSet<String> {
        self.codes
            .iter()
            .filter_map(|code| match code {
                Opcode::Call { name, .. } => Some(self.identifier(*name).to_string()),
                _ => None,
            })
            .collect()
    }

    /// Listing of pools and code, for debugging.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "constants:");
        for (i, constant) in self.constants.iter().enumerate() {
            let _ = writeln!(out, "  #{} = {}", i, constant);
        }
        let _ = writeln!(out, "identifiers:");
        for (i, name) in self.identifiers.iter().enumerate() {
            let _ = writeln!(out, "  #{} = {}", i, name);
        }
        if !self.definitions.is_empty() {
            let _ = writeln!(out, "definitions:");
            for (i, function) in self.definitions.iter().enumerate() {
                let _ = writeln!(out, "  #{} = {}", i, function);
            }
        }
        let _ = writeln!(out, "code:");
        for (i, code) in self.codes.iter().enumerate() {
            let _ = writeln!(out, "  {:>3}: {}", i, self.describe(code));
        }
        out
    }

    fn describe(&self, code: &Opcode) -> String {
        match code {
            Opcode::Push(i) => match self.constants.get(*i) {
                Some(value) => format!("push {}", value),
                None => format!("push #{}", i),
            },
            Opcode::Load(i) => format!("load {}", self.identifier(*i)),
            Opcode::Call { name, argc } => format!("call {} ({})", self.identifier(*name), argc),
            Opcode::Convert(i) => format!("convert {}", self.identifier(*i)),
            Opcode::Assign(i) => format!("assign {}", self.identifier(*i)),
            Opcode::Define(i) => match self.definitions.get(*i) {
                Some(function) => format!("define {}", function.name),
                None => format!("define #{}", i),
            },
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Opcode::Push(i) => write!(f, "push #{}", i),
            Opcode::Load(i) => write!(f, "load #{}", i),
            Opcode::Call { name, argc } => write!(f, "call #{} ({})", name, argc),
            Opcode::Neg => write!(f, "neg"),
            Opcode::Add => write!(f, "add"),
            Opcode::Sub => write!(f, "sub"),
            Opcode::Mul => write!(f, "mul"),
            Opcode::Div => write!(f, "div"),
            Opcode::IntDiv => write!(f, "idiv"),
            Opcode::Mod => write!(f, "mod"),
            Opcode::Pow => write!(f, "pow"),
            Opcode::Fact => write!(f, "fact"),
            Opcode::Shl => write!(f, "shl"),
            Opcode::Shr => write!(f, "shr"),
            Opcode::BitAnd => write!(f, "and"),
            Opcode::BitOr => write!(f, "or"),
            Opcode::Convert(i) => write!(f, "convert #{}", i),
            Opcode::Assign(i) => write!(f, "assign #{}", i),
            Opcode::Define(i) => write!(f, "define #{}", i),
            Opcode::Sep => write!(f, "sep"),
        }
    }
}
