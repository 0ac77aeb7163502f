use crate::functions::{self, BuiltinFunction};
use crate::number::Number;
use std::f64::consts;
use std::fmt;

/// Name of the implicit answer register.
pub const ANS: &str = "ans";

/// Built-in constants and units, in SI base units.
const BUILTIN_VARIABLES: &[(&str, f64)] = &[
    ("pi", consts::PI),
    ("e", consts::E),
    ("phi", 1.618_033_988_749_895),
    // length
    ("meter", 1.0),
    ("metre", 1.0),
    ("centimeter", 0.01),
    ("millimeter", 0.001),
    ("kilometer", 1000.0),
    ("inch", 0.0254),
    ("foot", 0.3048),
    ("yard", 0.9144),
    ("mile", 1609.344),
    // mass
    ("gram", 0.001),
    ("kilogram", 1.0),
    ("tonne", 1000.0),
    ("pound", 0.453_592_37),
    ("ounce", 0.028_349_523_125),
    // time
    ("second", 1.0),
    ("minute", 60.0),
    ("hour", 3600.0),
    ("day", 86400.0),
    ("week", 604_800.0),
    // volume
    ("liter", 0.001),
    ("litre", 0.001),
    ("gallon", 0.003_785_411_784),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    BuiltIn,
    UserDefined,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub identifier: String,
    pub value: Number,
    pub kind: VariableKind,
}

impl Variable {
    pub fn new(identifier: &str, value: Number, kind: VariableKind) -> Self {
        Self {
            identifier: identifier.to_string(),
            value,
            kind,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.kind == VariableKind::BuiltIn
    }
}

/// Function defined by evaluating `name(params) = body`. The body is kept as
/// source text and compiled on first call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFunction {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: String,
}

impl UserFunction {
    pub fn new(name: &str, parameters: Vec<String>, body: &str) -> Self {
        Self {
            name: name.to_string(),
            parameters,
            body: body.trim().to_string(),
        }
    }
}

impl fmt::Display for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({}) = {}", self.name, self.parameters.join(", "), self.body)
    }
}

/// What a name refers to, resolved against built-ins first.
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    BuiltInVariable(&'a Variable),
    UserVariable(&'a Variable),
    BuiltInFunction(&'static BuiltinFunction),
    UserFunction(&'a UserFunction),
    Unresolved,
}

/// Variables and user functions of one session, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    variables: Vec<Variable>,
    functions: Vec<UserFunction>,
}

impl SymbolTable {
    /// Table holding the built-in variables.
    pub fn new() -> Self {
        let mut table = Self::default();
        table.initialize_builtin_variables();
        table
    }

    /// Restores every built-in variable. `ans` keeps its current value.
    pub fn initialize_builtin_variables(&mut self) {
        if !self.is_builtin_variable(ANS) {
            let ans = self.variable(ANS).map(|v| v.value.clone()).unwrap_or_default();
            self.set_variable(ANS, ans, VariableKind::BuiltIn);
        }
        for (name, value) in BUILTIN_VARIABLES {
            self.set_variable(name, Number::new(*value), VariableKind::BuiltIn);
        }
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.identifier == name)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    pub fn is_builtin_variable(&self, name: &str) -> bool {
        self.variable(name).is_some_and(Variable::is_builtin)
    }

    /// Creates or overwrites `name` in place.
    pub fn set_variable(&mut self, name: &str, value: Number, kind: VariableKind) {
        match self.variables.iter_mut().find(|v| v.identifier == name) {
            Some(existing) => {
                existing.value = value;
                existing.kind = kind;
            }
            None => self.variables.push(Variable::new(name, value, kind)),
        }
    }

    /// Removes `name`. Built-ins are only removed when `force_builtin` is set.
    pub fn unset_variable(&mut self, name: &str, force_builtin: bool) -> bool {
        let Some(index) = self.variables.iter().position(|v| v.identifier == name) else {
            return false;
        };
        if self.variables[index].is_builtin() && !force_builtin {
            return false;
        }
        self.variables.remove(index);
        true
    }

    pub fn unset_all_user_defined_variables(&mut self) {
        self.variables.retain(Variable::is_builtin);
    }

    pub fn user_function(&self, name: &str) -> Option<&UserFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn user_functions(&self) -> &[UserFunction] {
        &self.functions
    }

    pub fn has_user_function(&self, name: &str) -> bool {
        self.user_function(name).is_some()
    }

    pub fn set_user_function(&mut self, function: UserFunction) {
        match self.functions.iter_mut().find(|f| f.name == function.name) {
            Some(existing) => *existing = function,
            None => self.functions.push(function),
        }
    }

    pub fn unset_user_function(&mut self, name: &str) -> bool {
        let before = self.functions.len();
        self.functions.retain(|f| f.name != name);
        self.functions.len() != before
    }

    pub fn unset_all_user_functions(&mut self) {
        self.functions.clear();
    }

    /// Resolves a name used as a value.
    pub fn resolve_variable(&self, name: &str) -> Resolved<'_> {
        match self.variable(name) {
            Some(v) if v.is_builtin() => Resolved::BuiltInVariable(v),
            Some(v) => Resolved::UserVariable(v),
            None => Resolved::Unresolved,
        }
    }

    /// Resolves a name used as a callee: built-in functions, then user
    /// functions, then variables (so the caller can say "not a function").
    pub fn resolve_call(&self, name: &str) -> Resolved<'_> {
        if let Some(builtin) = functions::find(name) {
            return Resolved::BuiltInFunction(builtin);
        }
        if let Some(function) = self.user_function(name) {
            return Resolved::UserFunction(function);
        }
        self.resolve_variable(name)
    }
}
