use std::fmt;
use std::rc::Rc;

use crate::ast::FunctionDecl;
use crate::environment::SharedEnv;

/// Signature of a host function exposed to scripts.
pub type NativeFn<'a> = fn(&[Value<'a>]) -> Result<Value<'a>, String>;

/// A runtime value. `'a` is the lifetime of the source/AST the program was
/// parsed from, which user functions keep a handle into.
#[derive(Debug, Clone)]
pub enum Value<'a> {
    NativeFunction {
        name: &'static str,
        arity: usize,
        func: NativeFn<'a>,
    },
    Function(Rc<LoxFunction<'a>>),
    Number(f64),
    String(String),
    Bool(bool),
    Nil,
}

/// A user function: its declaration plus the environment that was current
/// when the declaration executed.
pub struct LoxFunction<'a> {
    pub declaration: Rc<FunctionDecl<'a>>,
    pub closure: SharedEnv<'a>,
}

impl LoxFunction<'_> {
    pub fn name(&self) -> &str {
        self.declaration.name.lexeme
    }

    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }
}

// The closure chain can contain this very function, so it is left out.
impl fmt::Debug for LoxFunction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoxFunction")
            .field("name", &self.name())
            .field("arity", &self.arity())
            .finish_non_exhaustive()
    }
}

impl Value<'_> {
    /// nil and false are falsy; everything else, `0` and `""` included, is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }
}

impl PartialEq for Value<'_> {
    /// Same‑type values compare by value, functions by identity, and values
    /// of different types are never equal.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::NativeFunction { name: a, .. }, Value::NativeFunction { name: b, .. }) => {
                a == b
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::NativeFunction { .. } => write!(f, "<native fn>"),

            Value::Function(function) => write!(f, "<fn {}>", function.name()),

            Value::Number(n) => {
                if n.is_nan() {
                    write!(f, "NaN")
                } else if n.is_infinite() {
                    write!(f, "{}", if *n > 0.0 { "Infinity" } else { "-Infinity" })
                } else if n.abs() >= 1e21 {
                    // Shortest round-trip digits, exponent signed like `%g`.
                    write!(f, "{}", format!("{:e}", n).replacen('e', "e+", 1))
                } else if n.fract() == 0.0 {
                    write!(f, "{:.0}", n)
                } else {
                    write!(f, "{}", n)
                }
            }

            Value::String(s) => write!(f, "{}", s),

            Value::Bool(b) => write!(f, "{}", b),

            Value::Nil => write!(f, "nil"),
        }
    }
}
