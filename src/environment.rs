use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{LoxError, Result};
use crate::token::Token;
use crate::value::Value;

/// Environments are shared: blocks and calls hold the current one, closures
/// hold the one they were defined in.
pub type SharedEnv<'a> = Rc<RefCell<Environment<'a>>>;

/// One scope frame: bindings plus a link to the enclosing frame.
#[derive(Debug, Default)]
pub struct Environment<'a> {
    values: HashMap<&'a str, Value<'a>>,
    enclosing: Option<SharedEnv<'a>>,
}

impl<'a> Environment<'a> {
    /// A root (global) frame.
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: SharedEnv<'a>) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    pub fn shared(self) -> SharedEnv<'a> {
        Rc::new(RefCell::new(self))
    }

    /// Bind `name` in this frame, overwriting any previous binding.
    pub fn define(&mut self, name: &'a str, value: Value<'a>) {
        self.values.insert(name, value);
    }

    /// Look `name` up in this frame, then outward.
    pub fn get(&self, name: &Token<'_>) -> Result<Value<'a>> {
        if let Some(value) = self.values.get(name.lexeme) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            Err(undefined(name))
        }
    }

    /// Overwrite an existing binding of `name`, searching outward.
    pub fn assign(&mut self, name: &Token<'_>, value: Value<'a>) -> Result<()> {
        if let Some(slot) = self.values.get_mut(name.lexeme) {
            *slot = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(undefined(name))
        }
    }

    /// Read `name` from the frame exactly `distance` hops out, without
    /// searching.
    pub fn get_at(env: &SharedEnv<'a>, distance: usize, name: &Token<'_>) -> Result<Value<'a>> {
        let frame = Self::ancestor(env, distance, name)?;
        let value = frame.borrow().values.get(name.lexeme).cloned();

        value.ok_or_else(|| undefined(name))
    }

    /// Overwrite `name` in the frame exactly `distance` hops out.
    pub fn assign_at(
        env: &SharedEnv<'a>,
        distance: usize,
        name: &Token<'_>,
        value: Value<'a>,
    ) -> Result<()> {
        let frame = Self::ancestor(env, distance, name)?;
        let mut frame = frame.borrow_mut();

        match frame.values.get_mut(name.lexeme) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(undefined(name)),
        }
    }

    fn ancestor(env: &SharedEnv<'a>, distance: usize, name: &Token<'_>) -> Result<SharedEnv<'a>> {
        let mut frame: SharedEnv<'a> = Rc::clone(env);

        for _ in 0..distance {
            let next = frame.borrow().enclosing.clone();
            // The resolver only records distances that exist at runtime.
            frame = next.ok_or_else(|| undefined(name))?;
        }

        Ok(frame)
    }
}

fn undefined(name: &Token<'_>) -> LoxError {
    LoxError::runtime(name, format!("Undefined variable '{}'.", name.lexeme))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;
    use pretty_assertions::assert_eq;

    fn ident(name: &str) -> Token<'_> {
        Token::new(TokenType::IDENTIFIER, name, 1)
    }

    #[test]
    fn get_walks_outward() {
        let globals = Environment::new().shared();
        globals.borrow_mut().define("a", Value::Number(1.0));
        let inner = Environment::with_enclosing(Rc::clone(&globals));

        assert_eq!(inner.get(&ident("a")).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn undefined_lookup_names_the_variable() {
        let env = Environment::new();
        let err = env.get(&ident("missing")).unwrap_err();

        assert_eq!(err.to_string(), "Undefined variable 'missing'.\n[line 1]");
    }

    #[test]
    fn assign_requires_existing_binding() {
        let mut env = Environment::new();

        assert!(env.assign(&ident("x"), Value::Nil).is_err());

        env.define("x", Value::Nil);
        env.assign(&ident("x"), Value::Bool(true)).unwrap();
        assert_eq!(env.get(&ident("x")).unwrap(), Value::Bool(true));
    }

    #[test]
    fn distance_lookup_skips_shadowing_frames() {
        let outer = Environment::new().shared();
        outer.borrow_mut().define("a", Value::String("outer".into()));
        let inner = Environment::with_enclosing(Rc::clone(&outer)).shared();
        inner.borrow_mut().define("a", Value::String("inner".into()));

        let a = ident("a");
        assert_eq!(
            Environment::get_at(&inner, 0, &a).unwrap(),
            Value::String("inner".into())
        );
        assert_eq!(
            Environment::get_at(&inner, 1, &a).unwrap(),
            Value::String("outer".into())
        );

        Environment::assign_at(&inner, 1, &a, Value::Number(2.0)).unwrap();
        assert_eq!(outer.borrow().get(&a).unwrap(), Value::Number(2.0));
        assert_eq!(inner.borrow().get(&a).unwrap(), Value::String("inner".into()));
    }

    #[test]
    fn distance_past_the_root_is_an_error() {
        let env = Environment::new().shared();

        assert!(Environment::get_at(&env, 3, &ident("a")).is_err());
    }
}
