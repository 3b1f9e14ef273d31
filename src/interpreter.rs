use std::io::{self, Write};
use std::mem;
use std::rc::Rc;

use chrono::Utc;
use log::{debug, info};

use crate::ast::{Expr, ExprId, LiteralValue, Stmt};
use crate::environment::{Environment, SharedEnv};
use crate::error::{LoxError, Result};
use crate::resolver::Locals;
use crate::token::{Token, TokenType};
use crate::value::{LoxFunction, Value};

/// Deepest chain of nested user-function calls before the interpreter gives
/// up with a runtime error instead of exhausting the native stack.
pub const MAX_CALL_DEPTH: usize = 255;

/// How a statement finished. An early `return` is a normal control outcome,
/// not an error, so it travels on the `Ok` side.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion<'a> {
    Normal,
    Return(Value<'a>),
}

pub struct Interpreter<'a> {
    globals: SharedEnv<'a>,
    environment: SharedEnv<'a>,
    locals: Locals,
    out: Box<dyn Write + 'a>,
    depth: usize,
}

impl Default for Interpreter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Interpreter<'a> {
    /// Creates an Interpreter printing to stdout.
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Creates an Interpreter whose `print` statements write to `out`.
    /// Defines native functions such as `clock`.
    pub fn with_output(out: Box<dyn Write + 'a>) -> Self {
        info!("Initializing Interpreter");

        let globals: SharedEnv<'a> = Environment::new().shared();

        debug!("Defining native function 'clock'");

        globals.borrow_mut().define(
            "clock",
            Value::NativeFunction {
                name: "clock",
                arity: 0,
                func: |_args: &[Value<'a>]| {
                    let micros: i64 = Utc::now().timestamp_micros();
                    Ok(Value::Number(micros as f64 / 1_000_000.0))
                },
            },
        );

        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: Locals::new(),
            out,
            depth: 0,
        }
    }

    /// Install resolution results. Called once per resolved program; the
    /// REPL calls it once per line.
    pub fn resolve(&mut self, locals: Locals) {
        debug!("Installing {} resolved reference(s)", locals.len());

        self.locals.extend(locals);
    }

    /// Interprets a list of statements (a "program"). The first runtime error
    /// aborts the remaining statements and is returned.
    pub fn interpret(&mut self, statements: &[Stmt<'a>]) -> Result<()> {
        info!("Interpreting {} statements", statements.len());

        for stmt in statements {
            if let Completion::Return(value) = self.execute(stmt)? {
                // The resolver rejects top-level `return`.
                debug!("Top-level return of {} ignored", value);
                break;
            }
        }

        self.out.flush()?;

        info!("Interpretation completed successfully");
        Ok(())
    }

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt<'a>) -> Result<Completion<'a>> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
            }

            Stmt::Print(expr) => {
                let value: Value<'a> = self.evaluate(expr)?;
                writeln!(self.out, "{}", value)?;
            }

            Stmt::Var { name, initializer } => {
                let value: Value<'a> = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Defining variable '{}' = {}", name.lexeme, value);

                self.environment.borrow_mut().define(name.lexeme, value);
            }

            Stmt::Block(statements) => {
                let env = Environment::with_enclosing(Rc::clone(&self.environment)).shared();

                return self.execute_block(statements, env);
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    return self.execute(then_branch);
                } else if let Some(else_stmt) = else_branch {
                    return self.execute(else_stmt);
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let done @ Completion::Return(_) = self.execute(body)? {
                        return Ok(done);
                    }
                }
            }

            Stmt::Function(decl) => {
                debug!("Defining function '{}'", decl.name.lexeme);

                // Capturing the current frame, which is also where the name
                // is bound, lets the body refer to itself.
                let function = LoxFunction {
                    declaration: Rc::clone(decl),
                    closure: Rc::clone(&self.environment),
                };

                self.environment
                    .borrow_mut()
                    .define(decl.name.lexeme, Value::Function(Rc::new(function)));
            }

            Stmt::Return { value, .. } => {
                let value: Value<'a> = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Returning value: {}", value);

                return Ok(Completion::Return(value));
            }
        }

        Ok(Completion::Normal)
    }

    /// Runs `statements` in `env`, restoring the previous environment on
    /// every exit path.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt<'a>],
        env: SharedEnv<'a>,
    ) -> Result<Completion<'a>> {
        let previous: SharedEnv<'a> = mem::replace(&mut self.environment, env);

        let result = self.execute_all(statements);

        self.environment = previous;
        result
    }

    fn execute_all(&mut self, statements: &[Stmt<'a>]) -> Result<Completion<'a>> {
        for stmt in statements {
            if let done @ Completion::Return(_) = self.execute(stmt)? {
                return Ok(done);
            }
        }

        Ok(Completion::Normal)
    }

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr<'a>) -> Result<Value<'a>> {
        match expr {
            Expr::Literal(literal) => Ok(literal_value(literal)),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left_val: Value<'a> = self.evaluate(left)?;

                let decided = if operator.token_type == TokenType::OR {
                    left_val.is_truthy()
                } else {
                    !left_val.is_truthy()
                };

                if decided {
                    Ok(left_val)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Variable { id, name } => self.look_up_variable(*id, name),

            Expr::Assign { id, name, value } => {
                let value: Value<'a> = self.evaluate(value)?;

                match self.locals.depth(*id) {
                    Some(distance) => {
                        Environment::assign_at(&self.environment, distance, name, value.clone())?
                    }
                    None => self.globals.borrow_mut().assign(name, value.clone())?,
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee_val: Value<'a> = self.evaluate(callee)?;

                let mut arg_values: Vec<Value<'a>> = Vec::with_capacity(arguments.len());
                for arg in arguments {
                    arg_values.push(self.evaluate(arg)?);
                }

                self.call(callee_val, paren, arg_values)
            }
        }
    }

    fn look_up_variable(&self, id: ExprId, name: &Token<'_>) -> Result<Value<'a>> {
        match self.locals.depth(id) {
            Some(distance) => Environment::get_at(&self.environment, distance, name),
            None => self.globals.borrow().get(name),
        }
    }

    /// Evaluates a unary expression.
    fn evaluate_unary(&mut self, op: &Token<'_>, right: &Expr<'a>) -> Result<Value<'a>> {
        let right_val: Value<'a> = self.evaluate(right)?;

        match op.token_type {
            TokenType::MINUS => match right_val {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(LoxError::runtime(op, "Operand must be a number.")),
            },
            TokenType::BANG => Ok(Value::Bool(!right_val.is_truthy())),
            _ => Err(LoxError::runtime(op, "Invalid unary operator.")),
        }
    }

    /// Evaluates a binary expression. Both operands are evaluated, left first,
    /// before any type check.
    fn evaluate_binary(
        &mut self,
        left: &Expr<'a>,
        op: &Token<'_>,
        right: &Expr<'a>,
    ) -> Result<Value<'a>> {
        let left_val: Value<'a> = self.evaluate(left)?;
        let right_val: Value<'a> = self.evaluate(right)?;

        match op.token_type {
            TokenType::EQUAL_EQUAL => return Ok(Value::Bool(left_val == right_val)),
            TokenType::BANG_EQUAL => return Ok(Value::Bool(left_val != right_val)),
            TokenType::PLUS => {
                return match (left_val, right_val) {
                    (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                    (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
                    _ => Err(LoxError::runtime(
                        op,
                        "Operands must be two numbers or two strings.",
                    )),
                };
            }
            _ => {}
        }

        let (a, b) = match (left_val, right_val) {
            (Value::Number(a), Value::Number(b)) => (a, b),
            _ => return Err(LoxError::runtime(op, "Operands must be numbers.")),
        };

        let result = match op.token_type {
            TokenType::MINUS => Value::Number(a - b),
            TokenType::STAR => Value::Number(a * b),
            // IEEE semantics: x/0 is ±Infinity or NaN.
            TokenType::SLASH => Value::Number(a / b),
            TokenType::GREATER => Value::Bool(a > b),
            TokenType::GREATER_EQUAL => Value::Bool(a >= b),
            TokenType::LESS => Value::Bool(a < b),
            TokenType::LESS_EQUAL => Value::Bool(a <= b),
            _ => return Err(LoxError::runtime(op, "Invalid binary operator.")),
        };

        Ok(result)
    }

    /// Invokes a callable (native or user-defined function).
    fn call(
        &mut self,
        callee: Value<'a>,
        paren: &Token<'_>,
        args: Vec<Value<'a>>,
    ) -> Result<Value<'a>> {
        let arity: usize = match &callee {
            Value::NativeFunction { arity, .. } => *arity,
            Value::Function(function) => function.arity(),
            _ => {
                return Err(LoxError::runtime(
                    paren,
                    "Can only call functions and classes.",
                ))
            }
        };

        if args.len() != arity {
            return Err(LoxError::runtime(
                paren,
                format!("Expected {} arguments but got {}.", arity, args.len()),
            ));
        }

        match callee {
            Value::NativeFunction { name, func, .. } => {
                debug!("Calling native function '{}'", name);

                func(&args).map_err(|message| LoxError::runtime(paren, message))
            }

            Value::Function(function) => {
                debug!("Calling user-defined function '{}'", function.name());

                if self.depth >= MAX_CALL_DEPTH {
                    return Err(LoxError::runtime(paren, "Stack overflow."));
                }

                // A fresh frame under the *closure*, not the caller.
                let mut frame = Environment::with_enclosing(Rc::clone(&function.closure));
                for (param, arg) in function.declaration.params.iter().zip(args) {
                    frame.define(param.lexeme, arg);
                }

                self.depth += 1;
                let result = self.execute_block(&function.declaration.body, frame.shared());
                self.depth -= 1;

                let completion = result?;

                match completion {
                    Completion::Return(value) => Ok(value),
                    Completion::Normal => Ok(Value::Nil),
                }
            }

            _ => unreachable!("non-callables are rejected above"),
        }
    }
}

fn literal_value<'a>(literal: &LiteralValue) -> Value<'a> {
    match literal {
        LiteralValue::Number(n) => Value::Number(*n),
        LiteralValue::Str(s) => Value::String(s.clone()),
        LiteralValue::True => Value::Bool(true),
        LiteralValue::False => Value::Bool(false),
        LiteralValue::Nil => Value::Nil,
    }
}
