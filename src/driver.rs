//! Pipeline driver: source text in, output and diagnostics out.
//!
//! Stages run strictly in order, Lexing → Parsing → Resolving →
//! Interpreting. Lexing and parsing both always run so their diagnostics are
//! reported together; any static diagnostic stops the run before
//! interpretation, and the first runtime error stops interpretation.
//!
//! I/O failures on the output sink are returned as `Err`; everything the
//! program itself got wrong is an [`Outcome`].

use std::io::{self, Write};
use std::slice;

use log::info;

use crate::ast::Stmt;
use crate::ast_printer::AstPrinter;
use crate::error::{LoxError, Result};
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::{Locals, Resolver};
use crate::scanner::{scan_tokens, Scanner};
use crate::token::Token;

/// Pipeline stage, used for logging and to say where a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lexing,
    Parsing,
    Resolving,
    Interpreting,
}

/// Result of driving a source text through the pipeline.
#[derive(Debug)]
pub enum Outcome {
    Completed,

    /// Lexical, syntax or resolution errors; nothing was executed.
    StaticErrors {
        stage: Stage,
        errors: Vec<LoxError>,
    },

    /// Execution stopped at this error.
    RuntimeError(LoxError),
}

impl Outcome {
    /// 0 on success, 65 for static errors, 70 for a runtime error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Completed => 0,
            Outcome::StaticErrors { .. } => 65,
            Outcome::RuntimeError(_) => 70,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed)
    }

    /// Every diagnostic, in the order it was produced.
    pub fn diagnostics(&self) -> &[LoxError] {
        match self {
            Outcome::Completed => &[],
            Outcome::StaticErrors { errors, .. } => errors,
            Outcome::RuntimeError(e) => slice::from_ref(e),
        }
    }
}

/// Write every token of `source`, one per line, as text or JSON.
pub fn tokenize<W: Write>(source: &str, mut out: W, json: bool) -> Result<Outcome> {
    enter(Stage::Lexing);

    let mut errors: Vec<LoxError> = Vec::new();

    for result in Scanner::new(source) {
        match result {
            Ok(token) if json => {
                let line = serde_json::to_string(&token).map_err(io::Error::from)?;
                writeln!(out, "{}", line)?;
            }
            Ok(token) => writeln!(out, "{}", token)?,
            Err(e) => errors.push(e),
        }
    }
    out.flush()?;

    Ok(static_outcome(Stage::Lexing, errors).unwrap_or(Outcome::Completed))
}

/// Parse `source` as a single expression and write its prefix form.
pub fn parse<W: Write>(source: &str, mut out: W) -> Result<Outcome> {
    let (tokens, lex_errors) = lex(source);

    enter(Stage::Parsing);
    let parsed = Parser::new(&tokens).parse_expression();

    match with_lex_errors(lex_errors, parsed) {
        Ok(expr) => {
            writeln!(out, "{}", AstPrinter::print(&expr))?;
            out.flush()?;
            Ok(Outcome::Completed)
        }
        Err(outcome) => Ok(outcome),
    }
}

/// Evaluate `source` as a single expression and write its value.
pub fn evaluate<W: Write>(source: &str, mut out: W) -> Result<Outcome> {
    let (tokens, lex_errors) = lex(source);

    enter(Stage::Parsing);
    let parsed = Parser::new(&tokens).parse_expression();
    let expr = match with_lex_errors(lex_errors, parsed) {
        Ok(expr) => expr,
        Err(outcome) => return Ok(outcome),
    };

    enter(Stage::Interpreting);
    // A bare expression cannot print; its value is written here instead.
    let mut interpreter = Interpreter::with_output(Box::new(io::sink()));

    match interpreter.evaluate(&expr) {
        Ok(value) => {
            writeln!(out, "{}", value)?;
            out.flush()?;
            Ok(Outcome::Completed)
        }
        Err(e) => runtime_outcome(e),
    }
}

/// Run `source` as a program; `print` output goes to `out`.
pub fn run<'a, W: Write + 'a>(source: &'a str, out: W) -> Result<Outcome> {
    let (tokens, lex_errors) = lex(source);

    enter(Stage::Parsing);
    let parsed = Parser::new(&tokens).parse();
    let statements = match with_lex_errors(lex_errors, parsed) {
        Ok(statements) => statements,
        Err(outcome) => return Ok(outcome),
    };

    let locals = match resolve(&statements) {
        Ok(locals) => locals,
        Err(outcome) => return Ok(outcome),
    };

    enter(Stage::Interpreting);
    let mut interpreter = Interpreter::with_output(Box::new(out));
    interpreter.resolve(locals);

    match interpreter.interpret(&statements) {
        Ok(()) => Ok(Outcome::Completed),
        Err(e) => runtime_outcome(e),
    }
}

/// An interactive session: one interpreter whose globals persist from line
/// to line.
pub struct Session {
    interpreter: Interpreter<'static>,
    next_id: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    pub fn with_output(out: Box<dyn Write>) -> Self {
        info!("Starting interactive session");

        Session {
            interpreter: Interpreter::with_output(out),
            next_id: 0,
        }
    }

    /// Run one line of input through the full pipeline.
    pub fn run_line(&mut self, line: String) -> Result<Outcome> {
        // Functions declared on this line may be called from any later line,
        // so the text and its tokens must live as long as the session.
        let source: &'static str = Box::leak(line.into_boxed_str());
        let (tokens, lex_errors) = lex(source);
        let tokens: &'static [Token<'static>] = Box::leak(tokens.into_boxed_slice());

        enter(Stage::Parsing);
        let mut parser = Parser::starting_at(tokens, self.next_id);
        let parsed = parser.parse();
        self.next_id = parser.next_id();

        let statements = match with_lex_errors(lex_errors, parsed) {
            Ok(statements) => statements,
            Err(outcome) => return Ok(outcome),
        };

        let locals = match resolve(&statements) {
            Ok(locals) => locals,
            Err(outcome) => return Ok(outcome),
        };

        enter(Stage::Interpreting);
        self.interpreter.resolve(locals);

        match self.interpreter.interpret(&statements) {
            Ok(()) => Ok(Outcome::Completed),
            Err(e) => runtime_outcome(e),
        }
    }
}

// ─────────────────────────────── helpers ─────────────────────────────────

fn enter(stage: Stage) {
    info!("Entering stage {:?}", stage);
}

fn lex(source: &str) -> (Vec<Token<'_>>, Vec<LoxError>) {
    enter(Stage::Lexing);

    scan_tokens(source)
}

fn resolve(statements: &[Stmt<'_>]) -> std::result::Result<Locals, Outcome> {
    enter(Stage::Resolving);

    Resolver::new().resolve(statements).map_err(|errors| Outcome::StaticErrors {
        stage: Stage::Resolving,
        errors,
    })
}

/// Merge lexical errors in front of the parser's; either kind aborts.
fn with_lex_errors<T>(
    mut errors: Vec<LoxError>,
    parsed: std::result::Result<T, Vec<LoxError>>,
) -> std::result::Result<T, Outcome> {
    match parsed {
        Ok(value) => match static_outcome(Stage::Parsing, errors) {
            Some(outcome) => Err(outcome),
            None => Ok(value),
        },
        Err(parse_errors) => {
            errors.extend(parse_errors);
            Err(Outcome::StaticErrors {
                stage: Stage::Parsing,
                errors,
            })
        }
    }
}

fn static_outcome(stage: Stage, errors: Vec<LoxError>) -> Option<Outcome> {
    if errors.is_empty() {
        None
    } else {
        info!("Stage {:?} reported {} error(s)", stage, errors.len());

        Some(Outcome::StaticErrors { stage, errors })
    }
}

/// Runtime errors become an outcome; I/O failures are passed up.
fn runtime_outcome(e: LoxError) -> Result<Outcome> {
    match e {
        LoxError::Runtime { .. } => {
            info!("Runtime error: {}", e);

            Ok(Outcome::RuntimeError(e))
        }
        other => Err(other),
    }
}
