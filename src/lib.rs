//! Rox: a tree-walking interpreter for the Lox scripting language.
//!
//! The pipeline is [`scanner`] → [`parser`] → [`resolver`] →
//! [`interpreter`]; [`driver`] strings the stages together.

pub mod ast;
pub mod ast_printer;
pub mod driver;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod token;
pub mod value;
