//! The Accord policy language
//!
//! Source text is tokenized and parsed into a [`Script`], which the
//! tree-walking interpreter evaluates against an [`Environment`]. The value
//! model and operator semantics here are shared with the bytecode compiler.

/// Abstract syntax tree
pub mod ast;
/// Lexical scope chain
pub mod environment;
pub(crate) mod interpreter;
pub(crate) mod lexer;
/// Operator semantics
pub mod operators;
/// Source text to [`Script`]
pub mod parser;
/// Standard library
pub mod stdlib;
/// Runtime values
pub mod value;

pub use ast::{BinaryOperator, Expression, Script, SourceLocation, Statement, UnaryOperator};
pub use environment::Environment;
pub use parser::{MAX_NESTING_DEPTH, parse, parse_named};
pub use stdlib::{NativeContext, NativeFunction, Stdlib};
pub use value::Value;

/// Whether `word` is reserved and cannot be used as a name.
pub fn is_keyword(word: &str) -> bool {
    lexer::keyword(word).is_some()
}
