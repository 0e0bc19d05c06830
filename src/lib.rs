//! Reverse Polish Notation calculator.
//!
//! `3 4 +` evaluates to `7`. Supported are the binary operators `+ - * / % // **`, the
//! unary operators `~` (negate) and `$` (identity), and bracket groups such as
//! `4 ( 5 9 * ) +` whose content must itself be a complete RPN expression.

pub mod eval;
pub mod lex;
pub mod ops;

pub use eval::{ArithmeticDomainError, Interpreter, Step};
pub use lex::{Lexer, Token, TokenKind};
pub use ops::{Arity, DomainError, Operator};

/// Tokenizes, validates and reduces `expression` to a single number.
///
/// Failures are [`miette::Error`]s wrapping one of the error types in [`lex`] or an
/// [`ArithmeticDomainError`]; use `downcast_ref` to tell them apart.
pub fn evaluate(expression: &str) -> Result<f64, miette::Error> {
    Interpreter::new(None, expression)?.finish()
}

/// Returns the validated, bracket-free token sequence of `expression`.
pub fn tokenize(expression: &str) -> Result<Vec<Token<'_>>, miette::Error> {
    Lexer::new(None, expression).tokenize()
}
