use std::fmt::Display;

use miette::{Diagnostic, Error, LabeledSpan, NamedSource, SourceSpan, miette};
use thiserror::Error;

use crate::{
    Lexer,
    lex::{Token, TokenKind},
    ops::{DomainError, Operator},
};

#[derive(Error, Debug, Diagnostic)]
#[error("{reason} in `{expression}`")]
#[diagnostic(help(
    "`/`, `%` and `//` need a non-zero divisor, `%` and `//` need integers, `**` must stay real"
))]
pub struct ArithmeticDomainError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this operation")]
    bad_bit: SourceSpan,

    pub operator: Operator,
    #[source]
    pub reason: DomainError,
    pub expression: String,
}

/// One operator application, as performed by the [`Interpreter`].
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub operator: Operator,
    pub operands: Vec<f64>,
    pub result: f64,
}

impl Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for operand in &self.operands {
            write!(f, "{operand} ")?;
        }
        write!(f, "{} = {}", self.operator, self.result)
    }
}

#[derive(Debug, Clone, Copy)]
struct Operand {
    value: f64,
    start: usize,
    end: usize,
}

/// Reduces a validated token sequence with an operand stack.
///
/// Iterating yields every reduction in order; [`Interpreter::finish`] yields the value.
/// Pushing numbers and applying each operator to the top of the stack reduces the
/// leftmost ready operator first, the same order as rescanning the sequence would.
pub struct Interpreter<'de> {
    filename: Option<&'de str>,
    whole: &'de str,
    tokens: std::vec::IntoIter<Token<'de>>,
    stack: Vec<Operand>,
}

impl<'de> Iterator for Interpreter<'de> {
    type Item = Result<Step, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let token = self.tokens.next()?;
            match token.kind {
                TokenKind::Number(value) => self.stack.push(Operand {
                    value,
                    start: token.offset,
                    end: token.end(),
                }),
                TokenKind::BinaryOperator(op) | TokenKind::UnaryOperator(op) => {
                    let step = self.reduce(op, token);
                    if step.is_err() {
                        self.tokens = Vec::new().into_iter();
                    }
                    return Some(step);
                }
                TokenKind::LeftParen | TokenKind::RightParen => continue,
            }
        }
    }
}

impl<'de> Interpreter<'de> {
    pub fn new(filename: Option<&'de str>, whole: &'de str) -> Result<Self, Error> {
        let tokens = Lexer::new(filename, whole).tokenize()?;
        Ok(Self::with_tokens(filename, whole, tokens))
    }

    /// Skips tokenizing; `tokens` should come from [`Lexer::tokenize`] over `whole`.
    pub fn with_tokens(
        filename: Option<&'de str>,
        whole: &'de str,
        tokens: Vec<Token<'de>>,
    ) -> Self {
        Self {
            filename,
            whole,
            tokens: tokens.into_iter(),
            stack: Vec::with_capacity(4),
        }
    }

    /// Runs any remaining reductions and returns the single value left.
    pub fn finish(mut self) -> Result<f64, Error> {
        for step in self.by_ref() {
            step?;
        }
        match self.stack.as_slice() {
            [operand] => Ok(operand.value),
            stack => Err(miette!(
                "expression reduced to {} values instead of one",
                stack.len()
            )),
        }
    }

    fn reduce(&mut self, op: Operator, token: Token<'de>) -> Result<Step, Error> {
        let count = op.arity().operands();
        if self.stack.len() < count {
            return Err(miette!(
                labels = vec![LabeledSpan::at(token.offset..token.end(), "here")],
                "operator `{op}` has nothing to reduce"
            )
            .with_source_code(self.whole.to_string()));
        }

        let operands = self.stack.split_off(self.stack.len() - count);
        let values: Vec<f64> = operands.iter().map(|operand| operand.value).collect();
        let start = operands.first().map_or(token.offset, |operand| operand.start);
        let end = token.end();

        match op.apply(&values) {
            Ok(result) => {
                self.stack.push(Operand {
                    value: result,
                    start,
                    end,
                });
                Ok(Step {
                    operator: op,
                    operands: values,
                    result,
                })
            }
            Err(reason) => Err(ArithmeticDomainError {
                src: NamedSource::new(self.filename.unwrap_or("<input>"), self.whole.to_string()),
                bad_bit: SourceSpan::from(start..end),
                operator: op,
                reason,
                expression: self.whole[start..end].to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(input: &str) -> Result<f64, Error> {
        Interpreter::new(None, input)?.finish()
    }

    #[test]
    fn reduces_left_to_right() {
        assert_eq!(eval("5 8 9 + -").unwrap(), -12.0);
        assert_eq!(eval("9 6 4 2 / - *").unwrap(), 36.0);
    }

    #[test]
    fn steps_follow_reduction_order() {
        let steps: Vec<Step> = Interpreter::new(None, "7 ~ 3 +")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            steps,
            vec![
                Step {
                    operator: Operator::Tilde,
                    operands: vec![7.0],
                    result: -7.0,
                },
                Step {
                    operator: Operator::Plus,
                    operands: vec![-7.0, 3.0],
                    result: -4.0,
                },
            ]
        );
        assert_eq!(steps[1].to_string(), "-7 3 + = -4");
    }

    #[test]
    fn unary_leaves_deeper_operands_alone() {
        assert_eq!(eval("35 5 ~ /").unwrap(), -7.0);
        assert_eq!(eval("3 7 * ~").unwrap(), -21.0);
    }

    #[test]
    fn single_number() {
        assert_eq!(eval("42").unwrap(), 42.0);
        assert_eq!(eval("( 5 ~ )").unwrap(), -5.0);
    }

    #[test]
    fn domain_error_points_at_operation() {
        let err = eval("1 3 0 / +").unwrap_err();
        let err = err.downcast_ref::<ArithmeticDomainError>().expect("domain error");
        assert_eq!(err.reason, DomainError::DivisionByZero);
        assert_eq!(err.operator, Operator::Slash);
        assert_eq!(err.expression, "3 0 /");
    }

    #[test]
    fn domain_error_chains_its_reason() {
        let err = eval("3 0 /").unwrap_err();
        let err = err.downcast_ref::<ArithmeticDomainError>().expect("domain error");
        let source = std::error::Error::source(err).expect("reason as source");
        assert_eq!(
            source.downcast_ref::<DomainError>(),
            Some(&DomainError::DivisionByZero)
        );
    }

    #[test]
    fn iteration_stops_after_error() {
        let mut interpreter = Interpreter::new(None, "3 0 / 1 +").unwrap();
        assert!(interpreter.next().unwrap().is_err());
        assert!(interpreter.next().is_none());
    }

    #[test]
    fn unvalidated_tokens_fail_without_panicking() {
        let tokens = Lexer::new(None, "1 2")
            .map(|token| token.unwrap())
            .collect::<Vec<_>>();
        assert!(Interpreter::with_tokens(None, "1 2", tokens).finish().is_err());

        let tokens = Lexer::new(None, "+")
            .map(|token| token.unwrap())
            .collect::<Vec<_>>();
        assert!(Interpreter::with_tokens(None, "+", tokens).finish().is_err());
    }
}
