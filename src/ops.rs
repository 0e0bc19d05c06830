use std::fmt::Display;

use thiserror::Error;

/// Number of operands an operator consumes from the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Unary,
    Binary,
}

impl Arity {
    pub fn operands(self) -> usize {
        match self {
            Arity::Unary => 1,
            Arity::Binary => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    SlashSlash,
    StarStar,
    Tilde,
    Dollar,
}

/// Why an operator refused its operands.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("operation requires integers")]
    NonInteger,
    #[error("no real solution")]
    NoRealSolution,
    #[error("result is out of range")]
    OutOfRange,
    #[error("expected {expected} operand(s), got {got}")]
    OperandCount { expected: usize, got: usize },
}

impl Operator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => Operator::Plus,
            "-" => Operator::Minus,
            "*" => Operator::Star,
            "/" => Operator::Slash,
            "%" => Operator::Percent,
            "//" => Operator::SlashSlash,
            "**" => Operator::StarStar,
            "~" => Operator::Tilde,
            "$" => Operator::Dollar,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Star => "*",
            Operator::Slash => "/",
            Operator::Percent => "%",
            Operator::SlashSlash => "//",
            Operator::StarStar => "**",
            Operator::Tilde => "~",
            Operator::Dollar => "$",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            Operator::Tilde | Operator::Dollar => Arity::Unary,
            _ => Arity::Binary,
        }
    }

    /// Applies the operator to its operands, oldest first.
    ///
    /// Unary operators take exactly one operand. Domain guards run here, not when the
    /// operator is classified, so `3 0 /` tokenizes fine and only fails once reduced.
    pub fn apply(self, operands: &[f64]) -> Result<f64, DomainError> {
        match (self, operands) {
            (Operator::Tilde, [value]) => Ok(-value),
            (Operator::Dollar, [value]) => Ok(*value),
            (Operator::Plus, [lhs, rhs]) => Ok(lhs + rhs),
            (Operator::Minus, [lhs, rhs]) => Ok(lhs - rhs),
            (Operator::Star, [lhs, rhs]) => Ok(lhs * rhs),
            (Operator::Slash, [lhs, rhs]) => {
                if *rhs == 0.0 {
                    return Err(DomainError::DivisionByZero);
                }
                Ok(lhs / rhs)
            }
            (Operator::Percent, [lhs, rhs]) => {
                integers(*lhs, *rhs)?;
                Ok(floored_rem(*lhs, *rhs))
            }
            (Operator::SlashSlash, [lhs, rhs]) => {
                integers(*lhs, *rhs)?;
                Ok((lhs - floored_rem(*lhs, *rhs)) / rhs)
            }
            (Operator::StarStar, [base, exponent]) => power(*base, *exponent),
            (op, operands) => Err(DomainError::OperandCount {
                expected: op.arity().operands(),
                got: operands.len(),
            }),
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

// zero divisor wins over the integrality check
fn integers(lhs: f64, rhs: f64) -> Result<(), DomainError> {
    if rhs == 0.0 {
        return Err(DomainError::DivisionByZero);
    }
    if lhs.fract() != 0.0 || rhs.fract() != 0.0 {
        return Err(DomainError::NonInteger);
    }
    Ok(())
}

/// Remainder whose sign follows the divisor.
fn floored_rem(lhs: f64, rhs: f64) -> f64 {
    let rem = lhs % rhs;
    if rem != 0.0 && (rem < 0.0) != (rhs < 0.0) {
        rem + rhs
    } else {
        rem
    }
}

fn power(base: f64, exponent: f64) -> Result<f64, DomainError> {
    if base == 0.0 && exponent < 0.0 {
        return Err(DomainError::DivisionByZero);
    }
    let result = base.powf(exponent);
    // a NaN operand carries through, only a fresh NaN means a non-real result
    if result.is_nan() && !base.is_nan() && !exponent.is_nan() {
        Err(DomainError::NoRealSolution)
    } else if result.is_infinite() && base.is_finite() && exponent.is_finite() {
        Err(DomainError::OutOfRange)
    } else {
        Ok(result)
    }
}
