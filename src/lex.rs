use std::fmt::Display;

use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;

use crate::ops::{Arity, Operator};

#[derive(Error, Debug, Diagnostic)]
#[error("empty expression")]
#[diagnostic(help("enter numbers and operators separated by spaces, e.g. `3 4 +`"))]
pub struct EmptyInputError {
    #[source_code]
    src: NamedSource<String>,
}

#[derive(Error, Debug, Diagnostic)]
#[error("unrecognized token `{token}`")]
#[diagnostic(help(
    "supported tokens are numbers, `(` and `)`, binary operators (+ - * / % // **) and unary operators (~ $)"
))]
pub struct UnknownTokenError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this token")]
    bad_bit: SourceSpan,

    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bracket {
    Opening,
    Closing,
}

impl Display for Bracket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bracket::Opening => write!(f, "opening"),
            Bracket::Closing => write!(f, "closing"),
        }
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("unmatched {bracket} bracket")]
#[diagnostic(help("every `(` must be closed by a matching `)`"))]
pub struct UnmatchedBracketError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this bracket")]
    bad_bit: SourceSpan,

    pub bracket: Bracket,
}

#[derive(Error, Debug, Diagnostic)]
#[error("invalid expression in brackets: {content}")]
#[diagnostic(help("a bracket group must be a complete RPN expression that reduces to one value"))]
pub struct InvalidBracketContentError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this group")]
    bad_bit: SourceSpan,

    pub content: String,
}

#[derive(Error, Debug, Diagnostic)]
#[error("expression does not reduce to a single value: {reason}")]
#[diagnostic(help("each binary operator needs two values before it, and one value must remain"))]
pub struct UnbalancedExpressionError {
    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    bad_bit: SourceSpan,

    pub reason: String,
}

#[derive(Error, Debug, Diagnostic)]
#[error("misplaced unary operator `{operator}` at position {position} (brackets excluded)")]
#[diagnostic(help("a unary operator follows the value it applies to, e.g. `7 ~`"))]
pub struct MisplacedUnaryOperatorError {
    #[source_code]
    src: NamedSource<String>,

    #[label("nothing to apply this to")]
    bad_bit: SourceSpan,

    pub operator: Operator,
    pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    pub literal: &'de str,
    pub offset: usize,
}

impl Token<'_> {
    pub fn span(&self) -> SourceSpan {
        SourceSpan::from(self.offset..self.end())
    }

    pub fn end(&self) -> usize {
        self.offset + self.literal.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    Number(f64),
    BinaryOperator(Operator),
    UnaryOperator(Operator),
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.literal;
        match self.kind {
            TokenKind::LeftParen => write!(f, "LEFT_PAREN {lit} null"),
            TokenKind::RightParen => write!(f, "RIGHT_PAREN {lit} null"),
            TokenKind::Number(n) => write!(f, "NUMBER {lit} {n}"),
            TokenKind::BinaryOperator(_) => write!(f, "BINARY_OPERATOR {lit} null"),
            TokenKind::UnaryOperator(_) => write!(f, "UNARY_OPERATOR {lit} null"),
        }
    }
}

/// Returns whether `literal` is a plain decimal number such as `3`, `-2.5`, `.5` or `1e3`.
pub fn is_number(literal: &str) -> bool {
    parse_number(literal).is_some()
}

pub fn parse_number(literal: &str) -> Option<f64> {
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());

    let unsigned = literal.strip_prefix(['+', '-']).unwrap_or(literal);
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(at) => (&unsigned[..at], Some(&unsigned[at + 1..])),
        None => (unsigned, None),
    };

    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return None;
    }
    if let Some(exponent) = exponent {
        let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
        if digits.is_empty() || !all_digits(digits) {
            return None;
        }
    }

    literal.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Splits an expression on whitespace and classifies each part.
///
/// The iterator only classifies; bracket matching and stack balance are checked by
/// [`Lexer::tokenize`].
pub struct Lexer<'de> {
    filename: Option<&'de str>,
    whole: &'de str,
    rest: &'de str,
    pub byte: usize,
}

impl<'de> Lexer<'de> {
    pub fn new(filename: Option<&'de str>, input: &'de str) -> Self {
        Lexer {
            filename,
            whole: input,
            rest: input,
            byte: 0,
        }
    }

    fn source(&self) -> NamedSource<String> {
        source(self.filename, self.whole)
    }

    /// Produces the flattened, validated token sequence. Brackets are checked and dropped.
    pub fn tokenize(self) -> Result<Vec<Token<'de>>, Error> {
        let (filename, whole) = (self.filename, self.whole);

        if whole.trim().is_empty() {
            return Err(EmptyInputError {
                src: self.source(),
            }
            .into());
        }

        let mut tokens = Vec::new();
        let mut open = Vec::new();
        // only the most recently opened group is captured
        let mut group: Vec<Token<'de>> = Vec::new();
        let mut capturing = false;

        for token in self {
            let token = token?;
            match token.kind {
                TokenKind::LeftParen => {
                    open.push(token.offset);
                    group.clear();
                    capturing = true;
                }
                TokenKind::RightParen => {
                    let Some(start) = open.pop() else {
                        return Err(UnmatchedBracketError {
                            src: source(filename, whole),
                            bad_bit: token.span(),
                            bracket: Bracket::Closing,
                        }
                        .into());
                    };
                    if balance(&group).is_err() {
                        return Err(InvalidBracketContentError {
                            src: source(filename, whole),
                            bad_bit: SourceSpan::from(start..token.end()),
                            content: group_text(&group),
                        }
                        .into());
                    }
                    capturing = false;
                }
                _ => {
                    if capturing {
                        group.push(token);
                    }
                    tokens.push(token);
                }
            }
        }

        if let Some(&start) = open.last() {
            return Err(UnmatchedBracketError {
                src: source(filename, whole),
                bad_bit: SourceSpan::from(start..start + 1),
                bracket: Bracket::Opening,
            }
            .into());
        }

        match balance(&tokens) {
            Ok(()) => Ok(tokens),
            Err(Imbalance::MisplacedUnary { index, operator }) => {
                Err(MisplacedUnaryOperatorError {
                    src: source(filename, whole),
                    bad_bit: tokens[index].span(),
                    operator,
                    position: index,
                }
                .into())
            }
            Err(Imbalance::MissingOperands { index }) => {
                let token = tokens[index];
                Err(UnbalancedExpressionError {
                    src: source(filename, whole),
                    bad_bit: token.span(),
                    reason: format!("operator `{}` is missing an operand", token.literal),
                }
                .into())
            }
            Err(Imbalance::Leftover { values }) => {
                let start = whole.len() - whole.trim_start().len();
                let end = whole.trim_end().len();
                Err(UnbalancedExpressionError {
                    src: source(filename, whole),
                    bad_bit: SourceSpan::from(start..end),
                    reason: format!("{values} values are left without an operator"),
                }
                .into())
            }
        }
    }
}

impl<'de> Iterator for Lexer<'de> {
    type Item = Result<Token<'de>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let trimmed = self.rest.trim_start();
        self.byte += self.rest.len() - trimmed.len();
        if trimmed.is_empty() {
            self.rest = trimmed;
            return None;
        }

        let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        let literal = &trimmed[..end];
        let offset = self.byte;
        self.rest = &trimmed[end..];
        self.byte += end;

        let kind = match literal {
            "(" => TokenKind::LeftParen,
            ")" => TokenKind::RightParen,
            literal => {
                if let Some(n) = parse_number(literal) {
                    TokenKind::Number(n)
                } else if let Some(op) = Operator::from_symbol(literal) {
                    match op.arity() {
                        Arity::Unary => TokenKind::UnaryOperator(op),
                        Arity::Binary => TokenKind::BinaryOperator(op),
                    }
                } else {
                    return Some(Err(UnknownTokenError {
                        src: self.source(),
                        bad_bit: SourceSpan::from(offset..self.byte),
                        token: literal.to_string(),
                    }
                    .into()));
                }
            }
        };

        Some(Ok(Token {
            kind,
            literal,
            offset,
        }))
    }
}

fn source(filename: Option<&str>, whole: &str) -> NamedSource<String> {
    NamedSource::new(filename.unwrap_or("<input>"), whole.to_string())
}

fn group_text(group: &[Token<'_>]) -> String {
    let mut text = String::from("(");
    for token in group {
        text.push(' ');
        text.push_str(token.literal);
    }
    text.push_str(" )");
    text
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Imbalance {
    MissingOperands { index: usize },
    MisplacedUnary { index: usize, operator: Operator },
    Leftover { values: usize },
}

/// Simulates operand consumption. Unary operators need a value but leave the count alone.
fn balance(tokens: &[Token<'_>]) -> Result<(), Imbalance> {
    let mut values = 0usize;
    for (index, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Number(_) => values += 1,
            TokenKind::BinaryOperator(_) => {
                if values < 2 {
                    return Err(Imbalance::MissingOperands { index });
                }
                values -= 1;
            }
            TokenKind::UnaryOperator(operator) => {
                if values < 1 {
                    return Err(Imbalance::MisplacedUnary { index, operator });
                }
            }
            TokenKind::LeftParen | TokenKind::RightParen => {}
        }
    }
    if values == 1 {
        Ok(())
    } else {
        Err(Imbalance::Leftover { values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(None, input)
            .tokenize()
            .expect("valid expression")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn recognizes_numbers() {
        for literal in ["3", "-2.5", "+7", ".5", "5.", "1e3", "2.5E-2", "007"] {
            assert!(is_number(literal), "{literal}");
        }
        for literal in ["", ".", "-", "+", "1.2.3", "e5", "1e", "inf", "NaN", "1_000", "0x10", "1e400"] {
            assert!(!is_number(literal), "{literal}");
        }
        assert_eq!(parse_number("-8"), Some(-8.0));
    }

    #[test]
    fn classifies_parts() {
        let tokens: Vec<_> = Lexer::new(None, "  ( 3 -4.5 // ) ~ $ ")
            .collect::<Result<_, _>>()
            .expect("all parts known");
        let kinds: Vec<_> = tokens.iter().map(|token| token.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::LeftParen,
                TokenKind::Number(3.0),
                TokenKind::Number(-4.5),
                TokenKind::BinaryOperator(Operator::SlashSlash),
                TokenKind::RightParen,
                TokenKind::UnaryOperator(Operator::Tilde),
                TokenKind::UnaryOperator(Operator::Dollar),
            ]
        );
        assert_eq!(tokens[2].offset, 6);
        assert_eq!(tokens[2].literal, "-4.5");
    }

    #[test]
    fn brackets_are_flattened() {
        assert_eq!(
            kinds("4 ( 5 9 * ) +"),
            vec![
                TokenKind::Number(4.0),
                TokenKind::Number(5.0),
                TokenKind::Number(9.0),
                TokenKind::BinaryOperator(Operator::Star),
                TokenKind::BinaryOperator(Operator::Plus),
            ]
        );
    }

    #[test]
    fn tokenizing_is_repeatable() {
        let input = "9 ( 8 6 * ) ( 8 5 % ) + * 17 /";
        let first = Lexer::new(None, input).tokenize().expect("valid");
        let second = Lexer::new(None, input).tokenize().expect("valid");
        assert_eq!(first, second);
    }

    #[test]
    fn nested_group_keeps_last_capture() {
        // the outer `)` re-checks `25 3 5 * //`, so `5 ... +` is never checked on its own
        assert_eq!(kinds("( 5 ( 25 3 5 * // ) + ) 3 /").len(), 9);
    }

    #[test]
    fn unknown_token() {
        let err = Lexer::new(None, "3 GOIDA +").tokenize().unwrap_err();
        let err = err.downcast_ref::<UnknownTokenError>().expect("unknown token");
        assert_eq!(err.token, "GOIDA");
    }

    #[test]
    fn bracket_errors() {
        let err = Lexer::new(None, "( 5 8 +").tokenize().unwrap_err();
        let err = err.downcast_ref::<UnmatchedBracketError>().expect("unmatched");
        assert_eq!(err.bracket, Bracket::Opening);

        let err = Lexer::new(None, "3 9 - )").tokenize().unwrap_err();
        let err = err.downcast_ref::<UnmatchedBracketError>().expect("unmatched");
        assert_eq!(err.bracket, Bracket::Closing);

        let err = Lexer::new(None, "4 ( 5 6 + - )").tokenize().unwrap_err();
        let err = err.downcast_ref::<InvalidBracketContentError>().expect("bad group");
        assert_eq!(err.content, "( 5 6 + - )");

        let err = Lexer::new(None, "( )").tokenize().unwrap_err();
        assert!(err.downcast_ref::<InvalidBracketContentError>().is_some());

        let err = Lexer::new(None, "( ~ 5 )").tokenize().unwrap_err();
        assert!(err.downcast_ref::<InvalidBracketContentError>().is_some());
    }

    #[test]
    fn misplaced_unary_position() {
        let err = Lexer::new(None, "~ + 97").tokenize().unwrap_err();
        let err = err.downcast_ref::<MisplacedUnaryOperatorError>().expect("misplaced");
        assert_eq!(err.operator, Operator::Tilde);
        assert_eq!(err.position, 0);
    }

    #[test]
    fn unbalanced_expressions() {
        for input in ["5 9 + -", "1 2", "+"] {
            let err = Lexer::new(None, input).tokenize().unwrap_err();
            assert!(
                err.downcast_ref::<UnbalancedExpressionError>().is_some(),
                "{input}"
            );
        }
    }

    #[test]
    fn empty_input() {
        for input in ["", "   ", "\t\n"] {
            let err = Lexer::new(None, input).tokenize().unwrap_err();
            assert!(err.downcast_ref::<EmptyInputError>().is_some());
        }
    }
}
