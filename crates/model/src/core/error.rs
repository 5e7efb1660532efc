use crate::execution::expr::Rule;
use pest::error::{Error as PestError, InputLocation, LineColLocation};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValueError {
    #[error("Expected a JSON object for a row, got: {0}")]
    NotAnObject(String),

    #[error("Row id must be a string, got: {0}")]
    InvalidRowId(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("Expression is empty")]
    Empty,

    #[error("Invalid character in expression: {0:?}")]
    InvalidCharacter(char),

    #[error("Unbalanced parentheses")]
    UnbalancedParens,

    #[error("Syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Expression ended unexpectedly")]
    UnexpectedEnd,
}

impl ExprError {
    /// Narrows a pest failure to the most specific variant the input allows.
    pub fn from_pest_error(input: &str, err: PestError<Rule>) -> Self {
        let opens = input.chars().filter(|c| *c == '(').count();
        let closes = input.chars().filter(|c| *c == ')').count();
        if opens != closes {
            return ExprError::UnbalancedParens;
        }

        let offset = match err.location {
            InputLocation::Pos(pos) => pos,
            InputLocation::Span((start, _)) => start,
        };
        let rest = input.get(offset..).unwrap_or_default();
        match rest.chars().next() {
            None => return ExprError::UnexpectedEnd,
            Some(_) if rest.trim().is_empty() => return ExprError::UnexpectedEnd,
            Some(c) if !is_expression_char(c) => return ExprError::InvalidCharacter(c),
            Some(_) => {}
        }

        let (line, column) = match err.line_col {
            LineColLocation::Pos((l, c)) => (l, c),
            LineColLocation::Span((l, c), _) => (l, c),
        };

        ExprError::Syntax {
            line,
            column,
            message: format!("{}", err.variant),
        }
    }
}

fn is_expression_char(c: char) -> bool {
    c.is_alphanumeric()
        || c.is_whitespace()
        || matches!(c, '_' | '.' | '+' | '-' | '*' | '/' | '(' | ')')
}
