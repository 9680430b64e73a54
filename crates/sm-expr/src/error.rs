//! Error types for expression parsing and evaluation.

use thiserror::Error;

/// Result type for expression operations.
pub type ExprResult<T> = Result<T, ExprError>;

/// Errors raised while lexing, parsing or evaluating a mapping expression.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("Lex error at offset {pos}: {what}")]
    Lex { pos: usize, what: String },

    #[error("Parse error at offset {pos}: {what}")]
    Parse { pos: usize, what: String },

    #[error("Unknown variable or function '{name}'")]
    UnknownName { name: String },

    #[error("Vector index {index} out of range for length {length}")]
    IndexOutOfRange { index: usize, length: usize },

    #[error("History index {index} out of range")]
    HistoryOutOfRange { index: i64 },

    #[error("Evaluation error: {what}")]
    Eval { what: String },
}

impl From<ExprError> for sm_core::MapperError {
    fn from(e: ExprError) -> Self {
        sm_core::MapperError::InvalidExpression {
            expression: String::new(),
            reason: e.to_string(),
        }
    }
}
