/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for parsing and evaluating expressions.

use thiserror::Error;

/// Syntax error categories raised while parsing an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    ExceededMaxDepth,
    ExceededMaxLength,
    TooFewParameters,
    TooManyParameters,
    UnexpectedEndOfExpression,
    UnexpectedSymbol,
    UnrecognizedFunction,
    UnrecognizedNamedValue,
}

/// An expression failed to parse.
///
/// `position` is 1-based and counts characters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.message())]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub raw: String,
    pub position: usize,
    pub expression: String,
    limit: usize,
}

impl ParseError {
    pub(crate) fn new(
        kind: ParseErrorKind,
        raw: impl Into<String>,
        index: usize,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            raw: raw.into(),
            position: index + 1,
            expression: expression.into(),
            limit: 0,
        }
    }

    pub(crate) fn limit(kind: ParseErrorKind, limit: usize, expression: impl Into<String>) -> Self {
        Self {
            kind,
            raw: String::new(),
            position: 0,
            expression: expression.into(),
            limit,
        }
    }

    fn message(&self) -> String {
        let description = match self.kind {
            ParseErrorKind::ExceededMaxDepth => {
                return format!("Exceeded max expression depth {}", self.limit);
            }
            ParseErrorKind::ExceededMaxLength => {
                return format!("Exceeded max expression length {}", self.limit);
            }
            ParseErrorKind::TooFewParameters => "Too few parameters supplied",
            ParseErrorKind::TooManyParameters => "Too many parameters supplied",
            ParseErrorKind::UnexpectedEndOfExpression => "Unexpected end of expression",
            ParseErrorKind::UnexpectedSymbol => "Unexpected symbol",
            ParseErrorKind::UnrecognizedFunction => "Unrecognized function",
            ParseErrorKind::UnrecognizedNamedValue => "Unrecognized named-value",
        };
        format!(
            "{}: '{}'. Located at position {} within expression: {}",
            description, self.raw, self.position, self.expression
        )
    }
}

/// Errors raised while evaluating expressions or accounting memory.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Maximum object size exceeded")]
    MaxBytesExceeded { max_bytes: usize },

    #[error("Maximum object depth exceeded")]
    MaxDepthExceeded { max_depth: usize },

    #[error("Maximum events exceeded")]
    MaxEventsExceeded { max_events: usize },

    #[error("Unrecognized function: '{0}'")]
    UnknownFunction(String),

    /// A function rejected its arguments or failed while running.
    #[error("{message}")]
    Function { function: String, message: String },

    #[error("The operation was cancelled")]
    Cancelled,
}

impl ExpressionError {
    pub(crate) fn function(function: &str, message: impl Into<String>) -> Self {
        ExpressionError::Function {
            function: function.to_string(),
            message: message.into(),
        }
    }

    /// Resource limits and cancellation abort the surrounding operation
    /// instead of being recorded against a single node.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExpressionError::MaxBytesExceeded { .. }
                | ExpressionError::MaxDepthExceeded { .. }
                | ExpressionError::MaxEventsExceeded { .. }
                | ExpressionError::Cancelled
        )
    }
}

pub type ExpressionResult<T> = Result<T, ExpressionError>;
