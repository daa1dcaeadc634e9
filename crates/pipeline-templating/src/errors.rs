/*
 * errors.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Errors raised and recorded while reading or evaluating templates.
//!
//! [`TemplateError`] aborts an operation. [`TemplateValidationError`]s are
//! recorded on the context and the operation continues.

use std::fmt;

use pipeline_expressions::ExpressionError;
use thiserror::Error;

/// Failures that abort a read, evaluation or schema check.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    /// Budget exceeded, cancellation, or an expression failure that
    /// could not be recorded against a node.
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("Expected a scalar value, a sequence, or a mapping")]
    UnexpectedNode,

    #[error("Schema definition '{0}' not found")]
    DefinitionNotFound(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// The object stream source or sink failed.
    #[error("{0}")]
    ObjectStream(String),
}

impl TemplateError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TemplateError::Expression(ExpressionError::Cancelled))
    }
}

pub type TemplateResult<T> = Result<T, TemplateError>;

/// A recorded, non-fatal problem with a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateValidationError {
    pub code: Option<String>,
    pub message: String,
}

impl TemplateValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for TemplateValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

const TRUNCATION_MARKER: &str = "[...]";

/// Bounded accumulator of [`TemplateValidationError`]s.
///
/// Errors past `max_errors` are dropped. Messages longer than
/// `max_message_length` characters are truncated and marked with `[...]`.
#[derive(Debug, Clone)]
pub struct TemplateValidationErrors {
    errors: Vec<TemplateValidationError>,
    max_errors: usize,
    max_message_length: usize,
}

impl TemplateValidationErrors {
    pub fn new(max_errors: usize, max_message_length: usize) -> Self {
        Self {
            errors: Vec::new(),
            max_errors,
            max_message_length,
        }
    }

    pub fn add(&mut self, mut error: TemplateValidationError) {
        if self.errors.len() >= self.max_errors {
            tracing::trace!(message = %error.message, "Dropping validation error past the limit");
            return;
        }
        if self.max_message_length > 0 && error.message.chars().count() > self.max_message_length {
            let mut truncated: String = error.message.chars().take(self.max_message_length).collect();
            truncated.push_str(TRUNCATION_MARKER);
            error.message = truncated;
        }
        self.errors.push(error);
    }

    pub fn add_message(&mut self, message: impl Into<String>) {
        self.add(TemplateValidationError::new(message));
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemplateValidationError> + '_ {
        self.errors.iter()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }

    pub fn into_vec(self) -> Vec<TemplateValidationError> {
        self.errors
    }
}

impl<'a> IntoIterator for &'a TemplateValidationErrors {
    type Item = &'a TemplateValidationError;
    type IntoIter = std::slice::Iter<'a, TemplateValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

// Messages recorded by the reader and evaluator.
pub(crate) const UNEXPECTED_SEQUENCE_START: &str = "A sequence was not expected";
pub(crate) const UNEXPECTED_MAPPING_START: &str = "A mapping was not expected";
pub(crate) const EXPRESSION_NOT_ALLOWED: &str = "A template expression is not allowed in this context";
pub(crate) const MAPPING_KEY_NOT_SCALAR: &str = "A mapping key must be a scalar value";
pub(crate) const INSERT_REQUIRES_MAPPING: &str = "The directive 'insert' requires a mapping value";

pub(crate) fn unexpected_value(value: &str) -> String {
    format!("Unexpected value '{value}'")
}

pub(crate) fn value_already_defined(value: &str) -> String {
    format!("'{value}' is already defined")
}

pub(crate) fn unable_to_determine_one_of(properties: &str) -> String {
    format!(
        "There's not enough info to determine what you meant. Add one of these properties: {properties}"
    )
}

pub(crate) fn required_property_missing(name: &str) -> String {
    format!("Required property is missing: {name}")
}
