/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Values and the `${{ }}` expression language used by pipeline templates.
//!
//! - [`value`]: the [`Value`] model with ordered, case-insensitive dictionaries
//! - [`wire`]: tagged JSON serialization of values
//! - [`parser`]: expression syntax, producing [`ExpressionNode`] trees
//! - [`evaluator`]: evaluation with abstract comparison and wildcard filtering
//! - [`functions`]: `format`, `join`, `toJson`, `hashFiles` and the rest
//! - [`memory`]: byte, depth and event budgets shared with the template reader
//!
//! # Example
//!
//! ```
//! use pipeline_expressions::{Dictionary, EvaluationOptions, Value, evaluate_str};
//!
//! let mut values = Dictionary::new();
//! values.insert("matrix", Value::from_json(&serde_json::json!({"os": "linux"})));
//!
//! let result = evaluate_str(
//!     "format('runs-on {0}', matrix.os)",
//!     &values,
//!     &EvaluationOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(result, Value::from("runs-on linux"));
//! ```

pub mod ast;
pub mod coercion;
pub mod convert;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod json;
pub mod lexer;
pub mod memory;
pub mod number;
pub mod parser;
pub mod value;
pub mod wire;

pub use ast::{CompareOperator, ExpressionNode};
pub use convert::ValueConverters;
pub use error::{ExpressionError, ExpressionResult, ParseError, ParseErrorKind};
pub use evaluator::{EvaluationContext, EvaluationOptions, evaluate_str};
pub use functions::{BUILTIN_FUNCTIONS, Function, FunctionInfo, FunctionRegistry};
pub use lexer::escape_string;
pub use memory::MemoryCounter;
pub use parser::{ParseOptions, parse, validate_syntax};
pub use value::{CaseSensitiveDictionary, Dictionary, Value, ValueKind};
pub use wire::WireError;

// Re-exported so hosts share one cancellation type with the evaluator.
pub use tokio_util::sync::CancellationToken;
