/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Schema-guided reading, evaluation and writing of CI pipeline templates.
//!
//! A document flows through these stages:
//!
//! 1. An [`ObjectReader`] (YAML or JSON) feeds [`read_template`], which
//!    validates the document against a [`TemplateSchema`] and builds a
//!    [`TemplateToken`] tree. Scalars holding `${{ }}` become expression
//!    tokens.
//! 2. [`evaluate_template`] expands the expressions whose values are known
//!    to the [`TemplateContext`].
//! 3. [`write_template`] drives an [`ObjectWriter`] with the result.
//!
//! Problems with individual nodes are recorded on the context rather than
//! aborting the operation.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use pipeline_templating::{
//!     TemplateContext, TemplateLimits, TemplateSchema, YamlObjectReader, read_template, schema,
//! };
//!
//! let mut context = TemplateContext::new(Arc::new(TemplateSchema::new()), TemplateLimits::default());
//! let file_id = context.get_file_id("ci.yml");
//! let mut source = YamlObjectReader::new("on: [push, pull_request]\n").unwrap();
//!
//! let (token, _bytes) = read_template(&mut context, schema::ANY, &mut source, Some(file_id));
//! assert!(context.errors().is_empty());
//! assert!(token.unwrap().as_mapping().unwrap().get("on").is_some());
//! ```

pub mod context;
pub mod embedded;
pub mod errors;
pub mod evaluator;
pub mod json;
pub mod object_stream;
pub mod reader;
pub mod schema;
pub mod tokens;
pub mod trace;
pub mod writer;
pub mod yaml;

pub use context::{TemplateContext, TemplateLimits};
pub use embedded::{EmbeddedExpressionError, parse_scalar};
pub use errors::{TemplateError, TemplateResult, TemplateValidationError, TemplateValidationErrors};
pub use evaluator::evaluate_template;
pub use json::{JsonObjectReader, JsonObjectWriter};
pub use object_stream::{ObjectReader, ObjectWriter, RawScalar, RawStart, SourcePosition};
pub use reader::read_template;
pub use schema::{Definition, MappingDefinition, PropertyValue, StringDefinition, TemplateSchema};
pub use tokens::{
    BasicExpressionToken, InsertExpressionToken, LiteralToken, MappingToken, Provenance,
    ScalarToken, SequenceToken, TemplateToken,
};
pub use trace::{NoopTraceWriter, TraceWriter, TracingTraceWriter};
pub use writer::write_template;
pub use yaml::{YamlObjectReader, YamlObjectWriter};
