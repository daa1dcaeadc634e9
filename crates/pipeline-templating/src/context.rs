/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Per-operation state shared by the reader and the evaluator.

use std::fmt;
use std::sync::Arc;

use pipeline_expressions::{
    CancellationToken, Dictionary, EvaluationContext, EvaluationOptions, ExpressionError,
    ExpressionResult, Function, FunctionInfo, FunctionRegistry, MemoryCounter, ParseOptions, Value,
};
use serde::Deserialize;

use crate::errors::{TemplateError, TemplateValidationError, TemplateValidationErrors};
use crate::object_stream::SourcePosition;
use crate::schema::TemplateSchema;
use crate::tokens::Provenance;
use crate::trace::{TraceWriter, TracingTraceWriter};

/// Budgets for one read or evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TemplateLimits {
    pub max_depth: usize,
    pub max_events: usize,
    pub max_bytes: usize,
    pub max_errors: usize,
    pub max_message_length: usize,
}

impl Default for TemplateLimits {
    fn default() -> Self {
        Self {
            max_depth: 50,
            max_events: 1_000_000,
            max_bytes: 10 * 1024 * 1024,
            max_errors: 10,
            max_message_length: 500,
        }
    }
}

impl TemplateLimits {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }

    pub fn with_max_message_length(mut self, max_message_length: usize) -> Self {
        self.max_message_length = max_message_length;
        self
    }
}

/// State for one read-or-evaluate operation: the schema, expression values
/// and functions, recorded errors, the file table, the trace sink and the
/// memory budget.
///
/// Create one per document; a context is not shared between operations
/// running at the same time.
#[derive(Debug)]
pub struct TemplateContext {
    schema: Arc<TemplateSchema>,
    limits: TemplateLimits,
    errors: TemplateValidationErrors,
    memory: MemoryCounter,
    expression_values: Dictionary,
    expression_functions: FunctionRegistry,
    evaluation_options: EvaluationOptions,
    file_names: Vec<String>,
    trace: Box<dyn TraceWriter>,
    cancellation: CancellationToken,
}

impl TemplateContext {
    pub fn new(schema: Arc<TemplateSchema>, limits: TemplateLimits) -> Self {
        Self {
            schema,
            limits,
            errors: TemplateValidationErrors::new(limits.max_errors, limits.max_message_length),
            memory: MemoryCounter::with_limits(limits.max_bytes, limits.max_depth, limits.max_events),
            expression_values: Dictionary::new(),
            expression_functions: FunctionRegistry::builtin(),
            evaluation_options: EvaluationOptions {
                max_memory: limits.max_bytes,
                ..EvaluationOptions::default()
            },
            file_names: Vec::new(),
            trace: Box::new(TracingTraceWriter),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_trace_writer(mut self, trace: impl TraceWriter + 'static) -> Self {
        self.trace = Box::new(trace);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Replace the evaluation options. The byte budget stays with the
    /// context's memory counter.
    pub fn with_evaluation_options(mut self, options: EvaluationOptions) -> Self {
        self.evaluation_options = options;
        self
    }

    pub fn schema(&self) -> &Arc<TemplateSchema> {
        &self.schema
    }

    pub fn limits(&self) -> &TemplateLimits {
        &self.limits
    }

    pub fn errors(&self) -> &TemplateValidationErrors {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut TemplateValidationErrors {
        &mut self.errors
    }

    pub fn memory(&self) -> &MemoryCounter {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryCounter {
        &mut self.memory
    }

    pub fn trace(&self) -> &dyn TraceWriter {
        self.trace.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn check_cancelled(&self) -> ExpressionResult<()> {
        if self.cancellation.is_cancelled() {
            Err(ExpressionError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn expression_values(&self) -> &Dictionary {
        &self.expression_values
    }

    /// Register a named value. Lookup ignores case; the configured value
    /// converters are applied.
    pub fn insert_expression_value(&mut self, name: impl Into<String>, value: Value) {
        let value = self.evaluation_options.converters.canonicalize(value);
        self.expression_values.insert(name, value);
    }

    pub fn expression_functions(&self) -> &FunctionRegistry {
        &self.expression_functions
    }

    pub fn register_function(&mut self, info: FunctionInfo, function: impl Function + 'static) {
        self.expression_functions.register(info, function);
    }

    /// Parse options accepting exactly the registered values and functions.
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions::new()
            .with_named_values(self.expression_values.keys())
            .with_functions(self.expression_functions.infos().cloned())
    }

    /// Evaluation context over this context's values and functions,
    /// charging the shared memory counter.
    pub fn to_evaluation_context(&mut self) -> EvaluationContext<'_> {
        EvaluationContext::new(
            &self.expression_values,
            &self.expression_functions,
            &self.evaluation_options,
            &mut self.memory,
        )
        .with_cancellation(&self.cancellation)
    }

    /// Id for `name`, adding it to the file table on first use. Ids start at 1.
    pub fn get_file_id(&mut self, name: &str) -> usize {
        if let Some(index) = self.file_names.iter().position(|n| n == name) {
            return index + 1;
        }
        self.file_names.push(name.to_string());
        self.file_names.len()
    }

    pub fn get_file_name(&self, file_id: usize) -> Option<&str> {
        file_id
            .checked_sub(1)
            .and_then(|index| self.file_names.get(index))
            .map(String::as_str)
    }

    pub fn file_names(&self) -> &[String] {
        &self.file_names
    }

    /// Record an error located at a file and position.
    pub fn error_at(
        &mut self,
        file_id: Option<usize>,
        position: Option<SourcePosition>,
        message: impl fmt::Display,
    ) {
        let prefix = self.location_prefix(file_id, position);
        let message = format!("{prefix}{message}");
        self.trace.error(&message);
        self.errors.add(TemplateValidationError::new(message));
    }

    /// Record an error against a token's provenance.
    pub fn error_token(&mut self, provenance: Option<Provenance>, message: impl fmt::Display) {
        match provenance {
            Some(p) => self.error_at(
                Some(p.file_id),
                Some(SourcePosition::new(p.line, p.column)),
                message,
            ),
            None => self.error_at(None, None, message),
        }
    }

    /// Record an operation-level failure against a file.
    pub fn error(&mut self, file_id: Option<usize>, error: &TemplateError) {
        self.error_at(file_id, None, error);
    }

    fn location_prefix(&self, file_id: Option<usize>, position: Option<SourcePosition>) -> String {
        let file = file_id.and_then(|id| self.get_file_name(id));
        match (file, position) {
            (Some(file), Some(p)) => format!("{file} (Line: {}, Col: {}): ", p.line, p.column),
            (Some(file), None) => format!("{file}: "),
            (None, Some(p)) => format!("(Line: {}, Col: {}): ", p.line, p.column),
            (None, None) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::NoopTraceWriter;
    use pretty_assertions::assert_eq;

    fn context() -> TemplateContext {
        TemplateContext::new(Arc::new(TemplateSchema::new()), TemplateLimits::default())
            .with_trace_writer(NoopTraceWriter)
    }

    #[test]
    fn file_ids_are_stable_and_one_based() {
        let mut context = context();
        assert_eq!(context.get_file_id("ci.yml"), 1);
        assert_eq!(context.get_file_id("other.yml"), 2);
        assert_eq!(context.get_file_id("ci.yml"), 1);
        assert_eq!(context.get_file_name(2), Some("other.yml"));
        assert_eq!(context.get_file_name(0), None);
        assert_eq!(context.get_file_name(3), None);
    }

    #[test]
    fn errors_carry_location_prefix() {
        let mut context = context();
        let file = context.get_file_id("ci.yml");
        context.error_token(Some(Provenance::new(file, 3, 7)), "Unexpected value 'x'");
        context.error(Some(file), &TemplateError::UnexpectedNode);
        context.error_at(None, None, "bare");
        let messages: Vec<&str> = context.errors().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "ci.yml (Line: 3, Col: 7): Unexpected value 'x'",
                "ci.yml: Expected a scalar value, a sequence, or a mapping",
                "bare",
            ]
        );
    }

    #[test]
    fn expression_values_ignore_case_and_are_canonicalized() {
        let mut context = context();
        context.insert_expression_value("Matrix", Value::from_json(&serde_json::json!({"n": -0.0})));
        let matrix = context.expression_values().get("matrix").unwrap();
        assert_eq!(matrix.get("n").and_then(Value::as_number).map(f64::is_sign_negative), Some(false));
        let value = context
            .to_evaluation_context()
            .evaluate_expression("matrix.n == 0")
            .unwrap();
        assert_eq!(value, Value::Boolean(true));
    }

    #[test]
    fn evaluation_charges_the_shared_counter() {
        let mut context = context();
        context
            .to_evaluation_context()
            .evaluate_expression("format('{0}', 'abc')")
            .unwrap();
        assert!(context.memory().current_bytes() > 0);
    }

    #[test]
    fn cancellation_is_observed() {
        let token = CancellationToken::new();
        let context = context().with_cancellation(token.clone());
        assert!(context.check_cancelled().is_ok());
        token.cancel();
        assert_eq!(context.check_cancelled(), Err(ExpressionError::Cancelled));
    }

    #[test]
    fn limits_deserialize_with_defaults() {
        let limits: TemplateLimits = serde_json::from_str(r#"{"max-depth": 5}"#).unwrap();
        assert_eq!(limits, TemplateLimits::default().with_max_depth(5));
    }
}
