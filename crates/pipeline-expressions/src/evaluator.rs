/*
 * evaluator.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tree-walking evaluator.
//!
//! Named values are borrowed from the host's dictionary, so member access
//! into large contexts does not copy them. Function results and wildcard
//! projections are charged against the [`MemoryCounter`].

use std::borrow::Cow;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::ast::ExpressionNode;
use crate::convert::ValueConverters;
use crate::error::{ExpressionError, ExpressionResult};
use crate::functions::FunctionRegistry;
use crate::memory::{MIN_OBJECT_SIZE, MemoryCounter};
use crate::parser::{ParseOptions, parse};
use crate::value::{Dictionary, Value};

/// Default byte budget for a standalone evaluation.
pub const DEFAULT_MAX_MEMORY: usize = 1024 * 1024;

/// Host-supplied knobs for evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationOptions {
    /// Byte budget used when the evaluation owns its memory counter.
    pub max_memory: usize,
    pub converters: ValueConverters,
    /// Root directory `hashFiles` searches. Without one, `hashFiles` fails.
    pub workspace: Option<PathBuf>,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            max_memory: DEFAULT_MAX_MEMORY,
            converters: ValueConverters::default(),
            workspace: None,
        }
    }
}

/// Result of evaluating a node.
///
/// `filtered` marks arrays produced by a wildcard; indexing into one maps
/// the index over its items.
struct Evaluated<'a> {
    value: Cow<'a, Value>,
    filtered: bool,
}

impl<'a> Evaluated<'a> {
    fn owned(value: Value) -> Self {
        Self {
            value: Cow::Owned(value),
            filtered: false,
        }
    }

    fn borrowed(value: &'a Value) -> Self {
        Self {
            value: Cow::Borrowed(value),
            filtered: false,
        }
    }

    fn filtered(items: Vec<Value>) -> Self {
        Self {
            value: Cow::Owned(Value::Array(items)),
            filtered: true,
        }
    }
}

pub struct EvaluationContext<'a> {
    values: &'a Dictionary,
    functions: &'a FunctionRegistry,
    options: &'a EvaluationOptions,
    memory: &'a mut MemoryCounter,
    cancellation: Option<&'a CancellationToken>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        values: &'a Dictionary,
        functions: &'a FunctionRegistry,
        options: &'a EvaluationOptions,
        memory: &'a mut MemoryCounter,
    ) -> Self {
        Self {
            values,
            functions,
            options,
            memory,
            cancellation: None,
        }
    }

    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn options(&self) -> &'a EvaluationOptions {
        self.options
    }

    pub fn memory(&mut self) -> &mut MemoryCounter {
        &mut *self.memory
    }

    /// Parse options that accept exactly the names this context can resolve.
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions::new()
            .with_named_values(self.values.keys())
            .with_functions(self.functions.infos().cloned())
    }

    pub fn check_cancelled(&self) -> ExpressionResult<()> {
        match self.cancellation {
            Some(token) if token.is_cancelled() => Err(ExpressionError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Parse and evaluate `expression` against this context.
    pub fn evaluate_expression(&mut self, expression: &str) -> ExpressionResult<Value> {
        match parse(expression, &self.parse_options())? {
            Some(tree) => self.evaluate_tree(&tree),
            None => Ok(Value::Null),
        }
    }

    /// Evaluate a whole expression tree.
    pub fn evaluate_tree(&mut self, tree: &ExpressionNode) -> ExpressionResult<Value> {
        self.check_cancelled()?;
        tracing::debug!(expression = %tree, "Evaluating expression");
        let result = self.evaluate(tree)?.into_owned();
        tracing::trace!(kind = %result.kind(), "Expression result");
        Ok(result)
    }

    /// Evaluate a single node. Used by functions to evaluate their parameters.
    pub fn evaluate(&mut self, node: &ExpressionNode) -> ExpressionResult<Cow<'a, Value>> {
        Ok(self.evaluate_node(node)?.value)
    }

    fn evaluate_node(&mut self, node: &ExpressionNode) -> ExpressionResult<Evaluated<'a>> {
        match node {
            ExpressionNode::Literal(value) => Ok(Evaluated::owned(value.clone())),
            ExpressionNode::NamedValue(name) => {
                let values: &'a Dictionary = self.values;
                Ok(match values.get(name) {
                    Some(value) => Evaluated::borrowed(value),
                    None => Evaluated::owned(Value::Null),
                })
            }
            ExpressionNode::Wildcard => Ok(Evaluated::owned(Value::Null)),
            ExpressionNode::Not(inner) => {
                let value = self.evaluate(inner)?;
                Ok(Evaluated::owned(Value::Boolean(value.is_falsy())))
            }
            ExpressionNode::And(items) => {
                let mut last = Evaluated::owned(Value::Boolean(true));
                for item in items {
                    last = self.evaluate_node(item)?;
                    if last.value.is_falsy() {
                        break;
                    }
                }
                Ok(last)
            }
            ExpressionNode::Or(items) => {
                let mut last = Evaluated::owned(Value::Boolean(false));
                for item in items {
                    last = self.evaluate_node(item)?;
                    if last.value.is_truthy() {
                        break;
                    }
                }
                Ok(last)
            }
            ExpressionNode::Compare(op, left, right) => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                Ok(Evaluated::owned(Value::Boolean(op.apply(&left, &right))))
            }
            ExpressionNode::Index(target, index) => self.evaluate_index(target, index),
            ExpressionNode::Function(name, parameters) => {
                self.check_cancelled()?;
                let functions = self.functions;
                let (_, function) = functions
                    .get(name)
                    .ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;
                let result = function.evaluate(self, parameters)?;
                self.memory.add_value(&result, true)?;
                Ok(Evaluated::owned(result))
            }
        }
    }

    fn evaluate_index(
        &mut self,
        target: &ExpressionNode,
        index: &ExpressionNode,
    ) -> ExpressionResult<Evaluated<'a>> {
        let target = self.evaluate_node(target)?;
        let index = match index {
            ExpressionNode::Wildcard => None,
            other => Some(self.evaluate(other)?),
        };

        if target.filtered {
            let items = match target.value.into_owned() {
                Value::Array(items) => items,
                _ => Vec::new(),
            };
            let mut result = Vec::new();
            for item in &items {
                match &index {
                    None => result.extend(children(item).cloned()),
                    Some(index) => {
                        if let Some(child) = lookup(item, index) {
                            result.push(child.clone());
                        }
                    }
                }
            }
            self.memory.add_bytes(MIN_OBJECT_SIZE)?;
            return Ok(Evaluated::filtered(result));
        }

        let Some(index) = index else {
            let items: Vec<Value> = children(&target.value).cloned().collect();
            self.memory.add_bytes(MIN_OBJECT_SIZE)?;
            return Ok(Evaluated::filtered(items));
        };

        Ok(match target.value {
            Cow::Borrowed(value) => match lookup(value, &index) {
                Some(child) => Evaluated::borrowed(child),
                None => Evaluated::owned(Value::Null),
            },
            Cow::Owned(value) => {
                Evaluated::owned(lookup(&value, &index).cloned().unwrap_or(Value::Null))
            }
        })
    }
}

/// Array items or dictionary values; nothing for primitives.
fn children(value: &Value) -> impl Iterator<Item = &Value> {
    value.children().into_iter().flatten()
}

fn lookup<'v>(target: &'v Value, index: &Value) -> Option<&'v Value> {
    match target {
        Value::Dictionary(_) | Value::CaseSensitiveDictionary(_) => {
            if !index.is_primitive() {
                return None;
            }
            target.get(&index.convert_to_string())
        }
        Value::Array(items) => {
            let position = index.convert_to_number();
            if position.is_nan() || position < 0.0 {
                return None;
            }
            items.get(position.floor() as usize)
        }
        _ => None,
    }
}

/// Evaluate `expression` with the built-in function library and a fresh
/// memory counter sized by `options.max_memory`.
pub fn evaluate_str(
    expression: &str,
    values: &Dictionary,
    options: &EvaluationOptions,
) -> ExpressionResult<Value> {
    let functions = FunctionRegistry::builtin();
    let mut memory = MemoryCounter::new(options.max_memory);
    let mut context = EvaluationContext::new(values, &functions, options, &mut memory);
    context.evaluate_expression(expression)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn values() -> Dictionary {
        let github = Value::from_json(&serde_json::json!({
            "ref": "refs/heads/main",
            "event": {
                "commits": [
                    {"id": "a1", "author": {"name": "ana"}},
                    {"id": "b2", "author": {"name": "bo"}}
                ]
            }
        }));
        let matrix = Value::from_json(&serde_json::json!({"os": ["linux", "windows"]}));
        let mut values = Dictionary::new();
        values.insert("github", github);
        values.insert("matrix", matrix);
        values
    }

    fn eval(expression: &str) -> Value {
        evaluate_str(expression, &values(), &EvaluationOptions::default()).unwrap()
    }

    #[test]
    fn member_access_and_indexing() {
        assert_eq!(eval("github.ref"), Value::from("refs/heads/main"));
        assert_eq!(eval("github['REF']"), Value::from("refs/heads/main"));
        assert_eq!(eval("matrix.os[1]"), Value::from("windows"));
        assert_eq!(eval("matrix.os[1.7]"), Value::from("windows"));
        assert_eq!(eval("matrix.os[5]"), Value::Null);
        assert_eq!(eval("matrix.os[-1]"), Value::Null);
        assert_eq!(eval("github.missing.deeper"), Value::Null);
    }

    #[test]
    fn wildcards_project_over_items() {
        assert_eq!(
            eval("github.event.commits.*.author.name"),
            Value::Array(vec![Value::from("ana"), Value::from("bo")])
        );
        assert_eq!(
            eval("github.event.commits[*].id"),
            Value::Array(vec![Value::from("a1"), Value::from("b2")])
        );
        assert_eq!(eval("github.ref.*"), Value::Array(Vec::new()));
    }

    #[test]
    fn logical_operators_return_operands() {
        assert_eq!(eval("github.nothing || 'fallback'"), Value::from("fallback"));
        assert_eq!(eval("'a' && 'b'"), Value::from("b"));
        assert_eq!(eval("0 && 'b'"), Value::Number(0.0));
        assert_eq!(eval("!github.nothing"), Value::Boolean(true));
    }

    #[test]
    fn comparisons_coerce() {
        assert_eq!(eval("'1' == 1"), Value::Boolean(true));
        assert_eq!(eval("github.ref == 'REFS/HEADS/MAIN'"), Value::Boolean(true));
        assert_eq!(eval("NaN == NaN"), Value::Boolean(false));
        assert_eq!(eval("2 > '10'"), Value::Boolean(false));
    }

    #[test]
    fn empty_expression_is_null() {
        assert_eq!(eval("  "), Value::Null);
    }

    #[test]
    fn unknown_named_values_fail_to_parse() {
        let error = evaluate_str("secrets.x", &values(), &EvaluationOptions::default()).unwrap_err();
        assert!(matches!(error, ExpressionError::Parse(_)));
    }

    #[test]
    fn function_results_are_charged() {
        let options = EvaluationOptions {
            max_memory: 100,
            ..EvaluationOptions::default()
        };
        let error = evaluate_str("format('{0}{0}{0}{0}{0}', github.ref)", &values(), &options)
            .unwrap_err();
        assert!(matches!(error, ExpressionError::MaxBytesExceeded { .. }));
    }

    #[test]
    fn cancellation_stops_evaluation() {
        let values = values();
        let functions = FunctionRegistry::builtin();
        let options = EvaluationOptions::default();
        let mut memory = MemoryCounter::new(options.max_memory);
        let token = CancellationToken::new();
        token.cancel();
        let mut context =
            EvaluationContext::new(&values, &functions, &options, &mut memory).with_cancellation(&token);
        assert_eq!(
            context.evaluate_expression("toJson(github)"),
            Err(ExpressionError::Cancelled)
        );
    }
}
