/*
 * functions/collections.rs
 * Copyright (c) 2025 Posit, PBC
 */

use super::primitive_string;
use crate::ast::ExpressionNode;
use crate::coercion::contains_ignore_case;
use crate::error::ExpressionResult;
use crate::evaluator::EvaluationContext;
use crate::memory::{MIN_OBJECT_SIZE, MemoryCounter};
use crate::value::Value;

const DEFAULT_SEPARATOR: &str = ",";

/// `join(items, separator = ',')`.
///
/// Primitive items are coerced to text and containers contribute an empty
/// string. A primitive first argument is returned as text.
pub(crate) fn join(
    context: &mut EvaluationContext<'_>,
    parameters: &[ExpressionNode],
) -> ExpressionResult<Value> {
    let items = context.evaluate(&parameters[0])?;
    let separator = match parameters.get(1) {
        Some(parameter) => primitive_string(context, parameter)?
            .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string()),
        None => DEFAULT_SEPARATOR.to_string(),
    };

    match items.as_ref() {
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| {
                    if item.is_primitive() {
                        item.convert_to_string()
                    } else {
                        String::new()
                    }
                })
                .collect();
            let total = parts.iter().map(String::len).sum::<usize>()
                + separator.len() * parts.len().saturating_sub(1);
            context.memory().ensure_bytes(MemoryCounter::string_bytes(total))?;
            Ok(Value::String(parts.join(&separator)))
        }
        value if value.is_primitive() => Ok(Value::String(value.convert_to_string())),
        _ => Ok(Value::String(String::new())),
    }
}

/// `split(text, separator = ',')` into an array of strings.
pub(crate) fn split(
    context: &mut EvaluationContext<'_>,
    parameters: &[ExpressionNode],
) -> ExpressionResult<Value> {
    let text = primitive_string(context, &parameters[0])?.unwrap_or_default();
    let separator = match parameters.get(1) {
        Some(parameter) => primitive_string(context, parameter)?
            .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string()),
        None => DEFAULT_SEPARATOR.to_string(),
    };

    if separator.is_empty() {
        return Ok(Value::Array(vec![Value::String(text)]));
    }
    let pieces = text.matches(separator.as_str()).count() + 1;
    context.memory().ensure_bytes(
        MIN_OBJECT_SIZE
            + pieces * (MIN_OBJECT_SIZE + MemoryCounter::string_bytes(0))
            + text.len(),
    )?;
    Ok(Value::Array(
        text.split(separator.as_str())
            .map(|piece| Value::String(piece.to_string()))
            .collect(),
    ))
}

/// `count(x)`: array length, character count of a primitive, else 0.
pub(crate) fn count(
    context: &mut EvaluationContext<'_>,
    parameters: &[ExpressionNode],
) -> ExpressionResult<Value> {
    let value = context.evaluate(&parameters[0])?;
    let count = match value.as_ref() {
        Value::Array(items) => items.len(),
        primitive if primitive.is_primitive() => primitive.convert_to_string().chars().count(),
        _ => 0,
    };
    Ok(Value::Number(count as f64))
}

/// `in(needle, candidates...)`: true when any candidate equals the needle.
///
/// Candidates are evaluated left to right and evaluation stops at the first match.
pub(crate) fn is_in(
    context: &mut EvaluationContext<'_>,
    parameters: &[ExpressionNode],
) -> ExpressionResult<Value> {
    let needle = context.evaluate(&parameters[0])?;
    for candidate in &parameters[1..] {
        let candidate = context.evaluate(candidate)?;
        if needle.abstract_equal(&candidate) {
            return Ok(Value::Boolean(true));
        }
    }
    Ok(Value::Boolean(false))
}

/// `contains(haystack, needle)`.
///
/// Arrays and dictionaries match an element or value by abstract equality.
/// A primitive haystack is searched as text, ignoring case.
pub(crate) fn contains(
    context: &mut EvaluationContext<'_>,
    parameters: &[ExpressionNode],
) -> ExpressionResult<Value> {
    let haystack = context.evaluate(&parameters[0])?;
    let needle = context.evaluate(&parameters[1])?;
    let found = match haystack.as_ref() {
        Value::Array(items) => items.iter().any(|item| item.abstract_equal(&needle)),
        Value::Dictionary(map) => map.values().any(|item| item.abstract_equal(&needle)),
        Value::CaseSensitiveDictionary(map) => {
            map.values().any(|item| item.abstract_equal(&needle))
        }
        primitive => {
            needle.is_primitive()
                && contains_ignore_case(
                    &primitive.convert_to_string(),
                    &needle.convert_to_string(),
                )
        }
    };
    Ok(Value::Boolean(found))
}
