/*
 * functions/json.rs
 * Copyright (c) 2025 Posit, PBC
 */

use crate::ast::ExpressionNode;
use crate::error::{ExpressionError, ExpressionResult};
use crate::evaluator::EvaluationContext;
use crate::json::to_json_string;
use crate::memory::MemoryCounter;
use crate::value::Value;

/// `toJson(value)`: two-space indented JSON.
pub(crate) fn to_json(
    context: &mut EvaluationContext<'_>,
    parameters: &[ExpressionNode],
) -> ExpressionResult<Value> {
    let value = context.evaluate(&parameters[0])?;
    let text = to_json_string(&value, context.memory())?;
    Ok(Value::String(text))
}

/// `fromJson(text)`: parse JSON into a value. Objects become case-insensitive
/// dictionaries and the configured converters are applied.
pub(crate) fn from_json(
    context: &mut EvaluationContext<'_>,
    parameters: &[ExpressionNode],
) -> ExpressionResult<Value> {
    let text = context.evaluate(&parameters[0])?.convert_to_string();
    if text.trim().is_empty() {
        return Err(ExpressionError::function(
            "fromJson",
            "fromJson requires a non-empty JSON document",
        ));
    }
    context
        .memory()
        .ensure_bytes(MemoryCounter::string_bytes(text.len()))?;
    let json: serde_json::Value = serde_json::from_str(&text).map_err(|error| {
        ExpressionError::function("fromJson", format!("Error parsing fromJson: {error}"))
    })?;
    let value = Value::from_json(&json);
    Ok(context.options().converters.canonicalize(value))
}
