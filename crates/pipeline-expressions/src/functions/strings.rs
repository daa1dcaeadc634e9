/*
 * functions/strings.rs
 * Copyright (c) 2025 Posit, PBC
 */

use super::primitive_string;
use crate::ast::ExpressionNode;
use crate::coercion::{ends_with_ignore_case, starts_with_ignore_case};
use crate::error::ExpressionResult;
use crate::evaluator::EvaluationContext;
use crate::memory::MemoryCounter;
use crate::value::Value;

/// `replace(text, old, new)`: ordinal replacement of every occurrence.
///
/// All three arguments are coerced to text first. An empty `old` leaves the
/// text unchanged.
pub(crate) fn replace(
    context: &mut EvaluationContext<'_>,
    parameters: &[ExpressionNode],
) -> ExpressionResult<Value> {
    let text = context.evaluate(&parameters[0])?.convert_to_string();
    let old = context.evaluate(&parameters[1])?.convert_to_string();
    let new = context.evaluate(&parameters[2])?.convert_to_string();
    if old.is_empty() {
        return Ok(Value::String(text));
    }

    let occurrences = text.matches(old.as_str()).count();
    let length = text.len() - occurrences * old.len() + occurrences * new.len();
    context
        .memory()
        .ensure_bytes(MemoryCounter::string_bytes(length))?;
    Ok(Value::String(text.replace(old.as_str(), &new)))
}

/// `startsWith(text, prefix)`, ignoring case. False unless both are primitives.
pub(crate) fn starts_with(
    context: &mut EvaluationContext<'_>,
    parameters: &[ExpressionNode],
) -> ExpressionResult<Value> {
    let text = primitive_string(context, &parameters[0])?;
    let prefix = primitive_string(context, &parameters[1])?;
    Ok(Value::Boolean(match (text, prefix) {
        (Some(text), Some(prefix)) => starts_with_ignore_case(&text, &prefix),
        _ => false,
    }))
}

/// `endsWith(text, suffix)`, ignoring case. False unless both are primitives.
pub(crate) fn ends_with(
    context: &mut EvaluationContext<'_>,
    parameters: &[ExpressionNode],
) -> ExpressionResult<Value> {
    let text = primitive_string(context, &parameters[0])?;
    let suffix = primitive_string(context, &parameters[1])?;
    Ok(Value::Boolean(match (text, suffix) {
        (Some(text), Some(suffix)) => ends_with_ignore_case(&text, &suffix),
        _ => false,
    }))
}
