/*
 * functions/format.rs
 * Copyright (c) 2025 Posit, PBC
 */

use crate::ast::ExpressionNode;
use crate::error::{ExpressionError, ExpressionResult};
use crate::evaluator::EvaluationContext;
use crate::memory::MemoryCounter;
use crate::value::Value;

/// `format(fmt, args...)`: replaces `{N}` with the N-th argument.
///
/// `{{` and `}}` produce literal braces. Arguments are evaluated at most once
/// and only when referenced.
pub(crate) fn format(
    context: &mut EvaluationContext<'_>,
    parameters: &[ExpressionNode],
) -> ExpressionResult<Value> {
    let format = context.evaluate(&parameters[0])?.convert_to_string();
    let arguments = &parameters[1..];
    let mut cache: Vec<Option<String>> = vec![None; arguments.len()];
    let invalid = || {
        ExpressionError::function(
            "format",
            format!("The following format string is invalid: '{format}'"),
        )
    };

    let mut result = String::new();
    let mut rest = format.as_str();
    while !rest.is_empty() {
        let Some(brace) = rest.find(['{', '}']) else {
            append(context, &mut result, rest)?;
            break;
        };
        append(context, &mut result, &rest[..brace])?;
        let after = &rest[brace + 1..];

        if rest[brace..].starts_with("{{") {
            append(context, &mut result, "{")?;
            rest = &after[1..];
        } else if rest[brace..].starts_with("}}") {
            append(context, &mut result, "}")?;
            rest = &after[1..];
        } else if rest[brace..].starts_with('}') {
            return Err(invalid());
        } else {
            let close = after.find('}').ok_or_else(invalid)?;
            let digits = &after[..close];
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            let position: usize = digits.parse().map_err(|_| invalid())?;
            if position >= arguments.len() {
                return Err(ExpressionError::function(
                    "format",
                    format!(
                        "The following format string references more arguments than were supplied: '{format}'"
                    ),
                ));
            }
            if cache[position].is_none() {
                cache[position] = Some(context.evaluate(&arguments[position])?.convert_to_string());
            }
            let argument = cache[position].as_deref().unwrap_or_default();
            append(context, &mut result, argument)?;
            rest = &after[close + 1..];
        }
    }

    Ok(Value::String(result))
}

fn append(
    context: &mut EvaluationContext<'_>,
    result: &mut String,
    text: &str,
) -> ExpressionResult<()> {
    context
        .memory()
        .ensure_bytes(MemoryCounter::string_bytes(result.len() + text.len()))?;
    result.push_str(text);
    Ok(())
}
