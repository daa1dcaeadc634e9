/*
 * functions/case.rs
 * Copyright (c) 2025 Posit, PBC
 */

use crate::ast::ExpressionNode;
use crate::error::{ExpressionError, ExpressionResult};
use crate::evaluator::EvaluationContext;
use crate::value::Value;

/// `case(pred1, val1, pred2, val2, ..., default)`.
///
/// Returns the value paired with the first true predicate, or the default.
/// Predicates must evaluate to booleans. Only the selected value is evaluated.
pub(crate) fn case(
    context: &mut EvaluationContext<'_>,
    parameters: &[ExpressionNode],
) -> ExpressionResult<Value> {
    if parameters.len() % 2 == 0 {
        return Err(ExpressionError::function(
            "case",
            format!(
                "case requires an odd number of parameters, but {} were supplied",
                parameters.len()
            ),
        ));
    }

    let (default, pairs) = parameters
        .split_last()
        .ok_or_else(|| ExpressionError::function("case", "case requires parameters"))?;
    for pair in pairs.chunks(2) {
        let predicate = context.evaluate(&pair[0])?;
        match predicate.as_ref() {
            Value::Boolean(true) => return Ok(context.evaluate(&pair[1])?.into_owned()),
            Value::Boolean(false) => {}
            other => {
                return Err(ExpressionError::function(
                    "case",
                    format!(
                        "case predicates must evaluate to a boolean, found {} in '{}'",
                        other.kind(),
                        pair[0]
                    ),
                ));
            }
        }
    }
    Ok(context.evaluate(default)?.into_owned())
}
