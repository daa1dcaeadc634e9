/*
 * evaluator.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Expansion of expressions in a token tree read earlier.
//!
//! Expressions whose named values and functions are all registered on the
//! context are evaluated and replaced by tokens built from the result. The
//! rest are left in place for a later stage. Results are checked against
//! the schema the same way the reader checks literals.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use pipeline_expressions::memory::MIN_OBJECT_SIZE;
use pipeline_expressions::{ExpressionError, ParseErrorKind, ParseOptions, parse};

use crate::context::TemplateContext;
use crate::errors::{
    EXPRESSION_NOT_ALLOWED, INSERT_REQUIRES_MAPPING, MAPPING_KEY_NOT_SCALAR, TemplateResult,
    UNEXPECTED_MAPPING_START, UNEXPECTED_SEQUENCE_START, unexpected_value, value_already_defined,
};
use crate::schema::{ANY, DefinitionInfo, TemplateSchema, mapping_shape_errors};
use crate::tokens::{
    BasicExpressionToken, LiteralToken, MappingToken, Provenance, ScalarToken, SequenceToken,
    TemplateToken,
};

/// Evaluate the expressions in `token`, validating the result against the
/// schema definition `type_name`.
///
/// Schema problems and malformed expressions are recorded on the context;
/// a malformed expression becomes an empty literal. Function failures,
/// budget violations and cancellation abort the evaluation, record one
/// error and return `None`.
pub fn evaluate_template(
    context: &mut TemplateContext,
    type_name: &str,
    token: &TemplateToken,
    file_id: Option<usize>,
) -> Option<TemplateToken> {
    let file_name = file_id
        .and_then(|id| context.get_file_name(id))
        .map(str::to_string);
    match &file_name {
        Some(name) => context
            .trace()
            .info(&format!("Begin evaluating template '{name}'")),
        None => context.trace().info("Begin evaluating template"),
    }

    let schema = Arc::clone(context.schema());
    let options = context.parse_options();
    let result = TemplateEvaluator {
        context: &mut *context,
        schema: &schema,
        options,
        file_id,
    }
    .evaluate_root(type_name, token);

    let result = match result {
        Ok(token) => Some(token),
        Err(error) => {
            context.error(file_id, &error);
            None
        }
    };
    match &file_name {
        Some(name) => context
            .trace()
            .info(&format!("Finished evaluating template '{name}'")),
        None => context.trace().info("Finished evaluating template"),
    }
    result
}

/// Outcome of expanding one expression.
enum Expanded {
    Token(TemplateToken),
    /// Refers to names the context does not provide yet.
    Deferred,
    /// Recorded as an error.
    Failed,
}

struct TemplateEvaluator<'a, 's> {
    context: &'a mut TemplateContext,
    schema: &'s TemplateSchema,
    options: ParseOptions,
    file_id: Option<usize>,
}

impl<'s> TemplateEvaluator<'_, 's> {
    fn evaluate_root(&mut self, type_name: &str, token: &TemplateToken) -> TemplateResult<TemplateToken> {
        let definition = DefinitionInfo::root(self.schema, type_name)?;
        self.evaluate(token, &definition)
    }

    fn evaluate(
        &mut self,
        token: &TemplateToken,
        definition: &DefinitionInfo<'s>,
    ) -> TemplateResult<TemplateToken> {
        self.context.check_cancelled()?;
        self.context.memory_mut().increment_events()?;

        match token {
            TemplateToken::Literal(literal) => {
                self.validate_literal(literal, definition)?;
                self.context.memory_mut().add_bytes(token.bytes())?;
                Ok(token.clone())
            }
            TemplateToken::BasicExpression(expression) => {
                match self.expand(expression)? {
                    Expanded::Token(result) => self.evaluate(&result, definition),
                    Expanded::Deferred => {
                        self.context.memory_mut().add_bytes(token.bytes())?;
                        Ok(token.clone())
                    }
                    Expanded::Failed => Ok(empty_literal(expression.provenance)),
                }
            }
            TemplateToken::InsertExpression(insert) => {
                self.error(insert.provenance, unexpected_value(&token.to_string()));
                Ok(empty_literal(insert.provenance))
            }
            TemplateToken::Sequence(sequence) => {
                self.context.memory_mut().increment_depth()?;
                self.context.memory_mut().add_bytes(MIN_OBJECT_SIZE)?;
                let result = self.evaluate_sequence(sequence, definition)?;
                self.context.memory_mut().decrement_depth();
                Ok(TemplateToken::Sequence(result))
            }
            TemplateToken::Mapping(mapping) => {
                self.context.memory_mut().increment_depth()?;
                self.context.memory_mut().add_bytes(MIN_OBJECT_SIZE)?;
                let result = self.evaluate_mapping(mapping, definition)?;
                self.context.memory_mut().decrement_depth();
                Ok(TemplateToken::Mapping(result))
            }
        }
    }

    fn expand(&mut self, expression: &BasicExpressionToken) -> TemplateResult<Expanded> {
        let tree = match parse(&expression.expression, &self.options) {
            Ok(Some(tree)) => tree,
            Ok(None) => return Ok(Expanded::Token(empty_literal(expression.provenance))),
            Err(error)
                if matches!(
                    error.kind,
                    ParseErrorKind::UnrecognizedNamedValue | ParseErrorKind::UnrecognizedFunction
                ) =>
            {
                return Ok(Expanded::Deferred);
            }
            Err(error) => {
                self.error(expression.provenance, error);
                return Ok(Expanded::Failed);
            }
        };

        match self.context.to_evaluation_context().evaluate_tree(&tree) {
            Ok(value) => Ok(Expanded::Token(TemplateToken::from_value(
                &value,
                expression.provenance,
            ))),
            Err(error) if error.is_fatal() || matches!(error, ExpressionError::Function { .. }) => {
                Err(error.into())
            }
            Err(error) => {
                self.error(expression.provenance, error);
                Ok(Expanded::Failed)
            }
        }
    }

    fn validate_literal(
        &mut self,
        literal: &LiteralToken,
        definition: &DefinitionInfo<'s>,
    ) -> TemplateResult<()> {
        let scalars = self.schema.scalars(definition.definition)?;
        if !scalars.iter().any(|d| d.is_match(&literal.value)) {
            self.error(literal.provenance, unexpected_value(&literal.value));
        }
        Ok(())
    }

    fn evaluate_sequence(
        &mut self,
        sequence: &SequenceToken,
        definition: &DefinitionInfo<'s>,
    ) -> TemplateResult<SequenceToken> {
        let mut result = SequenceToken::new(sequence.provenance);
        let Some(sequence_definition) = self.schema.sequence(definition.definition)? else {
            self.error(sequence.provenance, UNEXPECTED_SEQUENCE_START);
            return Ok(result);
        };
        let item = definition.child(self.schema, &sequence_definition.item_type)?;
        for token in &sequence.items {
            result.items.push(self.evaluate(token, &item)?);
        }
        Ok(result)
    }

    fn evaluate_mapping(
        &mut self,
        mapping: &MappingToken,
        definition: &DefinitionInfo<'s>,
    ) -> TemplateResult<MappingToken> {
        let mut result = MappingToken::new(mapping.provenance);
        let mut candidates = self.schema.mappings(definition.definition)?;
        if candidates.is_empty() {
            self.error(mapping.provenance, UNEXPECTED_MAPPING_START);
            return Ok(result);
        }
        let loose = candidates
            .iter()
            .copied()
            .find(|m| m.loose_key_type.is_some() && m.loose_value_type.is_some());

        let mut pending: VecDeque<(ScalarToken, TemplateToken)> =
            mapping.pairs.iter().cloned().collect();
        let mut keys = HashSet::new();
        let mut has_expression_key = false;
        while let Some((key, value)) = pending.pop_front() {
            self.context.check_cancelled()?;

            let literal = match key {
                ScalarToken::Literal(literal) => literal,
                ScalarToken::InsertExpression(insert) => {
                    if !definition.expressions_allowed() {
                        has_expression_key = true;
                        self.error(insert.provenance, EXPRESSION_NOT_ALLOWED);
                        continue;
                    }
                    match self.evaluate(&value, &definition.child(self.schema, ANY)?)? {
                        TemplateToken::Mapping(inserted) => {
                            for pair in inserted.pairs.into_iter().rev() {
                                pending.push_front(pair);
                            }
                        }
                        deferred @ TemplateToken::BasicExpression(_) => {
                            has_expression_key = true;
                            self.context.memory_mut().add_bytes(MIN_OBJECT_SIZE)?;
                            result
                                .pairs
                                .push((ScalarToken::InsertExpression(insert), deferred));
                        }
                        _ => self.error(insert.provenance, INSERT_REQUIRES_MAPPING),
                    }
                    continue;
                }
                ScalarToken::BasicExpression(expression) => match self.expand(&expression)? {
                    Expanded::Token(TemplateToken::Literal(literal)) => literal,
                    Expanded::Token(_) => {
                        self.error(expression.provenance, MAPPING_KEY_NOT_SCALAR);
                        continue;
                    }
                    Expanded::Deferred => {
                        has_expression_key = true;
                        let key = ScalarToken::BasicExpression(expression);
                        self.context.memory_mut().add_bytes(key.bytes())?;
                        let value = self.evaluate(&value, &definition.child(self.schema, ANY)?)?;
                        result.pairs.push((key, value));
                        continue;
                    }
                    Expanded::Failed => continue,
                },
            };

            if !keys.insert(literal.value.to_lowercase()) {
                self.error(literal.provenance, value_already_defined(&literal.value));
                continue;
            }

            let value_type = match self.schema.try_match_key(&mut candidates, &literal.value)? {
                Some(value_type) => value_type,
                None => match loose {
                    Some(loose) => {
                        let key_type = loose.loose_key_type.as_deref().unwrap_or(ANY);
                        self.validate_literal(&literal, &definition.child(self.schema, key_type)?)?;
                        candidates.retain(|m| std::ptr::eq(*m, loose));
                        loose.loose_value_type.as_deref().unwrap_or(ANY)
                    }
                    None => {
                        self.error(literal.provenance, unexpected_value(&literal.value));
                        continue;
                    }
                },
            };

            let key = ScalarToken::Literal(literal);
            self.context.memory_mut().add_bytes(key.bytes())?;
            let value = self.evaluate(&value, &definition.child(self.schema, value_type)?)?;
            result.pairs.push((key, value));
        }

        for message in mapping_shape_errors(&candidates, &keys, has_expression_key) {
            self.error(mapping.provenance, message);
        }
        Ok(result)
    }

    fn error(&mut self, provenance: Option<Provenance>, message: impl std::fmt::Display) {
        match provenance {
            Some(_) => self.context.error_token(provenance, message),
            None => self.context.error_at(self.file_id, None, message),
        }
    }
}

fn empty_literal(provenance: Option<Provenance>) -> TemplateToken {
    TemplateToken::Literal(LiteralToken::new(provenance, ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TemplateLimits;
    use crate::schema::{Definition, MappingDefinition, PropertyValue, STRING};
    use crate::trace::NoopTraceWriter;
    use pipeline_expressions::Value;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context(schema: TemplateSchema) -> TemplateContext {
        let mut context = TemplateContext::new(Arc::new(schema), TemplateLimits::default())
            .with_trace_writer(NoopTraceWriter);
        context.insert_expression_value(
            "matrix",
            Value::from_json(&json!({"os": "linux", "tags": ["a", "b"]})),
        );
        context
    }

    fn expression(text: &str) -> TemplateToken {
        TemplateToken::BasicExpression(BasicExpressionToken::new(None, text))
    }

    fn key(text: &str) -> ScalarToken {
        ScalarToken::Literal(LiteralToken::new(None, text))
    }

    #[test]
    fn expands_scalars_and_containers() {
        let mut context = context(TemplateSchema::new());
        let token = TemplateToken::Mapping(MappingToken {
            provenance: None,
            pairs: vec![
                (key("os"), expression("format('{0}-latest', matrix.os)")),
                (key("tags"), expression("matrix.tags")),
            ],
        });
        let result = evaluate_template(&mut context, ANY, &token, None).unwrap();
        assert!(context.errors().is_empty());
        assert!(result.is_fully_evaluated());
        let mapping = result.as_mapping().unwrap();
        assert_eq!(mapping.get("os").and_then(TemplateToken::as_literal), Some("linux-latest"));
        assert_eq!(mapping.get("tags").and_then(|t| t.as_sequence()).map(|s| s.items.len()), Some(2));
    }

    #[test]
    fn unknown_names_are_deferred() {
        let mut context = context(TemplateSchema::new());
        let token = expression("secrets.token");
        let result = evaluate_template(&mut context, ANY, &token, None).unwrap();
        assert_eq!(result, token);
        assert!(context.errors().is_empty());
    }

    #[test]
    fn function_errors_abort() {
        let mut context = context(TemplateSchema::new());
        let token = TemplateToken::Mapping(MappingToken {
            provenance: None,
            pairs: vec![
                (key("a"), expression("case(1, 'x', 'y')")),
                (key("b"), expression("format('{3}', 'x')")),
            ],
        });
        assert_eq!(evaluate_template(&mut context, ANY, &token, None), None);
        assert_eq!(context.errors().len(), 1);
    }

    #[test]
    fn malformed_expressions_are_recorded_per_node() {
        let mut context = context(TemplateSchema::new());
        let token = expression("matrix.os ==");
        let result = evaluate_template(&mut context, ANY, &token, None).unwrap();
        assert_eq!(result, TemplateToken::literal(""));
        assert_eq!(context.errors().len(), 1);
    }

    #[test]
    fn results_are_validated_against_the_schema() {
        let schema = TemplateSchema::new().with_definition(
            "job",
            Definition::mapping(
                MappingDefinition::new().with_property("runs-on", PropertyValue::required(STRING)),
            ),
        );
        let mut context = context(schema);
        let token = TemplateToken::Mapping(MappingToken {
            provenance: None,
            pairs: vec![(key("runs-on"), expression("matrix.tags"))],
        });
        evaluate_template(&mut context, "job", &token, None).unwrap();
        let messages: Vec<&str> = context.errors().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec![UNEXPECTED_SEQUENCE_START]);
    }

    #[test]
    fn cancellation_aborts() {
        let mut context = context(TemplateSchema::new());
        context.cancellation().cancel();
        assert_eq!(evaluate_template(&mut context, ANY, &TemplateToken::literal("x"), None), None);
        assert_eq!(context.errors().len(), 1);
    }
}
