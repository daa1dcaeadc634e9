/*
 * reader.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Schema-guided construction of a token tree from an object stream.
//!
//! Problems with individual nodes are recorded on the context and the
//! offending value is skipped. Only budget violations, cancellation, schema
//! misconfiguration and a malformed stream abort the read.

use std::collections::HashSet;
use std::sync::Arc;

use pipeline_expressions::memory::MIN_OBJECT_SIZE;

use crate::context::TemplateContext;
use crate::embedded;
use crate::errors::{
    EXPRESSION_NOT_ALLOWED, MAPPING_KEY_NOT_SCALAR, TemplateError, TemplateResult,
    UNEXPECTED_MAPPING_START, UNEXPECTED_SEQUENCE_START, unexpected_value, value_already_defined,
};
use crate::object_stream::{ObjectReader, RawScalar, SourcePosition};
use crate::schema::{ANY, DefinitionInfo, TemplateSchema, mapping_shape_errors};
use crate::tokens::{
    LiteralToken, MappingToken, Provenance, ScalarToken, SequenceToken, TemplateToken,
};

/// Read one document from `source`, validating it against the schema
/// definition `type_name`.
///
/// Returns the token tree, or `None` when the read was aborted, together
/// with the bytes charged to the context's memory counter. Recorded errors
/// are left on the context either way.
pub fn read_template(
    context: &mut TemplateContext,
    type_name: &str,
    source: &mut dyn ObjectReader,
    file_id: Option<usize>,
) -> (Option<TemplateToken>, usize) {
    let schema = Arc::clone(context.schema());
    let before = context.memory().current_bytes();

    let result = TemplateReader {
        context: &mut *context,
        schema: &schema,
        source,
        file_id,
    }
    .read(type_name);

    let bytes = context.memory().current_bytes().saturating_sub(before);
    match result {
        Ok(token) => {
            context
                .trace()
                .verbose(&format!("Read template '{type_name}' ({bytes} bytes)"));
            (Some(token), bytes)
        }
        Err(error) => {
            context.error(file_id, &error);
            (None, bytes)
        }
    }
}

struct TemplateReader<'a, 's> {
    context: &'a mut TemplateContext,
    schema: &'s TemplateSchema,
    source: &'a mut dyn ObjectReader,
    file_id: Option<usize>,
}

impl<'s> TemplateReader<'_, 's> {
    fn read(&mut self, type_name: &str) -> TemplateResult<TemplateToken> {
        self.source.validate_start()?;
        let definition = DefinitionInfo::root(self.schema, type_name)?;
        let token = self.read_value(&definition)?;
        self.source.validate_end()?;
        Ok(token)
    }

    fn read_value(&mut self, definition: &DefinitionInfo<'s>) -> TemplateResult<TemplateToken> {
        self.context.check_cancelled()?;
        self.context.memory_mut().increment_events()?;

        if let Some(raw) = self.source.allow_scalar()? {
            let scalar = self.read_scalar(raw, definition)?;
            self.context.memory_mut().add_bytes(scalar.bytes())?;
            return Ok(scalar.into());
        }

        if let Some(start) = self.source.allow_sequence_start()? {
            self.context.memory_mut().increment_depth()?;
            self.context.memory_mut().add_bytes(MIN_OBJECT_SIZE)?;
            let provenance = self.provenance(start.position);
            let sequence = self.read_sequence(provenance, definition)?;
            self.context.memory_mut().decrement_depth();
            return Ok(TemplateToken::Sequence(sequence));
        }

        if let Some(start) = self.source.allow_mapping_start()? {
            self.context.memory_mut().increment_depth()?;
            self.context.memory_mut().add_bytes(MIN_OBJECT_SIZE)?;
            let provenance = self.provenance(start.position);
            let mapping = self.read_mapping(provenance, definition)?;
            self.context.memory_mut().decrement_depth();
            return Ok(TemplateToken::Mapping(mapping));
        }

        Err(TemplateError::UnexpectedNode)
    }

    /// Split a scalar on embedded expressions and check it against the
    /// definition. Anything that does not fit is recorded and kept as a
    /// literal of the raw text.
    fn read_scalar(
        &mut self,
        raw: RawScalar,
        definition: &DefinitionInfo<'s>,
    ) -> TemplateResult<ScalarToken> {
        let provenance = self.provenance(raw.position);
        let scalar = match self.split_scalar(&raw.text, provenance, definition) {
            Some(scalar) => scalar,
            None => return Ok(ScalarToken::Literal(LiteralToken::new(provenance, raw.text))),
        };

        match scalar {
            ScalarToken::Literal(literal) => {
                self.validate_literal(&literal, definition)?;
                Ok(ScalarToken::Literal(literal))
            }
            _ if !definition.expressions_allowed() => {
                self.error(provenance, EXPRESSION_NOT_ALLOWED);
                Ok(ScalarToken::Literal(LiteralToken::new(provenance, raw.text)))
            }
            ScalarToken::InsertExpression(_) => {
                self.error(provenance, unexpected_value(&raw.text));
                Ok(ScalarToken::Literal(LiteralToken::new(provenance, raw.text)))
            }
            expression => Ok(expression),
        }
    }

    fn split_scalar(
        &mut self,
        text: &str,
        provenance: Option<Provenance>,
        definition: &DefinitionInfo<'s>,
    ) -> Option<ScalarToken> {
        match embedded::parse_scalar(text, provenance, &definition.allowed_context) {
            Ok(scalar) => Some(scalar),
            Err(error) => {
                self.error(provenance, error);
                None
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

    fn read_sequence(
        &mut self,
        provenance: Option<Provenance>,
        definition: &DefinitionInfo<'s>,
    ) -> TemplateResult<SequenceToken> {
        let mut sequence = SequenceToken::new(provenance);
        let Some(sequence_definition) = self.schema.sequence(definition.definition)? else {
            self.error(provenance, UNEXPECTED_SEQUENCE_START);
            while !self.source.allow_sequence_end()? {
                self.skip_value()?;
            }
            return Ok(sequence);
        };

        let item = definition.child(self.schema, &sequence_definition.item_type)?;
        while !self.source.allow_sequence_end()? {
            sequence.items.push(self.read_value(&item)?);
        }
        Ok(sequence)
    }

    fn read_mapping(
        &mut self,
        provenance: Option<Provenance>,
        definition: &DefinitionInfo<'s>,
    ) -> TemplateResult<MappingToken> {
        let mut mapping = MappingToken::new(provenance);
        let mut candidates = self.schema.mappings(definition.definition)?;
        if candidates.is_empty() {
            self.error(provenance, UNEXPECTED_MAPPING_START);
            while !self.source.allow_mapping_end()? {
                self.skip_value()?;
                self.skip_value()?;
            }
            return Ok(mapping);
        }

        // Schema validation allows at most one loose shape per one-of.
        let loose = candidates
            .iter()
            .copied()
            .find(|m| m.loose_key_type.is_some() && m.loose_value_type.is_some());

        let mut keys = HashSet::new();
        let mut has_expression_key = false;
        while !self.source.allow_mapping_end()? {
            self.context.check_cancelled()?;

            let Some(raw_key) = self.source.allow_scalar()? else {
                self.error(provenance, MAPPING_KEY_NOT_SCALAR);
                self.skip_value()?;
                self.skip_value()?;
                continue;
            };
            let key_provenance = self.provenance(raw_key.position);
            let key = self
                .split_scalar(&raw_key.text, key_provenance, definition)
                .unwrap_or_else(|| {
                    ScalarToken::Literal(LiteralToken::new(key_provenance, raw_key.text.as_str()))
                });

            let literal = match key {
                ScalarToken::Literal(literal) => literal,
                expression => {
                    has_expression_key = true;
                    if !definition.expressions_allowed() {
                        self.error(key_provenance, EXPRESSION_NOT_ALLOWED);
                        self.skip_value()?;
                        continue;
                    }
                    self.context.memory_mut().add_bytes(expression.bytes())?;
                    let value = self.read_value(&definition.child(self.schema, ANY)?)?;
                    mapping.pairs.push((expression, value));
                    continue;
                }
            };

            if !keys.insert(literal.value.to_lowercase()) {
                self.error(key_provenance, value_already_defined(&literal.value));
                self.skip_value()?;
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
                        self.error(key_provenance, unexpected_value(&literal.value));
                        self.skip_value()?;
                        continue;
                    }
                },
            };

            let key = ScalarToken::Literal(literal);
            self.context.memory_mut().add_bytes(key.bytes())?;
            let value = self.read_value(&definition.child(self.schema, value_type)?)?;
            mapping.pairs.push((key, value));
        }

        for message in mapping_shape_errors(&candidates, &keys, has_expression_key) {
            self.error(provenance, message);
        }
        Ok(mapping)
    }

    /// Consume one value without building tokens. Budgets still apply.
    fn skip_value(&mut self) -> TemplateResult<()> {
        self.context.memory_mut().increment_events()?;

        if self.source.allow_scalar()?.is_some() {
            return Ok(());
        }

        if self.source.allow_sequence_start()?.is_some() {
            self.context.memory_mut().increment_depth()?;
            while !self.source.allow_sequence_end()? {
                self.skip_value()?;
            }
            self.context.memory_mut().decrement_depth();
            return Ok(());
        }

        if self.source.allow_mapping_start()?.is_some() {
            self.context.memory_mut().increment_depth()?;
            while !self.source.allow_mapping_end()? {
                self.skip_value()?;
                self.skip_value()?;
            }
            self.context.memory_mut().decrement_depth();
            return Ok(());
        }

        Err(TemplateError::UnexpectedNode)
    }

    fn provenance(&self, position: Option<SourcePosition>) -> Option<Provenance> {
        match (self.file_id, position) {
            (Some(file_id), Some(position)) => {
                Some(Provenance::new(file_id, position.line, position.column))
            }
            _ => None,
        }
    }

    fn error(&mut self, provenance: Option<Provenance>, message: impl std::fmt::Display) {
        match provenance {
            Some(_) => self.context.error_token(provenance, message),
            None => self.context.error_at(self.file_id, None, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TemplateLimits;
    use crate::json::JsonObjectReader;
    use crate::schema::{Definition, MappingDefinition, PropertyValue, STRING};
    use crate::trace::NoopTraceWriter;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn read(
        schema: TemplateSchema,
        type_name: &str,
        document: serde_json::Value,
    ) -> (Option<TemplateToken>, Vec<String>) {
        let mut context = TemplateContext::new(Arc::new(schema), TemplateLimits::default())
            .with_trace_writer(NoopTraceWriter);
        let mut source = JsonObjectReader::new(document);
        let (token, _) = read_template(&mut context, type_name, &mut source, None);
        let errors = context.errors().iter().map(|e| e.message.clone()).collect();
        (token, errors)
    }

    fn step_schema() -> TemplateSchema {
        TemplateSchema::new().with_definition(
            "step",
            Definition::mapping(
                MappingDefinition::new()
                    .with_property("name", PropertyValue::new(STRING))
                    .with_property("run", PropertyValue::required(STRING)),
            )
            .with_context(["matrix"]),
        )
    }

    #[test]
    fn reads_any_document() {
        let (token, errors) = read(TemplateSchema::new(), ANY, json!({"a": ["x", 1, true]}));
        assert!(errors.is_empty());
        let mapping = token.unwrap();
        let items = mapping.as_mapping().unwrap().get("a").unwrap().as_sequence().unwrap();
        let texts: Vec<&str> = items.items.iter().filter_map(TemplateToken::as_literal).collect();
        assert_eq!(texts, vec!["x", "1", "true"]);
    }

    #[test]
    fn unknown_property_is_skipped() {
        let (token, errors) = read(step_schema(), "step", json!({"run": "make", "shell": "bash"}));
        assert_eq!(errors, vec!["Unexpected value 'shell'"]);
        assert_eq!(token.unwrap().as_mapping().unwrap().pairs.len(), 1);
    }

    #[test]
    fn missing_required_property() {
        let (_, errors) = read(step_schema(), "step", json!({"name": "build"}));
        assert_eq!(errors, vec!["Required property is missing: run"]);
    }

    #[test]
    fn expressions_follow_allowed_context() {
        let (token, errors) = read(step_schema(), "step", json!({"run": "make ${{ matrix.target }}"}));
        assert!(errors.is_empty(), "{errors:?}");
        let run = token.unwrap().as_mapping().unwrap().get("run").cloned().unwrap();
        assert_eq!(run.to_string(), "${{ format('make {0}', matrix.target) }}");

        let (_, errors) = read(TemplateSchema::new(), ANY, json!({"run": "${{ matrix.target }}"}));
        assert_eq!(errors, vec![EXPRESSION_NOT_ALLOWED]);
    }

    #[test]
    fn sequence_where_mapping_expected() {
        let (token, errors) = read(step_schema(), "step", json!([{"run": "a"}, "b"]));
        assert_eq!(errors, vec![UNEXPECTED_SEQUENCE_START]);
        assert_eq!(token.unwrap().as_sequence().unwrap().items.len(), 0);
    }

    #[test]
    fn malformed_key_is_kept_as_text() {
        let (token, errors) = read(TemplateSchema::new(), ANY, json!({"a ${{ x": "v", "b": "w"}));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("The expression is not closed"), "{errors:?}");
        let mapping = token.unwrap();
        let mapping = mapping.as_mapping().unwrap();
        assert_eq!(mapping.pairs.len(), 2);
        assert_eq!(mapping.get("a ${{ x").and_then(TemplateToken::as_literal), Some("v"));
    }

    #[test]
    fn malformed_key_still_checks_duplicates() {
        let (token, errors) = read(TemplateSchema::new(), ANY, json!({"a ${{ x": "v", "A ${{ X": "w"}));
        assert_eq!(errors.len(), 3);
        assert!(errors[2].ends_with("'A ${{ X' is already defined"), "{errors:?}");
        assert_eq!(token.unwrap().as_mapping().unwrap().pairs.len(), 1);
    }

    #[test]
    fn rejected_expression_key_suppresses_required_check() {
        let schema = TemplateSchema::new().with_definition(
            "strict-step",
            Definition::mapping(
                MappingDefinition::new().with_property("run", PropertyValue::required(STRING)),
            ),
        );
        let (_, errors) = read(schema, "strict-step", json!({"${{ matrix.step }}": "x"}));
        assert_eq!(errors, vec![EXPRESSION_NOT_ALLOWED]);
    }

    #[test]
    fn missing_definition_aborts() {
        let (token, errors) = read(TemplateSchema::new(), "workflow", json!({}));
        assert!(token.is_none());
        assert_eq!(errors, vec!["Schema definition 'workflow' not found"]);
    }
}
