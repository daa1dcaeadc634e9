/*
 * writer.rs
 * Copyright (c) 2025 Posit, PBC
 */

use crate::errors::TemplateResult;
use crate::object_stream::ObjectWriter;
use crate::tokens::{ScalarToken, TemplateToken};

/// Drive `sink` with the structure of `token`.
///
/// Expressions still present are written as their `${{ }}` text.
pub fn write_template(sink: &mut dyn ObjectWriter, token: &TemplateToken) -> TemplateResult<()> {
    sink.write_start()?;
    write_value(sink, token)?;
    sink.write_end()
}

fn write_value(sink: &mut dyn ObjectWriter, token: &TemplateToken) -> TemplateResult<()> {
    match token {
        TemplateToken::Literal(literal) => sink.write_string(&literal.value),
        TemplateToken::BasicExpression(_) | TemplateToken::InsertExpression(_) => {
            sink.write_string(&token.to_string())
        }
        TemplateToken::Sequence(sequence) => {
            sink.write_sequence_start()?;
            for item in &sequence.items {
                write_value(sink, item)?;
            }
            sink.write_sequence_end()
        }
        TemplateToken::Mapping(mapping) => {
            sink.write_mapping_start()?;
            for (key, value) in &mapping.pairs {
                write_key(sink, key)?;
                write_value(sink, value)?;
            }
            sink.write_mapping_end()
        }
    }
}

fn write_key(sink: &mut dyn ObjectWriter, key: &ScalarToken) -> TemplateResult<()> {
    match key {
        ScalarToken::Literal(literal) => sink.write_string(&literal.value),
        expression => sink.write_string(&expression.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::JsonObjectWriter;
    use crate::tokens::{BasicExpressionToken, LiteralToken, MappingToken, SequenceToken};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn writes_structure_and_expression_text() {
        let token = TemplateToken::Mapping(MappingToken {
            provenance: None,
            pairs: vec![
                (
                    ScalarToken::Literal(LiteralToken::new(None, "steps")),
                    TemplateToken::Sequence(SequenceToken {
                        provenance: None,
                        items: vec![TemplateToken::literal("a"), TemplateToken::literal("b")],
                    }),
                ),
                (
                    ScalarToken::BasicExpression(BasicExpressionToken::new(None, "matrix.key")),
                    TemplateToken::BasicExpression(BasicExpressionToken::new(None, "matrix.value")),
                ),
            ],
        });

        let mut sink = JsonObjectWriter::new();
        write_template(&mut sink, &token).unwrap();
        assert_eq!(
            sink.into_value(),
            Some(json!({
                "steps": ["a", "b"],
                "${{ matrix.key }}": "${{ matrix.value }}",
            }))
        );
    }
}
