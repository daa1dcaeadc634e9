/*
 * embedded.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Splitting scalars on embedded `${{ }}` expressions.
//!
//! A scalar holding a single expression becomes an expression token. Text
//! mixed with expressions is folded into one `format()` call, so
//! `a${{ 1 }}b` becomes `format('a{0}b', 1)`.

use pipeline_expressions::lexer::{Lexer, TokenKind};
use pipeline_expressions::{
    FunctionInfo, ParseError, ParseOptions, Value, escape_string, parse, validate_syntax,
};
use thiserror::Error;

use crate::tokens::{
    BasicExpressionToken, INSERT_DIRECTIVE, InsertExpressionToken, LiteralToken, Provenance,
    ScalarToken,
};

pub const OPEN_EXPRESSION: &str = "${{";
pub const CLOSE_EXPRESSION: &str = "}}";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbeddedExpressionError {
    #[error(
        "The expression is not closed. An unescaped ${{{{ sequence was found, but the closing }}}} sequence was not found."
    )]
    NotClosed,

    #[error("An expression was expected")]
    ExpectedExpression,

    #[error(
        "Exactly {expected} parameter(s) were expected following the directive '{directive}'. Actual parameter count: {actual}"
    )]
    DirectiveParameters {
        directive: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error(
        "The directive '{0}' is not allowed in this context. Directives are not supported for expressions that are embedded within a string. Directives are only supported when the entire value is an expression."
    )]
    DirectiveNotAllowedInline(&'static str),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

enum Segment {
    Literal(String),
    Expression(String),
    Insert,
}

/// Parse options for a position whose allowed expression context is
/// `allowed_context`. Entries shaped like `name(min,max)` are functions,
/// anything else is a named value.
pub fn parse_options(allowed_context: &[String]) -> ParseOptions {
    allowed_context
        .iter()
        .fold(ParseOptions::new(), |options, name| {
            match FunctionInfo::parse_signature(name) {
                Some(info) => options.with_function(info),
                None => options.with_named_value(name.clone()),
            }
        })
}

/// Split `raw` into literal and expression segments and fold them into a
/// single scalar token.
///
/// With an empty `allowed_context` expressions are only checked for syntax;
/// the caller decides whether an expression is allowed at all.
pub fn parse_scalar(
    raw: &str,
    provenance: Option<Provenance>,
    allowed_context: &[String],
) -> Result<ScalarToken, EmbeddedExpressionError> {
    let Some(mut next_start) = raw.find(OPEN_EXPRESSION) else {
        return Ok(ScalarToken::Literal(LiteralToken::new(provenance, raw)));
    };
    let options = (!allowed_context.is_empty()).then(|| parse_options(allowed_context));

    let bytes = raw.as_bytes();
    let mut segments: Vec<Segment> = Vec::new();
    let mut i = 0;
    while i < raw.len() {
        if i < next_start {
            push_literal(&mut segments, &raw[i..next_start]);
            i = next_start;
            continue;
        }

        let start = next_start;
        let mut end = None;
        let mut in_string = false;
        i = start + OPEN_EXPRESSION.len();
        while i < bytes.len() {
            match bytes[i] {
                b'\'' => in_string = !in_string,
                b'}' if !in_string && bytes[i - 1] == b'}' => {
                    end = Some(i);
                    i += 1;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        let Some(end) = end else {
            return Err(EmbeddedExpressionError::NotClosed);
        };

        let text = &raw[start + OPEN_EXPRESSION.len()..end + 1 - CLOSE_EXPRESSION.len()];
        let segment = parse_expression(text, options.as_ref())?;
        if matches!(segment, Segment::Insert) && (start != 0 || i < raw.len()) {
            return Err(EmbeddedExpressionError::DirectiveNotAllowedInline(INSERT_DIRECTIVE));
        }
        segments.push(segment);

        next_start = match raw[i..].find(OPEN_EXPRESSION) {
            Some(offset) => i + offset,
            None => raw.len(),
        };
    }

    if let [Segment::Expression(expression)] = segments.as_slice() {
        if let Some(text) = string_literal(expression) {
            return Ok(ScalarToken::Literal(LiteralToken::new(provenance, text)));
        }
    }

    match segments.as_slice() {
        [Segment::Expression(expression)] => Ok(ScalarToken::BasicExpression(
            BasicExpressionToken::new(provenance, expression.clone()),
        )),
        [Segment::Insert] => Ok(ScalarToken::InsertExpression(InsertExpressionToken::new(
            provenance,
        ))),
        [Segment::Literal(text)] => Ok(ScalarToken::Literal(LiteralToken::new(
            provenance,
            text.clone(),
        ))),
        _ => Ok(ScalarToken::BasicExpression(BasicExpressionToken::new(
            provenance,
            fold_into_format(&segments),
        ))),
    }
}

fn push_literal(segments: &mut Vec<Segment>, text: &str) {
    if let Some(Segment::Literal(last)) = segments.last_mut() {
        last.push_str(text);
    } else {
        segments.push(Segment::Literal(text.to_string()));
    }
}

fn parse_expression(
    text: &str,
    options: Option<&ParseOptions>,
) -> Result<Segment, EmbeddedExpressionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EmbeddedExpressionError::ExpectedExpression);
    }

    if let Some(parameters) = directive_parameters(trimmed, INSERT_DIRECTIVE) {
        if !parameters.is_empty() {
            return Err(EmbeddedExpressionError::DirectiveParameters {
                directive: INSERT_DIRECTIVE,
                expected: 0,
                actual: parameters.len(),
            });
        }
        return Ok(Segment::Insert);
    }

    match options {
        Some(options) => parse(trimmed, options)?,
        None => validate_syntax(trimmed)?,
    };
    Ok(Segment::Expression(trimmed.to_string()))
}

/// Whitespace-separated parameters following `directive`, or `None` when
/// `text` does not start with the directive. Quoted strings and
/// parenthesized groups are kept together.
fn directive_parameters<'t>(text: &'t str, directive: &str) -> Option<Vec<&'t str>> {
    let rest = text.strip_prefix(directive)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let mut parameters = Vec::new();
    let mut in_string = false;
    let mut parens = 0i32;
    let mut start = 0;
    for (index, c) in rest.char_indices() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => parens += 1,
            ')' if !in_string => parens -= 1,
            c if c.is_whitespace() && !in_string && parens == 0 => {
                if start < index {
                    parameters.push(&rest[start..index]);
                }
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    if start < rest.len() {
        parameters.push(&rest[start..]);
    }
    Some(parameters)
}

/// The text of `expression` when it is exactly one string literal.
fn string_literal(expression: &str) -> Option<String> {
    let mut tokens = Lexer::new(expression);
    let token = tokens.next()?;
    if token.kind != TokenKind::String || tokens.next().is_some() {
        return None;
    }
    match token.value {
        Some(Value::String(text)) => Some(text),
        _ => None,
    }
}

fn fold_into_format(segments: &[Segment]) -> String {
    let mut format = String::new();
    let mut arguments = String::new();
    let mut index = 0;
    for segment in segments {
        match segment {
            Segment::Literal(text) => {
                format.push_str(&escape_string(text).replace('{', "{{").replace('}', "}}"));
            }
            Segment::Expression(expression) => {
                format.push('{');
                format.push_str(&index.to_string());
                format.push('}');
                index += 1;
                arguments.push_str(", ");
                arguments.push_str(expression);
            }
            Segment::Insert => {}
        }
    }
    format!("format('{format}'{arguments})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn context(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn expression(raw: &str) -> String {
        match parse_scalar(raw, None, &context(&["matrix", "github"])).unwrap() {
            ScalarToken::BasicExpression(token) => token.expression,
            other => panic!("expected an expression, got {other:?}"),
        }
    }

    #[test]
    fn plain_text_stays_literal() {
        assert_eq!(
            parse_scalar("hello {world}", None, &[]).unwrap(),
            ScalarToken::Literal(LiteralToken::new(None, "hello {world}"))
        );
    }

    #[test]
    fn single_expression_is_trimmed() {
        assert_eq!(expression("${{  matrix.os }}"), "matrix.os");
    }

    #[test]
    fn mixed_text_folds_into_format() {
        assert_eq!(expression("a${{ 1 }}b"), "format('a{0}b', 1)");
        assert_eq!(
            expression("it's {x} ${{ matrix.os }}-${{ github.ref }}"),
            "format('it''s {{x}} {0}-{1}', matrix.os, github.ref)"
        );
    }

    #[test]
    fn quoted_braces_do_not_close() {
        assert_eq!(
            expression("${{ format('}}{0}', 'x') }}!"),
            "format('{0}!', format('}}{0}', 'x'))"
        );
    }

    #[test]
    fn escaped_expression_collapses_to_literal() {
        assert_eq!(
            parse_scalar("${{ '{{ literal }}' }}", None, &[]).unwrap(),
            ScalarToken::Literal(LiteralToken::new(None, "{{ literal }}"))
        );
        assert_eq!(
            parse_scalar("${{ 'it''s' }}", None, &[]).unwrap(),
            ScalarToken::Literal(LiteralToken::new(None, "it's"))
        );
    }

    #[test]
    fn unclosed_expression_is_an_error() {
        assert_eq!(
            parse_scalar("a ${{ matrix.os", None, &context(&["matrix"])),
            Err(EmbeddedExpressionError::NotClosed)
        );
        assert_eq!(
            parse_scalar("${{ '}}' ", None, &[]),
            Err(EmbeddedExpressionError::NotClosed)
        );
    }

    #[test]
    fn empty_expression_is_an_error() {
        assert_eq!(
            parse_scalar("${{ }}", None, &[]),
            Err(EmbeddedExpressionError::ExpectedExpression)
        );
    }

    #[test]
    fn insert_directive_must_be_whole_value() {
        assert!(matches!(
            parse_scalar("${{ insert }}", None, &[]).unwrap(),
            ScalarToken::InsertExpression(_)
        ));
        assert_eq!(
            parse_scalar("x ${{ insert }}", None, &[]),
            Err(EmbeddedExpressionError::DirectiveNotAllowedInline("insert"))
        );
        assert!(matches!(
            parse_scalar("${{ insert foo }}", None, &[]),
            Err(EmbeddedExpressionError::DirectiveParameters { actual: 1, .. })
        ));
        // A named value that merely starts with the directive name.
        assert_eq!(
            parse_scalar("${{ inserted }}", None, &context(&["inserted"])).unwrap(),
            ScalarToken::BasicExpression(BasicExpressionToken::new(None, "inserted"))
        );
    }

    #[test]
    fn unknown_names_fail_when_context_is_known() {
        assert!(matches!(
            parse_scalar("${{ secrets.token }}", None, &context(&["github"])),
            Err(EmbeddedExpressionError::Parse(_))
        ));
        assert!(matches!(
            parse_scalar("${{ secrets.token }}", None, &[]).unwrap(),
            ScalarToken::BasicExpression(_)
        ));
    }

    #[test]
    fn function_signatures_in_context() {
        let allowed = context(&["github", "success(0,0)"]);
        assert!(parse_scalar("${{ success() && github.ref }}", None, &allowed).is_ok());
        assert!(parse_scalar("${{ failure() }}", None, &allowed).is_err());
    }
}
