/*
 * tokens.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Document token model produced by the reader and consumed by the writer
//! and evaluator.

use std::fmt;

use pipeline_expressions::memory::MIN_OBJECT_SIZE;
use pipeline_expressions::number::format_number;
use pipeline_expressions::{Dictionary, MemoryCounter, Value};

/// Where a token came from. File id, line and column are always recorded
/// together; a token without a known origin has no provenance at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Provenance {
    /// 1-based id from the context's file table.
    pub file_id: usize,
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

impl Provenance {
    pub fn new(file_id: usize, line: usize, column: usize) -> Self {
        Self {
            file_id,
            line,
            column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralToken {
    pub provenance: Option<Provenance>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicExpressionToken {
    pub provenance: Option<Provenance>,
    /// Expression text without the `${{ }}` markers.
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertExpressionToken {
    pub provenance: Option<Provenance>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SequenceToken {
    pub provenance: Option<Provenance>,
    pub items: Vec<TemplateToken>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MappingToken {
    pub provenance: Option<Provenance>,
    pub pairs: Vec<(ScalarToken, TemplateToken)>,
}

/// A token that can appear as a mapping key.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarToken {
    Literal(LiteralToken),
    BasicExpression(BasicExpressionToken),
    InsertExpression(InsertExpressionToken),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateToken {
    Literal(LiteralToken),
    BasicExpression(BasicExpressionToken),
    InsertExpression(InsertExpressionToken),
    Sequence(SequenceToken),
    Mapping(MappingToken),
}

pub const INSERT_DIRECTIVE: &str = "insert";

impl LiteralToken {
    pub fn new(provenance: Option<Provenance>, value: impl Into<String>) -> Self {
        Self {
            provenance,
            value: value.into(),
        }
    }
}

impl BasicExpressionToken {
    pub fn new(provenance: Option<Provenance>, expression: impl Into<String>) -> Self {
        Self {
            provenance,
            expression: expression.into(),
        }
    }
}

impl InsertExpressionToken {
    pub fn new(provenance: Option<Provenance>) -> Self {
        Self { provenance }
    }
}

impl SequenceToken {
    pub fn new(provenance: Option<Provenance>) -> Self {
        Self {
            provenance,
            items: Vec::new(),
        }
    }
}

impl MappingToken {
    pub fn new(provenance: Option<Provenance>) -> Self {
        Self {
            provenance,
            pairs: Vec::new(),
        }
    }

    /// Value of the first literal key equal to `key`, ignoring case.
    pub fn get(&self, key: &str) -> Option<&TemplateToken> {
        self.pairs.iter().find_map(|(k, v)| match k {
            ScalarToken::Literal(literal) if literal.value.eq_ignore_ascii_case(key) => Some(v),
            _ => None,
        })
    }
}

impl ScalarToken {
    pub fn provenance(&self) -> Option<Provenance> {
        match self {
            ScalarToken::Literal(t) => t.provenance,
            ScalarToken::BasicExpression(t) => t.provenance,
            ScalarToken::InsertExpression(t) => t.provenance,
        }
    }

    pub fn is_expression(&self) -> bool {
        !matches!(self, ScalarToken::Literal(_))
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            ScalarToken::Literal(t) => Some(&t.value),
            _ => None,
        }
    }

    /// Estimated bytes, as charged to the memory counter.
    pub fn bytes(&self) -> usize {
        match self {
            ScalarToken::Literal(t) => MIN_OBJECT_SIZE + MemoryCounter::string_bytes(t.value.len()),
            ScalarToken::BasicExpression(t) => {
                MIN_OBJECT_SIZE + MemoryCounter::string_bytes(t.expression.len())
            }
            ScalarToken::InsertExpression(_) => MIN_OBJECT_SIZE,
        }
    }
}

impl fmt::Display for ScalarToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarToken::Literal(t) => f.write_str(&t.value),
            ScalarToken::BasicExpression(t) => write!(f, "${{{{ {} }}}}", t.expression),
            ScalarToken::InsertExpression(_) => write!(f, "${{{{ {INSERT_DIRECTIVE} }}}}"),
        }
    }
}

impl From<ScalarToken> for TemplateToken {
    fn from(scalar: ScalarToken) -> Self {
        match scalar {
            ScalarToken::Literal(t) => TemplateToken::Literal(t),
            ScalarToken::BasicExpression(t) => TemplateToken::BasicExpression(t),
            ScalarToken::InsertExpression(t) => TemplateToken::InsertExpression(t),
        }
    }
}

impl TemplateToken {
    pub fn literal(value: impl Into<String>) -> Self {
        TemplateToken::Literal(LiteralToken::new(None, value))
    }

    pub fn provenance(&self) -> Option<Provenance> {
        match self {
            TemplateToken::Literal(t) => t.provenance,
            TemplateToken::BasicExpression(t) => t.provenance,
            TemplateToken::InsertExpression(t) => t.provenance,
            TemplateToken::Sequence(t) => t.provenance,
            TemplateToken::Mapping(t) => t.provenance,
        }
    }

    /// Name of the token kind, for messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            TemplateToken::Literal(_) => "literal",
            TemplateToken::BasicExpression(_) => "expression",
            TemplateToken::InsertExpression(_) => "insert directive",
            TemplateToken::Sequence(_) => "sequence",
            TemplateToken::Mapping(_) => "mapping",
        }
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            TemplateToken::Literal(t) => Some(&t.value),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&SequenceToken> {
        match self {
            TemplateToken::Sequence(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&MappingToken> {
        match self {
            TemplateToken::Mapping(t) => Some(t),
            _ => None,
        }
    }

    /// Split into a mapping-key token, or give back a container.
    pub fn into_scalar(self) -> Result<ScalarToken, TemplateToken> {
        match self {
            TemplateToken::Literal(t) => Ok(ScalarToken::Literal(t)),
            TemplateToken::BasicExpression(t) => Ok(ScalarToken::BasicExpression(t)),
            TemplateToken::InsertExpression(t) => Ok(ScalarToken::InsertExpression(t)),
            other => Err(other),
        }
    }

    /// True when no expression or directive remains anywhere in the tree.
    pub fn is_fully_evaluated(&self) -> bool {
        self.traverse().all(|node| match node {
            Node::Key(key) => !key.is_expression(),
            Node::Token(token) => !matches!(
                token,
                TemplateToken::BasicExpression(_) | TemplateToken::InsertExpression(_)
            ),
        })
    }

    /// Estimated bytes of this node alone.
    pub fn bytes(&self) -> usize {
        match self {
            TemplateToken::Literal(t) => MIN_OBJECT_SIZE + MemoryCounter::string_bytes(t.value.len()),
            TemplateToken::BasicExpression(t) => {
                MIN_OBJECT_SIZE + MemoryCounter::string_bytes(t.expression.len())
            }
            TemplateToken::InsertExpression(_)
            | TemplateToken::Sequence(_)
            | TemplateToken::Mapping(_) => MIN_OBJECT_SIZE,
        }
    }

    /// Estimated bytes of the whole tree, keys included.
    pub fn total_bytes(&self) -> usize {
        self.traverse()
            .map(|node| match node {
                Node::Key(key) => key.bytes(),
                Node::Token(token) => token.bytes(),
            })
            .sum()
    }

    /// Pre-order walk over every token, mapping keys included.
    pub fn traverse(&self) -> Traverse<'_> {
        Traverse {
            stack: vec![Node::Token(self)],
        }
    }

    /// Project into the value model. Expressions become their `${{ }}` text.
    pub fn to_value(&self) -> Value {
        match self {
            TemplateToken::Literal(t) => Value::String(t.value.clone()),
            TemplateToken::BasicExpression(_) | TemplateToken::InsertExpression(_) => {
                Value::String(self.to_string())
            }
            TemplateToken::Sequence(t) => Value::Array(t.items.iter().map(Self::to_value).collect()),
            TemplateToken::Mapping(t) => {
                let mut map = Dictionary::with_capacity(t.pairs.len());
                for (key, value) in &t.pairs {
                    map.insert(key.to_string(), value.to_value());
                }
                Value::Dictionary(map)
            }
        }
    }

    /// Build tokens from an evaluated value. Every produced token carries
    /// `provenance`.
    pub fn from_value(value: &Value, provenance: Option<Provenance>) -> TemplateToken {
        match value {
            Value::Null => TemplateToken::Literal(LiteralToken::new(provenance, "")),
            Value::Boolean(b) => TemplateToken::Literal(LiteralToken::new(provenance, b.to_string())),
            Value::Number(n) => TemplateToken::Literal(LiteralToken::new(provenance, format_number(*n))),
            Value::String(s) => TemplateToken::Literal(LiteralToken::new(provenance, s.clone())),
            Value::Array(items) => TemplateToken::Sequence(SequenceToken {
                provenance,
                items: items
                    .iter()
                    .map(|item| Self::from_value(item, provenance))
                    .collect(),
            }),
            Value::Dictionary(map) => mapping_from_entries(map.iter(), provenance),
            Value::CaseSensitiveDictionary(map) => mapping_from_entries(map.iter(), provenance),
        }
    }
}

fn mapping_from_entries<'v>(
    entries: impl Iterator<Item = (&'v str, &'v Value)>,
    provenance: Option<Provenance>,
) -> TemplateToken {
    TemplateToken::Mapping(MappingToken {
        provenance,
        pairs: entries
            .map(|(key, value)| {
                (
                    ScalarToken::Literal(LiteralToken::new(provenance, key)),
                    TemplateToken::from_value(value, provenance),
                )
            })
            .collect(),
    })
}

impl fmt::Display for TemplateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateToken::Literal(t) => f.write_str(&t.value),
            TemplateToken::BasicExpression(t) => write!(f, "${{{{ {} }}}}", t.expression),
            TemplateToken::InsertExpression(_) => write!(f, "${{{{ {INSERT_DIRECTIVE} }}}}"),
            TemplateToken::Sequence(_) => f.write_str("Sequence"),
            TemplateToken::Mapping(_) => f.write_str("Mapping"),
        }
    }
}

/// A node visited by [`TemplateToken::traverse`].
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Key(&'a ScalarToken),
    Token(&'a TemplateToken),
}

pub struct Traverse<'a> {
    stack: Vec<Node<'a>>,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Node<'a>> {
        let node = self.stack.pop()?;
        if let Node::Token(token) = node {
            match token {
                TemplateToken::Sequence(sequence) => {
                    self.stack
                        .extend(sequence.items.iter().rev().map(Node::Token));
                }
                TemplateToken::Mapping(mapping) => {
                    for (key, value) in mapping.pairs.iter().rev() {
                        self.stack.push(Node::Token(value));
                        self.stack.push(Node::Key(key));
                    }
                }
                _ => {}
            }
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(text: &str) -> ScalarToken {
        ScalarToken::Literal(LiteralToken::new(None, text))
    }

    fn sample() -> TemplateToken {
        TemplateToken::Mapping(MappingToken {
            provenance: None,
            pairs: vec![
                (key("name"), TemplateToken::literal("build")),
                (
                    key("steps"),
                    TemplateToken::Sequence(SequenceToken {
                        provenance: None,
                        items: vec![
                            TemplateToken::literal("a"),
                            TemplateToken::BasicExpression(BasicExpressionToken::new(
                                None,
                                "matrix.os",
                            )),
                        ],
                    }),
                ),
            ],
        })
    }

    #[test]
    fn traverse_is_pre_order_with_keys() {
        let token = sample();
        let visited: Vec<String> = token
            .traverse()
            .map(|node| match node {
                Node::Key(k) => format!("key:{k}"),
                Node::Token(t) => t.to_string(),
            })
            .collect();
        assert_eq!(
            visited,
            vec![
                "Mapping",
                "key:name",
                "build",
                "key:steps",
                "Sequence",
                "a",
                "${{ matrix.os }}",
            ]
        );
    }

    #[test]
    fn total_bytes_sums_every_node() {
        let token = sample();
        let expected = MIN_OBJECT_SIZE
            + (MIN_OBJECT_SIZE + 26 + 4)
            + (MIN_OBJECT_SIZE + 26 + 5)
            + (MIN_OBJECT_SIZE + 26 + 5)
            + MIN_OBJECT_SIZE
            + (MIN_OBJECT_SIZE + 26 + 1)
            + (MIN_OBJECT_SIZE + 26 + 9);
        assert_eq!(token.total_bytes(), expected);
    }

    #[test]
    fn value_projection_keeps_expression_text() {
        let value = sample().to_value();
        assert_eq!(value.get("name"), Some(&Value::from("build")));
        let steps = value.get("steps").and_then(Value::as_array).unwrap();
        assert_eq!(steps[1], Value::from("${{ matrix.os }}"));
        assert!(!sample().is_fully_evaluated());
    }

    #[test]
    fn from_value_builds_literals_and_containers() {
        let value = Value::from_json(&serde_json::json!({"os": ["linux", 1.5, true, null]}));
        let provenance = Some(Provenance::new(1, 2, 3));
        let token = TemplateToken::from_value(&value, provenance);
        let mapping = token.as_mapping().unwrap();
        let items = &mapping.get("OS").and_then(TemplateToken::as_sequence).unwrap().items;
        let texts: Vec<&str> = items.iter().filter_map(TemplateToken::as_literal).collect();
        assert_eq!(texts, vec!["linux", "1.5", "true", ""]);
        assert!(token.traverse().all(|node| match node {
            Node::Key(k) => k.provenance() == provenance,
            Node::Token(t) => t.provenance() == provenance,
        }));
        assert!(token.is_fully_evaluated());
    }
}
