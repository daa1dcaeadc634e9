/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

use std::fmt;

use crate::lexer::{escape_string, is_legal_keyword};
use crate::number::format_number;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl CompareOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "==" => CompareOperator::Equal,
            "!=" => CompareOperator::NotEqual,
            "<" => CompareOperator::LessThan,
            "<=" => CompareOperator::LessThanOrEqual,
            ">" => CompareOperator::GreaterThan,
            ">=" => CompareOperator::GreaterThanOrEqual,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOperator::Equal => "==",
            CompareOperator::NotEqual => "!=",
            CompareOperator::LessThan => "<",
            CompareOperator::LessThanOrEqual => "<=",
            CompareOperator::GreaterThan => ">",
            CompareOperator::GreaterThanOrEqual => ">=",
        }
    }

    pub fn apply(self, left: &Value, right: &Value) -> bool {
        match self {
            CompareOperator::Equal => left.abstract_equal(right),
            CompareOperator::NotEqual => left.abstract_not_equal(right),
            CompareOperator::LessThan => left.abstract_less_than(right),
            CompareOperator::LessThanOrEqual => left.abstract_less_than_or_equal(right),
            CompareOperator::GreaterThan => left.abstract_greater_than(right),
            CompareOperator::GreaterThanOrEqual => left.abstract_greater_than_or_equal(right),
        }
    }
}

/// A parsed expression.
///
/// Property access (`a.b`) and indexing (`a['b']`) both become
/// [`ExpressionNode::Index`]. `&&` and `||` chains are flattened into a
/// single n-ary node.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    Literal(Value),
    NamedValue(String),
    /// `*` in `a.*` or `a[*]`. Only valid as the index of an [`ExpressionNode::Index`].
    Wildcard,
    Index(Box<ExpressionNode>, Box<ExpressionNode>),
    Not(Box<ExpressionNode>),
    And(Vec<ExpressionNode>),
    Or(Vec<ExpressionNode>),
    Compare(CompareOperator, Box<ExpressionNode>, Box<ExpressionNode>),
    Function(String, Vec<ExpressionNode>),
}

impl ExpressionNode {
    /// Names of all named values referenced by this expression.
    pub fn named_values(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                ExpressionNode::NamedValue(name) => names.push(name.as_str()),
                ExpressionNode::Index(target, index) => {
                    stack.push(index);
                    stack.push(target);
                }
                ExpressionNode::Not(inner) => stack.push(inner),
                ExpressionNode::Compare(_, left, right) => {
                    stack.push(right);
                    stack.push(left);
                }
                ExpressionNode::And(items)
                | ExpressionNode::Or(items)
                | ExpressionNode::Function(_, items) => stack.extend(items.iter().rev()),
                ExpressionNode::Literal(_) | ExpressionNode::Wildcard => {}
            }
        }
        names
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    items: &[ExpressionNode],
    separator: &str,
) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionNode::Literal(Value::String(s)) => write!(f, "'{}'", escape_string(s)),
            ExpressionNode::Literal(Value::Number(n)) => f.write_str(&format_number(*n)),
            ExpressionNode::Literal(Value::Boolean(b)) => write!(f, "{b}"),
            ExpressionNode::Literal(other) => f.write_str(if other.is_null() {
                "null"
            } else {
                other.kind().display_name()
            }),
            ExpressionNode::NamedValue(name) => f.write_str(name),
            ExpressionNode::Wildcard => f.write_str("*"),
            ExpressionNode::Index(target, index) => match index.as_ref() {
                ExpressionNode::Literal(Value::String(name)) if is_legal_keyword(name) => {
                    write!(f, "{target}.{name}")
                }
                other => write!(f, "{target}[{other}]"),
            },
            ExpressionNode::Not(inner) => write!(f, "!{inner}"),
            ExpressionNode::And(items) => {
                f.write_str("(")?;
                write_joined(f, items, " && ")?;
                f.write_str(")")
            }
            ExpressionNode::Or(items) => {
                f.write_str("(")?;
                write_joined(f, items, " || ")?;
                f.write_str(")")
            }
            ExpressionNode::Compare(op, left, right) => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            ExpressionNode::Function(name, args) => {
                write!(f, "{name}(")?;
                write_joined(f, args, ", ")?;
                f.write_str(")")
            }
        }
    }
}
