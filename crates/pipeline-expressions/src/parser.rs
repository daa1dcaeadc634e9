/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Precedence-climbing parser producing [`ExpressionNode`] trees.
//!
//! Operator precedence from loosest to tightest: `||`, `&&`, `== !=`,
//! `< <= > >=`, `!`, then member access and indexing.

use crate::ast::{CompareOperator, ExpressionNode};
use crate::coercion::eq_ignore_case;
use crate::error::{ParseError, ParseErrorKind};
use crate::functions::{BUILTIN_FUNCTIONS, FunctionInfo};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::value::Value;

/// Deepest tree (and deepest nesting of groups and calls) accepted.
pub const MAX_DEPTH: usize = 50;

/// Longest expression accepted, in characters.
pub const MAX_LENGTH: usize = 21_000;

/// Names the parser recognizes besides the built-in functions.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    named_values: Vec<String>,
    functions: Vec<FunctionInfo>,
    allow_unknown_keywords: bool,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_named_value(mut self, name: impl Into<String>) -> Self {
        self.named_values.push(name.into());
        self
    }

    pub fn with_named_values<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.named_values.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_function(mut self, info: FunctionInfo) -> Self {
        self.functions.push(info);
        self
    }

    pub fn with_functions(mut self, infos: impl IntoIterator<Item = FunctionInfo>) -> Self {
        self.functions.extend(infos);
        self
    }

    /// Accept any named value or function name and skip arity checks.
    pub fn allow_unknown_keywords(mut self) -> Self {
        self.allow_unknown_keywords = true;
        self
    }

    fn is_named_value(&self, name: &str) -> bool {
        self.named_values.iter().any(|n| eq_ignore_case(n, name))
    }

    fn function(&self, name: &str) -> Option<&FunctionInfo> {
        BUILTIN_FUNCTIONS
            .iter()
            .chain(self.functions.iter())
            .find(|info| eq_ignore_case(&info.name, name))
    }
}

/// Parse `expression`. Returns `None` for an empty or whitespace-only expression.
pub fn parse(expression: &str, options: &ParseOptions) -> Result<Option<ExpressionNode>, ParseError> {
    tracing::trace!(expression, "Parsing expression");
    if expression.chars().count() > MAX_LENGTH {
        return Err(ParseError::limit(
            ParseErrorKind::ExceededMaxLength,
            MAX_LENGTH,
            expression,
        ));
    }

    let mut lexer = Lexer::new(expression);
    let tokens: Vec<Token> = lexer.by_ref().collect();
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut parser = Parser {
        expression,
        tokens,
        position: 0,
        options,
        nesting: 0,
    };
    let parsed = parser.parse_binary(0)?;
    if let Some(token) = parser.tokens.get(parser.position) {
        return Err(parser.error(ParseErrorKind::UnexpectedSymbol, token));
    }
    if lexer.has_unclosed_tokens() {
        return Err(parser.unexpected_end());
    }
    Ok(Some(parsed.node))
}

/// Check syntax only: any named value or function name is accepted.
pub fn validate_syntax(expression: &str) -> Result<Option<ExpressionNode>, ParseError> {
    parse(expression, &ParseOptions::new().allow_unknown_keywords())
}

struct Parsed {
    node: ExpressionNode,
    depth: usize,
}

impl Parsed {
    fn leaf(node: ExpressionNode) -> Self {
        Self { node, depth: 1 }
    }
}

#[derive(Clone, Copy)]
enum BinaryOperator {
    Or,
    And,
    Compare(CompareOperator),
}

impl BinaryOperator {
    fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Compare(CompareOperator::Equal | CompareOperator::NotEqual) => 3,
            BinaryOperator::Compare(_) => 4,
        }
    }
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    position: usize,
    options: &'a ParseOptions,
    nesting: usize,
}

impl Parser<'_> {
    fn error(&self, kind: ParseErrorKind, token: &Token) -> ParseError {
        ParseError::new(kind, token.raw.clone(), token.index, self.expression)
    }

    fn unexpected_end(&self) -> ParseError {
        match self.tokens.last() {
            Some(last) => self.error(ParseErrorKind::UnexpectedEndOfExpression, last),
            None => ParseError::new(
                ParseErrorKind::UnexpectedEndOfExpression,
                "",
                0,
                self.expression,
            ),
        }
    }

    fn depth_exceeded(&self) -> ParseError {
        ParseError::limit(ParseErrorKind::ExceededMaxDepth, MAX_DEPTH, self.expression)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|token| token.kind)
    }

    fn advance(&mut self) -> Result<Token, ParseError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| self.unexpected_end())?;
        if token.kind == TokenKind::Unexpected {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        }
        self.position += 1;
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let token = self.advance()?;
        if token.kind != kind {
            return Err(self.error(ParseErrorKind::UnexpectedSymbol, &token));
        }
        Ok(token)
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.nesting += 1;
        if self.nesting > MAX_DEPTH {
            return Err(self.depth_exceeded());
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn container(&self, node: ExpressionNode, child_depth: usize) -> Result<Parsed, ParseError> {
        let depth = child_depth + 1;
        if depth > MAX_DEPTH {
            return Err(self.depth_exceeded());
        }
        Ok(Parsed { node, depth })
    }

    fn peek_binary_operator(&self) -> Option<BinaryOperator> {
        let token = self.peek()?;
        if token.kind != TokenKind::LogicalOperator {
            return None;
        }
        match token.raw.as_str() {
            "||" => Some(BinaryOperator::Or),
            "&&" => Some(BinaryOperator::And),
            other => CompareOperator::from_symbol(other).map(BinaryOperator::Compare),
        }
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Parsed, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some(operator) = self.peek_binary_operator() {
            let precedence = operator.precedence();
            if precedence < min_precedence {
                break;
            }
            self.advance()?;
            let right = self.parse_binary(precedence + 1)?;
            left = self.combine(operator, left, right)?;
        }
        Ok(left)
    }

    fn combine(
        &self,
        operator: BinaryOperator,
        left: Parsed,
        right: Parsed,
    ) -> Result<Parsed, ParseError> {
        match operator {
            BinaryOperator::Compare(op) => self.container(
                ExpressionNode::Compare(op, Box::new(left.node), Box::new(right.node)),
                left.depth.max(right.depth),
            ),
            BinaryOperator::And | BinaryOperator::Or => {
                let is_and = matches!(operator, BinaryOperator::And);
                let mut items = Vec::new();
                let mut child_depth = 0;
                for operand in [left, right] {
                    match operand.node {
                        ExpressionNode::And(nested) if is_and => {
                            child_depth = child_depth.max(operand.depth - 1);
                            items.extend(nested);
                        }
                        ExpressionNode::Or(nested) if !is_and => {
                            child_depth = child_depth.max(operand.depth - 1);
                            items.extend(nested);
                        }
                        node => {
                            child_depth = child_depth.max(operand.depth);
                            items.push(node);
                        }
                    }
                }
                let node = if is_and {
                    ExpressionNode::And(items)
                } else {
                    ExpressionNode::Or(items)
                };
                self.container(node, child_depth)
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Parsed, ParseError> {
        let is_not = self
            .peek()
            .is_some_and(|t| t.kind == TokenKind::LogicalOperator && t.raw == "!");
        if !is_not {
            let primary = self.parse_primary()?;
            return self.parse_postfix(primary);
        }
        self.advance()?;
        self.enter()?;
        let operand = self.parse_unary()?;
        self.leave();
        self.container(ExpressionNode::Not(Box::new(operand.node)), operand.depth)
    }

    fn parse_primary(&mut self) -> Result<Parsed, ParseError> {
        let token = self.advance()?;
        match token.kind {
            kind if kind.is_literal() => Ok(Parsed::leaf(ExpressionNode::Literal(
                token.value.unwrap_or(Value::Null),
            ))),
            TokenKind::NamedValue => {
                if !self.options.allow_unknown_keywords && !self.options.is_named_value(&token.raw) {
                    return Err(self.error(ParseErrorKind::UnrecognizedNamedValue, &token));
                }
                Ok(Parsed::leaf(ExpressionNode::NamedValue(token.raw)))
            }
            TokenKind::Function => self.parse_call(token),
            TokenKind::StartGroup => {
                self.enter()?;
                let inner = self.parse_binary(0)?;
                self.expect(TokenKind::EndGroup)?;
                self.leave();
                Ok(inner)
            }
            _ => Err(self.error(ParseErrorKind::UnexpectedSymbol, &token)),
        }
    }

    fn parse_call(&mut self, name: Token) -> Result<Parsed, ParseError> {
        let info = self.options.function(&name.raw).cloned();
        if info.is_none() && !self.options.allow_unknown_keywords {
            return Err(self.error(ParseErrorKind::UnrecognizedFunction, &name));
        }

        self.expect(TokenKind::StartParameters)?;
        self.enter()?;
        let mut args = Vec::new();
        let mut child_depth = 0;
        if self.peek_kind() == Some(TokenKind::EndParameters) {
            self.advance()?;
        } else {
            loop {
                let arg = self.parse_binary(0)?;
                child_depth = child_depth.max(arg.depth);
                args.push(arg.node);
                let separator = self.advance()?;
                match separator.kind {
                    TokenKind::Separator => continue,
                    TokenKind::EndParameters => break,
                    _ => return Err(self.error(ParseErrorKind::UnexpectedSymbol, &separator)),
                }
            }
        }
        self.leave();

        if let Some(info) = info {
            if args.len() < info.min_parameters {
                return Err(self.error(ParseErrorKind::TooFewParameters, &name));
            }
            if args.len() > info.max_parameters {
                return Err(self.error(ParseErrorKind::TooManyParameters, &name));
            }
        }
        self.container(ExpressionNode::Function(name.raw, args), child_depth)
    }

    fn parse_postfix(&mut self, mut target: Parsed) -> Result<Parsed, ParseError> {
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dereference) => {
                    self.advance()?;
                    let member = self.advance()?;
                    let index = match member.kind {
                        TokenKind::PropertyName => {
                            ExpressionNode::Literal(Value::String(member.raw))
                        }
                        TokenKind::Wildcard => ExpressionNode::Wildcard,
                        _ => return Err(self.error(ParseErrorKind::UnexpectedSymbol, &member)),
                    };
                    target = self.container(
                        ExpressionNode::Index(Box::new(target.node), Box::new(index)),
                        target.depth,
                    )?;
                }
                Some(TokenKind::StartIndex) => {
                    self.advance()?;
                    self.enter()?;
                    let index = if self.peek_kind() == Some(TokenKind::Wildcard) {
                        self.advance()?;
                        Parsed::leaf(ExpressionNode::Wildcard)
                    } else {
                        self.parse_binary(0)?
                    };
                    self.expect(TokenKind::EndIndex)?;
                    self.leave();
                    target = self.container(
                        ExpressionNode::Index(Box::new(target.node), Box::new(index.node)),
                        target.depth.max(index.depth),
                    )?;
                }
                _ => return Ok(target),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn options() -> ParseOptions {
        ParseOptions::new().with_named_values(["github", "matrix", "env"])
    }

    fn parse_ok(expression: &str) -> ExpressionNode {
        parse(expression, &options()).unwrap().unwrap()
    }

    fn parse_err(expression: &str) -> ParseError {
        parse(expression, &options()).unwrap_err()
    }

    fn named(name: &str) -> Box<ExpressionNode> {
        Box::new(ExpressionNode::NamedValue(name.to_string()))
    }

    fn string(text: &str) -> Box<ExpressionNode> {
        Box::new(ExpressionNode::Literal(Value::from(text)))
    }

    #[test]
    fn empty_expression_parses_to_nothing() {
        assert_eq!(parse("   ", &options()).unwrap(), None);
    }

    #[test]
    fn member_access_becomes_index() {
        assert_eq!(
            parse_ok("github.event['ref']"),
            ExpressionNode::Index(
                Box::new(ExpressionNode::Index(named("github"), string("event"))),
                string("ref")
            )
        );
    }

    #[test]
    fn comparison_binds_tighter_than_logic() {
        let node = parse_ok("matrix.os == 'linux' && !env.skip || github.ref != 'main'");
        let ExpressionNode::Or(items) = node else {
            panic!("expected ||");
        };
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], ExpressionNode::And(inner) if inner.len() == 2));
        assert!(matches!(
            &items[1],
            ExpressionNode::Compare(CompareOperator::NotEqual, _, _)
        ));
    }

    #[test]
    fn logical_chains_are_flattened() {
        let node = parse_ok("github && matrix && env && (github && env)");
        let ExpressionNode::And(items) = node else {
            panic!("expected &&");
        };
        assert_eq!(items.len(), 5);
    }

    #[test]
    fn relational_binds_tighter_than_equality() {
        let node = parse_ok("1 < 2 == true");
        assert!(matches!(
            node,
            ExpressionNode::Compare(CompareOperator::Equal, left, _)
                if matches!(*left, ExpressionNode::Compare(CompareOperator::LessThan, _, _))
        ));
    }

    #[test]
    fn function_names_are_case_insensitive() {
        assert!(matches!(
            parse_ok("FORMAT('{0}', 1)"),
            ExpressionNode::Function(name, args) if name == "FORMAT" && args.len() == 2
        ));
    }

    #[test]
    fn reports_unknown_names() {
        let error = parse_err("secrets.token");
        assert_eq!(error.kind, ParseErrorKind::UnrecognizedNamedValue);
        assert_eq!(
            error.to_string(),
            "Unrecognized named-value: 'secrets'. Located at position 1 within expression: secrets.token"
        );
        assert_eq!(parse_err("nope(1)").kind, ParseErrorKind::UnrecognizedFunction);
    }

    #[test]
    fn checks_function_arity() {
        assert_eq!(parse_err("startsWith('a')").kind, ParseErrorKind::TooFewParameters);
        assert_eq!(parse_err("toJson(1, 2)").kind, ParseErrorKind::TooManyParameters);
    }

    #[test]
    fn reports_unexpected_symbols_with_position() {
        let error = parse_err("github.ref == 'main' ]");
        assert_eq!(error.kind, ParseErrorKind::UnexpectedSymbol);
        assert_eq!(error.raw, "]");
        assert_eq!(error.position, 22);
    }

    #[test]
    fn reports_unexpected_end() {
        assert_eq!(parse_err("(github").kind, ParseErrorKind::UnexpectedEndOfExpression);
        assert_eq!(parse_err("github ==").kind, ParseErrorKind::UnexpectedEndOfExpression);
        assert_eq!(parse_err("format('a',").kind, ParseErrorKind::UnexpectedEndOfExpression);
    }

    #[test]
    fn enforces_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(60), ")".repeat(60));
        assert_eq!(parse_err(&deep).kind, ParseErrorKind::ExceededMaxDepth);

        let chain = vec!["1"; 60].join(" == ");
        assert_eq!(parse_err(&chain).kind, ParseErrorKind::ExceededMaxDepth);

        let shallow = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert!(parse(&shallow, &options()).is_ok());
    }

    #[test]
    fn enforces_length_limit() {
        let long = format!("'{}'", "a".repeat(MAX_LENGTH));
        assert_eq!(parse_err(&long).kind, ParseErrorKind::ExceededMaxLength);
    }

    #[test]
    fn validate_syntax_accepts_unknown_names() {
        assert!(validate_syntax("secrets.token || custom(1, 2, 3)").is_ok());
        assert!(validate_syntax("a ==").is_err());
    }

    #[test]
    fn display_round_trips_through_the_parser() {
        let node = parse_ok("format('it''s {0}', matrix.os[0]) == 'x' && !github.*");
        let reparsed = parse(&node.to_string(), &options()).unwrap().unwrap();
        assert_eq!(reparsed, node);
    }
}
