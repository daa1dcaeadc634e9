/*
 * lexer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tokenizer for the expression language.
//!
//! The lexer tracks the previous token so that each token is only accepted
//! where it can legally appear. An out-of-place token is reported as
//! [`TokenKind::Unexpected`] and the parser turns it into a syntax error.

use crate::number::parse_number;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    StartGroup,
    StartIndex,
    StartParameters,
    EndGroup,
    EndIndex,
    EndParameters,
    Separator,
    Dereference,
    Wildcard,
    LogicalOperator,
    Null,
    Boolean,
    Number,
    String,
    PropertyName,
    Function,
    NamedValue,
    Unexpected,
}

impl TokenKind {
    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::Null | TokenKind::Boolean | TokenKind::Number | TokenKind::String
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text of the token.
    pub raw: String,
    /// Character offset into the expression.
    pub index: usize,
    /// Parsed literal for null, boolean, number and string tokens.
    pub value: Option<Value>,
}

/// Tokens after which an operand may start. `None` stands for "first token".
const OPERAND_START: &[Option<TokenKind>] = &[
    None,
    Some(TokenKind::Separator),
    Some(TokenKind::StartGroup),
    Some(TokenKind::StartParameters),
    Some(TokenKind::StartIndex),
    Some(TokenKind::LogicalOperator),
];

/// Tokens that can end an operand, excluding literals.
const OPERAND_END_NON_LITERAL: &[Option<TokenKind>] = &[
    Some(TokenKind::EndGroup),
    Some(TokenKind::EndParameters),
    Some(TokenKind::EndIndex),
    Some(TokenKind::Wildcard),
    Some(TokenKind::PropertyName),
    Some(TokenKind::NamedValue),
];

/// Tokens that can end an operand.
const OPERAND_END: &[Option<TokenKind>] = &[
    Some(TokenKind::EndGroup),
    Some(TokenKind::EndParameters),
    Some(TokenKind::EndIndex),
    Some(TokenKind::Wildcard),
    Some(TokenKind::Null),
    Some(TokenKind::Boolean),
    Some(TokenKind::Number),
    Some(TokenKind::String),
    Some(TokenKind::PropertyName),
    Some(TokenKind::NamedValue),
];

const TWO_CHAR_OPERATORS: &[&str] = &["!=", ">=", "<=", "==", "&&", "||"];

pub struct Lexer {
    chars: Vec<char>,
    index: usize,
    last: Option<TokenKind>,
    unclosed: Vec<TokenKind>,
}

impl Lexer {
    pub fn new(expression: &str) -> Self {
        Self {
            chars: expression.chars().collect(),
            index: 0,
            last: None,
            unclosed: Vec::new(),
        }
    }

    /// True while a group, index or parameter list is still open.
    pub fn has_unclosed_tokens(&self) -> bool {
        !self.unclosed.is_empty()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    fn read_single(&mut self, kind: TokenKind) -> Token {
        let start = self.index;
        self.index += 1;
        let raw = self.slice(start, self.index);
        self.create_token(kind, raw, start, None)
    }

    fn read_number(&mut self) -> Token {
        let start = self.index;
        self.index += 1;
        while let Some(c) = self.peek(0) {
            if is_token_boundary(c) && c != '.' {
                break;
            }
            self.index += 1;
        }
        let raw = self.slice(start, self.index);
        let number = parse_number(&raw);
        if number.is_nan() {
            return self.create_token(TokenKind::Unexpected, raw, start, None);
        }
        self.create_token(TokenKind::Number, raw, start, Some(Value::Number(number)))
    }

    fn read_keyword(&mut self) -> Token {
        let start = self.index;
        self.index += 1;
        while self.peek(0).is_some_and(|c| !is_token_boundary(c)) {
            self.index += 1;
        }
        let raw = self.slice(start, self.index);
        if !is_legal_keyword(&raw) {
            return self.create_token(TokenKind::Unexpected, raw, start, None);
        }
        if self.last == Some(TokenKind::Dereference) {
            return self.create_token(TokenKind::PropertyName, raw, start, None);
        }
        let literal = match raw.as_str() {
            "null" => Some((TokenKind::Null, Value::Null)),
            "true" => Some((TokenKind::Boolean, Value::Boolean(true))),
            "false" => Some((TokenKind::Boolean, Value::Boolean(false))),
            "NaN" => Some((TokenKind::Number, Value::Number(f64::NAN))),
            "Infinity" => Some((TokenKind::Number, Value::Number(f64::INFINITY))),
            _ => None,
        };
        if let Some((kind, value)) = literal {
            return self.create_token(kind, raw, start, Some(value));
        }

        let mut lookahead = self.index;
        while self.chars.get(lookahead).is_some_and(|c| c.is_whitespace()) {
            lookahead += 1;
        }
        let kind = if self.chars.get(lookahead) == Some(&'(') {
            TokenKind::Function
        } else {
            TokenKind::NamedValue
        };
        self.create_token(kind, raw, start, None)
    }

    fn read_string(&mut self) -> Token {
        let start = self.index;
        self.index += 1;
        let mut text = String::new();
        let mut closed = false;
        while let Some(c) = self.peek(0) {
            self.index += 1;
            if c == '\'' {
                if self.peek(0) != Some('\'') {
                    closed = true;
                    break;
                }
                self.index += 1;
            }
            text.push(c);
        }
        let raw = self.slice(start, self.index);
        if closed {
            self.create_token(TokenKind::String, raw, start, Some(Value::String(text)))
        } else {
            self.create_token(TokenKind::Unexpected, raw, start, None)
        }
    }

    fn read_operator(&mut self) -> Token {
        let start = self.index;
        if self.index + 1 < self.chars.len() {
            let raw = self.slice(start, start + 2);
            if TWO_CHAR_OPERATORS.contains(&raw.as_str()) {
                self.index += 2;
                return self.create_token(TokenKind::LogicalOperator, raw, start, None);
            }
        }
        self.index += 1;
        let raw = self.slice(start, self.index);
        if matches!(raw.as_str(), "!" | ">" | "<") {
            return self.create_token(TokenKind::LogicalOperator, raw, start, None);
        }
        while self.peek(0).is_some_and(|c| !is_token_boundary(c)) {
            self.index += 1;
        }
        let raw = self.slice(start, self.index);
        self.create_token(TokenKind::Unexpected, raw, start, None)
    }

    fn follows(&self, allowed: &[Option<TokenKind>]) -> bool {
        allowed.contains(&self.last)
    }

    fn create_token(
        &mut self,
        kind: TokenKind,
        raw: String,
        index: usize,
        value: Option<Value>,
    ) -> Token {
        let legal = match kind {
            TokenKind::StartGroup => self.follows(OPERAND_START),
            TokenKind::StartIndex | TokenKind::Dereference => {
                self.follows(OPERAND_END_NON_LITERAL)
            }
            TokenKind::StartParameters => self.last == Some(TokenKind::Function),
            TokenKind::EndGroup | TokenKind::EndIndex | TokenKind::Separator => {
                self.follows(OPERAND_END)
            }
            TokenKind::EndParameters => {
                self.last == Some(TokenKind::StartParameters) || self.follows(OPERAND_END)
            }
            TokenKind::Wildcard => matches!(
                self.last,
                Some(TokenKind::StartIndex | TokenKind::Dereference)
            ),
            TokenKind::LogicalOperator if raw == "!" => self.follows(OPERAND_START),
            TokenKind::LogicalOperator => self.follows(OPERAND_END),
            TokenKind::PropertyName => self.last == Some(TokenKind::Dereference),
            TokenKind::Null
            | TokenKind::Boolean
            | TokenKind::Number
            | TokenKind::String
            | TokenKind::Function
            | TokenKind::NamedValue => self.follows(OPERAND_START),
            TokenKind::Unexpected => true,
        };

        let unexpected = |raw: String| Token {
            kind: TokenKind::Unexpected,
            raw,
            index,
            value: None,
        };
        if !legal {
            return unexpected(raw);
        }

        let top = self.unclosed.last().copied();
        match kind {
            TokenKind::StartGroup | TokenKind::StartIndex | TokenKind::StartParameters => {
                self.unclosed.push(kind);
            }
            TokenKind::EndGroup | TokenKind::EndIndex | TokenKind::EndParameters => {
                let opener = match kind {
                    TokenKind::EndGroup => TokenKind::StartGroup,
                    TokenKind::EndIndex => TokenKind::StartIndex,
                    _ => TokenKind::StartParameters,
                };
                if top != Some(opener) {
                    return unexpected(raw);
                }
                self.unclosed.pop();
            }
            TokenKind::Separator if top != Some(TokenKind::StartParameters) => {
                return unexpected(raw);
            }
            _ => {}
        }

        Token {
            kind,
            raw,
            index,
            value,
        }
    }
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        while self.peek(0).is_some_and(char::is_whitespace) {
            self.index += 1;
        }
        let c = self.peek(0)?;
        let token = match c {
            '(' if self.last == Some(TokenKind::Function) => {
                self.read_single(TokenKind::StartParameters)
            }
            '(' => self.read_single(TokenKind::StartGroup),
            '[' => self.read_single(TokenKind::StartIndex),
            ')' if self.unclosed.last() == Some(&TokenKind::StartParameters) => {
                self.read_single(TokenKind::EndParameters)
            }
            ')' => self.read_single(TokenKind::EndGroup),
            ']' => self.read_single(TokenKind::EndIndex),
            ',' => self.read_single(TokenKind::Separator),
            '*' => self.read_single(TokenKind::Wildcard),
            '\'' => self.read_string(),
            '!' | '>' | '<' | '=' | '&' | '|' => self.read_operator(),
            '.' if self.follows(OPERAND_START) => self.read_number(),
            '.' => self.read_single(TokenKind::Dereference),
            '-' | '+' | '0'..='9' => self.read_number(),
            _ => self.read_keyword(),
        };
        self.last = Some(token.kind);
        Some(token)
    }
}

fn is_token_boundary(c: char) -> bool {
    matches!(
        c,
        '(' | '[' | ')' | ']' | ',' | '.' | '!' | '>' | '<' | '=' | '&' | '|'
    ) || c.is_whitespace()
}

/// `[A-Za-z_][A-Za-z0-9_-]*`, with letters taken from the full Unicode range.
pub fn is_legal_keyword(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Escape text for use inside a single-quoted string literal.
pub fn escape_string(text: &str) -> String {
    text.replace('\'', "''")
}
