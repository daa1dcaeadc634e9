/*
 * coercion.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Truthiness, string/number coercion and abstract comparison.
//!
//! Comparisons coerce mismatched operands before comparing:
//! a string compared with a number becomes a number, booleans and null
//! become numbers, and strings compare ordinally ignoring case.
//! NaN never compares equal, and containers only equal themselves.

use std::cmp::Ordering;

use crate::number::{format_number, parse_number};
use crate::value::Value;

impl Value {
    /// `null`, `false`, `0`, `NaN` and `""` are falsy. Everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => !(*n == 0.0 || n.is_nan()),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_falsy(&self) -> bool {
        !self.is_truthy()
    }

    pub fn convert_to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Boolean(true) => 1.0,
            Value::Boolean(false) => 0.0,
            Value::Number(n) => *n,
            Value::String(s) => parse_number(s),
            _ => f64::NAN,
        }
    }

    /// Text form used by `format`, `join` and friends.
    ///
    /// Containers render as their kind name.
    pub fn convert_to_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            other => other.kind().display_name().to_string(),
        }
    }

    pub fn abstract_equal(&self, other: &Value) -> bool {
        abstract_compare(self, other) == Some(Ordering::Equal)
    }

    pub fn abstract_not_equal(&self, other: &Value) -> bool {
        !self.abstract_equal(other)
    }

    pub fn abstract_less_than(&self, other: &Value) -> bool {
        abstract_compare(self, other) == Some(Ordering::Less)
    }

    pub fn abstract_less_than_or_equal(&self, other: &Value) -> bool {
        matches!(
            abstract_compare(self, other),
            Some(Ordering::Less | Ordering::Equal)
        )
    }

    pub fn abstract_greater_than(&self, other: &Value) -> bool {
        abstract_compare(self, other) == Some(Ordering::Greater)
    }

    pub fn abstract_greater_than_or_equal(&self, other: &Value) -> bool {
        matches!(
            abstract_compare(self, other),
            Some(Ordering::Greater | Ordering::Equal)
        )
    }
}

/// Operand after coercion.
#[derive(Debug, Clone, Copy)]
enum Coerced<'a> {
    Null,
    Boolean(bool),
    Number(f64),
    String(&'a str),
    Container(&'a Value),
}

impl<'a> Coerced<'a> {
    fn of(value: &'a Value) -> Self {
        match value {
            Value::Null => Coerced::Null,
            Value::Boolean(b) => Coerced::Boolean(*b),
            Value::Number(n) => Coerced::Number(*n),
            Value::String(s) => Coerced::String(s),
            other => Coerced::Container(other),
        }
    }

    fn to_number(self) -> f64 {
        match self {
            Coerced::Null => 0.0,
            Coerced::Boolean(b) => f64::from(u8::from(b)),
            Coerced::Number(n) => n,
            Coerced::String(s) => parse_number(s),
            Coerced::Container(_) => f64::NAN,
        }
    }

    fn same_kind(&self, other: &Coerced<'_>) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// `None` when the operands are unordered (NaN, mismatched kinds, distinct containers).
fn abstract_compare(left: &Value, right: &Value) -> Option<Ordering> {
    let mut left = Coerced::of(left);
    let mut right = Coerced::of(right);

    while !left.same_kind(&right) {
        match (left, right) {
            (Coerced::Number(_), Coerced::String(s)) => right = Coerced::Number(parse_number(s)),
            (Coerced::String(s), Coerced::Number(_)) => left = Coerced::Number(parse_number(s)),
            (Coerced::Boolean(_) | Coerced::Null, _) => left = Coerced::Number(left.to_number()),
            (_, Coerced::Boolean(_) | Coerced::Null) => right = Coerced::Number(right.to_number()),
            _ => return None,
        }
    }

    match (left, right) {
        (Coerced::Null, Coerced::Null) => Some(Ordering::Equal),
        (Coerced::Boolean(a), Coerced::Boolean(b)) => Some(a.cmp(&b)),
        (Coerced::Number(a), Coerced::Number(b)) => a.partial_cmp(&b),
        (Coerced::String(a), Coerced::String(b)) => Some(cmp_ignore_case(a, b)),
        (Coerced::Container(a), Coerced::Container(b)) if std::ptr::eq(a, b) => {
            Some(Ordering::Equal)
        }
        _ => None,
    }
}

fn fold(text: &str) -> impl Iterator<Item = char> + '_ {
    text.chars().flat_map(char::to_uppercase)
}

/// Ordinal comparison ignoring case.
pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    fold(a).cmp(fold(b))
}

pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    fold(a).eq(fold(b))
}

pub fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    let mut text = fold(text);
    fold(prefix).all(|c| text.next() == Some(c))
}

pub fn ends_with_ignore_case(text: &str, suffix: &str) -> bool {
    let text: Vec<char> = fold(text).collect();
    let suffix: Vec<char> = fold(suffix).collect();
    text.ends_with(&suffix)
}

pub fn contains_ignore_case(text: &str, needle: &str) -> bool {
    fold(text).collect::<String>().contains(&fold(needle).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Dictionary;

    #[test]
    fn falsy_values() {
        for value in [
            Value::Null,
            Value::Boolean(false),
            Value::Number(0.0),
            Value::Number(f64::NAN),
            Value::from(""),
        ] {
            assert!(value.is_falsy(), "{value:?} should be falsy");
        }
        assert!(Value::from("false").is_truthy());
        assert!(Value::Array(Vec::new()).is_truthy());
        assert!(Value::Dictionary(Dictionary::new()).is_truthy());
    }

    #[test]
    fn string_conversion() {
        assert_eq!(Value::Null.convert_to_string(), "");
        assert_eq!(Value::Boolean(true).convert_to_string(), "true");
        assert_eq!(Value::Number(3.0).convert_to_string(), "3");
        assert_eq!(Value::Array(Vec::new()).convert_to_string(), "Array");
        assert_eq!(Value::Dictionary(Dictionary::new()).convert_to_string(), "Object");
    }

    #[test]
    fn number_and_string_compare_numerically() {
        assert!(Value::Number(1.0).abstract_equal(&Value::from("1")));
        assert!(Value::from(" 0x10 ").abstract_equal(&Value::Number(16.0)));
        assert!(Value::from("2").abstract_less_than(&Value::Number(10.0)));
    }

    #[test]
    fn booleans_and_null_compare_as_numbers() {
        assert!(Value::Boolean(true).abstract_equal(&Value::Number(1.0)));
        assert!(Value::Null.abstract_equal(&Value::Boolean(false)));
        assert!(Value::Null.abstract_equal(&Value::from("")));
        assert!(Value::Boolean(true).abstract_equal(&Value::from("1")));
    }

    #[test]
    fn strings_compare_ignoring_case() {
        assert!(Value::from("Ubuntu").abstract_equal(&Value::from("UBUNTU")));
        assert!(Value::from("abc").abstract_less_than(&Value::from("ABD")));
    }

    #[test]
    fn nan_is_never_equal() {
        let nan = Value::Number(f64::NAN);
        assert!(!nan.abstract_equal(&nan));
        assert!(nan.abstract_not_equal(&nan));
        assert!(!nan.abstract_less_than(&Value::Number(1.0)));
        assert!(!Value::from("abc").abstract_equal(&Value::Number(0.0)));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = Value::Array(Vec::new());
        let b = Value::Array(Vec::new());
        assert!(a.abstract_equal(&a));
        assert!(!a.abstract_equal(&b));
        assert!(!a.abstract_equal(&Value::from("Array")));
    }

    #[test]
    fn ignore_case_helpers() {
        assert!(starts_with_ignore_case("Hello", "he"));
        assert!(!starts_with_ignore_case("He", "hello"));
        assert!(ends_with_ignore_case("refs/heads/MAIN", "/main"));
        assert!(contains_ignore_case("Windows-Latest", "LATEST"));
        assert!(eq_ignore_case("straße", "STRASSE"));
    }
}
