/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Runtime values flowing through expressions and templates.
//!
//! A [`Value`] is a tagged union of strings, booleans, numbers, arrays and
//! two dictionary flavors. Dictionaries keep insertion order and index their
//! keys either case-insensitively ([`Dictionary`]) or ordinally
//! ([`CaseSensitiveDictionary`]).

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Discriminant of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Dictionary,
    CaseSensitiveDictionary,
}

impl ValueKind {
    /// Name used when a non-primitive is coerced to a string.
    pub fn display_name(self) -> &'static str {
        match self {
            ValueKind::Null => "Null",
            ValueKind::Boolean => "Boolean",
            ValueKind::Number => "Number",
            ValueKind::String => "String",
            ValueKind::Array => "Array",
            ValueKind::Dictionary | ValueKind::CaseSensitiveDictionary => "Object",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Key comparison used by an [`OrderedMap`].
pub trait KeyComparison: Clone + Default + fmt::Debug {
    fn normalize(key: &str) -> Cow<'_, str>;
}

/// Keys compare with ordinal ignore-case semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IgnoreCase;

/// Keys compare byte-for-byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ordinal;

impl KeyComparison for IgnoreCase {
    fn normalize(key: &str) -> Cow<'_, str> {
        if key.chars().any(char::is_uppercase) {
            Cow::Owned(key.to_lowercase())
        } else {
            Cow::Borrowed(key)
        }
    }
}

impl KeyComparison for Ordinal {
    fn normalize(key: &str) -> Cow<'_, str> {
        Cow::Borrowed(key)
    }
}

/// Insertion-ordered map from string keys to values.
///
/// Setting an existing key replaces its value in place, keeping the
/// original key spelling and position.
#[derive(Clone)]
pub struct OrderedMap<C> {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
    comparison: PhantomData<C>,
}

pub type Dictionary = OrderedMap<IgnoreCase>;
pub type CaseSensitiveDictionary = OrderedMap<Ordinal>;

impl<C: KeyComparison> OrderedMap<C> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            comparison: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace. Returns the previous value for the key, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        let normalized = C::normalize(&key).into_owned();
        if let Some(&position) = self.index.get(&normalized) {
            return Some(std::mem::replace(&mut self.entries[position].1, value));
        }
        self.index.insert(normalized, self.entries.len());
        self.entries.push((key, value));
        None
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.position(key).map(|position| &self.entries[position].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.position(key)
            .map(move |position| &mut self.entries[position].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Entry at `position` in insertion order.
    pub fn get_index(&self, position: usize) -> Option<(&str, &Value)> {
        self.entries
            .get(position)
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.entries.iter().map(|(_, value)| value)
    }

    pub(crate) fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut Value> + '_ {
        self.entries.iter_mut().map(|(_, value)| value)
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.index.get(C::normalize(key).as_ref()).copied()
    }
}

impl<C: KeyComparison> Default for OrderedMap<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for OrderedMap<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(key, value)| (key, value)))
            .finish()
    }
}

impl<C> PartialEq for OrderedMap<C> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<C: KeyComparison, K: Into<String>> FromIterator<(K, Value)> for OrderedMap<C> {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<C> IntoIterator for OrderedMap<C> {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A runtime value.
///
/// Equality via `==` is structural and intended for tests and caching. The
/// expression language uses [`Value::abstract_equal`] instead, where
/// containers only ever equal themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Boolean(bool),
    Number(f64),
    Array(Vec<Value>),
    Dictionary(Dictionary),
    CaseSensitiveDictionary(CaseSensitiveDictionary),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::String(_) => ValueKind::String,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::Array(_) => ValueKind::Array,
            Value::Dictionary(_) => ValueKind::Dictionary,
            Value::CaseSensitiveDictionary(_) => ValueKind::CaseSensitiveDictionary,
        }
    }

    /// Null, booleans, numbers and strings.
    pub fn is_primitive(&self) -> bool {
        !self.is_collection()
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Value::Array(_) | Value::Dictionary(_) | Value::CaseSensitiveDictionary(_)
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key in either dictionary flavor.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dictionary(map) => map.get(key),
            Value::CaseSensitiveDictionary(map) => map.get(key),
            _ => None,
        }
    }

    /// Number of direct children of a collection, zero for primitives.
    pub fn len(&self) -> usize {
        match self {
            Value::Array(items) => items.len(),
            Value::Dictionary(map) => map.len(),
            Value::CaseSensitiveDictionary(map) => map.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pre-order depth-first walk over this value and all descendants.
    ///
    /// Uses an explicit stack so arbitrarily deep values are safe to walk.
    pub fn traverse(&self) -> Traverse<'_> {
        Traverse {
            pending: Some(self),
            stack: Vec::new(),
        }
    }

    /// Children of an array, or the values of a dictionary.
    pub(crate) fn children(&self) -> Option<Children<'_>> {
        match self {
            Value::Array(items) => Some(Children::Items(items.iter())),
            Value::Dictionary(map) => Some(Children::Entries(map.entries().iter())),
            Value::CaseSensitiveDictionary(map) => {
                Some(Children::Entries(map.entries().iter()))
            }
            _ => None,
        }
    }
}

pub(crate) enum Children<'a> {
    Items(std::slice::Iter<'a, Value>),
    Entries(std::slice::Iter<'a, (String, Value)>),
}

impl<'a> Iterator for Children<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Children::Items(items) => items.next(),
            Children::Entries(entries) => entries.next().map(|(_, value)| value),
        }
    }
}

/// Iterator returned by [`Value::traverse`].
pub struct Traverse<'a> {
    pending: Option<&'a Value>,
    stack: Vec<Children<'a>>,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.pending.take() {
            Some(value) => value,
            None => loop {
                let top = self.stack.last_mut()?;
                match top.next() {
                    Some(value) => break value,
                    None => {
                        self.stack.pop();
                    }
                }
            },
        };
        if let Some(children) = next.children() {
            self.stack.push(children);
        }
        Some(next)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<Dictionary> for Value {
    fn from(value: Dictionary) -> Self {
        Value::Dictionary(value)
    }
}

impl From<CaseSensitiveDictionary> for Value {
    fn from(value: CaseSensitiveDictionary) -> Self {
        Value::CaseSensitiveDictionary(value)
    }
}
