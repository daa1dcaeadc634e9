/*
 * convert.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Canonicalization of host values before they enter evaluation.

use std::collections::HashMap;

use crate::value::{Value, ValueKind};

/// Rewrites a value of one kind into its canonical form.
pub type Canonicalizer = fn(Value) -> Value;

/// Per-kind canonicalization table.
///
/// The default table normalizes negative zero. Hosts add their own entries
/// with [`ValueConverters::with`]; kinds without an entry pass through.
#[derive(Debug, Clone)]
pub struct ValueConverters {
    converters: HashMap<ValueKind, Canonicalizer>,
}

impl Default for ValueConverters {
    fn default() -> Self {
        Self::empty().with(ValueKind::Number, normalize_zero)
    }
}

impl ValueConverters {
    /// A table that leaves every value untouched.
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    pub fn with(mut self, kind: ValueKind, converter: Canonicalizer) -> Self {
        self.converters.insert(kind, converter);
        self
    }

    /// Canonicalize `value` and, for collections, every descendant.
    pub fn canonicalize(&self, value: Value) -> Value {
        if self.converters.is_empty() {
            return value;
        }
        let value = match value {
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|item| self.canonicalize(item)).collect())
            }
            Value::Dictionary(mut map) => {
                self.canonicalize_children(map.entries_mut());
                Value::Dictionary(map)
            }
            Value::CaseSensitiveDictionary(mut map) => {
                self.canonicalize_children(map.entries_mut());
                Value::CaseSensitiveDictionary(map)
            }
            primitive => primitive,
        };
        match self.converters.get(&value.kind()) {
            Some(converter) => converter(value),
            None => value,
        }
    }

    fn canonicalize_children<'a>(&self, children: impl Iterator<Item = &'a mut Value>) {
        for child in children {
            let owned = std::mem::replace(child, Value::Null);
            *child = self.canonicalize(owned);
        }
    }
}

fn normalize_zero(value: Value) -> Value {
    match value {
        Value::Number(n) if n == 0.0 => Value::Number(0.0),
        other => other,
    }
}
