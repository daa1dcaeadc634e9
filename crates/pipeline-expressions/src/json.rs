/*
 * json.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Plain JSON projection of [`Value`] and the indented `toJson` rendering.

use crate::error::ExpressionResult;
use crate::memory::MemoryCounter;
use crate::number::format_number;
use crate::value::{Dictionary, Value};

/// Largest integer that round-trips exactly through an f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

impl Value {
    /// Project to untagged JSON. Dictionaries of either flavor become objects.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Dictionary(map) => {
                Json::Object(map.iter().map(|(k, v)| (k.to_string(), v.to_json())).collect())
            }
            Value::CaseSensitiveDictionary(map) => {
                Json::Object(map.iter().map(|(k, v)| (k.to_string(), v.to_json())).collect())
            }
        }
    }

    /// Build a value from untagged JSON. Objects become case-insensitive dictionaries.
    pub fn from_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Boolean(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            Json::Object(object) => Value::Dictionary(
                object
                    .iter()
                    .map(|(k, v)| (k.as_str(), Value::from_json(v)))
                    .collect::<Dictionary>(),
            ),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

enum Frame<'v> {
    Items {
        items: std::slice::Iter<'v, Value>,
        first: bool,
    },
    Entries {
        entries: std::slice::Iter<'v, (String, Value)>,
        first: bool,
    },
}

struct JsonWriter<'m> {
    out: String,
    memory: &'m MemoryCounter,
}

impl JsonWriter<'_> {
    fn write(&mut self, text: &str) -> ExpressionResult<()> {
        self.memory
            .ensure_bytes(MemoryCounter::string_bytes(self.out.len() + text.len()))?;
        self.out.push_str(text);
        Ok(())
    }

    fn write_separator(&mut self, first: bool, level: usize) -> ExpressionResult<()> {
        let comma = if first { "" } else { "," };
        self.write(&format!("{comma}\n{}", "  ".repeat(level)))
    }

    fn write_string(&mut self, value: &str) -> ExpressionResult<()> {
        // Serializing a str cannot fail.
        let quoted = serde_json::to_string(value).unwrap_or_default();
        self.write(&quoted)
    }
}

/// Render `value` as two-space indented JSON.
///
/// Non-finite numbers are written as the strings `"NaN"`, `"Infinity"` and
/// `"-Infinity"` so the output stays valid JSON.
///
/// Each chunk is checked against `memory` before it is appended, so an
/// oversized document fails without being fully built. Deep values are
/// walked with an explicit stack.
pub fn to_json_string(value: &Value, memory: &MemoryCounter) -> ExpressionResult<String> {
    let mut writer = JsonWriter {
        out: String::new(),
        memory,
    };
    let mut stack: Vec<Frame<'_>> = Vec::new();
    let mut pending = Some(value);

    loop {
        if let Some(node) = pending.take() {
            match node {
                Value::Null => writer.write("null")?,
                Value::Boolean(b) => writer.write(if *b { "true" } else { "false" })?,
                Value::Number(n) if n.is_finite() => writer.write(&format_number(*n))?,
                Value::Number(n) => writer.write_string(&format_number(*n))?,
                Value::String(s) => writer.write_string(s)?,
                Value::Array(items) if items.is_empty() => writer.write("[]")?,
                Value::Array(items) => {
                    writer.write("[")?;
                    stack.push(Frame::Items {
                        items: items.iter(),
                        first: true,
                    });
                }
                other => {
                    let entries = match other {
                        Value::Dictionary(map) => map.entries(),
                        Value::CaseSensitiveDictionary(map) => map.entries(),
                        _ => &[],
                    };
                    if entries.is_empty() {
                        writer.write("{}")?;
                    } else {
                        writer.write("{")?;
                        stack.push(Frame::Entries {
                            entries: entries.iter(),
                            first: true,
                        });
                    }
                }
            }
        }

        let level = stack.len();
        let Some(frame) = stack.last_mut() else {
            break;
        };
        match frame {
            Frame::Items { items, first } => match items.next() {
                Some(item) => {
                    let was_first = std::mem::replace(first, false);
                    writer.write_separator(was_first, level)?;
                    pending = Some(item);
                }
                None => {
                    stack.pop();
                    writer.write(&format!("\n{}]", "  ".repeat(level - 1)))?;
                }
            },
            Frame::Entries { entries, first } => match entries.next() {
                Some((key, item)) => {
                    let was_first = std::mem::replace(first, false);
                    writer.write_separator(was_first, level)?;
                    writer.write_string(key)?;
                    writer.write(": ")?;
                    pending = Some(item);
                }
                None => {
                    stack.pop();
                    writer.write(&format!("\n{}}}", "  ".repeat(level - 1)))?;
                }
            },
        }
    }

    Ok(writer.out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projection_uses_integers_when_exact() {
        let value = Value::Array(vec![Value::Number(1.0), Value::Number(1.5), Value::Null]);
        assert_eq!(value.to_json(), json!([1, 1.5, null]));
    }

    #[test]
    fn from_json_keeps_key_order() {
        let value = Value::from_json(&json!({"b": 1, "a": [true, "x"]}));
        let map = value.as_dictionary().unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(value.get("A").map(Value::len), Some(2));
    }

    #[test]
    fn renders_indented_json() {
        let value = Value::from_json(&json!({"a": [1, "x"], "b": {}, "c": []}));
        let memory = MemoryCounter::new(usize::MAX);
        assert_eq!(
            to_json_string(&value, &memory).unwrap(),
            "{\n  \"a\": [\n    1,\n    \"x\"\n  ],\n  \"b\": {},\n  \"c\": []\n}"
        );
    }

    #[test]
    fn renders_scalars() {
        let memory = MemoryCounter::new(usize::MAX);
        assert_eq!(to_json_string(&Value::from("a\"b"), &memory).unwrap(), "\"a\\\"b\"");
        assert_eq!(to_json_string(&Value::Null, &memory).unwrap(), "null");
        assert_eq!(to_json_string(&Value::Number(2.0), &memory).unwrap(), "2");
    }

    #[test]
    fn non_finite_numbers_render_as_strings() {
        let value = Value::Array(vec![Value::Number(f64::NAN), Value::Number(f64::NEG_INFINITY)]);
        let memory = MemoryCounter::new(usize::MAX);
        let rendered = to_json_string(&value, &memory).unwrap();
        assert_eq!(rendered, "[\n  \"NaN\",\n  \"-Infinity\"\n]");
        assert!(serde_json::from_str::<serde_json::Value>(&rendered).is_ok());
    }

    #[test]
    fn rendering_respects_memory_budget() {
        let value = Value::Array(vec![Value::from("x".repeat(100))]);
        let memory = MemoryCounter::new(64);
        assert!(to_json_string(&value, &memory).is_err());
    }
}
