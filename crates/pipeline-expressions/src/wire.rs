/*
 * wire.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tagged JSON wire format for [`Value`].
//!
//! Every value serializes as an object carrying a type tag `t`:
//!
//! | t | kind                      | payload                        |
//! |---|---------------------------|--------------------------------|
//! | 0 | string                    | `s`                            |
//! | 1 | array                     | `a` (omitted when empty)       |
//! | 2 | dictionary                | `d` = `[{"k": .., "v": ..}]`   |
//! | 3 | boolean                   | `b`                            |
//! | 4 | number                    | `n`                            |
//! | 5 | case-sensitive dictionary | `d`                            |
//!
//! Null is written as JSON `null`. Non-finite numbers are written as the
//! strings `"NaN"`, `"Infinity"` and `"-Infinity"`. Plain JSON strings,
//! booleans and numbers are accepted on read.

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::value::{KeyComparison, OrderedMap, Value};

const TYPE_STRING: u64 = 0;
const TYPE_ARRAY: u64 = 1;
const TYPE_DICTIONARY: u64 = 2;
const TYPE_BOOLEAN: u64 = 3;
const TYPE_NUMBER: u64 = 4;
const TYPE_CASE_SENSITIVE_DICTIONARY: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("Expected a tagged object but found {0}")]
    UnexpectedJson(&'static str),

    #[error("Missing or invalid type tag 't'")]
    MissingType,

    #[error("Unknown type tag {0}")]
    UnknownType(u64),

    #[error("Field '{field}' is missing or invalid for type tag {tag}")]
    InvalidField { tag: u64, field: &'static str },
}

impl Value {
    /// Serialize to the tagged wire form.
    pub fn to_wire(&self) -> serde_json::Value {
        // Serializing into a serde_json::Value cannot fail for these shapes.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Read the tagged wire form. Plain JSON primitives are accepted.
    pub fn from_wire(json: &serde_json::Value) -> Result<Value, WireError> {
        use serde_json::Value as Json;

        let object = match json {
            Json::Null => return Ok(Value::Null),
            Json::Bool(b) => return Ok(Value::Boolean(*b)),
            Json::Number(n) => return Ok(Value::Number(n.as_f64().unwrap_or(f64::NAN))),
            Json::String(s) => return Ok(Value::String(s.clone())),
            Json::Array(_) => return Err(WireError::UnexpectedJson("an array")),
            Json::Object(object) => object,
        };

        let tag = object
            .get("t")
            .and_then(Json::as_u64)
            .ok_or(WireError::MissingType)?;
        let invalid = |field| WireError::InvalidField { tag, field };

        match tag {
            TYPE_STRING => object
                .get("s")
                .and_then(Json::as_str)
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(|| invalid("s")),
            TYPE_BOOLEAN => object
                .get("b")
                .and_then(Json::as_bool)
                .map(Value::Boolean)
                .ok_or_else(|| invalid("b")),
            TYPE_NUMBER => match object.get("n") {
                Some(Json::Number(n)) => Ok(Value::Number(n.as_f64().unwrap_or(f64::NAN))),
                Some(Json::String(s)) => match s.as_str() {
                    "NaN" => Ok(Value::Number(f64::NAN)),
                    "Infinity" => Ok(Value::Number(f64::INFINITY)),
                    "-Infinity" => Ok(Value::Number(f64::NEG_INFINITY)),
                    _ => Err(invalid("n")),
                },
                _ => Err(invalid("n")),
            },
            TYPE_ARRAY => match object.get("a") {
                None | Some(Json::Null) => Ok(Value::Array(Vec::new())),
                Some(Json::Array(items)) => items
                    .iter()
                    .map(Value::from_wire)
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                Some(_) => Err(invalid("a")),
            },
            TYPE_DICTIONARY => read_entries(object.get("d"), tag).map(Value::Dictionary),
            TYPE_CASE_SENSITIVE_DICTIONARY => {
                read_entries(object.get("d"), tag).map(Value::CaseSensitiveDictionary)
            }
            other => Err(WireError::UnknownType(other)),
        }
    }
}

fn read_entries<C: KeyComparison>(
    entries: Option<&serde_json::Value>,
    tag: u64,
) -> Result<OrderedMap<C>, WireError> {
    let invalid = |field| WireError::InvalidField { tag, field };
    let entries = match entries {
        None | Some(serde_json::Value::Null) => return Ok(OrderedMap::new()),
        Some(serde_json::Value::Array(entries)) => entries,
        Some(_) => return Err(invalid("d")),
    };
    let mut map = OrderedMap::with_capacity(entries.len());
    for entry in entries {
        let key = entry
            .get("k")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| invalid("k"))?;
        let value = match entry.get("v") {
            Some(value) => Value::from_wire(value)?,
            None => Value::Null,
        };
        map.insert(key, value);
    }
    Ok(map)
}

#[derive(Serialize)]
struct WireEntry<'a> {
    k: &'a str,
    v: &'a Value,
}

fn serialize_entries<S, C>(
    serializer: S,
    tag: u64,
    map: &OrderedMap<C>,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    C: KeyComparison,
{
    let mut state = serializer.serialize_map(Some(if map.is_empty() { 1 } else { 2 }))?;
    state.serialize_entry("t", &tag)?;
    if !map.is_empty() {
        let entries: Vec<WireEntry<'_>> = map.iter().map(|(k, v)| WireEntry { k, v }).collect();
        state.serialize_entry("d", &entries)?;
    }
    state.end()
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::String(s) => {
                let mut state = serializer.serialize_map(Some(2))?;
                state.serialize_entry("t", &TYPE_STRING)?;
                state.serialize_entry("s", s)?;
                state.end()
            }
            Value::Boolean(b) => {
                let mut state = serializer.serialize_map(Some(2))?;
                state.serialize_entry("t", &TYPE_BOOLEAN)?;
                state.serialize_entry("b", b)?;
                state.end()
            }
            Value::Number(n) => {
                let mut state = serializer.serialize_map(Some(2))?;
                state.serialize_entry("t", &TYPE_NUMBER)?;
                if n.is_finite() {
                    state.serialize_entry("n", n)?;
                } else {
                    state.serialize_entry("n", &crate::number::format_number(*n))?;
                }
                state.end()
            }
            Value::Array(items) => {
                let mut state =
                    serializer.serialize_map(Some(if items.is_empty() { 1 } else { 2 }))?;
                state.serialize_entry("t", &TYPE_ARRAY)?;
                if !items.is_empty() {
                    state.serialize_entry("a", items)?;
                }
                state.end()
            }
            Value::Dictionary(map) => serialize_entries(serializer, TYPE_DICTIONARY, map),
            Value::CaseSensitiveDictionary(map) => {
                serialize_entries(serializer, TYPE_CASE_SENSITIVE_DICTIONARY, map)
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Value::from_wire(&json).map_err(D::Error::custom)
    }
}
