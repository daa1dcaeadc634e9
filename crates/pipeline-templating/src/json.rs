/*
 * json.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! JSON object stream source and sink over `serde_json::Value`.
//!
//! JSON carries no positions, so tokens read from it have no provenance.
//! Numbers, booleans and null are read as their JSON text.

use serde_json::{Map, Value as JsonValue};

use crate::errors::{TemplateError, TemplateResult};
use crate::object_stream::{
    EventQueue, ObjectReader, ObjectWriter, RawScalar, RawStart, StreamEvent,
};

#[derive(Debug)]
pub struct JsonObjectReader {
    events: EventQueue,
}

impl JsonObjectReader {
    pub fn new(document: JsonValue) -> Self {
        let mut events = EventQueue::default();
        push_events(&mut events, document);
        Self { events }
    }

    pub fn parse(text: &str) -> TemplateResult<Self> {
        let document = serde_json::from_str(text)
            .map_err(|e| TemplateError::ObjectStream(format!("Invalid JSON: {e}")))?;
        Ok(Self::new(document))
    }
}

fn scalar(text: String) -> StreamEvent {
    StreamEvent::Scalar(RawScalar {
        position: None,
        text,
    })
}

fn push_events(events: &mut EventQueue, value: JsonValue) {
    match value {
        JsonValue::Null => events.push(scalar("null".to_string())),
        JsonValue::Bool(b) => events.push(scalar(b.to_string())),
        JsonValue::Number(n) => events.push(scalar(n.to_string())),
        JsonValue::String(s) => events.push(scalar(s)),
        JsonValue::Array(items) => {
            events.push(StreamEvent::SequenceStart(RawStart { position: None }));
            for item in items {
                push_events(events, item);
            }
            events.push(StreamEvent::SequenceEnd);
        }
        JsonValue::Object(map) => {
            events.push(StreamEvent::MappingStart(RawStart { position: None }));
            for (key, value) in map {
                events.push(scalar(key));
                push_events(events, value);
            }
            events.push(StreamEvent::MappingEnd);
        }
    }
}

impl ObjectReader for JsonObjectReader {
    fn validate_start(&mut self) -> TemplateResult<()> {
        self.events.validate_start()
    }

    fn allow_scalar(&mut self) -> TemplateResult<Option<RawScalar>> {
        Ok(self.events.allow_scalar())
    }

    fn allow_sequence_start(&mut self) -> TemplateResult<Option<RawStart>> {
        Ok(self.events.allow_sequence_start())
    }

    fn allow_sequence_end(&mut self) -> TemplateResult<bool> {
        Ok(self.events.allow_sequence_end())
    }

    fn allow_mapping_start(&mut self) -> TemplateResult<Option<RawStart>> {
        Ok(self.events.allow_mapping_start())
    }

    fn allow_mapping_end(&mut self) -> TemplateResult<bool> {
        Ok(self.events.allow_mapping_end())
    }

    fn validate_end(&mut self) -> TemplateResult<()> {
        self.events.validate_end()
    }
}

enum Frame {
    Sequence(Vec<JsonValue>),
    Mapping {
        map: Map<String, JsonValue>,
        key: Option<String>,
    },
}

/// Builds a `serde_json::Value`. Every scalar is written as a JSON string.
#[derive(Default)]
pub struct JsonObjectWriter {
    stack: Vec<Frame>,
    root: Option<JsonValue>,
}

impl JsonObjectWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The finished document, if one was written.
    pub fn into_value(self) -> Option<JsonValue> {
        self.root
    }

    fn push_value(&mut self, value: JsonValue) -> TemplateResult<()> {
        match self.stack.last_mut() {
            None if self.root.is_none() => {
                self.root = Some(value);
                Ok(())
            }
            None => Err(stream_error("A document was already written")),
            Some(Frame::Sequence(items)) => {
                items.push(value);
                Ok(())
            }
            Some(Frame::Mapping { map, key }) => match key.take() {
                Some(key) => {
                    map.insert(key, value);
                    Ok(())
                }
                None => Err(stream_error("Mapping keys must be strings")),
            },
        }
    }
}

fn stream_error(message: &str) -> TemplateError {
    TemplateError::ObjectStream(message.to_string())
}

impl ObjectWriter for JsonObjectWriter {
    fn write_start(&mut self) -> TemplateResult<()> {
        Ok(())
    }

    fn write_string(&mut self, value: &str) -> TemplateResult<()> {
        if let Some(Frame::Mapping { key: key @ None, .. }) = self.stack.last_mut() {
            *key = Some(value.to_string());
            return Ok(());
        }
        self.push_value(JsonValue::String(value.to_string()))
    }

    fn write_sequence_start(&mut self) -> TemplateResult<()> {
        self.stack.push(Frame::Sequence(Vec::new()));
        Ok(())
    }

    fn write_sequence_end(&mut self) -> TemplateResult<()> {
        match self.stack.pop() {
            Some(Frame::Sequence(items)) => self.push_value(JsonValue::Array(items)),
            _ => Err(stream_error("Unexpected sequence end")),
        }
    }

    fn write_mapping_start(&mut self) -> TemplateResult<()> {
        self.stack.push(Frame::Mapping {
            map: Map::new(),
            key: None,
        });
        Ok(())
    }

    fn write_mapping_end(&mut self) -> TemplateResult<()> {
        match self.stack.pop() {
            Some(Frame::Mapping { map, key: None }) => self.push_value(JsonValue::Object(map)),
            _ => Err(stream_error("Unexpected mapping end")),
        }
    }

    fn write_end(&mut self) -> TemplateResult<()> {
        if !self.stack.is_empty() {
            return Err(stream_error("Unclosed sequence or mapping"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn reads_primitives_as_text() {
        let mut reader = JsonObjectReader::new(json!([null, true, 2.5, "x"]));
        reader.validate_start().unwrap();
        assert!(reader.allow_sequence_start().unwrap().is_some());
        let mut texts = Vec::new();
        while let Some(scalar) = reader.allow_scalar().unwrap() {
            assert_eq!(scalar.position, None);
            texts.push(scalar.text);
        }
        assert_eq!(texts, vec!["null", "true", "2.5", "x"]);
        assert!(reader.allow_sequence_end().unwrap());
        reader.validate_end().unwrap();
    }

    #[test]
    fn invalid_json_is_a_stream_error() {
        assert!(matches!(
            JsonObjectReader::parse("{"),
            Err(TemplateError::ObjectStream(_))
        ));
    }

    #[test]
    fn writer_rejects_container_keys() {
        let mut writer = JsonObjectWriter::new();
        writer.write_mapping_start().unwrap();
        assert!(writer.write_sequence_start().is_ok());
        assert!(writer.write_sequence_end().is_err());
    }

    #[test]
    fn writer_builds_nested_document() {
        let mut writer = JsonObjectWriter::new();
        writer.write_start().unwrap();
        writer.write_mapping_start().unwrap();
        writer.write_string("on").unwrap();
        writer.write_sequence_start().unwrap();
        writer.write_string("push").unwrap();
        writer.write_sequence_end().unwrap();
        writer.write_mapping_end().unwrap();
        writer.write_end().unwrap();
        assert_eq!(writer.into_value(), Some(json!({"on": ["push"]})));
    }
}
