/*
 * yaml.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! YAML object stream source and sink built on yaml-rust2.
//!
//! The source parses the whole document up front, keeping the position of
//! every node. Anchors are not supported: an alias is rejected when the
//! document is loaded.

use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::Marker;
use yaml_rust2::yaml::Hash;
use yaml_rust2::{Yaml, YamlEmitter};

use crate::errors::{TemplateError, TemplateResult};
use crate::object_stream::{
    EventQueue, ObjectReader, ObjectWriter, RawScalar, RawStart, SourcePosition, StreamEvent,
};

#[derive(Debug)]
pub struct YamlObjectReader {
    events: EventQueue,
}

impl YamlObjectReader {
    /// Parse a single YAML document.
    pub fn new(content: &str) -> TemplateResult<Self> {
        let mut collector = EventCollector::default();
        Parser::new_from_str(content)
            .load(&mut collector, false)
            .map_err(|e| TemplateError::ObjectStream(format!("Invalid YAML: {e}")))?;
        if let Some(message) = collector.error {
            return Err(TemplateError::ObjectStream(message));
        }
        Ok(Self {
            events: collector.events,
        })
    }
}

#[derive(Default)]
struct EventCollector {
    events: EventQueue,
    error: Option<String>,
}

fn position(marker: &Marker) -> Option<SourcePosition> {
    Some(SourcePosition::new(marker.line(), marker.col() + 1))
}

impl MarkedEventReceiver for EventCollector {
    fn on_event(&mut self, ev: Event, marker: Marker) {
        match ev {
            Event::Scalar(text, _style, _anchor_id, _tag) => {
                self.events.push(StreamEvent::Scalar(RawScalar {
                    position: position(&marker),
                    text,
                }));
            }
            Event::SequenceStart(_anchor_id, _tag) => {
                self.events.push(StreamEvent::SequenceStart(RawStart {
                    position: position(&marker),
                }));
            }
            Event::SequenceEnd => self.events.push(StreamEvent::SequenceEnd),
            Event::MappingStart(_anchor_id, _tag) => {
                self.events.push(StreamEvent::MappingStart(RawStart {
                    position: position(&marker),
                }));
            }
            Event::MappingEnd => self.events.push(StreamEvent::MappingEnd),
            Event::Alias(_anchor_id) => {
                if self.error.is_none() {
                    self.error = Some(format!(
                        "(Line: {}, Col: {}): Anchors and aliases are not supported",
                        marker.line(),
                        marker.col() + 1
                    ));
                }
            }
            Event::Nothing
            | Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart
            | Event::DocumentEnd => {}
        }
    }
}

impl ObjectReader for YamlObjectReader {
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
    Sequence(Vec<Yaml>),
    Mapping { map: Hash, key: Option<Yaml> },
}

/// Builds a yaml-rust2 document. Scalars are written as strings; the
/// emitter quotes any that would otherwise read back as another type.
#[derive(Default)]
pub struct YamlObjectWriter {
    stack: Vec<Frame>,
    root: Option<Yaml>,
}

impl YamlObjectWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_yaml(self) -> Option<Yaml> {
        self.root
    }

    /// Emit the finished document as YAML text.
    pub fn to_yaml_string(&self) -> TemplateResult<String> {
        let Some(root) = &self.root else {
            return Err(stream_error("No document was written"));
        };
        let mut out = String::new();
        YamlEmitter::new(&mut out)
            .dump(root)
            .map_err(|e| TemplateError::ObjectStream(format!("Failed to emit YAML: {e}")))?;
        Ok(out)
    }

    fn push_value(&mut self, value: Yaml) -> TemplateResult<()> {
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

impl ObjectWriter for YamlObjectWriter {
    fn write_start(&mut self) -> TemplateResult<()> {
        Ok(())
    }

    fn write_string(&mut self, value: &str) -> TemplateResult<()> {
        if let Some(Frame::Mapping { key: key @ None, .. }) = self.stack.last_mut() {
            *key = Some(Yaml::String(value.to_string()));
            return Ok(());
        }
        self.push_value(Yaml::String(value.to_string()))
    }

    fn write_sequence_start(&mut self) -> TemplateResult<()> {
        self.stack.push(Frame::Sequence(Vec::new()));
        Ok(())
    }

    fn write_sequence_end(&mut self) -> TemplateResult<()> {
        match self.stack.pop() {
            Some(Frame::Sequence(items)) => self.push_value(Yaml::Array(items)),
            _ => Err(stream_error("Unexpected sequence end")),
        }
    }

    fn write_mapping_start(&mut self) -> TemplateResult<()> {
        self.stack.push(Frame::Mapping {
            map: Hash::new(),
            key: None,
        });
        Ok(())
    }

    fn write_mapping_end(&mut self) -> TemplateResult<()> {
        match self.stack.pop() {
            Some(Frame::Mapping { map, key: None }) => self.push_value(Yaml::Hash(map)),
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

    fn scalars(reader: &mut YamlObjectReader) -> Vec<String> {
        let mut texts = Vec::new();
        while let Some(scalar) = reader.allow_scalar().unwrap() {
            assert!(scalar.position.is_some());
            texts.push(scalar.text);
        }
        texts
    }

    #[test]
    fn reads_events_with_positions() {
        let mut reader = YamlObjectReader::new("on: push\nruns-on: [ubuntu, macos]\n").unwrap();
        reader.validate_start().unwrap();
        let start = reader.allow_mapping_start().unwrap().unwrap();
        assert_eq!(start.position.map(|p| p.column), Some(1));
        assert_eq!(scalars(&mut reader), vec!["on", "push", "runs-on"]);
        assert!(reader.allow_sequence_start().unwrap().is_some());
        assert_eq!(scalars(&mut reader), vec!["ubuntu", "macos"]);
        assert!(reader.allow_sequence_end().unwrap());
        assert!(reader.allow_mapping_end().unwrap());
        reader.validate_end().unwrap();
    }

    #[test]
    fn rejects_aliases() {
        let error = YamlObjectReader::new("a: &x 1\nb: *x\n").unwrap_err();
        assert!(error.to_string().contains("aliases are not supported"));
    }

    #[test]
    fn rejects_invalid_yaml() {
        assert!(YamlObjectReader::new("a: [1, 2\n").is_err());
    }

    #[test]
    fn emits_strings_that_read_back_unchanged() {
        let mut writer = YamlObjectWriter::new();
        writer.write_start().unwrap();
        writer.write_mapping_start().unwrap();
        writer.write_string("enabled").unwrap();
        writer.write_string("true").unwrap();
        writer.write_mapping_end().unwrap();
        writer.write_end().unwrap();

        let text = writer.to_yaml_string().unwrap();
        let mut reader = YamlObjectReader::new(&text).unwrap();
        reader.allow_mapping_start().unwrap();
        assert_eq!(scalars(&mut reader), vec!["enabled", "true"]);
    }
}
