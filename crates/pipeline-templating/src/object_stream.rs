/*
 * object_stream.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Pull-based object stream sources and push-based sinks.
//!
//! The reader asks a source for the most specific shape first: a scalar,
//! then a sequence start, then a mapping start. Sources buffer as needed
//! to answer each question without consuming anything on a "no".

use std::collections::VecDeque;

use crate::errors::{TemplateError, TemplateResult};

/// 1-based line and column of a node in its source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A scalar produced by a source, as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawScalar {
    pub position: Option<SourcePosition>,
    pub text: String,
}

/// A sequence or mapping start produced by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawStart {
    pub position: Option<SourcePosition>,
}

pub trait ObjectReader {
    /// Called once before the first node.
    fn validate_start(&mut self) -> TemplateResult<()>;

    fn allow_scalar(&mut self) -> TemplateResult<Option<RawScalar>>;

    fn allow_sequence_start(&mut self) -> TemplateResult<Option<RawStart>>;

    fn allow_sequence_end(&mut self) -> TemplateResult<bool>;

    fn allow_mapping_start(&mut self) -> TemplateResult<Option<RawStart>>;

    fn allow_mapping_end(&mut self) -> TemplateResult<bool>;

    /// Called once after the root node. Fails if anything is left.
    fn validate_end(&mut self) -> TemplateResult<()>;
}

pub trait ObjectWriter {
    fn write_start(&mut self) -> TemplateResult<()>;

    fn write_string(&mut self, value: &str) -> TemplateResult<()>;

    fn write_sequence_start(&mut self) -> TemplateResult<()>;

    fn write_sequence_end(&mut self) -> TemplateResult<()>;

    fn write_mapping_start(&mut self) -> TemplateResult<()>;

    fn write_mapping_end(&mut self) -> TemplateResult<()>;

    fn write_end(&mut self) -> TemplateResult<()>;
}

/// One buffered node of a document, as produced by a parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamEvent {
    Scalar(RawScalar),
    SequenceStart(RawStart),
    SequenceEnd,
    MappingStart(RawStart),
    MappingEnd,
}

/// Fully buffered event stream answering the [`ObjectReader`] questions.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    events: VecDeque<StreamEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: StreamEvent) {
        self.events.push_back(event);
    }

    pub fn validate_start(&self) -> TemplateResult<()> {
        if self.events.is_empty() {
            return Err(TemplateError::ObjectStream(
                "Expected a document but the stream is empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn allow_scalar(&mut self) -> Option<RawScalar> {
        match self.events.pop_front()? {
            StreamEvent::Scalar(scalar) => Some(scalar),
            other => {
                self.events.push_front(other);
                None
            }
        }
    }

    pub fn allow_sequence_start(&mut self) -> Option<RawStart> {
        match self.events.pop_front()? {
            StreamEvent::SequenceStart(start) => Some(start),
            other => {
                self.events.push_front(other);
                None
            }
        }
    }

    pub fn allow_sequence_end(&mut self) -> bool {
        self.allow(&StreamEvent::SequenceEnd)
    }

    pub fn allow_mapping_start(&mut self) -> Option<RawStart> {
        match self.events.pop_front()? {
            StreamEvent::MappingStart(start) => Some(start),
            other => {
                self.events.push_front(other);
                None
            }
        }
    }

    pub fn allow_mapping_end(&mut self) -> bool {
        self.allow(&StreamEvent::MappingEnd)
    }

    pub fn validate_end(&self) -> TemplateResult<()> {
        if !self.events.is_empty() {
            return Err(TemplateError::ObjectStream(
                "Expected the end of the document".to_string(),
            ));
        }
        Ok(())
    }

    fn allow(&mut self, expected: &StreamEvent) -> bool {
        if self.events.front() == Some(expected) {
            self.events.pop_front();
            true
        } else {
            false
        }
    }
}
