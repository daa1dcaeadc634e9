/*
 * memory.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Byte, depth and event budgets for reading and evaluation.
//!
//! Sizes are estimates: every object costs [`MIN_OBJECT_SIZE`] and every
//! string an extra [`STRING_BASE_OVERHEAD`] plus its length. Budgets are
//! checked before a charge is committed, so a failed charge leaves the
//! counter unchanged.

use crate::error::{ExpressionError, ExpressionResult};
use crate::value::Value;

pub const MIN_OBJECT_SIZE: usize = 24;
pub const STRING_BASE_OVERHEAD: usize = 26;

/// Charge for a null slot in a collection.
const NULL_SIZE: usize = 8;

#[derive(Debug, Clone)]
pub struct MemoryCounter {
    max_bytes: usize,
    max_depth: usize,
    max_events: usize,
    current_bytes: usize,
    depth: usize,
    events: usize,
}

impl MemoryCounter {
    /// A counter that only bounds bytes.
    pub fn new(max_bytes: usize) -> Self {
        Self::with_limits(max_bytes, usize::MAX, usize::MAX)
    }

    pub fn with_limits(max_bytes: usize, max_depth: usize, max_events: usize) -> Self {
        Self {
            max_bytes,
            max_depth,
            max_events,
            current_bytes: 0,
            depth: 0,
            events: 0,
        }
    }

    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn events(&self) -> usize {
        self.events
    }

    /// Fail if `bytes` more would exceed the budget, without charging them.
    pub fn ensure_bytes(&self, bytes: usize) -> ExpressionResult<()> {
        match self.current_bytes.checked_add(bytes) {
            Some(total) if total <= self.max_bytes => Ok(()),
            _ => Err(ExpressionError::MaxBytesExceeded {
                max_bytes: self.max_bytes,
            }),
        }
    }

    pub fn add_bytes(&mut self, bytes: usize) -> ExpressionResult<()> {
        self.ensure_bytes(bytes)?;
        self.current_bytes += bytes;
        Ok(())
    }

    pub fn add_string(&mut self, value: &str) -> ExpressionResult<()> {
        self.add_bytes(Self::string_bytes(value.len()))
    }

    /// Charge a value, and with `traverse` all of its descendants.
    pub fn add_value(&mut self, value: &Value, traverse: bool) -> ExpressionResult<()> {
        self.add_bytes(Self::value_bytes(value, traverse))
    }

    pub fn subtract_bytes(&mut self, bytes: usize) {
        debug_assert!(bytes <= self.current_bytes, "released more bytes than charged");
        self.current_bytes = self.current_bytes.saturating_sub(bytes);
    }

    pub fn increment_depth(&mut self) -> ExpressionResult<()> {
        if self.depth >= self.max_depth {
            return Err(ExpressionError::MaxDepthExceeded {
                max_depth: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn decrement_depth(&mut self) {
        debug_assert!(self.depth > 0, "depth decremented below zero");
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn increment_events(&mut self) -> ExpressionResult<()> {
        if self.events >= self.max_events {
            return Err(ExpressionError::MaxEventsExceeded {
                max_events: self.max_events,
            });
        }
        self.events += 1;
        Ok(())
    }

    /// Estimated size of a string of `len` bytes.
    pub fn string_bytes(len: usize) -> usize {
        STRING_BASE_OVERHEAD.saturating_add(len)
    }

    pub fn value_bytes(value: &Value, traverse: bool) -> usize {
        if traverse {
            value.traverse().map(Self::single_value_bytes).sum()
        } else {
            Self::single_value_bytes(value)
        }
    }

    fn single_value_bytes(value: &Value) -> usize {
        match value {
            Value::Null => NULL_SIZE,
            Value::String(s) => MIN_OBJECT_SIZE + Self::string_bytes(s.len()),
            Value::Dictionary(map) => {
                MIN_OBJECT_SIZE + map.keys().map(|k| Self::string_bytes(k.len())).sum::<usize>()
            }
            Value::CaseSensitiveDictionary(map) => {
                MIN_OBJECT_SIZE + map.keys().map(|k| Self::string_bytes(k.len())).sum::<usize>()
            }
            _ => MIN_OBJECT_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_charge_leaves_counter_unchanged() {
        let mut counter = MemoryCounter::new(100);
        counter.add_bytes(60).unwrap();
        let error = counter.add_bytes(50).unwrap_err();
        assert_eq!(error, ExpressionError::MaxBytesExceeded { max_bytes: 100 });
        assert_eq!(counter.current_bytes(), 60);
        counter.add_bytes(40).unwrap();
        assert_eq!(counter.current_bytes(), 100);
    }

    #[test]
    fn subtract_releases_bytes() {
        let mut counter = MemoryCounter::new(100);
        counter.add_bytes(80).unwrap();
        counter.subtract_bytes(30);
        counter.add_bytes(50).unwrap();
        assert_eq!(counter.current_bytes(), 100);
    }

    #[test]
    fn depth_is_bounded() {
        let mut counter = MemoryCounter::with_limits(usize::MAX, 2, usize::MAX);
        counter.increment_depth().unwrap();
        counter.increment_depth().unwrap();
        assert!(matches!(
            counter.increment_depth(),
            Err(ExpressionError::MaxDepthExceeded { max_depth: 2 })
        ));
        counter.decrement_depth();
        counter.increment_depth().unwrap();
    }

    #[test]
    fn events_are_bounded() {
        let mut counter = MemoryCounter::with_limits(usize::MAX, usize::MAX, 3);
        for _ in 0..3 {
            counter.increment_events().unwrap();
        }
        assert!(counter.increment_events().is_err());
        assert_eq!(counter.events(), 3);
    }

    #[test]
    fn value_size_includes_descendants_when_traversing() {
        let value = Value::Array(vec![Value::from("ab"), Value::Boolean(true)]);
        let shallow = MemoryCounter::value_bytes(&value, false);
        let deep = MemoryCounter::value_bytes(&value, true);
        assert_eq!(shallow, MIN_OBJECT_SIZE);
        assert_eq!(
            deep,
            MIN_OBJECT_SIZE + (MIN_OBJECT_SIZE + STRING_BASE_OVERHEAD + 2) + MIN_OBJECT_SIZE
        );
    }
}
