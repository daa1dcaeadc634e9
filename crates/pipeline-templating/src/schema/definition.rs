/*
 * schema/definition.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Definition types: the legal shapes at a position in a document.

use std::collections::BTreeMap;

use pipeline_expressions::coercion::eq_ignore_case;
use pipeline_expressions::number::parse_number;
use regex::Regex;

/// A named schema node.
#[derive(Debug, Clone)]
pub struct Definition {
    pub kind: DefinitionKind,
    /// Expression context names (`github`, `format(1,255)`, ...) that become
    /// legal at and below this definition.
    pub context: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub enum DefinitionKind {
    Null,
    Boolean,
    Number,
    String(StringDefinition),
    Sequence(SequenceDefinition),
    Mapping(MappingDefinition),
    OneOf(OneOfDefinition),
}

#[derive(Debug, Clone, Default)]
pub struct StringDefinition {
    pub constant: Option<String>,
    pub ignore_case: bool,
    pub require_non_empty: bool,
    pub pattern: Option<Regex>,
}

#[derive(Debug, Clone)]
pub struct SequenceDefinition {
    pub item_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyValue {
    pub type_name: String,
    pub required: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MappingDefinition {
    pub properties: BTreeMap<String, PropertyValue>,
    pub loose_key_type: Option<String>,
    pub loose_value_type: Option<String>,
    pub inherits: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OneOfDefinition {
    pub alternatives: Vec<String>,
}

impl Definition {
    pub fn new(kind: DefinitionKind) -> Self {
        Self {
            kind,
            context: Vec::new(),
            description: None,
        }
    }

    pub fn null() -> Self {
        Self::new(DefinitionKind::Null)
    }

    pub fn boolean() -> Self {
        Self::new(DefinitionKind::Boolean)
    }

    pub fn number() -> Self {
        Self::new(DefinitionKind::Number)
    }

    pub fn string(definition: StringDefinition) -> Self {
        Self::new(DefinitionKind::String(definition))
    }

    pub fn sequence(item_type: impl Into<String>) -> Self {
        Self::new(DefinitionKind::Sequence(SequenceDefinition {
            item_type: item_type.into(),
        }))
    }

    pub fn mapping(definition: MappingDefinition) -> Self {
        Self::new(DefinitionKind::Mapping(definition))
    }

    pub fn one_of<I, S>(alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(DefinitionKind::OneOf(OneOfDefinition {
            alternatives: alternatives.into_iter().map(Into::into).collect(),
        }))
    }

    pub fn with_context<I, S>(mut self, context: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context.extend(context.into_iter().map(Into::into));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self.kind,
            DefinitionKind::Null
                | DefinitionKind::Boolean
                | DefinitionKind::Number
                | DefinitionKind::String(_)
        )
    }

    /// Whether a scalar with this text satisfies the definition. Containers
    /// and one-of definitions never match directly.
    pub fn is_match(&self, text: &str) -> bool {
        match &self.kind {
            DefinitionKind::Null => matches!(text, "" | "~" | "null" | "Null" | "NULL"),
            DefinitionKind::Boolean => matches!(
                text,
                "true" | "True" | "TRUE" | "false" | "False" | "FALSE"
            ),
            DefinitionKind::Number => is_number(text),
            DefinitionKind::String(definition) => definition.is_match(text),
            _ => false,
        }
    }
}

fn is_number(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed == "NaN" || !parse_number(trimmed).is_nan()
}

impl StringDefinition {
    pub fn non_empty() -> Self {
        Self {
            require_non_empty: true,
            ..Self::default()
        }
    }

    pub fn constant(value: impl Into<String>) -> Self {
        Self {
            constant: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn with_ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn is_match(&self, text: &str) -> bool {
        if let Some(constant) = &self.constant {
            return if self.ignore_case {
                eq_ignore_case(constant, text)
            } else {
                constant == text
            };
        }
        if self.require_non_empty && text.is_empty() {
            return false;
        }
        match &self.pattern {
            Some(pattern) => pattern.is_match(text),
            None => true,
        }
    }
}

impl PropertyValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            required: false,
        }
    }

    pub fn required(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            required: true,
        }
    }
}

impl MappingDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_loose(
        mut self,
        key_type: impl Into<String>,
        value_type: impl Into<String>,
    ) -> Self {
        self.loose_key_type = Some(key_type.into());
        self.loose_value_type = Some(value_type.into());
        self
    }

    pub fn with_inherits(mut self, parent: impl Into<String>) -> Self {
        self.inherits = Some(parent.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_kinds_match_text() {
        assert!(Definition::null().is_match(""));
        assert!(Definition::null().is_match("~"));
        assert!(!Definition::null().is_match("none"));
        assert!(Definition::boolean().is_match("True"));
        assert!(!Definition::boolean().is_match("yes"));
        assert!(Definition::number().is_match("1.5e3"));
        assert!(Definition::number().is_match("0x1F"));
        assert!(!Definition::number().is_match("1.2.3"));
        assert!(!Definition::number().is_match(""));
    }

    #[test]
    fn string_constraints() {
        assert!(StringDefinition::default().is_match(""));
        assert!(!StringDefinition::non_empty().is_match(""));
        assert!(StringDefinition::constant("push").is_match("push"));
        assert!(!StringDefinition::constant("push").is_match("PUSH"));
        assert!(StringDefinition::constant("push").with_ignore_case().is_match("PUSH"));
        let semver = StringDefinition::default().with_pattern(Regex::new(r"^\d+\.\d+$").unwrap());
        assert!(semver.is_match("1.2"));
        assert!(!semver.is_match("one"));
    }

    #[test]
    fn containers_never_match_scalars() {
        assert!(!Definition::sequence("any").is_match("x"));
        assert!(!Definition::one_of(["string"]).is_match("x"));
    }
}
