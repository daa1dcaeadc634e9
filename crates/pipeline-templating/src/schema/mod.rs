/*
 * schema/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template schema: named definitions and the key-matching rules the reader
//! and evaluator query.
//!
//! Schemas are built in code. Every schema starts with the built-in
//! definitions `null`, `boolean`, `number`, `string`, `non-empty-string`,
//! `sequence`, `mapping` and `any`.

mod definition;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;

pub use definition::{
    Definition, DefinitionKind, MappingDefinition, OneOfDefinition, PropertyValue,
    SequenceDefinition, StringDefinition,
};

use crate::errors::{TemplateError, TemplateResult};

pub const NULL: &str = "null";
pub const BOOLEAN: &str = "boolean";
pub const NUMBER: &str = "number";
pub const STRING: &str = "string";
pub const NON_EMPTY_STRING: &str = "non-empty-string";
pub const SEQUENCE: &str = "sequence";
pub const MAPPING: &str = "mapping";
pub const ANY: &str = "any";

/// Inheritance chains longer than this are rejected.
const MAX_INHERITANCE_DEPTH: usize = 10;

static DEFINITION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_-]*$").expect("definition name pattern is valid")
});

#[derive(Debug, Clone)]
pub struct TemplateSchema {
    definitions: HashMap<String, Definition>,
}

impl Default for TemplateSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateSchema {
    /// A schema holding only the built-in definitions.
    pub fn new() -> Self {
        let mut definitions = HashMap::new();
        definitions.insert(NULL.to_string(), Definition::null());
        definitions.insert(BOOLEAN.to_string(), Definition::boolean());
        definitions.insert(NUMBER.to_string(), Definition::number());
        definitions.insert(
            STRING.to_string(),
            Definition::string(StringDefinition::default()),
        );
        definitions.insert(
            NON_EMPTY_STRING.to_string(),
            Definition::string(StringDefinition::non_empty()),
        );
        definitions.insert(SEQUENCE.to_string(), Definition::sequence(ANY));
        definitions.insert(
            MAPPING.to_string(),
            Definition::mapping(MappingDefinition::new().with_loose(STRING, ANY)),
        );
        definitions.insert(
            ANY.to_string(),
            Definition::one_of([NULL, BOOLEAN, NUMBER, STRING, SEQUENCE, MAPPING]),
        );
        Self { definitions }
    }

    /// Add or replace a definition.
    pub fn with_definition(mut self, name: impl Into<String>, definition: Definition) -> Self {
        self.insert(name, definition);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, definition: Definition) {
        self.definitions.insert(name.into(), definition);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn get_definition(&self, name: &str) -> TemplateResult<&Definition> {
        self.definitions
            .get(name)
            .ok_or_else(|| TemplateError::DefinitionNotFound(name.to_string()))
    }

    /// The definition itself, or the alternatives of a one-of.
    pub fn alternatives<'s>(&'s self, definition: &'s Definition) -> TemplateResult<Vec<&'s Definition>> {
        match &definition.kind {
            DefinitionKind::OneOf(one_of) => one_of
                .alternatives
                .iter()
                .map(|name| self.get_definition(name))
                .collect(),
            _ => Ok(vec![definition]),
        }
    }

    pub fn scalars<'s>(&'s self, definition: &'s Definition) -> TemplateResult<Vec<&'s Definition>> {
        Ok(self
            .alternatives(definition)?
            .into_iter()
            .filter(|d| d.is_scalar())
            .collect())
    }

    pub fn sequence<'s>(&'s self, definition: &'s Definition) -> TemplateResult<Option<&'s SequenceDefinition>> {
        Ok(self
            .alternatives(definition)?
            .into_iter()
            .find_map(|d| match &d.kind {
                DefinitionKind::Sequence(sequence) => Some(sequence),
                _ => None,
            }))
    }

    pub fn mappings<'s>(&'s self, definition: &'s Definition) -> TemplateResult<Vec<&'s MappingDefinition>> {
        Ok(self
            .alternatives(definition)?
            .into_iter()
            .filter_map(|d| match &d.kind {
                DefinitionKind::Mapping(mapping) => Some(mapping),
                _ => None,
            })
            .collect())
    }

    fn parent<'s>(&'s self, definition: &'s MappingDefinition) -> TemplateResult<Option<&'s MappingDefinition>> {
        let Some(name) = &definition.inherits else {
            return Ok(None);
        };
        match &self.get_definition(name)?.kind {
            DefinitionKind::Mapping(parent) => Ok(Some(parent)),
            _ => Err(TemplateError::InvalidSchema(format!(
                "Definition '{name}' is inherited but is not a mapping"
            ))),
        }
    }

    /// Whether the mapping or any ancestor declares properties.
    pub fn has_properties<'s>(&'s self, definition: &'s MappingDefinition) -> TemplateResult<bool> {
        let mut current = definition;
        for _ in 0..MAX_INHERITANCE_DEPTH {
            if !current.properties.is_empty() {
                return Ok(true);
            }
            match self.parent(current)? {
                Some(parent) => current = parent,
                None => return Ok(false),
            }
        }
        Err(inheritance_too_deep())
    }

    /// Value type of property `name`, following inheritance.
    pub fn try_get_property<'s>(
        &'s self,
        definition: &'s MappingDefinition,
        name: &str,
    ) -> TemplateResult<Option<&'s str>> {
        let mut current = definition;
        for _ in 0..MAX_INHERITANCE_DEPTH {
            if let Some(property) = current.properties.get(name) {
                return Ok(Some(&property.type_name));
            }
            match self.parent(current)? {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
        Err(inheritance_too_deep())
    }

    /// Resolve `key` against the candidate mapping shapes.
    ///
    /// The value type comes from the first candidate declaring the key.
    /// When some candidates lack the key they are removed, narrowing the
    /// one-of for the keys that follow.
    pub fn try_match_key<'s>(
        &'s self,
        candidates: &mut Vec<&'s MappingDefinition>,
        key: &str,
    ) -> TemplateResult<Option<&'s str>> {
        let mut value_type = None;
        let mut missing_in_some = false;
        for candidate in candidates.iter() {
            match self.try_get_property(candidate, key)? {
                Some(found) => {
                    if value_type.is_none() {
                        value_type = Some(found);
                    }
                }
                None => missing_in_some = true,
            }
        }

        if value_type.is_some() && missing_in_some {
            let mut retained = Vec::with_capacity(candidates.len());
            for candidate in candidates.drain(..) {
                if self.try_get_property(candidate, key)?.is_some() {
                    retained.push(candidate);
                }
            }
            *candidates = retained;
        }
        Ok(value_type)
    }

    /// Check definition names, references and one-of shapes.
    pub fn validate(&self) -> TemplateResult<()> {
        let mut names: Vec<&String> = self.definitions.keys().collect();
        names.sort();
        for name in names {
            if !DEFINITION_NAME.is_match(name) {
                return Err(TemplateError::InvalidSchema(format!(
                    "Invalid definition name '{name}'"
                )));
            }
            let definition = &self.definitions[name.as_str()];
            match &definition.kind {
                DefinitionKind::Sequence(sequence) => {
                    self.require(name, "item type", &sequence.item_type)?;
                }
                DefinitionKind::Mapping(mapping) => self.validate_mapping(name, mapping)?,
                DefinitionKind::OneOf(one_of) => self.validate_one_of(name, one_of)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn require(&self, owner: &str, role: &str, reference: &str) -> TemplateResult<()> {
        if self.contains(reference) {
            Ok(())
        } else {
            Err(TemplateError::InvalidSchema(format!(
                "Definition '{owner}' references unknown {role} '{reference}'"
            )))
        }
    }

    fn validate_mapping(&self, name: &str, mapping: &MappingDefinition) -> TemplateResult<()> {
        for property in mapping.properties.values() {
            self.require(name, "property type", &property.type_name)?;
        }
        match (&mapping.loose_key_type, &mapping.loose_value_type) {
            (Some(key), Some(value)) => {
                self.require(name, "loose key type", key)?;
                self.require(name, "loose value type", value)?;
                if !self
                    .scalars(self.get_definition(key)?)?
                    .iter()
                    .any(|d| matches!(d.kind, DefinitionKind::String(_)))
                {
                    return Err(TemplateError::InvalidSchema(format!(
                        "Definition '{name}': loose key type '{key}' must be a string definition"
                    )));
                }
            }
            (None, None) => {}
            _ => {
                return Err(TemplateError::InvalidSchema(format!(
                    "Definition '{name}' must declare both a loose key type and a loose value type"
                )));
            }
        }
        if let Some(parent) = &mapping.inherits {
            self.require(name, "inherited definition", parent)?;
            self.has_properties(mapping)?;
        }
        Ok(())
    }

    fn validate_one_of(&self, name: &str, one_of: &OneOfDefinition) -> TemplateResult<()> {
        let invalid = |message: String| -> TemplateResult<()> {
            Err(TemplateError::InvalidSchema(format!(
                "Definition '{name}': {message}"
            )))
        };
        let mut seen_kinds = HashSet::new();
        let mut loose_mappings = 0;
        for alternative in &one_of.alternatives {
            self.require(name, "one-of alternative", alternative)?;
            let definition = self.get_definition(alternative)?;
            let kind = match &definition.kind {
                DefinitionKind::Null => "null",
                DefinitionKind::Boolean => "boolean",
                DefinitionKind::Number => "number",
                DefinitionKind::Sequence(_) => "sequence",
                DefinitionKind::String(_) => continue,
                DefinitionKind::Mapping(mapping) => {
                    if mapping.loose_key_type.is_some() {
                        loose_mappings += 1;
                    }
                    continue;
                }
                DefinitionKind::OneOf(_) => {
                    return invalid(format!("nested one-of '{alternative}' is not supported"));
                }
            };
            if !seen_kinds.insert(kind) {
                return invalid(format!("only one {kind} alternative is allowed"));
            }
        }
        if loose_mappings > 1 {
            return invalid("only one mapping alternative may declare loose properties".to_string());
        }
        Ok(())
    }
}

fn inheritance_too_deep() -> TemplateError {
    TemplateError::InvalidSchema(format!(
        "Inheritance depth exceeded {MAX_INHERITANCE_DEPTH}"
    ))
}

/// A definition together with the expression context allowed at its
/// position. The context only grows while descending.
#[derive(Debug, Clone)]
pub(crate) struct DefinitionInfo<'s> {
    pub definition: &'s Definition,
    pub allowed_context: Rc<[String]>,
}

impl<'s> DefinitionInfo<'s> {
    pub fn root(schema: &'s TemplateSchema, name: &str) -> TemplateResult<Self> {
        let definition = schema.get_definition(name)?;
        Ok(Self {
            definition,
            allowed_context: dedup_ignore_case(definition.context.iter()).into(),
        })
    }

    pub fn child(&self, schema: &'s TemplateSchema, name: &str) -> TemplateResult<Self> {
        let definition = schema.get_definition(name)?;
        let allowed_context = if definition.context.is_empty() {
            Rc::clone(&self.allowed_context)
        } else {
            dedup_ignore_case(self.allowed_context.iter().chain(definition.context.iter())).into()
        };
        Ok(Self {
            definition,
            allowed_context,
        })
    }

    pub fn expressions_allowed(&self) -> bool {
        !self.allowed_context.is_empty()
    }
}

fn dedup_ignore_case<'a>(names: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .filter(|name| seen.insert(name.to_lowercase()))
        .cloned()
        .collect()
}

/// Messages for a finished mapping: an ambiguous one-of, or missing
/// required properties when exactly one shape remains.
///
/// For the ambiguity hint, properties declared by exactly one candidate are
/// listed alphabetically.
pub(crate) fn mapping_shape_errors(
    candidates: &[&MappingDefinition],
    present_keys: &HashSet<String>,
    has_expression_key: bool,
) -> Vec<String> {
    match candidates {
        [] => Vec::new(),
        [only] => {
            if has_expression_key {
                return Vec::new();
            }
            only.properties
                .iter()
                .filter(|(name, property)| {
                    property.required && !present_keys.contains(&name.to_lowercase())
                })
                .map(|(name, _)| crate::errors::required_property_missing(name))
                .collect()
        }
        several => {
            let mut hits: BTreeMap<&str, usize> = BTreeMap::new();
            for candidate in several {
                for name in candidate.properties.keys() {
                    *hits.entry(name.as_str()).or_default() += 1;
                }
            }
            let unique: Vec<&str> = hits
                .into_iter()
                .filter(|(_, count)| *count == 1)
                .map(|(name, _)| name)
                .collect();
            vec![crate::errors::unable_to_determine_one_of(&unique.join(", "))]
        }
    }
}
