/*
 * functions/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Function library and registry.
//!
//! Functions receive their parameters unevaluated and evaluate them on
//! demand through the [`EvaluationContext`], which lets `case` and `in`
//! short-circuit.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::ast::ExpressionNode;
use crate::error::ExpressionResult;
use crate::evaluator::EvaluationContext;
use crate::value::Value;

mod case;
mod collections;
mod format;
mod hash_files;
mod json;
mod strings;

/// Name and arity of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: Cow<'static, str>,
    pub min_parameters: usize,
    pub max_parameters: usize,
}

impl FunctionInfo {
    pub fn new(name: impl Into<Cow<'static, str>>, min_parameters: usize, max_parameters: usize) -> Self {
        Self {
            name: name.into(),
            min_parameters,
            max_parameters,
        }
    }

    const fn builtin(name: &'static str, min_parameters: usize, max_parameters: usize) -> Self {
        Self {
            name: Cow::Borrowed(name),
            min_parameters,
            max_parameters,
        }
    }

    /// Parse a signature such as `hashFiles(1,255)`.
    ///
    /// Returns `None` when `text` is not of the form `name(min,max)`.
    pub fn parse_signature(text: &str) -> Option<Self> {
        let (name, rest) = text.split_once('(')?;
        let arguments = rest.strip_suffix(')')?;
        let (min, max) = arguments.split_once(',')?;
        let min = min.trim().parse().ok()?;
        let max = max.trim().parse().ok()?;
        let name = name.trim();
        if name.is_empty() || min > max {
            return None;
        }
        Some(Self::new(name.to_string(), min, max))
    }
}

impl fmt::Display for FunctionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.name, self.min_parameters, self.max_parameters)
    }
}

/// Functions every parser and evaluator knows about.
pub const BUILTIN_FUNCTIONS: &[FunctionInfo] = &[
    FunctionInfo::builtin("case", 3, usize::MAX),
    FunctionInfo::builtin("contains", 2, 2),
    FunctionInfo::builtin("count", 1, 1),
    FunctionInfo::builtin("endsWith", 2, 2),
    FunctionInfo::builtin("format", 1, usize::MAX),
    FunctionInfo::builtin("fromJson", 1, 1),
    FunctionInfo::builtin("hashFiles", 1, 255),
    FunctionInfo::builtin("in", 2, usize::MAX),
    FunctionInfo::builtin("join", 1, 2),
    FunctionInfo::builtin("replace", 3, 3),
    FunctionInfo::builtin("split", 1, 2),
    FunctionInfo::builtin("startsWith", 2, 2),
    FunctionInfo::builtin("toJson", 1, 1),
];

/// A callable expression function.
pub trait Function: Send + Sync {
    fn evaluate(
        &self,
        context: &mut EvaluationContext<'_>,
        parameters: &[ExpressionNode],
    ) -> ExpressionResult<Value>;
}

impl<F> Function for F
where
    F: Fn(&mut EvaluationContext<'_>, &[ExpressionNode]) -> ExpressionResult<Value> + Send + Sync,
{
    fn evaluate(
        &self,
        context: &mut EvaluationContext<'_>,
        parameters: &[ExpressionNode],
    ) -> ExpressionResult<Value> {
        self(context, parameters)
    }
}

/// Case-insensitive table of functions available during evaluation.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    entries: Vec<(FunctionInfo, Arc<dyn Function>)>,
    index: HashMap<String, usize>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in function library.
    pub fn builtin() -> Self {
        let implementations: [(&str, Arc<dyn Function>); 13] = [
            ("case", Arc::new(case::case)),
            ("contains", Arc::new(collections::contains)),
            ("count", Arc::new(collections::count)),
            ("endsWith", Arc::new(strings::ends_with)),
            ("format", Arc::new(format::format)),
            ("fromJson", Arc::new(json::from_json)),
            ("hashFiles", Arc::new(hash_files::hash_files)),
            ("in", Arc::new(collections::is_in)),
            ("join", Arc::new(collections::join)),
            ("replace", Arc::new(strings::replace)),
            ("split", Arc::new(collections::split)),
            ("startsWith", Arc::new(strings::starts_with)),
            ("toJson", Arc::new(json::to_json)),
        ];
        let mut registry = Self::new();
        for (info, (name, function)) in BUILTIN_FUNCTIONS.iter().zip(implementations) {
            debug_assert_eq!(info.name, name);
            registry.insert(info.clone(), function);
        }
        registry
    }

    /// Register a function, replacing any existing one with the same name.
    pub fn register(&mut self, info: FunctionInfo, function: impl Function + 'static) {
        self.insert(info, Arc::new(function));
    }

    fn insert(&mut self, info: FunctionInfo, function: Arc<dyn Function>) {
        let key = info.name.to_lowercase();
        match self.index.get(&key) {
            Some(&position) => self.entries[position] = (info, function),
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push((info, function));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<(&FunctionInfo, &dyn Function)> {
        let position = *self.index.get(&name.to_lowercase())?;
        let (info, function) = &self.entries[position];
        Some((info, function.as_ref()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    pub fn infos(&self) -> impl Iterator<Item = &FunctionInfo> + '_ {
        self.entries.iter().map(|(info, _)| info)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.infos()).finish()
    }
}

/// Evaluate a parameter and coerce primitives to text. Containers yield `None`.
pub(crate) fn primitive_string(
    context: &mut EvaluationContext<'_>,
    parameter: &ExpressionNode,
) -> ExpressionResult<Option<String>> {
    let value = context.evaluate(parameter)?;
    Ok(value.is_primitive().then(|| value.convert_to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_signatures() {
        assert_eq!(
            FunctionInfo::parse_signature("hashFiles(1,255)"),
            Some(FunctionInfo::new("hashFiles", 1, 255))
        );
        assert_eq!(
            FunctionInfo::parse_signature("always( 0 , 0 )"),
            Some(FunctionInfo::new("always", 0, 0))
        );
        assert_eq!(FunctionInfo::parse_signature("github"), None);
        assert_eq!(FunctionInfo::parse_signature("bad(2,1)"), None);
    }

    #[test]
    fn builtin_registry_covers_the_library() {
        let registry = FunctionRegistry::builtin();
        assert_eq!(registry.len(), BUILTIN_FUNCTIONS.len());
        assert!(registry.contains("TOJSON"));
        assert_eq!(registry.get("hashfiles").map(|(info, _)| info.max_parameters), Some(255));
    }

    #[test]
    fn registering_replaces_by_name() {
        fn noop(_: &mut EvaluationContext<'_>, _: &[ExpressionNode]) -> ExpressionResult<Value> {
            Ok(Value::Null)
        }
        let mut registry = FunctionRegistry::builtin();
        registry.register(FunctionInfo::new("Format", 0, 0), noop);
        assert_eq!(registry.len(), BUILTIN_FUNCTIONS.len());
        assert_eq!(registry.get("format").map(|(info, _)| info.max_parameters), Some(0));
    }
}
