/*
 * commands/eval.rs
 * Copyright (c) 2025 Posit, PBC
 */

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use pipeline_expressions::{Dictionary, EvaluationOptions, Value, evaluate_str};
use tracing::debug;

pub fn execute(expression: &str, context: Option<&Path>, workspace: Option<PathBuf>) -> Result<()> {
    let values = match context {
        Some(path) => load_context(path)?,
        None => Dictionary::new(),
    };
    let options = EvaluationOptions {
        workspace,
        ..EvaluationOptions::default()
    };

    let value = evaluate(expression, &values, &options)?;
    println!("{}", serde_json::to_string_pretty(&value.to_json())?);
    Ok(())
}

fn evaluate(expression: &str, values: &Dictionary, options: &EvaluationOptions) -> Result<Value> {
    debug!(expression, "Evaluating");
    evaluate_str(expression, values, options)
        .with_context(|| format!("Failed to evaluate '{expression}'"))
}

/// Named values from the top-level keys of a JSON object.
fn load_context(path: &Path) -> Result<Dictionary> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read context file {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    let Some(object) = json.as_object() else {
        bail!("Context file must hold a JSON object: {}", path.display());
    };

    let mut values = Dictionary::with_capacity(object.len());
    for (name, value) in object {
        values.insert(name.clone(), Value::from_json(value));
    }
    Ok(values)
}
