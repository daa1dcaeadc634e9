/*
 * commands/check.rs
 * Copyright (c) 2025 Posit, PBC
 */

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use pipeline_templating::schema::{BOOLEAN, MAPPING, NULL, NUMBER, SEQUENCE, STRING};
use pipeline_templating::{
    Definition, JsonObjectReader, ObjectReader, TemplateContext, TemplateLimits, TemplateSchema,
    YamlObjectReader, read_template,
};
use tracing::info;

/// Root definition: any document, with expressions allowed throughout.
const PIPELINE: &str = "pipeline";

/// Named values an expression in a pipeline may refer to.
const CONTEXTS: &[&str] = &["github", "env", "inputs", "matrix"];

pub fn execute(file: &Path, max_bytes: Option<usize>, max_depth: Option<usize>) -> Result<()> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut limits = TemplateLimits::default();
    if let Some(max_bytes) = max_bytes {
        limits = limits.with_max_bytes(max_bytes);
    }
    if let Some(max_depth) = max_depth {
        limits = limits.with_max_depth(max_depth);
    }

    let errors = check_document(&file.display().to_string(), &content, limits)?;
    for error in &errors {
        println!("{error}");
    }
    if !errors.is_empty() {
        bail!("{} error(s) found in {}", errors.len(), file.display());
    }
    println!("{}: OK", file.display());
    Ok(())
}

fn pipeline_schema() -> TemplateSchema {
    TemplateSchema::new().with_definition(
        PIPELINE,
        Definition::one_of([NULL, BOOLEAN, NUMBER, STRING, SEQUENCE, MAPPING])
            .with_context(CONTEXTS.iter().copied()),
    )
}

/// Read `content` and return the recorded error messages.
fn check_document(name: &str, content: &str, limits: TemplateLimits) -> Result<Vec<String>> {
    let schema = pipeline_schema();
    schema.validate()?;

    let mut source: Box<dyn ObjectReader> = if name.ends_with(".json") {
        Box::new(JsonObjectReader::parse(content)?)
    } else {
        Box::new(YamlObjectReader::new(content)?)
    };

    let mut context = TemplateContext::new(Arc::new(schema), limits);
    let file_id = context.get_file_id(name);
    let (token, bytes) = read_template(&mut context, PIPELINE, &mut *source, Some(file_id));
    info!(file = name, bytes, complete = token.is_some(), "Read pipeline");

    Ok(context.errors().iter().map(|e| e.message.clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_contexts() {
        let errors = check_document(
            "ci.yml",
            "on: push\njobs:\n  test:\n    runs-on: ${{ matrix.os }}\n    env:\n      REF: ${{ github.ref }}\n",
            TemplateLimits::default(),
        )
        .unwrap();
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn reports_unknown_contexts_with_location() {
        let errors = check_document(
            "ci.yml",
            "run: echo ${{ secrets.token }}\n",
            TemplateLimits::default(),
        )
        .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("ci.yml (Line: 1, "), "{errors:?}");
    }

    #[test]
    fn reads_json_documents() {
        let errors = check_document(
            "ci.json",
            r#"{"steps": [{"run": "${{ inputs.cmd }}"}]}"#,
            TemplateLimits::default(),
        )
        .unwrap();
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn invalid_yaml_is_a_hard_error() {
        assert!(check_document("ci.yml", "a: [1\n", TemplateLimits::default()).is_err());
    }
}
