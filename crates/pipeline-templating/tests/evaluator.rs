/*
 * tests/evaluator.rs
 * Copyright (c) 2025 Posit, PBC
 */

use std::sync::Arc;

use pipeline_expressions::{FunctionInfo, Value};
use pipeline_templating::schema::{ANY, Definition, MappingDefinition, PropertyValue, STRING};
use pipeline_templating::{
    JsonObjectWriter, NoopTraceWriter, TemplateContext, TemplateLimits, TemplateSchema,
    TemplateToken, YamlObjectReader, evaluate_template, read_template, write_template,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn job_schema() -> TemplateSchema {
    TemplateSchema::new()
        .with_definition(
            "job",
            Definition::mapping(
                MappingDefinition::new()
                    .with_property("runs-on", PropertyValue::required("job-string"))
                    .with_property("env", PropertyValue::new("job-env"))
                    .with_property("steps", PropertyValue::new("job-steps")),
            )
            .with_context(["matrix", "github"]),
        )
        .with_definition("job-string", Definition::string(Default::default()))
        .with_definition(
            "job-env",
            Definition::mapping(MappingDefinition::new().with_loose(STRING, STRING)),
        )
        .with_definition("job-steps", Definition::sequence(STRING))
}

fn context(limits: TemplateLimits) -> TemplateContext {
    let mut context =
        TemplateContext::new(Arc::new(job_schema()), limits).with_trace_writer(NoopTraceWriter);
    context.insert_expression_value(
        "matrix",
        Value::from_json(&json!({
            "os": "ubuntu",
            "env": {"CI": "true", "LANG": "C"},
            "steps": ["build", "test"],
        })),
    );
    context
}

/// Read `yaml` as a job, evaluate it and project the result as JSON.
fn evaluate(context: &mut TemplateContext, yaml: &str) -> Option<serde_json::Value> {
    let file_id = context.get_file_id("job.yml");
    let mut source = YamlObjectReader::new(yaml).unwrap();
    let (token, _) = read_template(context, "job", &mut source, Some(file_id));
    let token = token?;
    let evaluated = evaluate_template(context, "job", &token, Some(file_id))?;
    let mut sink = JsonObjectWriter::new();
    write_template(&mut sink, &evaluated).unwrap();
    sink.into_value()
}

fn messages(context: &TemplateContext) -> Vec<String> {
    context.errors().iter().map(|e| e.message.clone()).collect()
}

#[test]
fn expands_expressions_and_folded_text() {
    let mut context = context(TemplateLimits::default());
    let result = evaluate(
        &mut context,
        "runs-on: ${{ matrix.os }}-latest\nsteps: ${{ matrix.steps }}\n",
    );
    assert_eq!(messages(&context), Vec::<String>::new());
    assert_eq!(
        result,
        Some(json!({"runs-on": "ubuntu-latest", "steps": ["build", "test"]}))
    );
}

#[test]
fn insert_splices_mapping_pairs() {
    let mut context = context(TemplateLimits::default());
    let result = evaluate(
        &mut context,
        "runs-on: x\nenv:\n  FIRST: 1\n  ${{ insert }}: ${{ matrix.env }}\n  LAST: 2\n",
    );
    assert_eq!(messages(&context), Vec::<String>::new());
    assert_eq!(
        result,
        Some(json!({
            "runs-on": "x",
            "env": {"FIRST": "1", "CI": "true", "LANG": "C", "LAST": "2"},
        }))
    );
}

#[test]
fn insert_of_a_scalar_is_an_error() {
    let mut context = context(TemplateLimits::default());
    let result = evaluate(&mut context, "runs-on: x\nenv:\n  ${{ insert }}: ${{ matrix.os }}\n");
    assert_eq!(result, Some(json!({"runs-on": "x", "env": {}})));
    let errors = messages(&context);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].ends_with("The directive 'insert' requires a mapping value"));
}

#[test]
fn spliced_duplicates_are_rejected() {
    let mut context = context(TemplateLimits::default());
    evaluate(&mut context, "runs-on: x\nenv:\n  ci: yes\n  ${{ insert }}: ${{ matrix.env }}\n");
    let errors = messages(&context);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].ends_with("'CI' is already defined"));
}

#[test]
fn dynamic_keys_evaluate_to_literals() {
    let mut context = context(TemplateLimits::default());
    let result = evaluate(&mut context, "runs-on: x\nenv:\n  ${{ matrix.os }}_HOME: /opt\n");
    assert_eq!(messages(&context), Vec::<String>::new());
    assert_eq!(result, Some(json!({"runs-on": "x", "env": {"ubuntu_HOME": "/opt"}})));
}

#[test]
fn unavailable_context_is_left_for_later() {
    let mut context = context(TemplateLimits::default());
    let result = evaluate(&mut context, "runs-on: ${{ github.runner }}\n");
    assert_eq!(messages(&context), Vec::<String>::new());
    assert_eq!(result, Some(json!({"runs-on": "${{ github.runner }}"})));
}

#[test]
fn result_shape_is_validated() {
    let mut context = context(TemplateLimits::default());
    let result = evaluate(&mut context, "runs-on: ${{ matrix.steps }}\n");
    assert_eq!(result, Some(json!({"runs-on": []})));
    let errors = messages(&context);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("job.yml (Line: 1, "));
    assert!(errors[0].ends_with("A sequence was not expected"));
}

#[test]
fn function_failures_abort_the_evaluation() {
    let mut context = context(TemplateLimits::default());
    let result = evaluate(
        &mut context,
        "runs-on: x\nenv:\n  A: ${{ case(1, 'x', 'y') }}\n  B: ${{ format('{3}', 'x') }}\n",
    );
    assert_eq!(result, None);
    let errors = messages(&context);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("job.yml: "), "{errors:?}");
}

#[test]
fn malformed_json_aborts_the_evaluation() {
    let mut context = context(TemplateLimits::default());
    assert_eq!(evaluate(&mut context, "runs-on: ${{ fromJson('{') }}\n"), None);
    assert!(messages(&context)[0].contains("Error parsing fromJson"));
}

#[test]
fn registered_functions_are_available() {
    struct Runner;

    impl pipeline_expressions::Function for Runner {
        fn evaluate(
            &self,
            _context: &mut pipeline_expressions::EvaluationContext<'_>,
            _parameters: &[pipeline_expressions::ExpressionNode],
        ) -> pipeline_expressions::ExpressionResult<Value> {
            Ok(Value::from("self-hosted"))
        }
    }

    let mut context = context(TemplateLimits::default());
    context.register_function(FunctionInfo::new("runner", 0, 0), Runner);
    let token = TemplateToken::BasicExpression(pipeline_templating::BasicExpressionToken::new(
        None,
        "runner()",
    ));
    let result = evaluate_template(&mut context, ANY, &token, None).unwrap();
    assert_eq!(result.as_literal(), Some("self-hosted"));
}

#[test]
fn byte_budget_aborts_evaluation() {
    let mut context = context(TemplateLimits::default().with_max_bytes(2_000));
    context.insert_expression_value("big", Value::from("x".repeat(4_000)));
    let token = TemplateToken::BasicExpression(pipeline_templating::BasicExpressionToken::new(
        None,
        "format('{0}{0}', big)",
    ));
    assert_eq!(evaluate_template(&mut context, ANY, &token, None), None);
    assert_eq!(messages(&context), vec!["Maximum object size exceeded"]);
}
