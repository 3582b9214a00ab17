//! Evaluator integration tests: read once, evaluate against runtime values

use serde_json::json;
use weft_core::{NullTraceWriter, TemplateConfig, TemplateError, Token, TokenKind};
use weft_template::schema::{Definition, BOOLEAN, MAPPING, NULL, NUMBER, SEQUENCE, STRING};
use weft_template::{EventObjectReader, SchemaRegistry, TemplateContext, TemplateEngine};
use weft_test_utils::assertions::*;
use weft_test_utils::fixtures::*;
use weft_test_utils::{MockExpressionEngine, RecordingTraceWriter, TraceLevel};

fn read(engine: &TemplateEngine, source: &str) -> Token {
    let mut context = engine.context();
    let token = read_yaml(engine, &mut context, "workflow", source);
    assert_no_errors(&context);
    token
}

fn evaluate(engine: &TemplateEngine, context: &mut TemplateContext, template: &Token) -> Token {
    engine
        .evaluate(context, "workflow", template, 0, None)
        .expect("evaluation aborted")
        .expect("workflow type is known")
}

fn steps_source(steps: &str) -> String {
    format!("jobs:\n  build:\n    runs-on: linux\n    steps:\n{}", steps)
}

fn steps_json(token: &Token) -> serde_json::Value {
    token.to_json()["jobs"]["build"]["steps"].clone()
}

// ============================================================================
// FULL DOCUMENT
// ============================================================================

#[test]
fn test_ci_workflow_evaluates() {
    let engine = workflow_engine();
    let template = read(&engine, CI_WORKFLOW);
    let mut context = evaluation_context(&engine);
    let result = evaluate(&engine, &mut context, &template);
    assert_no_errors(&context);

    assert_eq!(
        result.to_json(),
        json!({
            "name": "ci",
            "env": { "CI": "true", "REF": "refs/heads/main" },
            "jobs": {
                "build": {
                    "runs-on": "linux",
                    "timeout-minutes": 30,
                    "env": { "OS": "linux", "DEBUG": "1" },
                    "steps": [
                        { "uses": "actions/checkout@v4" },
                        { "run": "echo building refs/heads/main on linux" },
                        { "run": "cargo test" },
                        {
                            "name": "cache",
                            "uses": "actions/cache@v4",
                            "with": { "key": "hash:**/Cargo.lock" }
                        }
                    ]
                }
            }
        })
    );
}

#[test]
fn test_read_and_evaluate_in_one_context() {
    let engine = workflow_engine();
    let mut context = evaluation_context(&engine);
    let mut reader = EventObjectReader::from_yaml_str(CI_WORKFLOW).unwrap();
    let read = engine.read(&mut context, "workflow", &mut reader, Some("ci.yml")).unwrap();
    let template = read.token.unwrap();

    let result = engine
        .evaluate(&mut context, "workflow", &template, read.bytes, Some("ci.yml"))
        .unwrap()
        .unwrap();
    assert_no_errors(&context);
    assert_eq!(result.to_json()["jobs"]["build"]["runs-on"], json!("linux"));
}

#[test]
fn test_evaluation_is_deterministic() {
    let engine = workflow_engine();
    let template = read(&engine, CI_WORKFLOW);
    let first = evaluate(&engine, &mut evaluation_context(&engine), &template);
    let second = evaluate(&engine, &mut evaluation_context(&engine), &template);
    assert_eq!(first, second);
}

#[test]
fn test_evaluating_evaluated_output_is_stable() {
    let engine = workflow_engine();
    let template = read(&engine, CI_WORKFLOW);
    let once = evaluate(&engine, &mut evaluation_context(&engine), &template);
    let mut context = evaluation_context(&engine);
    let twice = evaluate(&engine, &mut context, &once);
    assert_no_errors(&context);
    assert_eq!(once.to_json(), twice.to_json());
}

// ============================================================================
// PARTIAL CONTEXT
// ============================================================================

#[test]
fn test_missing_runtime_context_defers_expressions() {
    let engine = workflow_engine();
    let template = read(&engine, CI_WORKFLOW);

    // Only `github` and `vars` are known at this stage
    let mut context = engine.context();
    context.values = workflow_values();
    context.values.remove("matrix");
    let result = evaluate(&engine, &mut context, &template);
    assert_no_errors(&context);

    let json = result.to_json();
    assert_eq!(json["env"]["REF"], json!("refs/heads/main"));
    let build = result.get("jobs").and_then(|jobs| jobs.get("build")).unwrap();
    assert_eq!(
        build.get("runs-on").map(|t| &t.kind),
        Some(&TokenKind::BasicExpression("matrix.os".into()))
    );
    assert_eq!(
        build.get("timeout-minutes").map(|t| &t.kind),
        Some(&TokenKind::BasicExpression("matrix.timeout".into()))
    );
}

// ============================================================================
// DIRECTIVES
// ============================================================================

#[test]
fn test_insert_spreads_mapping() {
    let engine = workflow_engine();
    let template = read(
        &engine,
        "jobs:\n  build:\n    runs-on: linux\n    env:\n      A: a\n      ${{ insert }}: ${{ vars.extra_env }}\n      Z: z\n",
    );
    let mut context = evaluation_context(&engine);
    let result = evaluate(&engine, &mut context, &template);
    assert_no_errors(&context);

    let env = result.to_json()["jobs"]["build"]["env"].clone();
    let keys: Vec<&String> = env.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["A", "DEBUG", "Z"]);
}

#[test]
fn test_insert_duplicate_key_reported() {
    let engine = workflow_engine();
    let template = read(
        &engine,
        "jobs:\n  build:\n    runs-on: linux\n    env:\n      debug: '0'\n      ${{ insert }}: ${{ vars.extra_env }}\n",
    );
    let mut context = evaluation_context(&engine);
    let result = evaluate(&engine, &mut context, &template);
    assert_errors(&context, &[TemplateError::DuplicateKey { key: "DEBUG".to_string() }]);
    assert_eq!(result.to_json()["jobs"]["build"]["env"], json!({ "debug": "0" }));
}

#[test]
fn test_sequence_insertion() {
    let engine = workflow_engine();
    let template = read(
        &engine,
        &steps_source("      - run: first\n      - ${{ vars.extra_steps }}\n      - run: last\n"),
    );
    let mut context = evaluation_context(&engine);
    let result = evaluate(&engine, &mut context, &template);
    assert_no_errors(&context);
    assert_eq!(
        steps_json(&result),
        json!([{ "run": "first" }, { "run": "cargo test" }, { "run": "last" }])
    );
}

#[test]
fn test_conditional_steps() {
    let engine = workflow_engine();
    let source = steps_source(
        r#"      - ${{ if startsWith(github.ref, 'refs/tags/') }}:
          - run: release
      - ${{ elseif contains(github.ref, 'main') }}:
          - run: nightly
      - ${{ else }}:
          - run: check
      - run: always
"#,
    );
    let template = read(&engine, &source);
    let mut context = evaluation_context(&engine);
    let result = evaluate(&engine, &mut context, &template);
    assert_no_errors(&context);
    assert_eq!(steps_json(&result), json!([{ "run": "nightly" }, { "run": "always" }]));
}

#[test]
fn test_each_over_sequence() {
    let engine = workflow_engine();
    let source = steps_source(
        r#"      - ${{ each target in vars.targets }}:
          - run: cargo build --target ${{ target }}
"#,
    );
    let template = read(&engine, &source);
    let mut context = evaluation_context(&engine);
    let result = evaluate(&engine, &mut context, &template);
    assert_no_errors(&context);
    assert_eq!(
        steps_json(&result),
        json!([
            { "run": "cargo build --target x86_64" },
            { "run": "cargo build --target aarch64" }
        ])
    );
}

#[test]
fn test_each_over_missing_collection() {
    let engine = workflow_engine();
    let source = steps_source(
        r#"      - run: before
      - ${{ each target in vars.none }}:
          - run: ${{ target }}
"#,
    );
    let template = read(&engine, &source);
    let mut context = evaluation_context(&engine);
    let result = evaluate(&engine, &mut context, &template);
    assert_errors(&context, &[TemplateError::ExpectedSequence]);
    assert_eq!(steps_json(&result), json!([{ "run": "before" }]));
}

#[test]
fn test_each_over_empty_sequence_yields_nothing() {
    let engine = workflow_engine();
    let source = steps_source(
        r#"      - run: before
      - ${{ each target in vars.empty }}:
          - run: ${{ target }}
"#,
    );
    let template = read(&engine, &source);
    let mut context = evaluation_context(&engine);
    context.values = weft_template::ExpressionValues::from_json(&json!({
        "github": { "ref": "refs/heads/main" },
        "vars": { "empty": [] },
        "matrix": {}
    }));
    let result = evaluate(&engine, &mut context, &template);
    assert_no_errors(&context);
    assert_eq!(steps_json(&result), json!([{ "run": "before" }]));
}

// ============================================================================
// NATIVE VALUES AND INTERPOLATION
// ============================================================================

/// Engine whose root accepts any value and may reference `x`.
fn slot_engine() -> TemplateEngine {
    let schema = SchemaRegistry::builder()
        .definition(
            "slot",
            Definition::one_of([NULL, BOOLEAN, NUMBER, STRING, SEQUENCE, MAPPING]).with_context(["x"]),
        )
        .build()
        .expect("slot schema is valid");
    TemplateEngine::new(schema, TemplateConfig::default())
        .expect("default config is valid")
        .with_trace_writer(NullTraceWriter)
}

fn evaluate_slot(engine: &TemplateEngine, template: &Token, x: Token) -> (Token, TemplateContext) {
    let mut context = engine.context();
    context.values.insert("x", x);
    let result = engine
        .evaluate(&mut context, "slot", template, 0, None)
        .expect("evaluation aborted")
        .expect("slot type is known");
    (result, context)
}

#[test]
fn test_whole_value_expression_keeps_native_type() {
    let engine = slot_engine();
    let template = Token::expression("x");

    let (number, context) = evaluate_slot(&engine, &template, Token::number(3.0));
    assert_no_errors(&context);
    assert_eq!(number.kind, TokenKind::Number(3.0));

    let items = Token::sequence(vec![Token::number(1.0), Token::number(2.0)]);
    let (sequence, context) = evaluate_slot(&engine, &template, items);
    assert_no_errors(&context);
    assert!(matches!(sequence.kind, TokenKind::Sequence(_)), "{:?}", sequence);
    assert_eq!(sequence.to_json(), json!([1, 2]));
}

#[test]
fn test_interpolated_string_formats_segments() {
    let engine = slot_engine();
    let mut context = engine.context();
    let mut reader = EventObjectReader::from_yaml_str("a-${{ x }}-b").unwrap();
    let template = engine.read(&mut context, "slot", &mut reader, None).unwrap().token.unwrap();
    assert_no_errors(&context);
    assert_eq!(template.kind, TokenKind::BasicExpression("format('a-{0}-b', x)".into()));

    let (result, context) = evaluate_slot(&engine, &template, Token::string("Z"));
    assert_no_errors(&context);
    assert_eq!(result.as_str(), Some("a-Z-b"));

    // A null segment renders empty
    let (result, context) = evaluate_slot(&engine, &template, Token::null());
    assert_no_errors(&context);
    assert_eq!(result.as_str(), Some("a--b"));
}

// ============================================================================
// ERRORS
// ============================================================================

#[test]
fn test_failed_expression_is_reported() {
    let expressions = MockExpressionEngine::new()
        .with_result("matrix.os", Token::string("linux"))
        .with_failure("matrix.timeout", "timeout is not configured");
    let engine = workflow_engine().with_expression_engine(expressions.clone());
    let template = read(
        &engine,
        "jobs:\n  build:\n    runs-on: ${{ matrix.os }}\n    timeout-minutes: ${{ matrix.timeout }}\n",
    );

    let mut context = evaluation_context(&engine);
    let result = evaluate(&engine, &mut context, &template);
    // The failed value collapses to an empty string, which is not a number
    assert_errors(
        &context,
        &[
            TemplateError::ExpressionFailed {
                message: "timeout is not configured".to_string(),
            },
            TemplateError::UnexpectedValue { value: String::new() },
        ],
    );
    assert_eq!(result.to_json()["jobs"]["build"]["runs-on"], json!("linux"));
    assert_eq!(expressions.calls(), vec!["matrix.os", "matrix.timeout"]);
}

#[test]
fn test_result_of_wrong_shape_is_reported() {
    let engine = workflow_engine();
    let template = read(&engine, "jobs:\n  build:\n    runs-on: linux\n    timeout-minutes: ${{ matrix.os }}\n");
    let mut context = evaluation_context(&engine);
    evaluate(&engine, &mut context, &template);
    assert_errors(&context, &[TemplateError::UnexpectedValue { value: "linux".to_string() }]);
}

#[test]
fn test_trace_records_evaluation() {
    let trace = RecordingTraceWriter::new();
    let engine = workflow_engine().with_trace_writer(trace.clone());
    let template = read(&engine, "jobs:\n  build:\n    runs-on: ${{ vars.runner }}\n");
    let mut context = evaluation_context(&engine);
    engine
        .evaluate(&mut context, "workflow", &template, 0, Some("ci.yml"))
        .unwrap();

    let info = trace.messages(TraceLevel::Info);
    assert_eq!(info.first().map(String::as_str), Some("Begin evaluating template 'ci.yml'"));
    assert_eq!(info.last().map(String::as_str), Some("Finished evaluating template 'ci.yml'"));
}

#[test]
fn test_event_limit_is_fatal() {
    let mut config = workflow_config();
    config.limits.max_events = 20;
    let engine = workflow_engine_with(config);
    let template = read(&workflow_engine(), CI_WORKFLOW);
    let mut context = evaluation_context(&engine);
    let result = engine.evaluate(&mut context, "workflow", &template, 0, None);
    assert_resource_exceeded(&result, weft_core::Resource::Events);
}
