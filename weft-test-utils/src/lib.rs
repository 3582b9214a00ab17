//! WEFT Test Utilities
//!
//! Centralized test infrastructure for the WEFT workspace:
//! - Proptest generators for tokens, values and documents
//! - Mock expression engine and recording trace sink
//! - Test fixtures for a small CI workflow schema
//! - Custom assertions for accumulated errors and fatal outcomes

// Re-export core types for convenience
pub use weft_core::{
    FatalError, FatalResult, Resource, Span, TemplateConfig, TemplateError, TemplateLimits, Token, TokenKind,
    TraceWriter, ValidationError,
};
pub use weft_template::{
    BasicExpressionEngine, EventObjectReader, ExpressionEngine, ExpressionError, ExpressionValues, SchemaRegistry,
    TemplateContext, TemplateEngine,
};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// MOCKS
// ============================================================================

/// Expression engine with canned results keyed by expression text.
///
/// Unknown expressions fail at evaluation time. Validation accepts
/// everything unless the text was registered with [`Self::with_invalid`].
#[derive(Debug, Clone, Default)]
pub struct MockExpressionEngine {
    results: HashMap<String, Result<Token, String>>,
    invalid: HashMap<String, String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockExpressionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, expression: &str, value: Token) -> Self {
        self.results.insert(expression.to_string(), Ok(value));
        self
    }

    pub fn with_failure(mut self, expression: &str, message: &str) -> Self {
        self.results.insert(expression.to_string(), Err(message.to_string()));
        self
    }

    pub fn with_invalid(mut self, expression: &str, message: &str) -> Self {
        self.invalid.insert(expression.to_string(), message.to_string());
        self
    }

    /// Expressions evaluated so far, in order. Clones share the log.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

impl ExpressionEngine for MockExpressionEngine {
    fn validate(&self, expression: &str, _allowed: &[String]) -> Result<(), ExpressionError> {
        match self.invalid.get(expression) {
            Some(message) => Err(ExpressionError::Runtime {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn evaluate(&self, expression: &str, _values: &ExpressionValues) -> Result<Token, ExpressionError> {
        lock(&self.calls).push(expression.to_string());
        match self.results.get(expression) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(message)) => Err(ExpressionError::Runtime {
                message: message.clone(),
            }),
            None => Err(ExpressionError::Runtime {
                message: format!("No mock result for '{}'", expression),
            }),
        }
    }
}

/// Level of a recorded trace line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceLevel {
    Error,
    Info,
    Verbose,
}

/// Trace sink that keeps every line. Clones share the same log, so keep one
/// clone and hand the other to the engine.
#[derive(Debug, Clone, Default)]
pub struct RecordingTraceWriter {
    lines: Arc<Mutex<Vec<(TraceLevel, String)>>>,
}

impl RecordingTraceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(TraceLevel, String)> {
        lock(&self.lines).clone()
    }

    pub fn messages(&self, level: TraceLevel) -> Vec<String> {
        lock(&self.lines)
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl TraceWriter for RecordingTraceWriter {
    fn error(&self, message: &str) {
        lock(&self.lines).push((TraceLevel::Error, message.to_string()));
    }

    fn info(&self, message: &str) {
        lock(&self.lines).push((TraceLevel::Info, message.to_string()));
    }

    fn verbose(&self, message: &str) {
        lock(&self.lines).push((TraceLevel::Verbose, message.to_string()));
    }
}

/// A panicking test thread may poison the lock; the log is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating tokens and documents.

    use super::*;
    use proptest::prelude::*;

    /// Text that never contains an expression marker.
    pub fn arb_plain_string() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 _./-]{0,16}"
    }

    /// Mapping key: non-empty, no expression marker.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,8}"
    }

    /// Integral numbers only, so values survive a trip through text formats.
    pub fn arb_number() -> impl Strategy<Value = f64> {
        (-100_000i32..100_000).prop_map(f64::from)
    }

    /// Null, boolean, number or plain string.
    pub fn arb_literal() -> impl Strategy<Value = Token> {
        prop_oneof![
            Just(Token::null()),
            any::<bool>().prop_map(Token::boolean),
            arb_number().prop_map(Token::number),
            arb_plain_string().prop_map(Token::string),
        ]
    }

    /// Expression-free token tree with unique mapping keys.
    pub fn arb_plain_token() -> impl Strategy<Value = Token> {
        arb_literal().prop_recursive(4, 64, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Token::sequence),
                prop::collection::vec((arb_key(), inner), 0..6).prop_map(|pairs| {
                    let mut seen = std::collections::HashSet::new();
                    Token::mapping(
                        pairs
                            .into_iter()
                            .filter(|(key, _)| seen.insert(key.clone()))
                            .map(|(key, value)| (Token::string(key), value))
                            .collect(),
                    )
                }),
            ]
        })
    }

    /// Named values with plain contents.
    pub fn arb_values() -> impl Strategy<Value = ExpressionValues> {
        prop::collection::btree_map(arb_key(), arb_plain_token(), 0..4)
            .prop_map(|values| values.into_iter().collect())
    }

    /// A `step-env` style mapping of keys to plain strings, with the keys in
    /// generation order.
    pub fn arb_env() -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::vec(("[A-Z][A-Z0-9_]{0,8}", arb_plain_string()), 0..8).prop_map(|pairs| {
            let mut seen = std::collections::HashSet::new();
            pairs.into_iter().filter(|(key, _)| seen.insert(key.clone())).collect()
        })
    }

    /// Text with a `${{ }}` expression somewhere inside.
    pub fn arb_interpolated_string() -> impl Strategy<Value = String> {
        ("[a-z ]{0,6}", "[a-z][a-z0-9]{0,5}", "[a-z ]{0,6}")
            .prop_map(|(prefix, name, suffix)| format!("{}${{{{ {} }}}}{}", prefix, name, suffix))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built schema, engine and documents for common testing scenarios.

    use super::*;

    /// A small CI workflow schema.
    pub const WORKFLOW_SCHEMA: &str = r#"
version: workflow-v1.0
definitions:
  workflow:
    mapping:
      properties:
        name: string
        env: workflow-env
        jobs:
          type: jobs
          required: true
  workflow-env:
    context: [github, vars]
    mapping:
      loose-key-type: non-empty-string
      loose-value-type: string
  jobs:
    mapping:
      loose-key-type: non-empty-string
      loose-value-type: job
  job:
    mapping:
      properties:
        runs-on:
          type: runs-on
          required: true
        needs: needs
        env: job-env
        timeout-minutes: timeout
        steps: steps
  runs-on:
    context: [github, vars, matrix]
    one-of: [non-empty-string, string-list]
  needs:
    one-of: [non-empty-string, string-list]
  string-list:
    sequence:
      item-type: non-empty-string
  timeout:
    context: [matrix]
    number: {}
  job-env:
    context: [github, vars, matrix]
    mapping:
      loose-key-type: non-empty-string
      loose-value-type: string
  steps:
    context: [github, vars, matrix, "hashFiles(1,255)"]
    sequence:
      item-type: step
  step:
    one-of: [run-step, uses-step]
  run-step:
    mapping:
      properties:
        name: string
        run:
          type: non-empty-string
          required: true
        shell: string
        env: step-env
  uses-step:
    mapping:
      properties:
        name: string
        uses:
          type: non-empty-string
          required: true
        with: step-with
  step-env:
    mapping:
      loose-key-type: non-empty-string
      loose-value-type: string
  step-with:
    mapping:
      loose-key-type: non-empty-string
      loose-value-type: any
  non-empty-string:
    string:
      require-non-empty: true
"#;

    /// A workflow exercising interpolation, insert and sequence insertion.
    pub const CI_WORKFLOW: &str = r#"
name: ci
env:
  CI: true
  REF: ${{ github.ref }}
jobs:
  build:
    runs-on: ${{ matrix.os }}
    timeout-minutes: ${{ matrix.timeout }}
    env:
      OS: ${{ matrix.os }}
      ${{ insert }}: ${{ vars.extra_env }}
    steps:
      - uses: actions/checkout@v4
      - run: echo building ${{ github.ref }} on ${{ matrix.os }}
      - ${{ vars.extra_steps }}
      - name: cache
        uses: actions/cache@v4
        with:
          key: ${{ hashFiles('**/Cargo.lock') }}
"#;

    pub fn workflow_schema() -> SchemaRegistry {
        match SchemaRegistry::from_yaml_str(WORKFLOW_SCHEMA) {
            Ok(schema) => schema,
            Err(e) => panic!("workflow schema fixture is invalid: {}", e),
        }
    }

    /// Default limits with `if`/`elseif`/`else`/`each` enabled.
    pub fn workflow_config() -> TemplateConfig {
        TemplateConfig {
            extended_directives: true,
            ..TemplateConfig::default()
        }
    }

    /// Engine over [`workflow_schema`] with a deterministic `hashFiles`.
    pub fn workflow_engine() -> TemplateEngine {
        workflow_engine_with(workflow_config())
    }

    pub fn workflow_engine_with(config: TemplateConfig) -> TemplateEngine {
        let expressions = BasicExpressionEngine::new().with_function("hashFiles", 1, 255, |args| {
            let patterns: Vec<String> = args.iter().map(ToString::to_string).collect();
            Ok(Token::string(format!("hash:{}", patterns.join(","))))
        });
        match TemplateEngine::new(workflow_schema(), config) {
            Ok(engine) => engine
                .with_expression_engine(expressions)
                .with_trace_writer(weft_core::NullTraceWriter),
            Err(e) => panic!("workflow config fixture is invalid: {}", e),
        }
    }

    /// Runtime values used by [`CI_WORKFLOW`].
    pub fn workflow_values() -> ExpressionValues {
        ExpressionValues::from_json(&serde_json::json!({
            "github": { "ref": "refs/heads/main", "event_name": "push" },
            "vars": {
                "extra_env": { "DEBUG": "1" },
                "extra_steps": [ { "run": "cargo test" } ],
                "targets": ["x86_64", "aarch64"]
            },
            "matrix": { "os": "linux", "timeout": 30 }
        }))
    }

    /// Context ready for evaluating the workflow fixture.
    pub fn evaluation_context(engine: &TemplateEngine) -> TemplateContext {
        let mut context = engine.context();
        context.values = workflow_values();
        context.functions.push("hashFiles".to_string());
        context
    }

    /// Read a YAML document, panicking on fatal errors. Validation errors
    /// stay on `context`.
    #[track_caller]
    pub fn read_yaml(engine: &TemplateEngine, context: &mut TemplateContext, type_name: &str, source: &str) -> Token {
        let mut reader = match EventObjectReader::from_yaml_str(source) {
            Ok(reader) => reader,
            Err(e) => panic!("fixture YAML does not parse: {}", e),
        };
        match engine.read(context, type_name, &mut reader, None) {
            Ok(result) => match result.token {
                Some(token) => token,
                None => panic!("unknown type '{}'", type_name),
            },
            Err(e) => panic!("read aborted: {}", e),
        }
    }

    /// JSON rendering of a YAML document, for comparing expected output.
    #[track_caller]
    pub fn yaml_json(source: &str) -> serde_json::Value {
        match serde_yaml::from_str(source) {
            Ok(value) => value,
            Err(e) => panic!("expected YAML does not parse: {}", e),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over accumulated errors and fatal outcomes.

    use super::*;

    /// Assert that no validation error was recorded.
    #[track_caller]
    pub fn assert_no_errors(context: &TemplateContext) {
        let messages = error_messages(context);
        assert!(messages.is_empty(), "Expected no errors, got: {:#?}", messages);
    }

    /// Assert the exact recorded messages, in order.
    #[track_caller]
    pub fn assert_error_messages(context: &TemplateContext, expected: &[&str]) {
        assert_eq!(error_messages(context), expected);
    }

    /// Assert the recorded errors by kind, in order, ignoring where they
    /// were reported.
    #[track_caller]
    pub fn assert_errors(context: &TemplateContext, expected: &[TemplateError]) {
        let errors: Vec<&TemplateError> = context.errors.iter().map(|e| &e.error).collect();
        assert_eq!(errors, expected.iter().collect::<Vec<_>>(), "{:#?}", error_messages(context));
    }

    /// Assert that some recorded error is `expected`.
    #[track_caller]
    pub fn assert_has_error(context: &TemplateContext, expected: &TemplateError) {
        assert!(
            context.errors.iter().any(|e| &e.error == expected),
            "Expected {:?} among {:#?}",
            expected,
            error_messages(context)
        );
    }

    /// Assert that a call aborted on the given resource.
    #[track_caller]
    pub fn assert_resource_exceeded<T: std::fmt::Debug>(result: &FatalResult<T>, resource: Resource) {
        match result {
            Err(error) if error.resource() == Some(resource) => {}
            other => panic!("Expected {:?} to be exceeded, got: {:?}", resource, other),
        }
    }

    pub fn error_messages(context: &TemplateContext) -> Vec<String> {
        context.errors.iter().map(|e| e.message.clone()).collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
