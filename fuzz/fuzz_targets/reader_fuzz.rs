//! Fuzz test for reading and evaluating templates
//!
//! Arbitrary YAML is read against a small schema that allows expressions and
//! every directive, then evaluated with the document itself as `inputs`.
//! Neither pass may panic or leave the depth counter raised.
//!
//! Run with: cargo +nightly fuzz run reader_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use weft_core::{NullTraceWriter, TemplateConfig, TemplateLimits};
use weft_template::{EventObjectReader, ExpressionValues, SchemaRegistry, TemplateEngine};

const SCHEMA: &str = r#"
definitions:
  doc:
    context: [inputs]
    mapping:
      properties:
        name: string
        steps: steps
      loose-key-type: string
      loose-value-type: any
  steps:
    sequence:
      item-type: step
  step:
    one-of: [run-step, string]
  run-step:
    mapping:
      properties:
        run:
          type: string
          required: true
"#;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(mut reader) = EventObjectReader::from_yaml_str(source) else {
        return;
    };
    let Ok(schema) = SchemaRegistry::from_yaml_str(SCHEMA) else {
        return;
    };
    let config = TemplateConfig {
        extended_directives: true,
        limits: TemplateLimits {
            max_depth: 32,
            max_events: 10_000,
            max_bytes: 1 << 20,
            ..TemplateLimits::default()
        },
    };
    let Ok(engine) = TemplateEngine::new(schema, config) else {
        return;
    };
    let engine = engine.with_trace_writer(NullTraceWriter);

    let mut context = engine.context();
    let Ok(read) = engine.read(&mut context, "doc", &mut reader, Some("fuzz.yml")) else {
        return;
    };
    assert_eq!(context.memory.depth(), 0, "depth must unwind after a read");
    let Some(template) = read.token else {
        return;
    };

    let mut values = ExpressionValues::new();
    values.insert("inputs", template.clone());
    context.values = values;
    if engine
        .evaluate(&mut context, "doc", &template, read.bytes, Some("fuzz.yml"))
        .is_ok()
    {
        assert_eq!(context.memory.depth(), 0, "depth must unwind after evaluation");
    }
});
