/// Template Tracer - Shows the flow through Source → Reader → Evaluator
///
/// Usage: cargo run --bin trace_template <schema.yml> <type> <template.yml> [values.json]
///
/// Limits come from `WEFT_*` environment variables; log verbosity from `RUST_LOG`.

use std::fs;
use std::process;
use tracing_subscriber::EnvFilter;
use weft_core::{TemplateConfig, Token};
use weft_template::{EventObjectReader, ExpressionValues, SchemaRegistry, TemplateContext, TemplateEngine};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: cargo run --bin trace_template <schema.yml> <type> <template.yml> [values.json]");
        eprintln!();
        eprintln!("Example:");
        eprintln!("  cargo run --bin trace_template schema.yml workflow ci.yml values.json");
        process::exit(1);
    }

    let schema_source = read_file(&args[1]);
    let type_name = &args[2];
    let template_path = &args[3];
    let template_source = read_file(template_path);

    let schema = match SchemaRegistry::from_yaml_str(&schema_source) {
        Ok(schema) => schema,
        Err(e) => fail(&format!("Invalid schema {}: {}", args[1], e)),
    };
    let config = match TemplateConfig::from_env() {
        Ok(config) => config,
        Err(e) => fail(&format!("Invalid configuration: {}", e)),
    };
    let engine = match TemplateEngine::new(schema, config) {
        Ok(engine) => engine,
        Err(e) => fail(&format!("Invalid configuration: {}", e)),
    };

    println!("╔═══════════════════════════════════════════════════════════════");
    println!("║ TEMPLATE TRACER");
    println!("╚═══════════════════════════════════════════════════════════════\n");

    // Step 1: Read
    let mut reader = match EventObjectReader::from_yaml_str(&template_source) {
        Ok(reader) => reader,
        Err(e) => fail(&format!("Failed to parse {}: {}", template_path, e)),
    };
    let mut context = engine.context();
    let read = match engine.read(&mut context, type_name, &mut reader, Some(template_path)) {
        Ok(read) => read,
        Err(e) => fail(&format!("Read aborted: {}", e)),
    };

    println!("🔍 READER OUTPUT ({} bytes):", read.bytes);
    println!("─────────────────────────────────────────────────────────────");
    if let Some(token) = &read.token {
        print_token(token);
    }
    print_errors(&context);

    // Step 2: Evaluate
    let (Some(template), Some(values_path)) = (read.token, args.get(4)) else {
        return;
    };
    let values_source = read_file(values_path);
    let values = match serde_json::from_str::<serde_json::Value>(&values_source) {
        Ok(values) => ExpressionValues::from_json(&values),
        Err(e) => fail(&format!("Invalid values {}: {}", values_path, e)),
    };

    let mut context = engine.context();
    context.values = values;
    println!("\n⚙️  EVALUATOR OUTPUT:");
    println!("─────────────────────────────────────────────────────────────");
    match engine.evaluate(&mut context, type_name, &template, 0, Some(template_path)) {
        Ok(Some(token)) => print_token(&token),
        Ok(None) => {}
        Err(e) => fail(&format!("Evaluation aborted: {}", e)),
    }
    print_errors(&context);
}

fn read_file(path: &str) -> String {
    match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => fail(&format!("Failed to read {}: {}", path, e)),
    }
}

fn print_token(token: &Token) {
    match serde_json::to_string_pretty(&token.to_json()) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("❌ Failed to render output: {}", e),
    }
}

fn print_errors(context: &TemplateContext) {
    if context.errors.is_empty() {
        println!("\n✅ No errors");
        return;
    }
    println!("\n❌ {} error(s):", context.errors.len());
    for error in context.errors.iter() {
        println!("  - {}", error);
    }
}

fn fail(message: &str) -> ! {
    eprintln!("❌ {}", message);
    process::exit(1);
}
