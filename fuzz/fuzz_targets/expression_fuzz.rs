//! Fuzz test for the expression engine
//!
//! Arbitrary text is validated and evaluated against a fixed set of named
//! values. Both calls must return Ok or Err without panicking.
//!
//! Run with: cargo +nightly fuzz run expression_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use weft_core::Token;
use weft_template::{BasicExpressionEngine, ExpressionEngine, ExpressionValues};

fuzz_target!(|data: &[u8]| {
    let Ok(expression) = std::str::from_utf8(data) else {
        return;
    };

    let engine = BasicExpressionEngine::new();
    let allowed = vec!["github".to_string(), "matrix".to_string()];
    let _ = engine.validate(expression, &allowed);

    let mut values = ExpressionValues::new();
    values.insert(
        "github",
        Token::mapping(vec![
            (Token::string("ref"), Token::string("refs/heads/main")),
            (Token::string("run_number"), Token::number(42.0)),
        ]),
    );
    values.insert(
        "matrix",
        Token::sequence(vec![Token::boolean(true), Token::null(), Token::string("{0}")]),
    );
    if let Ok(value) = engine.evaluate(expression, &values) {
        // Every result must render
        let _ = value.to_json();
        let _ = value.to_string();
    }
});
