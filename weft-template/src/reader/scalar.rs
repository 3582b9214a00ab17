//! Scalar parsing: literal text, `${{ }}` expressions and directives

use crate::context::TemplateContext;
use crate::expression::string_literal;
use weft_core::{TemplateError, Token, TokenKind};

const OPEN_EXPRESSION: &str = "${{";
const CLOSE_EXPRESSION: &str = "}}";

pub const INSERT_DIRECTIVE: &str = "insert";
pub const IF_DIRECTIVE: &str = "if";
pub const ELSE_IF_DIRECTIVE: &str = "elseif";
pub const ELSE_DIRECTIVE: &str = "else";
pub const EACH_DIRECTIVE: &str = "each";

/// Directive names and their parameter counts.
const BASIC_DIRECTIVES: &[(&str, usize)] = &[(INSERT_DIRECTIVE, 0)];
const EXTENDED_DIRECTIVES: &[(&str, usize)] = &[
    (INSERT_DIRECTIVE, 0),
    (IF_DIRECTIVE, 1),
    (ELSE_IF_DIRECTIVE, 1),
    (ELSE_DIRECTIVE, 0),
    (EACH_DIRECTIVE, 3),
];

enum Segment {
    Literal(String),
    Expression(Token),
}

/// Parse a literal read from the source. Text without `${{` is returned
/// unchanged. Errors are recorded on the context and the raw text is kept.
pub fn parse_scalar(context: &mut TemplateContext, literal: Token, allowed: &[String]) -> Token {
    let span = literal.span;
    let raw = match literal.as_str() {
        Some(raw) if raw.contains(OPEN_EXPRESSION) => raw.to_string(),
        _ => return literal,
    };

    let mut segments = Vec::new();
    let mut i = 0;
    while i < raw.len() {
        let Some(offset) = raw[i..].find(OPEN_EXPRESSION) else {
            push_literal(&mut segments, &raw[i..]);
            break;
        };
        let start = i + offset;
        push_literal(&mut segments, &raw[i..start]);

        let body_start = start + OPEN_EXPRESSION.len();
        let Some(end) = find_close(&raw, body_start) else {
            context.error(span, TemplateError::UnterminatedExpression);
            push_literal(&mut segments, &raw[start..]);
            break;
        };

        let inline = start != 0 || end + CLOSE_EXPRESSION.len() < raw.len();
        match parse_expression(context, raw[body_start..end].trim(), allowed, inline) {
            Ok(token) => segments.push(Segment::Expression(token.with_span(span))),
            Err(error) => {
                context.error(span, error);
                return literal;
            }
        }
        i = end + CLOSE_EXPRESSION.len();
    }

    let mut collapsed: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            Segment::Expression(token) => match &token.kind {
                TokenKind::BasicExpression(text) => match string_literal(text) {
                    Some(value) => push_literal(&mut collapsed, &value),
                    None => collapsed.push(Segment::Expression(token)),
                },
                _ => collapsed.push(Segment::Expression(token)),
            },
            Segment::Literal(text) => push_literal(&mut collapsed, &text),
        }
    }

    match collapsed.as_slice() {
        [] => return Token::string("").with_span(span),
        [Segment::Literal(text)] => return Token::string(text.as_str()).with_span(span),
        [Segment::Expression(token)] => return token.clone(),
        _ => {}
    }

    let mut pattern = String::new();
    let mut args = String::new();
    let mut index = 0;
    for segment in &collapsed {
        match segment {
            Segment::Literal(text) => pattern.push_str(
                &text
                    .replace('\'', "''")
                    .replace('{', "{{")
                    .replace('}', "}}"),
            ),
            Segment::Expression(token) => {
                pattern.push_str(&format!("{{{}}}", index));
                index += 1;
                if let TokenKind::BasicExpression(text) = &token.kind {
                    args.push_str(", ");
                    args.push_str(text);
                }
            }
        }
    }
    Token::expression(format!("format('{}'{})", pattern, args)).with_span(span)
}

/// Append literal text, merging with a preceding literal segment.
fn push_literal(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    match segments.last_mut() {
        Some(Segment::Literal(last)) => last.push_str(text),
        _ => segments.push(Segment::Literal(text.to_string())),
    }
}

/// Byte index of the closing `}}`, ignoring braces inside single quotes.
fn find_close(raw: &str, from: usize) -> Option<usize> {
    let bytes = raw.as_bytes();
    let mut in_string = false;
    for j in from..bytes.len() {
        match bytes[j] {
            b'\'' => in_string = !in_string,
            b'}' if !in_string && j > from && bytes[j - 1] == b'}' => return Some(j - 1),
            _ => {}
        }
    }
    None
}

fn parse_expression(
    context: &TemplateContext,
    body: &str,
    allowed: &[String],
    inline: bool,
) -> Result<Token, TemplateError> {
    if body.is_empty() {
        return Err(TemplateError::ExpectedExpression);
    }

    if let Some(directive) = match_directive(context, body, allowed)? {
        if inline {
            return Err(TemplateError::DirectiveNotAllowedInline {
                directive: directive_name(&directive).to_string(),
            });
        }
        return Ok(directive);
    }

    validate_expression(context, body, allowed)?;
    Ok(Token::expression(body))
}

/// Expressions are only checked where the position allows any context; the
/// caller reports `ExpressionNotAllowed` elsewhere.
fn validate_expression(context: &TemplateContext, text: &str, allowed: &[String]) -> Result<(), TemplateError> {
    if allowed.is_empty() {
        return Ok(());
    }
    context
        .expressions
        .validate(text, allowed)
        .map_err(|e| TemplateError::InvalidExpression { message: e.to_string() })
}

fn match_directive(
    context: &TemplateContext,
    body: &str,
    allowed: &[String],
) -> Result<Option<Token>, TemplateError> {
    let directives = if context.extended_directives {
        EXTENDED_DIRECTIVES
    } else {
        BASIC_DIRECTIVES
    };

    for (name, expected) in directives {
        let Some(rest) = body.strip_prefix(name) else {
            continue;
        };
        if !(rest.is_empty() || rest.starts_with(char::is_whitespace)) {
            continue;
        }

        let parameters = split_parameters(rest);
        if parameters.len() != *expected {
            return Err(TemplateError::DirectiveParameterCount {
                directive: name.to_string(),
                expected: *expected,
                actual: parameters.len(),
            });
        }

        let kind = match *name {
            IF_DIRECTIVE => {
                validate_expression(context, parameters[0], allowed)?;
                TokenKind::If(parameters[0].into())
            }
            ELSE_IF_DIRECTIVE => {
                validate_expression(context, parameters[0], allowed)?;
                TokenKind::ElseIf(parameters[0].into())
            }
            ELSE_DIRECTIVE => TokenKind::Else,
            EACH_DIRECTIVE => {
                let (variable, keyword, collection) = (parameters[0], parameters[1], parameters[2]);
                if keyword != "in" {
                    return Err(TemplateError::InvalidExpression {
                        message: format!(
                            "Expected 'in' following the variable of directive 'each'. Actual: '{}'",
                            keyword
                        ),
                    });
                }
                if !is_variable_name(variable) {
                    return Err(TemplateError::InvalidExpression {
                        message: format!("Invalid variable name '{}'", variable),
                    });
                }
                validate_expression(context, collection, allowed)?;
                TokenKind::Each {
                    variable: variable.into(),
                    collection: collection.into(),
                }
            }
            _ => TokenKind::InsertExpression,
        };
        return Ok(Some(Token::new(kind)));
    }
    Ok(None)
}

/// Split directive parameters on whitespace outside quotes and parentheses.
fn split_parameters(text: &str) -> Vec<&str> {
    let mut parameters = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut parens: i32 = 0;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() && !in_string && parens == 0 {
            if start < i {
                parameters.push(&text[start..i]);
            }
            start = i + c.len_utf8();
        } else if c == '\'' {
            in_string = !in_string;
        } else if c == '(' && !in_string {
            parens += 1;
        } else if c == ')' && !in_string {
            parens -= 1;
        }
    }
    if start < text.len() {
        parameters.push(&text[start..]);
    }
    parameters
}

fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

pub fn directive_name(token: &Token) -> &'static str {
    match token.kind {
        TokenKind::InsertExpression => INSERT_DIRECTIVE,
        TokenKind::If(_) => IF_DIRECTIVE,
        TokenKind::ElseIf(_) => ELSE_IF_DIRECTIVE,
        TokenKind::Else => ELSE_DIRECTIVE,
        TokenKind::Each { .. } => EACH_DIRECTIVE,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::BasicExpressionEngine;
    use crate::schema::SchemaRegistry;
    use std::sync::Arc;
    use weft_core::{NullTraceWriter, TemplateConfig};

    fn context(extended: bool) -> TemplateContext {
        let config = TemplateConfig {
            extended_directives: extended,
            ..TemplateConfig::default()
        };
        TemplateContext::new(
            Arc::new(SchemaRegistry::builtin()),
            Arc::new(BasicExpressionEngine::new()),
            Arc::new(NullTraceWriter),
            &config,
        )
    }

    fn allowed() -> Vec<String> {
        vec!["x".to_string(), "matrix".to_string()]
    }

    fn parse(ctx: &mut TemplateContext, text: &str) -> Token {
        parse_scalar(ctx, Token::string(text), &allowed())
    }

    #[test]
    fn test_plain_literal_unchanged() {
        let mut ctx = context(false);
        assert_eq!(parse(&mut ctx, "plain"), Token::string("plain"));
        assert_eq!(parse_scalar(&mut ctx, Token::number(1.0), &allowed()), Token::number(1.0));
        assert!(ctx.errors.is_empty());
    }

    #[test]
    fn test_single_expression_stays_standalone() {
        let mut ctx = context(false);
        assert_eq!(parse(&mut ctx, "${{ matrix.os }}"), Token::expression("matrix.os"));
    }

    #[test]
    fn test_mixed_text_builds_format() {
        let mut ctx = context(false);
        assert_eq!(
            parse(&mut ctx, "a-${{ x }}-b"),
            Token::expression("format('a-{0}-b', x)")
        );
        assert_eq!(
            parse(&mut ctx, "it's {${{ x }}} ${{ matrix }}"),
            Token::expression("format('it''s {{{0}}} {1}', x, matrix)")
        );
        assert!(ctx.errors.is_empty());
    }

    #[test]
    fn test_string_constant_collapses() {
        let mut ctx = context(false);
        assert_eq!(parse(&mut ctx, "${{ '${{ not }}' }}"), Token::string("${{ not }}"));
        assert_eq!(parse(&mut ctx, "a ${{ 'b' }} c"), Token::string("a b c"));
    }

    #[test]
    fn test_unterminated_expression() {
        let mut ctx = context(false);
        let token = parse(&mut ctx, "a-${{ x -b");
        assert_eq!(token, Token::string("a-${{ x -b"));
        assert_eq!(ctx.errors.len(), 1);
        assert_eq!(ctx.errors.iter().next().unwrap().error, TemplateError::UnterminatedExpression);
    }

    #[test]
    fn test_empty_expression() {
        let mut ctx = context(false);
        assert_eq!(parse(&mut ctx, "${{ }}"), Token::string("${{ }}"));
        assert_eq!(ctx.errors.iter().next().unwrap().error, TemplateError::ExpectedExpression);
    }

    #[test]
    fn test_invalid_expression_keeps_literal() {
        let mut ctx = context(false);
        assert_eq!(parse(&mut ctx, "${{ secrets.x }}"), Token::string("${{ secrets.x }}"));
        assert!(matches!(
            ctx.errors.iter().next().unwrap().error,
            TemplateError::InvalidExpression { .. }
        ));
    }

    #[test]
    fn test_insert_directive() {
        let mut ctx = context(false);
        assert_eq!(parse(&mut ctx, "${{ insert }}"), Token::insert());
        let token = parse(&mut ctx, "${{ insert x }}");
        assert!(token.as_str().is_some());
        assert_eq!(
            ctx.errors.iter().next().unwrap().error,
            TemplateError::DirectiveParameterCount {
                directive: "insert".to_string(),
                expected: 0,
                actual: 1
            }
        );
    }

    #[test]
    fn test_inline_directive_rejected() {
        let mut ctx = context(false);
        parse(&mut ctx, "a ${{ insert }}");
        assert_eq!(
            ctx.errors.iter().next().unwrap().error,
            TemplateError::DirectiveNotAllowedInline {
                directive: "insert".to_string()
            }
        );
    }

    #[test]
    fn test_extended_directives_require_flag() {
        let mut basic = context(false);
        assert!(parse(&mut basic, "${{ if x }}").as_str().is_some());

        let mut extended = context(true);
        assert_eq!(
            parse(&mut extended, "${{ if contains(x, 'a b') }}").kind,
            TokenKind::If("contains(x, 'a b')".into())
        );
        assert_eq!(parse(&mut extended, "${{ if (x == 'a') }}").kind, TokenKind::If("(x == 'a')".into()));
        assert_eq!(parse(&mut extended, "${{ else }}").kind, TokenKind::Else);
        assert_eq!(
            parse(&mut extended, "${{ each item in matrix }}").kind,
            TokenKind::Each {
                variable: "item".into(),
                collection: "matrix".into()
            }
        );
        assert!(extended.errors.is_empty());

        parse(&mut extended, "${{ each item of matrix }}");
        assert_eq!(extended.errors.len(), 1);
        parse(&mut extended, "${{ if x == 'a' }}");
        assert!(matches!(
            extended.errors.iter().nth(1).unwrap().error,
            TemplateError::DirectiveParameterCount { actual: 3, .. }
        ));
    }

    #[test]
    fn test_split_parameters() {
        assert_eq!(split_parameters(" a  'b c' f(x, y) "), vec!["a", "'b c'", "f(x, y)"]);
        assert!(split_parameters("   ").is_empty());
    }

    #[test]
    fn test_close_inside_quotes_is_ignored() {
        let mut ctx = context(false);
        assert_eq!(parse(&mut ctx, "${{ format('}}', x) }}"), Token::expression("format('}}', x)"));
    }
}
