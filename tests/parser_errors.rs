// Parser and lexer error paths exercised through the public stage APIs

use tdl_core::error::{LexError, ParseError};
use tdl_core::lexer::Lexer;
use tdl_core::parser::{Parser, MAX_NESTING};

fn parse_err(source: &str) -> ParseError {
    let mut parser = Parser::new(source).expect("Lexer failed");
    parser
        .parse_document()
        .expect_err("document should not parse")
}

fn lex_err(source: &str) -> LexError {
    Lexer::new(source).lex().expect_err("source should not lex")
}

#[test]
fn test_missing_constructor_body() {
    let err = parse_err("type t = a\n");
    assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    assert_eq!(err.expected(), "`{`");
}

#[test]
fn test_missing_equals_in_type() {
    let err = parse_err("type t a {x: int}\n");
    assert_eq!(err.expected(), "`=`");
}

#[test]
fn test_pattern_target_must_be_constructor_call() {
    let err = parse_err("\"{x}\" => x + 1\n");
    assert_eq!(err.expected(), "a constructor call");
}

#[test]
fn test_unclosed_argument_list() {
    let err = parse_err("v := point(1, 2\n");
    assert!(matches!(err, ParseError::UnexpectedEof { .. }));
}

#[test]
fn test_missing_separator_in_list() {
    let err = parse_err("v := [1 2]\n");
    assert_eq!(err.expected(), "`,` or `]`");
}

#[test]
fn test_reference_needs_a_name() {
    let err = parse_err("v := !\n");
    assert_eq!(err.expected(), "a binding name");
}

#[test]
fn test_scope_needs_constructor_names() {
    let err = parse_err("type t = a {x: int}\nwhere x > 0 for {1}\n");
    assert_eq!(err.expected(), "a constructor name");
}

#[test]
fn test_stray_indentation() {
    let err = parse_err("a := 1\n    b := 2\n");
    assert_eq!(err.expected(), "a declaration or value");
}

#[test]
fn test_unterminated_string() {
    assert!(matches!(
        lex_err("v := \"abc\n"),
        LexError::UnterminatedString { .. }
    ));
}

#[test]
fn test_invalid_numbers() {
    for source in ["v := 1.2.3", "v := 12abc", "v := 1e", "v := 99999999999999999999"] {
        assert!(
            matches!(lex_err(source), LexError::InvalidNumber { .. }),
            "{source}"
        );
    }
}

#[test]
fn test_unexpected_character() {
    match lex_err("v := 1 ^ 2") {
        LexError::UnexpectedCharacter { found, .. } => assert_eq!(found, '^'),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_inconsistent_dedent() {
    assert!(matches!(
        lex_err("a:\n    b:\n        c: 1\n  d: 2\n"),
        LexError::InconsistentDedent { .. }
    ));
}

#[test]
fn test_mixed_indentation() {
    assert!(matches!(
        lex_err("a:\n  b:\n\t\t\tc: 2\n"),
        LexError::MixedIndentation { .. }
    ));
}

#[test]
fn test_error_positions() {
    let err = parse_err("v := [1,\n  2 3]\n");
    let offset = err.span().offset();
    assert_eq!(
        tdl_core::utils::get_line_and_column("v := [1,\n  2 3]\n", offset),
        (2, 5)
    );
}

#[test]
fn test_deeply_nested_values_are_rejected() {
    let depth = 5000;
    let source = format!("x := {}1{}\n", "[".repeat(depth), "]".repeat(depth));
    match parse_err(&source) {
        ParseError::TooDeep { limit, .. } => assert_eq!(limit, MAX_NESTING),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_nesting_below_the_limit_parses() {
    let depth = MAX_NESTING - 1;
    let source = format!("x := {}1{}\n", "[".repeat(depth), "]".repeat(depth));
    let mut parser = Parser::new(&source).expect("Lexer failed");
    assert!(parser.parse_document().is_ok());
}

#[test]
fn test_long_operator_chains_count_as_nesting() {
    let terms = vec!["n"; 500].join(" + ");
    let source = format!("type t = t {{n: int}} where {terms} > 0\n");
    assert!(matches!(parse_err(&source), ParseError::TooDeep { .. }));

    let mut parser = Parser::new("type t = t {n: int} where n + n + n > 0\n").expect("Lexer failed");
    assert!(parser.parse_document().is_ok());
}

#[test]
fn test_deeply_nested_types_are_rejected() {
    let source = format!("type t = t {{v: {}int}}\n", "list ".repeat(1000));
    assert!(matches!(parse_err(&source), ParseError::TooDeep { .. }));
}
