// Integration tests for tdl-core using test fixtures
use std::fs;
use std::path::PathBuf;
use tdl_core::error::{LexError, ParseError, ReferenceError, TypeErrorKind};
use tdl_core::{load_named, LoadError};

fn get_test_file_path(subdir: &str, filename: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join(subdir)
        .join(filename)
}

fn read_test_file(subdir: &str, filename: &str) -> String {
    let path = get_test_file_path(subdir, filename);
    fs::read_to_string(&path).unwrap_or_else(|_| panic!("Failed to read test file: {:?}", path))
}

// Documents that should load successfully
mod ok_tests {
    use super::*;

    fn load_ok(filename: &str) -> serde_json::Value {
        let content = read_test_file("ok", filename);
        let result = load_named(&content, filename);
        assert!(
            result.is_ok(),
            "Should load successfully: {:?}",
            result.err()
        );
        let json = result.unwrap().to_json().expect("Should serialize to JSON");
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_primitives() {
        let json = load_ok("primitives.tdl");
        assert_eq!(json["bindings"]["count"], 42);
        assert_eq!(json["bindings"]["negative"], -7);
        assert_eq!(json["bindings"]["nothing"], serde_json::Value::Null);
        assert_eq!(json["bindings"]["config"]["content type"], "json");
        assert_eq!(json["values"][0], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_shapes() {
        let json = load_ok("shapes.tdl");
        let shapes = &json["bindings"]["main"]["shapes"];
        assert_eq!(shapes[0]["$ctor"], "circle");
        assert_eq!(shapes[1], serde_json::json!({"$ctor": "rect", "width": 2.0, "height": 3.0}));
        assert_eq!(shapes[2]["side"], 4.0);
    }

    #[test]
    fn test_money() {
        let json = load_ok("money.tdl");
        assert_eq!(
            json["bindings"]["coffee"]["price"],
            serde_json::json!({"$ctor": "money", "amount": 29.99, "currency": "USD"})
        );
        assert_eq!(json["bindings"]["tea"]["price"]["amount"], 4.5);
        assert_eq!(json["bindings"]["tea"]["price"]["currency"], "EUR");
    }

    #[test]
    fn test_cycles() {
        let json = load_ok("cycles.tdl");
        assert_eq!(json["bindings"]["alice"]["friend"], serde_json::json!({"$ref": "bob"}));
        assert_eq!(json["bindings"]["bob"]["friend"], serde_json::json!({"$ref": "alice"}));
        assert_eq!(json["bindings"]["carol"]["friend"], serde_json::json!({"$ref": "carol"}));
    }

    #[test]
    fn test_sugar() {
        let json = load_ok("sugar.tdl");
        assert_eq!(
            json["bindings"]["systems"],
            serde_json::json!({"$ctor": "operating_systems", "names": ["macOS", "Linux"]})
        );
        let ada = &json["bindings"]["ada"];
        assert_eq!(ada["address"]["city"], "London");
        assert_eq!(ada["address"]["zip"], serde_json::Value::Null);
        assert_eq!(ada["pets"][1], serde_json::json!({"$ctor": "pet", "name": "Tom", "kind": "cat"}));
    }

    #[test]
    fn test_generics() {
        let json = load_ok("generics.tdl");
        let stock = &json["bindings"]["stock"];
        assert_eq!(stock["counts"][0], serde_json::json!({"$ctor": "pair", "first": "apples", "second": 3}));
        assert_eq!(stock["best"], serde_json::json!({"$ctor": "some", "value": "apples"}));
        assert_eq!(json["bindings"]["empty"]["best"], serde_json::json!({"$ctor": "none"}));
    }
}

// Documents that must be rejected, each with a specific error
mod bad_tests {
    use super::*;

    fn load_bad(filename: &str) -> LoadError {
        let content = read_test_file("bad", filename);
        match load_named(&content, filename) {
            Ok(_) => panic!("{filename} should fail to load"),
            Err(err) => err,
        }
    }

    fn type_error_kind(filename: &str) -> TypeErrorKind {
        match load_bad(filename) {
            LoadError::Type(err) => err.kind,
            other => panic!("Expected a type error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(
            type_error_kind("unknown_type.tdl"),
            TypeErrorKind::UnknownType("widget".to_string())
        );
    }

    #[test]
    fn test_constraint_violation() {
        match load_bad("constraint_violation.tdl") {
            LoadError::Constraint(violation) => {
                assert_eq!(violation.constructor, "age");
                assert_eq!(violation.constraint, "years >= 0");
                assert_eq!(violation.fields, vec![("years".to_string(), "-1".to_string())]);
            }
            other => panic!("Expected a constraint violation, got {other:?}"),
        }
    }

    #[test]
    fn test_undefined_reference() {
        assert!(matches!(
            load_bad("undefined_reference.tdl"),
            LoadError::Reference(ReferenceError::Undefined { .. })
        ));
    }

    #[test]
    fn test_ambiguous_anonymous() {
        assert_eq!(
            type_error_kind("ambiguous_anonymous.tdl"),
            TypeErrorKind::AmbiguousAnonymousConstructor("shape".to_string())
        );
    }

    #[test]
    fn test_pattern_mismatch() {
        assert_eq!(
            type_error_kind("pattern_mismatch.tdl"),
            TypeErrorKind::PatternMatchFailed {
                input: "free".to_string(),
                expected: "money".to_string()
            }
        );
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            load_bad("syntax_error.tdl"),
            LoadError::Parse(ParseError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_adjacent_placeholders() {
        assert!(matches!(
            type_error_kind("adjacent_placeholders.tdl"),
            TypeErrorKind::InvalidPattern(_)
        ));
    }

    #[test]
    fn test_self_dependency() {
        assert!(matches!(
            load_bad("self_dependency.tdl"),
            LoadError::Reference(ReferenceError::SelfDependency { .. })
        ));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            load_bad("unterminated_string.tdl"),
            LoadError::Lex(LexError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn test_duplicate_binding() {
        let err = load_bad("duplicate_binding.tdl");
        assert!(matches!(
            err,
            LoadError::Reference(ReferenceError::DuplicateBinding { .. })
        ));
        assert_eq!(err.line_col(), (2, 1));
    }
}
