// Constraint and resolution semantics observed through `load`

use tdl_core::error::TypeErrorKind;
use tdl_core::{load, LoadError};

fn violated_constraint(source: &str) -> Option<String> {
    match load(source) {
        Ok(_) => None,
        Err(LoadError::Constraint(violation)) => Some(violation.constraint),
        Err(other) => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_missing_optional_field_passes_vacuously() {
    let types = "type user = user {name: str, nickname: optional str} where len(nickname) > 2\n";
    assert_eq!(violated_constraint(&format!("{types}u := user(name: \"ada\")\n")), None);
    assert_eq!(
        violated_constraint(&format!("{types}u := user(name: \"ada\", nickname: null)\n")),
        None
    );
    assert_eq!(
        violated_constraint(&format!("{types}u := user(name: \"ada\", nickname: \"a\")\n")),
        Some("len(nickname) > 2".to_string())
    );
}

#[test]
fn test_missing_side_of_and_is_dropped() {
    let types = "type item = item {count: int, limit: optional int} where count > 0 and count <= limit\n";
    // `limit` is absent: only `count > 0` is left.
    assert_eq!(violated_constraint(&format!("{types}i := item(count: 3)\n")), None);
    assert_eq!(
        violated_constraint(&format!("{types}i := item(count: 0)\n")),
        Some("count > 0 and count <= limit".to_string())
    );
    assert!(violated_constraint(&format!("{types}i := item(count: 5, limit: 4)\n")).is_some());
}

#[test]
fn test_for_and_except_scopes() {
    let types = "type vehicle =\n    car {wheels: int}\n    bike {wheels: int}\n    trike {wheels: int}\n    where wheels == 4 for {car}\n    where wheels < 4 except {car}\n";

    assert_eq!(violated_constraint(&format!("{types}v := car(4)\n")), None);
    assert_eq!(violated_constraint(&format!("{types}v := bike(2)\n")), None);
    assert_eq!(
        violated_constraint(&format!("{types}v := car(3)\n")),
        Some("wheels == 4".to_string())
    );
    assert_eq!(
        violated_constraint(&format!("{types}v := trike(4)\n")),
        Some("wheels < 4".to_string())
    );
}

#[test]
fn test_inline_where_only_applies_to_its_constructor() {
    let types = "type n = pos {v: int} where v > 0 | neg {v: int} where v < 0\n";
    assert_eq!(violated_constraint(&format!("{types}a := pos(1)\nb := neg(-1)\n")), None);
    assert_eq!(
        violated_constraint(&format!("{types}a := neg(1)\n")),
        Some("v < 0".to_string())
    );
}

#[test]
fn test_first_failing_constraint_is_reported() {
    let types = "type t = t {x: int}\nwhere x > 10\nwhere x > 100\n";
    assert_eq!(
        violated_constraint(&format!("{types}v := t(5)\n")),
        Some("x > 10".to_string())
    );
}

#[test]
fn test_constraints_run_for_pattern_results() {
    let source = r#"
type money = money {amount: float, currency: str}
where amount > 0
"${amount}" => money(amount: float(amount), currency: "USD")

price: money := "$0"
"#;
    assert_eq!(violated_constraint(source), Some("amount > 0".to_string()));
}

#[test]
fn test_positional_fields_are_reachable_by_index() {
    let types = "type span = span {int, int} where _0 <= _1\n";
    assert_eq!(violated_constraint(&format!("{types}s := span(1, 2)\n")), None);
    assert_eq!(
        violated_constraint(&format!("{types}s := span(3, 2)\n")),
        Some("_0 <= _1".to_string())
    );
}

#[test]
fn test_constructor_must_match_expected_type() {
    let source = "type a = x {}\ntype b = y {}\ntype holder = holder {item: a}\nholder(y)\n";
    match load(source) {
        Err(LoadError::Type(err)) => assert_eq!(
            err.kind,
            TypeErrorKind::ConstructorMismatch {
                ctor: "y".to_string(),
                expected: "a".to_string()
            }
        ),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_bindings_resolve_in_any_order() {
    let source = "type wrapper = wrapper {inner: any}\nouter := wrapper(!middle)\nmiddle := wrapper(!leaf)\nleaf := 7\n";
    let loaded = load(source).unwrap();
    let json: serde_json::Value = serde_json::from_str(&loaded.to_json().unwrap()).unwrap();
    assert_eq!(json["bindings"]["outer"]["inner"], serde_json::json!({"$ref": "middle"}));
    assert_eq!(json["bindings"]["leaf"], 7);
}

#[test]
fn test_constraints_read_through_reference_cycles() {
    let types = "type person = person {name: str, spouse: optional person} where spouse.name != name\n";

    let loaded = load(&format!(
        "{types}alice := person(name: \"Alice\", spouse: !bob)\nbob := person(name: \"Bob\", spouse: !alice)\n"
    ))
    .unwrap();
    let alice = loaded.get("alice").unwrap();
    let bob = loaded
        .deref(alice.as_record().unwrap().get("spouse").unwrap())
        .unwrap();
    assert_eq!(bob.as_record().unwrap().get("name").unwrap().to_string(), "\"Bob\"");

    assert_eq!(
        violated_constraint(&format!(
            "{types}alice := person(name: \"Sam\", spouse: !bob)\nbob := person(name: \"Sam\", spouse: !alice)\n"
        )),
        Some("spouse.name != name".to_string())
    );
}
