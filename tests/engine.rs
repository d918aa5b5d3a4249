//! End-to-end scenarios for the matcher engine and template pipeline
//!
//! These run entirely in-process: schemas are loaded from YAML, responses
//! from JSON, and evaluation happens against a hand-seeded store. No
//! network is involved.

use apiprobe::matcher::{EvalOutput, MatcherPath, ResponseMatcher};
use apiprobe::store::DataStore;
use apiprobe::template::command::execute_commands;
use apiprobe::value::Value;
use apiprobe::Error;

fn load_schema(yaml: &str) -> ResponseMatcher {
    let node = Value::from_yaml_str(yaml).unwrap();
    let mut rm = ResponseMatcher::new();
    rm.load(&node, MatcherPath::root()).unwrap();
    rm
}

fn evaluate(schema: &str, response: &str) -> EvalOutput {
    evaluate_with_store(schema, response, &DataStore::new())
}

fn evaluate_with_store(schema: &str, response: &str, store: &DataStore) -> EvalOutput {
    let rm = load_schema(schema);
    let response = Value::from_json_str(response).unwrap();
    rm.evaluate(&response, store).unwrap()
}

#[test]
fn literal_integer_match() {
    // schema {page: {type: integer, matches: 2}} over {"page": 2}
    let out = evaluate(
        "page:\n  type: integer\n  matches: 2\n",
        r#"{"page": 2}"#,
    );
    assert!(out.passed);
    let field = out.results.iter().find(|r| r.path == ".page").unwrap();
    assert!(field.status);
    assert_eq!(field.error, "2");
}

#[test]
fn not_empty_string_fails_on_empty() {
    let out = evaluate(
        "name:\n  type: string\n  matches: $notEmpty\n",
        r#"{"name": ""}"#,
    );
    assert!(!out.passed);
    let field = out.results.iter().find(|r| r.path == ".name").unwrap();
    assert!(
        field.error.starts_with("Expected non-empty value"),
        "got: {}",
        field.error
    );
}

#[test]
fn unsorted_search_captures_from_selected_element() {
    // the high-priority email matcher selects the element; the generic id
    // matcher must then capture from that same element
    let schema = r#"
data:
  type: array
  length: $notEmpty
  sorted: false
  items:
    - type: object
      properties:
        email:
          priority: 0
          type: string
          matches: "a@b"
        id:
          priority: 1
          type: integer
          matches: $any
          storeAs: "uid"
"#;
    let out = evaluate(
        schema,
        r#"{"data":[{"email":"x@y","id":1},{"email":"a@b","id":42}]}"#,
    );
    assert!(out.passed, "fields: {:?}", out.results);
    assert_eq!(out.captures, vec![("uid".to_string(), Value::Int(42))]);
}

#[test]
fn array_length_expression_failure_message() {
    let out = evaluate(
        "items:\n  type: array\n  length: \"$>= 3\"\n",
        r#"{"items": [1, 2]}"#,
    );
    assert!(!out.passed);
    let field = out.results.iter().find(|r| r.path == ".items").unwrap();
    assert!(
        field
            .error
            .contains("Expected a result evaluating to: >= 3 but got 2"),
        "got: {}",
        field.error
    );
}

#[test]
fn nested_variable_composition() {
    let mut store = DataStore::new();
    store
        .put("Hosts.Beta", Value::Str("http://x".into()))
        .unwrap();
    store.put("STAGE", Value::Str("Beta".into())).unwrap();

    let resolved = store.expand_variable("@{Hosts.@{STAGE}}/foo").unwrap();
    assert_eq!(resolved, Value::Str("http://x/foo".into()));
}

#[test]
fn nested_subcommand_chain() {
    let out = execute_commands("$(echo $(echo first) $(echo second))").unwrap();
    assert_eq!(out, "first second");
}

#[test]
fn store_writes_are_idempotent() {
    let mut store = DataStore::new();
    store.put("a.b[1].c", Value::Int(5)).unwrap();
    let first = store.get("a").unwrap();
    store.put("a.b[1].c", Value::Int(5)).unwrap();
    assert_eq!(store.get("a").unwrap(), first);
}

#[test]
fn variable_cycles_error_rather_than_loop() {
    let mut store = DataStore::new();
    store.put_raw("a", Value::Str("@{b}".into()));
    store.put_raw("b", Value::Str("@{c}".into()));
    store.put_raw("c", Value::Str("@{a}".into()));
    assert!(matches!(
        store.expand_variable("@{a}"),
        Err(Error::BadVariable(_))
    ));

    // acyclic chains resolve to the terminal value
    store.put_raw("c", Value::Str("done".into()));
    assert_eq!(
        store.expand_variable("@{a}").unwrap(),
        Value::Str("done".into())
    );
}

#[test]
fn resolution_without_commands_is_deterministic() {
    let mut store = DataStore::new();
    store.put_raw("base", Value::Str("http://api".into()));
    store.put("Nested.key", Value::Int(3)).unwrap();

    let tree = Value::from_yaml_str(
        "route: \"@{base}/items\"\ncount: \"@{Nested.key}\"\nliteral: untouched\n",
    )
    .unwrap();
    let first = store.recursive_resolve(tree.clone()).unwrap();
    let second = store.recursive_resolve(tree).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first.get_field("count").unwrap(),
        &Value::Int(3),
        "whole-input references keep their resolved type"
    );
}

#[test]
fn priority_then_path_length_ordering() {
    let schema = r#"
deep:
  type: object
  properties:
    inner:
      type: integer
      matches: 1
late:
  type: integer
  matches: $any
  priority: 10000
early:
  type: integer
  matches: $any
  priority: 1
"#;
    let out = evaluate(schema, r#"{"deep":{"inner":1},"late":5,"early":6}"#);
    assert!(out.passed);

    let order: Vec<&str> = out.results.iter().map(|r| r.path.as_str()).collect();
    let pos = |p: &str| order.iter().position(|x| *x == p).unwrap();
    assert!(pos(".early") < pos(".deep"));
    assert!(pos(".deep") < pos(".deep.inner"), "parents before children");
    assert!(pos(".deep.inner") < pos(".late"));
}

#[test]
fn path_extensions_follow_the_selected_element() {
    // once the selector binds an unsorted element, matchers extending its
    // path must evaluate against the same element
    let schema = r#"
data:
  type: array
  length: $notEmpty
  sorted: false
  items:
    - type: object
      properties:
        name:
          priority: 0
          type: string
          matches: "^target$"
        detail:
          priority: 5
          type: object
          properties:
            score:
              type: integer
              matches: 10
"#;
    let out = evaluate(
        schema,
        r#"{"data":[{"name":"decoy","detail":{"score":99}},{"name":"target","detail":{"score":10}}]}"#,
    );
    assert!(out.passed, "fields: {:?}", out.results);
}

#[test]
fn evaluator_reports_every_field_failure() {
    // mismatches are per-field and never abort the remaining matchers
    let schema = "a:\n  type: integer\n  matches: 1\nb:\n  type: integer\n  matches: 2\n";
    let out = evaluate(schema, r#"{"a": 9, "b": 9}"#);
    assert!(!out.passed);
    let failing: Vec<_> = out.results.iter().filter(|r| !r.status).collect();
    assert_eq!(failing.len(), 2);
}

#[test]
fn exists_false_requires_absence() {
    let schema = "ghost:\n  type: string\n  exists: false\npresent:\n  type: integer\n  matches: 1\n";
    let out = evaluate(schema, r#"{"present": 1}"#);
    assert!(out.passed, "fields: {:?}", out.results);

    let out = evaluate(schema, r#"{"present": 1, "ghost": "here"}"#);
    assert!(!out.passed);
    let field = out.results.iter().find(|r| r.path == ".ghost").unwrap();
    assert!(field.error.contains("Expected null value"));
}

#[test]
fn short_form_payloads() {
    let schema = "page: 2\nname: demo\nflags:\n  - true\n";
    let out = evaluate(schema, r#"{"page": 2, "name": "demo", "flags": [true]}"#);
    assert!(out.passed, "fields: {:?}", out.results);

    let out = evaluate(schema, r#"{"page": 3, "name": "demo", "flags": [true]}"#);
    assert!(!out.passed);
}

#[test]
fn matcher_patterns_resolve_store_variables() {
    let mut store = DataStore::new();
    store.put_raw("expected_page", Value::Str("^2$".into()));
    let out = evaluate_with_store(
        "page:\n  type: integer\n  matches: \"@{expected_page}\"\n",
        r#"{"page": 2}"#,
        &store,
    );
    assert!(out.passed, "fields: {:?}", out.results);
}

#[test]
fn compact_path_keys_expand() {
    let schema = "\"$.result.items[0].id\":\n  type: integer\n  matches: 7\n";
    let out = evaluate(schema, r#"{"result":{"items":[{"id":7}]}}"#);
    assert!(out.passed, "fields: {:?}", out.results);

    let out = evaluate(schema, r#"{"result":{"items":[{"id":8}]}}"#);
    assert!(!out.passed);
}
