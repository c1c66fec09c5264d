//! End-to-end interpreter scenarios
//!
//! Scripts are parsed and executed through the public engine surface and
//! checked for their value, captured output and error kind.

use accord::{
    CancellationToken, EngineConfig, EngineContext, Error, ExecutionOptions, Resource,
    ResourceLimits, Value,
};

fn engine() -> EngineContext {
    EngineContext::new(EngineConfig::default()).expect("engine")
}

fn run(source: &str) -> accord::Result<accord::ExecutionOutcome> {
    let engine = engine();
    let script = engine.parse(source)?;
    engine.execute(&script, &ExecutionOptions::new())
}

#[test]
fn sums_top_level_bindings_and_prints() {
    let outcome = run("x = 10\ny = 20\nz = x + y\nprint(z)").unwrap();
    assert_eq!(outcome.output, vec!["30".to_string()]);
    assert_eq!(outcome.value, Value::Null);
    assert!(outcome.steps > 0);
}

#[test]
fn addition_commutes_and_strings_concatenate() {
    assert_eq!(run("3 + 4").unwrap().value, run("4 + 3").unwrap().value);
    assert_eq!(run("1.5 + 2.25").unwrap().value, run("2.25 + 1.5").unwrap().value);
    assert_eq!(run(r#""x" + "y""#).unwrap().value, Value::from("xy"));
}

#[test]
fn block_scoping_and_shadowing() {
    let err = run("{ let temp = 1 }\ntemp").unwrap_err();
    assert!(matches!(err, Error::NotDefined(name) if name == "temp"));

    let outcome = run(
        "limit = 100
         {
             let limit = 5
             print(limit)
         }
         limit",
    )
    .unwrap();
    assert_eq!(outcome.output, vec!["5".to_string()]);
    assert_eq!(outcome.value, Value::Integer(100));
}

#[test]
fn input_bindings_are_globals() {
    let engine = engine();
    let script = engine.parse("members * 2").unwrap();
    let options = ExecutionOptions::new().bind("members", 21);
    assert_eq!(engine.execute(&script, &options).unwrap().value, Value::Integer(42));
}

#[test]
fn runtime_errors_have_kinds() {
    assert!(matches!(run("1 / 0"), Err(Error::Arithmetic(_))));
    assert!(matches!(run("1 + true"), Err(Error::Type(_))));
    assert!(matches!(run("if \"yes\" { 1 }"), Err(Error::Type(_))));
    assert!(matches!(run("undefined_name"), Err(Error::NotDefined(_))));
    assert!(matches!(run("nope(1)"), Err(Error::NotDefined(_))));
    assert!(matches!(run("[1][1]"), Err(Error::IndexOutOfBounds { .. })));
}

#[test]
fn parse_errors_report_location() {
    let err = run("x = 1\ny = * 2").unwrap_err();
    match err {
        Error::Parse(parse) => {
            assert_eq!(parse.location.start_line, 2);
            assert_eq!(parse.location.start_column, 5);
        }
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn pathological_nesting_is_a_parse_error() {
    let parens = format!("x = {}1{}", "(".repeat(50_000), ")".repeat(50_000));
    assert!(matches!(run(&parens), Err(Error::Parse(_))));

    let chain = format!("total = {}", vec!["1"; 100_000].join(" + "));
    assert!(matches!(run(&chain), Err(Error::Parse(_))));

    assert!(matches!(run("x = 1e400"), Err(Error::Parse(_))));
}

#[test]
fn moderate_nesting_evaluates() {
    let parens = format!("{}2{} * 3", "(".repeat(64), ")".repeat(64));
    assert_eq!(run(&parens).unwrap().value, Value::Integer(6));

    let chain = vec!["1"; 100].join(" + ");
    assert_eq!(run(&chain).unwrap().value, Value::Integer(100));
}

#[test]
fn conditionless_loop_is_bounded_by_steps() {
    let engine = engine();
    let script = engine.parse("count = 0\nloop { count = count + 1 }").unwrap();
    let options = ExecutionOptions::new().with_limits(ResourceLimits {
        max_steps: Some(10_000),
        max_duration_ms: None,
        ..ResourceLimits::default()
    });
    let err = engine.execute(&script, &options).unwrap_err();
    assert!(matches!(
        err,
        Error::ResourceExhausted {
            resource: Resource::Steps,
            limit: 10_000
        }
    ));
}

#[test]
fn loop_breaks_and_evaluates_to_null() {
    let outcome = run(
        "n = 0
         result = loop {
             n = n + 1
             if n == 5 { break }
         }
         [n, result]",
    )
    .unwrap();
    assert_eq!(outcome.value, Value::Array(vec![5.into(), Value::Null]));
}

#[test]
fn cancelled_execution_stops_at_checkpoint() {
    let engine = engine();
    let script = engine.parse("loop { }").unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let options = ExecutionOptions::new().with_cancellation(token);
    assert!(matches!(engine.execute(&script, &options), Err(Error::Cancelled)));
}

#[test]
fn rendered_values_parse_back() {
    let engine = engine();
    let original = run(r#"{ "name": "coop", "shares": [1, 2.5, -3], "active": true, "note": null }"#)
        .unwrap()
        .value;
    let script = engine.parse(&original.render()).unwrap();
    let again = engine.execute(&script, &ExecutionOptions::new()).unwrap().value;
    assert_eq!(again, original);
}

#[test]
fn stdlib_functions_are_available() {
    let outcome = run(
        r#"let members = ["a", "b", "c"]
           let info = { size: len(members), kind: type_of(members) }
           print(info.size, info.kind, max(1, 7, 3), to_string(2.5))
           has_key(info, "size") && contains(members, "b")"#,
    )
    .unwrap();
    assert_eq!(outcome.output, vec!["3 array 7 2.5".to_string()]);
    assert_eq!(outcome.value, Value::Boolean(true));
}
