//! Property-based tests for the value model and arithmetic.

use std::collections::BTreeMap;

use accord::{CapabilitySet, EngineConfig, EngineContext, ExecutionOptions, Value};
use proptest::prelude::*;

fn engine() -> EngineContext {
    EngineContext::new(EngineConfig {
        builtin_templates: false,
        ..EngineConfig::default()
    })
    .expect("engine")
}

fn evaluate(engine: &EngineContext, source: &str) -> Value {
    let script = engine.parse(source).expect("parse");
    engine
        .execute(&script, &ExecutionOptions::new())
        .expect("execute")
        .value
}

/// Equality treats `Integer(1)` and `Number(1.0)` as equal; this does not.
fn same_kinds(a: &Value, b: &Value) -> bool {
    if a.type_name() != b.type_name() {
        return false;
    }
    match (a, b) {
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len() && left.iter().zip(right).all(|(l, r)| same_kinds(l, r))
        }
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .zip(right)
                    .all(|((lk, lv), (rk, rv))| lk == rk && same_kinds(lv, rv))
        }
        _ => true,
    }
}

/// Finite literal values, nested up to a few levels.
fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Boolean),
        any::<i64>().prop_map(Value::Integer),
        any::<f64>()
            .prop_filter("finite", |num| num.is_finite())
            .prop_map(Value::Number),
        "[a-zA-Z0-9 _\"\\\\\n\t-]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_][a-z0-9_]{0,6}", inner, 0..4)
                .prop_map(|entries: BTreeMap<String, Value>| Value::Object(entries)),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn rendered_literals_evaluate_to_themselves(value in arb_value()) {
        let engine = engine();
        let evaluated = evaluate(&engine, &value.render());
        prop_assert!(
            same_kinds(&evaluated, &value),
            "{} came back as {}",
            value.render(),
            evaluated.render()
        );
        prop_assert_eq!(evaluated, value);
    }

    #[test]
    fn integer_addition_commutes(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000) {
        let engine = engine();
        let forward = evaluate(&engine, &format!("{} + {}", Value::Integer(a).render(), Value::Integer(b).render()));
        let backward = evaluate(&engine, &format!("{} + {}", Value::Integer(b).render(), Value::Integer(a).render()));
        prop_assert_eq!(&forward, &Value::Integer(a + b));
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn float_addition_commutes(a in -1.0e9f64..1.0e9, b in -1.0e9f64..1.0e9) {
        let engine = engine();
        let forward = evaluate(&engine, &format!("{} + {}", Value::Number(a).render(), Value::Number(b).render()));
        let backward = evaluate(&engine, &format!("{} + {}", Value::Number(b).render(), Value::Number(a).render()));
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn string_concatenation_appends(a in "[a-z ]{0,10}", b in "[a-z ]{0,10}") {
        let engine = engine();
        let source = format!(
            "{} + {}",
            Value::from(a.as_str()).render(),
            Value::from(b.as_str()).render()
        );
        prop_assert_eq!(evaluate(&engine, &source), Value::String(format!("{}{}", a, b)));
    }

    #[test]
    fn vm_agrees_on_integer_expressions(a in -10_000i64..10_000, b in 1i64..100, c in -100i64..100) {
        let engine = engine();
        let source = format!(
            "let x = {}\nlet y = {}\nif x % y > {} {{ x / y * {} }} else {{ x - y + {} }}",
            a, b, c, c, c
        );
        let script = engine.parse(&source).unwrap();
        let interpreted = engine.execute(&script, &ExecutionOptions::new()).unwrap();
        let program = engine.compile(&script, &CapabilitySet::new()).unwrap();
        let compiled = engine.run(&program, &ExecutionOptions::new()).unwrap();
        prop_assert_eq!(interpreted.value, compiled.value);
    }
}
