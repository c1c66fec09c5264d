//! Template instantiation and execution
//!
//! The built-in templates are instantiated with concrete parameters and run
//! against recording host capabilities.

use std::collections::BTreeMap;
use std::sync::Arc;

use accord::{
    CapabilitySet, EngineConfig, EngineContext, Error, ExecutionOptions, HostCallOutcome, ParameterType, Template,
    TemplateParameter, TemplateRegistry, Value,
};
use parking_lot::Mutex;

fn engine() -> EngineContext {
    EngineContext::new(EngineConfig::default()).expect("engine")
}

fn params(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn object(entries: &[(&str, Value)]) -> Value {
    Value::Object(params(entries))
}

#[test]
fn mutual_credit_agreement_opens_a_credit_line() {
    let engine = engine();
    let calls: Arc<Mutex<Vec<Vec<Value>>>> = Arc::default();
    let recorded = Arc::clone(&calls);
    engine
        .register_capability("economic", "create_mutual_credit_line", "economic.credit", move |args| {
            recorded.lock().push(args.to_vec());
            Ok(Value::from("line-1"))
        })
        .unwrap();

    let script = engine
        .instantiate_template(
            "MutualCreditAgreement",
            &params(&[
                ("coop1_did", Value::from("did:icn:a")),
                ("coop2_did", Value::from("did:icn:b")),
                ("credit_limit", Value::Integer(500)),
                ("duration_days", Value::Integer(30)),
            ]),
        )
        .unwrap();
    assert_eq!(script.name, "MutualCreditAgreement");
    assert_eq!(
        script.metadata.get("template").map(String::as_str),
        Some("MutualCreditAgreement")
    );

    let options = ExecutionOptions::new().grant("economic.credit");
    let outcome = engine.execute(&script, &options).unwrap();

    assert_eq!(outcome.value, Value::from("line-1"));
    assert_eq!(outcome.output, vec!["credit line opened for 30 days".to_string()]);
    assert_eq!(
        *calls.lock(),
        vec![vec![Value::from("did:icn:a"), Value::from("did:icn:b"), Value::Integer(500)]]
    );

    let program = engine
        .compile(&script, &CapabilitySet::new().with("economic.credit"))
        .unwrap();
    let compiled = engine.run(&program, &options).unwrap();
    assert_eq!(compiled.value, outcome.value);
    assert_eq!(compiled.output, outcome.output);
    assert_eq!(compiled.host_calls.len(), 1);
    let recorded = calls.lock();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0], recorded[1]);
    assert_eq!(outcome.host_calls.len(), 1);
    assert_eq!(outcome.host_calls[0].qualified_name(), "economic.create_mutual_credit_line");
    assert_eq!(
        outcome.host_calls[0].outcome,
        HostCallOutcome::Returned {
            value: Value::from("line-1")
        }
    );
}

#[test]
fn missing_and_mistyped_parameters_are_rejected() {
    let engine = engine();
    let err = engine
        .instantiate_template(
            "MutualCreditAgreement",
            &params(&[("coop1_did", Value::from("did:icn:a")), ("credit_limit", 500.into())]),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::MissingParameter { ref parameter, .. } if parameter == "coop2_did"
    ));

    let err = engine
        .instantiate_template(
            "MutualCreditAgreement",
            &params(&[
                ("coop1_did", Value::from("icn:a")),
                ("coop2_did", Value::from("did:icn:b")),
                ("credit_limit", 500.into()),
            ]),
        )
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { ref parameter, .. } if parameter == "coop1_did"));

    let err = engine
        .instantiate_template("ProposalPolicy", &params(&[("proposal_type", "budget".into()), ("quorum", 10.into())]))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownParameter { .. }));

    assert!(matches!(
        engine.instantiate_template("NoSuchTemplate", &BTreeMap::new()),
        Err(Error::UnknownTemplate(_))
    ));
}

#[test]
fn missing_parameters_are_reported_before_other_errors() {
    let engine = engine();
    let missing_with_extra = engine
        .instantiate_template(
            "MutualCreditAgreement",
            &params(&[
                ("coop1_did", Value::from("did:icn:a")),
                ("credit_limit", 500.into()),
                ("memo", "hello".into()),
            ]),
        )
        .unwrap_err();
    assert!(matches!(
        missing_with_extra,
        Error::MissingParameter { ref parameter, .. } if parameter == "coop2_did"
    ));

    let missing_with_bad_type = engine
        .instantiate_template(
            "MutualCreditAgreement",
            &params(&[("coop1_did", Value::from("not-a-did")), ("credit_limit", 500.into())]),
        )
        .unwrap_err();
    assert!(matches!(
        missing_with_bad_type,
        Error::MissingParameter { ref parameter, .. } if parameter == "coop2_did"
    ));

    let extra_with_bad_type = engine
        .instantiate_template(
            "MutualCreditAgreement",
            &params(&[
                ("coop1_did", Value::from("not-a-did")),
                ("coop2_did", Value::from("did:icn:b")),
                ("credit_limit", 500.into()),
                ("memo", "hello".into()),
            ]),
        )
        .unwrap_err();
    assert!(matches!(
        extra_with_bad_type,
        Error::UnknownParameter { ref parameter, .. } if parameter == "memo"
    ));
}

#[test]
fn proposal_policy_tallies_votes() {
    let engine = engine();
    let script = engine
        .instantiate_template("ProposalPolicy", &params(&[("proposal_type", "budget".into())]))
        .unwrap();
    let votes = object(&[
        ("yes", 6.into()),
        ("no", 2.into()),
        ("abstain", 1.into()),
        ("eligible", 10.into()),
    ]);
    let outcome = engine
        .execute(&script, &ExecutionOptions::new().bind("votes", votes))
        .unwrap();
    assert_eq!(
        outcome.value,
        object(&[
            ("proposal_type", "budget".into()),
            ("quorum_met", true.into()),
            ("approved", true.into()),
        ])
    );

    let strict = engine
        .instantiate_template(
            "ProposalPolicy",
            &params(&[("proposal_type", "bylaws".into()), ("approval_percent", 80.into())]),
        )
        .unwrap();
    let votes = object(&[
        ("yes", 6.into()),
        ("no", 2.into()),
        ("abstain", 0.into()),
        ("eligible", 10.into()),
    ]);
    let outcome = engine
        .execute(&strict, &ExecutionOptions::new().bind("votes", votes))
        .unwrap();
    assert_eq!(outcome.value.as_object().unwrap()["approved"], Value::Boolean(false));
}

#[test]
fn resource_allocation_respects_pool_balance() {
    let engine = engine();
    let transfers: Arc<Mutex<Vec<Vec<Value>>>> = Arc::default();
    let recorded = Arc::clone(&transfers);
    engine
        .register_capability("economic", "get_balance", "economic.read", |_| Ok(Value::Integer(100)))
        .unwrap();
    engine
        .register_capability("economic", "transfer", "economic.write", move |args| {
            recorded.lock().push(args.to_vec());
            Ok(Value::Boolean(true))
        })
        .unwrap();
    let options = ExecutionOptions::new()
        .grant("economic.read")
        .grant("economic.write");

    let allocate = |amount: i64| {
        engine.instantiate_template(
            "ResourceAllocation",
            &params(&[
                ("resource_type", "storage".into()),
                ("amount", amount.into()),
                ("pool_did", "did:icn:pool".into()),
                ("recipient_did", "did:icn:member".into()),
            ]),
        )
    };

    let outcome = engine.execute(&allocate(40).unwrap(), &options).unwrap();
    assert_eq!(outcome.value.as_object().unwrap()["allocated"], Value::Boolean(true));
    assert_eq!(outcome.value.as_object().unwrap()["available"], Value::Integer(60));
    assert_eq!(transfers.lock().len(), 1);

    let outcome = engine.execute(&allocate(400).unwrap(), &options).unwrap();
    assert_eq!(outcome.value.as_object().unwrap()["allocated"], Value::Boolean(false));
    assert_eq!(transfers.lock().len(), 1);

    let err = engine
        .instantiate_template(
            "ResourceAllocation",
            &params(&[
                ("resource_type", "energy".into()),
                ("amount", 1.into()),
                ("pool_did", "did:icn:pool".into()),
                ("recipient_did", "did:icn:member".into()),
            ]),
        )
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { ref found, .. } if found == "\"energy\""));
}

#[test]
fn templates_round_trip_through_json_files() {
    let source = TemplateRegistry::new();
    source
        .register(
            Template::new("Dues", "let dues = {{ amount }}\nprint({{member}}, dues)\ndues")
                .with_parameter(TemplateParameter::required("member", ParameterType::Address))
                .with_parameter(TemplateParameter::optional(
                    "amount",
                    ParameterType::Integer,
                    Some(25.into()),
                )),
        )
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("templates.json");
    source
        .to_json(std::fs::File::create(&path).unwrap())
        .unwrap();

    let engine = EngineContext::new(EngineConfig {
        builtin_templates: false,
        ..EngineConfig::default()
    })
    .unwrap();
    let loaded = engine
        .templates()
        .load_json(std::fs::File::open(&path).unwrap())
        .unwrap();
    assert_eq!(loaded, 1);

    let script = engine
        .instantiate_template("Dues", &params(&[("member", "did:icn:ana".into())]))
        .unwrap();
    let outcome = engine.execute(&script, &ExecutionOptions::new()).unwrap();
    assert_eq!(outcome.value, Value::Integer(25));
    assert_eq!(outcome.output, vec!["did:icn:ana 25".to_string()]);

    // loading the same file again conflicts and registers nothing
    assert!(matches!(
        engine.templates().load_json(std::fs::File::open(&path).unwrap()),
        Err(Error::Conflict { .. })
    ));
    assert_eq!(engine.templates().names(), vec!["Dues".to_string()]);
}
