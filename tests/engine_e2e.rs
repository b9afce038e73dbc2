use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kyrorules::{
    Call, ErrorEvent, Expression, InMemoryRuleRepository, InvocationError, Record, Rule,
    RuleEngine, SessionResult, TypeDescriptor, TypeRef, TypeRegistry, Value,
};

fn types() -> TypeRegistry {
    TypeRegistry::new()
        .with_type(TypeDescriptor::new("Party").field("name", TypeRef::String))
        .with_type(
            TypeDescriptor::new("Customer")
                .extends("Party")
                .field("id", TypeRef::Int)
                .field("tier", TypeRef::Int),
        )
        .with_type(
            TypeDescriptor::new("Order")
                .field("id", TypeRef::Int)
                .field("customer_id", TypeRef::Int)
                .field("total", TypeRef::Float),
        )
}

fn customer(id: i64, name: &str) -> Value {
    Value::from(
        Record::new("Customer")
            .with_field("id", id)
            .with_field("name", name)
            .with_field("tier", 1i64),
    )
}

fn order(id: i64, customer_id: i64, total: f64) -> Value {
    Value::from(
        Record::new("Order")
            .with_field("id", id)
            .with_field("customer_id", customer_id)
            .with_field("total", total),
    )
}

fn summary() -> Value {
    Value::from(Record::new("Summary"))
}

fn push(result: &SessionResult, field: &str, value: Value) {
    result.update(|r| {
        let Some(record) = r.as_record_mut() else {
            return;
        };
        match record.get_mut(field) {
            Some(Value::List(items)) => items.push(value),
            _ => {
                record.set(field, vec![value]);
            }
        }
    });
}

fn list(result: &Value, field: &str) -> Vec<Value> {
    result
        .field(field)
        .and_then(Value::as_list)
        .map(<[Value]>::to_vec)
        .unwrap_or_default()
}

fn recorder(field: &'static str) -> impl Fn(&Call<'_>) -> Result<Value, InvocationError> + Send + Sync {
    move |call: &Call<'_>| -> Result<Value, InvocationError> {
        push(call.result(), field, call.arg(0).cloned().unwrap_or_default());
        Ok(Value::Null)
    }
}

fn collecting_handler() -> (Arc<Mutex<Vec<ErrorEvent>>>, impl Fn(&ErrorEvent) + Send + Sync) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |event: &ErrorEvent| {
        sink.lock().expect("event sink").push(event.clone());
    })
}

#[test]
fn matching_tuples_fire_in_odometer_order() {
    let rule = Rule::builder("vip-order")
        .attribute("limit", TypeRef::Float, 100.0)
        .fact("order", TypeRef::named("Order"))
        .fact("customer", TypeRef::named("Customer"))
        .when(Expression::and(vec![
            Expression::gt(Expression::placeholder("order.total"), Expression::placeholder("limit")),
            Expression::eq(
                Expression::placeholder("order.customer_id"),
                Expression::placeholder("customer.id"),
            ),
        ]))
        .then(Expression::function(
            "flag",
            TypeRef::Any,
            vec![
                ("order", Expression::placeholder("order.id")),
                ("who", Expression::placeholder("customer.name")),
            ],
        ))
        .build()
        .expect("valid rule");

    let engine = RuleEngine::builder()
        .repository(InMemoryRuleRepository::new().with_rules("orders", [rule]))
        .types(types())
        .uncached_function("flag", |call: &Call<'_>| {
            let who = call.named("who").cloned().unwrap_or_default();
            push(call.result(), "flagged", call.named("order").cloned().unwrap_or_default());
            push(call.result(), "who", who);
            Ok(Value::Null)
        })
        .build()
        .expect("engine builds");

    let facts = vec![
        customer(1, "ada"),
        order(10, 1, 250.0),
        Value::from("noise"),
        order(11, 2, 50.0),
        customer(2, "bob"),
        order(12, 2, 500.0),
        Value::Int(3),
    ];
    let session = engine.create_session("orders").expect("session");
    let result = session.execute(summary(), &facts).expect("execute");

    assert_eq!(list(&result, "flagged"), vec![Value::Int(10), Value::Int(12)]);
    assert_eq!(list(&result, "who"), vec![Value::from("ada"), Value::from("bob")]);
}

#[test]
fn failing_action_is_isolated() {
    let fragile = Rule::builder("fragile")
        .fact("n", TypeRef::Int)
        .when(Expression::bool(true))
        .then(Expression::function("explode", TypeRef::Any, vec![("n", Expression::placeholder("n"))]))
        .then(Expression::function("record", TypeRef::Any, vec![("n", Expression::placeholder("n"))]))
        .build()
        .expect("valid rule");
    let steady = Rule::builder("steady")
        .fact("n", TypeRef::Int)
        .when(Expression::bool(true))
        .then(Expression::function("steady", TypeRef::Any, vec![("n", Expression::placeholder("n"))]))
        .build()
        .expect("valid rule");

    let (events, handler) = collecting_handler();
    let engine = RuleEngine::builder()
        .repository(InMemoryRuleRepository::new().with_rules("numbers", [fragile, steady]))
        .uncached_function("explode", |call: &Call<'_>| {
            if call.arg(0) == Some(&Value::Int(2)) {
                return Err(InvocationError::new("two is not allowed"));
            }
            Ok(Value::Null)
        })
        .uncached_function("record", recorder("fragile"))
        .uncached_function("steady", recorder("steady"))
        .error_handler(handler)
        .build()
        .expect("engine builds");

    let facts = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
    let result = engine
        .create_session("numbers")
        .expect("session")
        .execute(summary(), &facts)
        .expect("execute");

    assert_eq!(list(&result, "fragile"), vec![Value::Int(1), Value::Int(3)]);
    assert_eq!(list(&result, "steady").len(), 3);

    let events = events.lock().expect("events");
    assert_eq!(events.len(), 1);
    assert!(events[0].is_execution());
    assert_eq!(events[0].rule.as_deref(), Some("fragile"));
    assert_eq!(events[0].expression.as_deref(), Some("explode(n=${n})"));
}

#[test]
fn failing_predicate_call_is_reported_and_skipped() {
    let rule = Rule::builder("lookup")
        .fact("n", TypeRef::Int)
        .when(Expression::function("remote", TypeRef::Bool, vec![("n", Expression::placeholder("n"))]))
        .then(Expression::function("record", TypeRef::Any, vec![("n", Expression::placeholder("n"))]))
        .build()
        .expect("valid rule");

    let (events, handler) = collecting_handler();
    let engine = RuleEngine::builder()
        .repository(InMemoryRuleRepository::new().with_rules("numbers", [rule]))
        .function("remote", |call: &Call<'_>| match call.arg(0) {
            Some(Value::Int(1)) => Err(InvocationError::new("timeout")),
            Some(Value::Int(n)) => Ok(Value::Bool(*n > 2)),
            _ => Ok(Value::Null),
        })
        .uncached_function("record", recorder("seen"))
        .error_handler(handler)
        .build()
        .expect("engine builds");

    let facts: Vec<Value> = (1..=4i64).map(Value::Int).collect();
    let result = engine
        .create_session("numbers")
        .expect("session")
        .execute(summary(), &facts)
        .expect("execute");

    assert_eq!(list(&result, "seen"), vec![Value::Int(3), Value::Int(4)]);
    let events = events.lock().expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].expression.as_deref(), Some("remote(n=${n})"));
}

fn scoring_engine(cached: bool, calls: Arc<AtomicUsize>) -> RuleEngine {
    let rule = Rule::builder("score")
        .fact("n", TypeRef::Int)
        .when(Expression::gt(
            Expression::function("score", TypeRef::Int, vec![("n", Expression::placeholder("n"))]),
            Expression::int(0),
        ))
        .build()
        .expect("valid rule");
    let backend = move |call: &Call<'_>| -> Result<Value, InvocationError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(call.arg(0).cloned().unwrap_or_default())
    };
    let builder = RuleEngine::builder().repository(InMemoryRuleRepository::new().with_rules("s", [rule]));
    let builder = if cached {
        builder.function("score", backend)
    } else {
        builder.uncached_function("score", backend)
    };
    builder.build().expect("engine builds")
}

#[test]
fn cached_functions_run_once_per_argument_vector() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = scoring_engine(true, Arc::clone(&calls));
    let facts = vec![Value::Int(1), Value::Int(1), Value::Int(2)];

    let session = engine.create_session("s").expect("session");
    session.execute(Value::Null, &facts).expect("execute");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // The cache belongs to the engine, so a new session reuses it.
    engine
        .create_session("s")
        .expect("session")
        .execute(Value::Null, &facts)
        .expect("execute");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let stats = engine.cache_stats();
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.hits, 4);
    assert_eq!(stats.entries, 2);
}

#[test]
fn actions_fire_for_every_match_even_when_registered_cached() {
    let rule = Rule::builder("tally")
        .fact("n", TypeRef::Int)
        .when(Expression::gt(
            Expression::function("weight", TypeRef::Int, vec![("n", Expression::placeholder("n"))]),
            Expression::int(0),
        ))
        .then(Expression::function("bump", TypeRef::Any, vec![("n", Expression::placeholder("n"))]))
        .build()
        .expect("valid rule");

    let weighed = Arc::new(AtomicUsize::new(0));
    let bumped = Arc::new(AtomicUsize::new(0));
    let (weigh_count, bump_count) = (Arc::clone(&weighed), Arc::clone(&bumped));
    let engine = RuleEngine::builder()
        .repository(InMemoryRuleRepository::new().with_rules("tally", [rule]))
        .function("weight", move |call: &Call<'_>| {
            weigh_count.fetch_add(1, Ordering::SeqCst);
            Ok(call.arg(0).cloned().unwrap_or_default())
        })
        .function("bump", move |call: &Call<'_>| {
            bump_count.fetch_add(1, Ordering::SeqCst);
            call.result().update(|r| {
                if let Some(n) = r.as_int() {
                    *r = Value::Int(n + 1);
                }
            });
            Ok(Value::Null)
        })
        .build()
        .expect("engine builds");

    let facts = vec![Value::Int(7), Value::Int(7)];
    let session = engine.create_session("tally").expect("session");
    let first = session.execute(Value::Int(0), &facts).expect("execute");
    let second = session.execute(Value::Int(0), &facts).expect("execute");

    assert_eq!(first, Value::Int(2));
    assert_eq!(second, Value::Int(2));
    assert_eq!(bumped.load(Ordering::SeqCst), 4);
    // The predicate function is pure and stays memoized.
    assert_eq!(weighed.load(Ordering::SeqCst), 1);
    assert_eq!(engine.cache_stats().entries, 1);
}

#[test]
fn uncached_functions_always_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = scoring_engine(false, Arc::clone(&calls));
    let facts = vec![Value::Int(1), Value::Int(1)];
    engine
        .create_session("s")
        .expect("session")
        .execute(Value::Null, &facts)
        .expect("execute");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(engine.invocation_cache().is_empty());
}

#[test]
fn stop_processing_halts_remaining_units() {
    let first = Rule::builder("first")
        .fact("n", TypeRef::Int)
        .when(Expression::bool(true))
        .then(Expression::function("halt", TypeRef::Any, vec![("n", Expression::placeholder("n"))]))
        .then(Expression::function("record", TypeRef::Any, vec![("n", Expression::placeholder("n"))]))
        .build()
        .expect("valid rule");
    let second = Rule::builder("second")
        .when(Expression::bool(true))
        .then(Expression::function("record", TypeRef::Any, vec![("n", Expression::int(-1))]))
        .build()
        .expect("valid rule");

    let stopped_by = Arc::new(Mutex::new(Vec::new()));
    let listener_log = Arc::clone(&stopped_by);
    let engine = RuleEngine::builder()
        .repository(InMemoryRuleRepository::new().with_rules("numbers", [first, second]))
        .uncached_function("halt", |call: &Call<'_>| {
            call.stop_processing();
            Ok(Value::Null)
        })
        .uncached_function("record", recorder("seen"))
        .on_stop(move |rule: &str| listener_log.lock().expect("listener").push(rule.to_string()))
        .build()
        .expect("engine builds");

    let facts = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
    let session = engine.create_session("numbers").expect("session");
    let result = session.execute(summary(), &facts).expect("execute");

    // The unit that asked to stop still completes its remaining actions.
    assert_eq!(list(&result, "seen"), vec![Value::Int(1)]);
    assert_eq!(*stopped_by.lock().expect("listener"), vec!["first".to_string()]);

    // Each execution gets a fresh stop flag.
    let result = session.execute(summary(), &facts).expect("execute");
    assert_eq!(list(&result, "seen"), vec![Value::Int(1)]);
    assert_eq!(stopped_by.lock().expect("listener").len(), 2);
}

#[test]
fn rules_without_matching_facts_are_skipped() {
    let rule = Rule::builder("orders-only")
        .fact("order", TypeRef::named("Order"))
        .fact("n", TypeRef::Int)
        .when(Expression::bool(true))
        .then(Expression::function("record", TypeRef::Any, vec![]))
        .build()
        .expect("valid rule");
    let (events, handler) = collecting_handler();
    let engine = RuleEngine::builder()
        .repository(InMemoryRuleRepository::new().with_rules("r", [rule]))
        .types(types())
        .uncached_function("record", recorder("seen"))
        .error_handler(handler)
        .build()
        .expect("engine builds");

    let result = engine
        .create_session("r")
        .expect("session")
        .execute(summary(), &[Value::Int(1), customer(1, "ada")])
        .expect("execute");
    assert!(list(&result, "seen").is_empty());
    assert!(events.lock().expect("events").is_empty());
}

#[test]
fn ctx_references_read_the_result_object() {
    let rule = Rule::builder("threshold")
        .when(Expression::gt(Expression::placeholder("ctx.threshold"), Expression::int(5)))
        .then(Expression::function("mark", TypeRef::Any, vec![]))
        .build()
        .expect("valid rule");
    let engine = RuleEngine::builder()
        .repository(InMemoryRuleRepository::new().with_rules("r", [rule]))
        .uncached_function("mark", |call: &Call<'_>| {
            call.result().update(|r| {
                if let Some(record) = r.as_record_mut() {
                    record.set("marked", true);
                }
            });
            Ok(Value::Null)
        })
        .build()
        .expect("engine builds");
    let session = engine.create_session("r").expect("session");

    let high = Value::from(Record::new("Summary").with_field("threshold", 10i64));
    let result = session.execute(high, &[]).expect("execute");
    assert_eq!(result.field("marked"), Some(&Value::Bool(true)));

    let low = Value::from(Record::new("Summary").with_field("threshold", 1i64));
    let result = session.execute(low, &[]).expect("execute");
    assert_eq!(result.field("marked"), None);

    // No threshold at all: the predicate is unknown and nothing fires.
    let result = session.execute(summary(), &[]).expect("execute");
    assert_eq!(result.field("marked"), None);
}

#[test]
fn configuration_errors_abort_session_creation() {
    let rule = Rule::builder("typo")
        .fact("order", TypeRef::named("Order"))
        .when(Expression::gt(Expression::placeholder("order.totl"), Expression::int(1)))
        .build()
        .expect("valid rule");
    let (events, handler) = collecting_handler();
    let engine = RuleEngine::builder()
        .repository(InMemoryRuleRepository::new().with_rules("r", [rule]))
        .types(types())
        .error_handler(handler)
        .build()
        .expect("engine builds");

    let err = engine.create_session("r").expect_err("invalid path");
    assert!(err.is_configuration());
    let events = events.lock().expect("events");
    assert_eq!(events.len(), 1);
    assert!(events[0].is_configuration());
    assert_eq!(events[0].rule.as_deref(), Some("typo"));
}
