use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use kyrorules::{
    Call, EngineConfig, Expression, FactCandidates, InMemoryRuleRepository, Record, Rule,
    RuleEngine, TupleEnumerator, TypeDescriptor, TypeRef, TypeRegistry, Value,
};

fn bench_enumeration(c: &mut Criterion) {
    let a: Vec<Value> = (0..20i64).map(Value::Int).collect();
    let b: Vec<Value> = (0..20i64).map(Value::Int).collect();
    let d: Vec<Value> = (0..20i64).map(Value::Int).collect();

    let mut group = c.benchmark_group("enumeration");
    group.throughput(Throughput::Elements(8_000));
    group.bench_function("odometer_20x20x20", |bench| {
        bench.iter(|| {
            let candidates = FactCandidates::new().with("a", &a).with("b", &b).with("d", &d);
            let count = TupleEnumerator::new(candidates)
                .unwrap()
                .filter(|t| t.len() == 3)
                .count();
            black_box(count)
        });
    });
    group.finish();
}

fn session_engine(config: EngineConfig) -> RuleEngine {
    let types = TypeRegistry::new()
        .with_type(
            TypeDescriptor::new("Order")
                .field("customer", TypeRef::Int)
                .field("total", TypeRef::Float),
        )
        .with_type(TypeDescriptor::new("Customer").field("id", TypeRef::Int));
    let rule = Rule::builder("big-orders")
        .fact("order", TypeRef::named("Order"))
        .fact("customer", TypeRef::named("Customer"))
        .when(Expression::and(vec![
            Expression::eq(
                Expression::placeholder("order.customer"),
                Expression::placeholder("customer.id"),
            ),
            Expression::gt(Expression::placeholder("order.total"), Expression::float(500.0)),
        ]))
        .then(Expression::function("count", TypeRef::Any, vec![]))
        .build()
        .unwrap();
    RuleEngine::builder()
        .repository(InMemoryRuleRepository::new().with_rules("bench", [rule]))
        .types(types)
        .uncached_function("count", |call: &Call<'_>| {
            call.result().update(|r| {
                if let Value::Int(n) = r {
                    *n += 1;
                }
            });
            Ok(Value::Null)
        })
        .config(config)
        .build()
        .unwrap()
}

fn session_facts() -> Vec<Value> {
    let mut facts: Vec<Value> = (0..200i64)
        .map(|i| {
            Value::from(
                Record::new("Order")
                    .with_field("customer", i % 50)
                    .with_field("total", (i * 7 % 1000) as f64),
            )
        })
        .collect();
    facts.extend((0..50i64).map(|id| Value::from(Record::new("Customer").with_field("id", id))));
    facts
}

fn bench_sessions(c: &mut Criterion) {
    let facts = session_facts();
    let mut group = c.benchmark_group("session");
    group.throughput(Throughput::Elements(200 * 50));

    for (name, config) in [
        ("sequential", EngineConfig::sequential()),
        ("parallel_4", EngineConfig::parallel(4)),
    ] {
        let engine = session_engine(config);
        let session = engine.create_session("bench").unwrap();
        group.bench_function(name, |b| {
            b.iter(|| black_box(session.execute(Value::Int(0), &facts).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_enumeration, bench_sessions);
criterion_main!(benches);
