// Criterion benchmarks for php-rs-sapi-embed

use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use php_rs_sapi_embed::{Descriptor, Engine, Exported, Returns, Value};
use serde::Serialize;

#[derive(Serialize)]
struct Record {
    id: i64,
    name: String,
    tags: Vec<String>,
    score: f64,
}

struct Counter {
    count: i64,
}

impl Exported for Counter {
    fn describe(d: &mut Descriptor<Self>) {
        d.field("Count", |c: &Counter| c.count).method("Inc", |c, _| {
            c.count += 1;
            Returns::single(c.count)
        });
    }
}

fn bench_to_value(c: &mut Criterion) {
    let records: Vec<Record> = (0..100)
        .map(|id| Record {
            id,
            name: format!("record {}", id),
            tags: vec!["a".into(), "b".into()],
            score: id as f64 / 3.0,
        })
        .collect();
    c.bench_function("value_from_records", |b| {
        b.iter(|| Value::new(black_box(&records)))
    });

    let map: BTreeMap<String, i64> = (0..100).map(|i| (format!("k{}", i), i)).collect();
    c.bench_function("value_from_map", |b| b.iter(|| Value::new(black_box(&map))));
}

fn bench_to_host(c: &mut Criterion) {
    let value = Value::new(&(0..100).map(|i| vec![i, i * 2]).collect::<Vec<_>>()).unwrap();
    c.bench_function("value_interface_nested", |b| b.iter(|| black_box(&value).interface()));
}

fn bench_receiver_calls(c: &mut Criterion) {
    let engine = Engine::new().unwrap();
    engine
        .define("Counter", |_| Some(Counter { count: 0 }))
        .unwrap();
    let ctx = engine.new_context().unwrap();
    c.bench_function("receiver_method_calls", |b| {
        b.iter(|| ctx.eval(black_box("$c = new Counter; for ($i = 0; $i < 100; $i++) { $c->Inc(); } return $c->Count;")))
    });
}

criterion_group!(benches, bench_to_value, bench_to_host, bench_receiver_calls);
criterion_main!(benches);
