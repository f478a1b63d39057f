use criterion::{criterion_group, criterion_main, Criterion};
use rq_core::{RecordKey, Row, Value};
use rq_dataflow::operators::{DistinctOperator, FilterOperator, MapOperator};
use rq_dataflow::{RowMultiset, UnaryOperator};

fn batch(n: i64) -> RowMultiset {
    let mut ms = RowMultiset::new();
    for i in 0..n {
        let mut row = Row::new();
        row.set("n", Value::Int(i));
        ms.push((RecordKey::Int(i), row), 1);
    }
    ms
}

fn filter_bench(c: &mut Criterion) {
    c.bench_function("filter_10k_rows", |b| {
        b.iter(|| {
            let mut op = FilterOperator::new(|_: &RecordKey, row: &Row| {
                row.get("n").and_then(|v| v.as_i64()).map(|n| n % 2 == 0).unwrap_or(false)
            });
            op.step(batch(10_000))
        })
    });
}

fn map_bench(c: &mut Criterion) {
    c.bench_function("map_10k_rows", |b| {
        b.iter(|| {
            let mut op = MapOperator::new(|_: &RecordKey, row: &Row| {
                let mut out = row.clone();
                out.set("doubled", Value::Int(row.get("n").and_then(|v| v.as_i64()).unwrap_or(0) * 2));
                out
            });
            op.step(batch(10_000))
        })
    });
}

fn distinct_bench(c: &mut Criterion) {
    c.bench_function("distinct_10k_rows_with_duplicates", |b| {
        b.iter(|| {
            let mut op = DistinctOperator::per_value();
            let mut ms = batch(5_000);
            ms.extend(batch(5_000).into_inner());
            op.step(ms)
        })
    });
}

criterion_group!(benches, filter_bench, map_bench, distinct_bench);
criterion_main!(benches);
