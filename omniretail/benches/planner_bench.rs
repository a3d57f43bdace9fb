//! Benchmarks for query planning.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use omniretail::context::Context;
use omniretail::planner::{extract_order_id, Planner};

fn planner_benchmark(c: &mut Criterion) {
    let planner = Planner::new();
    let session = Context::new().with("order_id", 7).with("product_name", "Widget");

    c.bench_function("plan_fresh_order_query", |b| {
        b.iter(|| planner.plan(black_box("Where is my order 7?"), Some(1), None));
    });

    c.bench_function("plan_continuation", |b| {
        b.iter(|| planner.plan(black_box("Tell me everything"), Some(1), Some(&session)));
    });

    c.bench_function("plan_unmatched", |b| {
        b.iter(|| planner.plan(black_box("Good morning, how are you today?"), None, None));
    });

    c.bench_function("extract_order_id", |b| {
        b.iter(|| extract_order_id(black_box("I need a refund for order number: 12345 please")));
    });
}

criterion_group!(benches, planner_benchmark);
criterion_main!(benches);
