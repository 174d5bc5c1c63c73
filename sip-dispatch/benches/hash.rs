use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sip_dispatch::distributor::hash_bucket;

fn bench_hash_bucket(c: &mut Criterion) {
    let call_ids = [
        "3848276298220188511@atlanta.example.com",
        "a84b4c76e66710@pc33.atlanta.com",
        "f81d4fae-7dec-11d0-a765-00a0c91e6bf6@biloxi.example.com",
    ];

    c.bench_function("hash bucket call-id and tag", |b| {
        b.iter(|| {
            for call_id in &call_ids {
                black_box(hash_bucket(black_box(call_id), black_box(Some("9fxced76sl"))));
            }
        });
    });

    c.bench_function("hash bucket without tag", |b| {
        b.iter(|| {
            for call_id in &call_ids {
                black_box(hash_bucket(black_box(call_id), None));
            }
        });
    });
}

criterion_group!(benches, bench_hash_bucket);
criterion_main!(benches);
