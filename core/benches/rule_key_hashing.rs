use anvil_core::fingerprint::{hash_contributions, Contribution, FieldValue};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn contributions(count: usize) -> Vec<Contribution> {
    (0..count)
        .map(|i| {
            let sources = FieldValue::list((0..16).map(|j| format!("src/module_{}/file_{}.rs", i, j)));
            Contribution::new(format!("field_{}", i), sources)
        })
        .collect()
}

pub fn rule_key_hashing(c: &mut Criterion) {
    let small = contributions(4);
    let large = contributions(512);
    c.bench_function("hash_contributions small rule", |b| {
        b.iter(|| hash_contributions(black_box(&small)))
    });
    c.bench_function("hash_contributions large rule", |b| {
        b.iter(|| hash_contributions(black_box(&large)))
    });
}

criterion_group!(benches, rule_key_hashing);
criterion_main!(benches);
