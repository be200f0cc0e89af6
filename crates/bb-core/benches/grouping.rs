use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bb_core::{GroupingPolicy, Rule};

fn synthetic_rules(count: u32) -> Vec<Rule> {
    (0..count)
        .map(|i| Rule::new(i % 24, format!("||host-{i}.example^$third-party")))
        .collect()
}

fn bench_group_rules(c: &mut Criterion) {
    let policy = GroupingPolicy::safari_default();
    let rules = synthetic_rules(150_000);

    c.bench_function("group_rules_150k", |b| {
        b.iter(|| policy.group_rules(black_box(&rules)))
    });
}

criterion_group!(benches, bench_group_rules);
criterion_main!(benches);
