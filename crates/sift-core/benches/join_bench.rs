use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use sift_core::{Consequence, Fact, FactBase, FactId, Pattern, Rule, Touched, Value, World};
use std::hint::black_box;

fn edge(id: FactId, a: i64, b: i64) -> Fact {
    Fact::new(id, vec![Value::Int(a), Value::Int(b)])
}

fn chain_facts(size: i64) -> (FactBase, FactId, FactId) {
    let mut facts = FactBase::new();
    let adjacent = facts.declare("Adjacent", 2).unwrap();
    let path = facts.declare("Path", 2).unwrap();
    for i in 0..size {
        facts.assert(edge(adjacent, i, i + 1), false).unwrap();
    }
    (facts, adjacent, path)
}

fn path_rule(adjacent: FactId, path: FactId) -> Rule {
    Rule::new("path")
        .when(Pattern::new(adjacent).bind(0, 0).bind(1, 1))
        .when(Pattern::new(adjacent).bind(0, 1).bind(1, 2))
        .then(Consequence::from_slots(path, &[0, 2]))
}

fn bench_full_vs_incremental(c: &mut Criterion) {
    let mut group = c.benchmark_group("self_join");

    for size in [100_i64, 400] {
        group.bench_with_input(BenchmarkId::new("full_scan", size), &size, |b, &size| {
            b.iter_batched(
                || chain_facts(size),
                |(mut facts, adjacent, path)| {
                    black_box(path_rule(adjacent, path).run_full(&mut facts).unwrap())
                },
                criterion::BatchSize::SmallInput,
            );
        });

        // Settled chain plus a single new edge at the end
        group.bench_with_input(BenchmarkId::new("incremental", size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let (mut facts, adjacent, path) = chain_facts(size);
                    facts.commit_all();
                    facts.assert(edge(adjacent, size, size + 1), false).unwrap();
                    (facts, adjacent, path)
                },
                |(mut facts, adjacent, path)| {
                    let touched = Touched::snapshot(&facts);
                    let rule = path_rule(adjacent, path);
                    black_box(rule.run_incremental(&mut facts, &touched).unwrap())
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_world_ticks(c: &mut Criterion) {
    c.bench_function("tick_with_100_new_edges", |b| {
        b.iter_batched(
            || {
                let mut world = World::new();
                let adjacent = world.declare("Adjacent", 2).unwrap();
                let path = world.declare("Path", 2).unwrap();
                world.add_rule(path_rule(adjacent, path).dedupe(true)).unwrap();
                for i in 0..1_000 {
                    world.assert("Adjacent", [i, i + 1]).unwrap();
                }
                world.simulate().unwrap();
                for i in 1_000..1_100 {
                    world.assert("Adjacent", [i, i + 1]).unwrap();
                }
                world
            },
            |mut world| black_box(world.simulate().unwrap()),
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_full_vs_incremental, bench_world_ticks);
criterion_main!(benches);
