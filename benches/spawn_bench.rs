#![allow(dead_code)]
//! Focused entity churn benchmark: spawn, add, destroy at various scales,
//! isolated from the broader `ecs_bench` suite so it can be run on its own
//! when tuning the entity pool and dense table growth strategy.
//!
//! Run with: cargo bench --bench spawn_bench

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use voxel_ecs_core::World;

#[derive(Debug, Copy, Clone)]
struct Position {
    x: f32,
    y: f32,
}

fn bench_create_destroy_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn");

    for count in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("create_add_destroy", count), &count, |b, &count| {
            b.iter(|| {
                let mut world = World::new();
                world.register_component::<Position>("Position");
                let mut entities = Vec::with_capacity(count);
                for i in 0..count {
                    let e = world.create();
                    world.add(e, Position { x: i as f32, y: 0.0 });
                    entities.push(e);
                }
                for e in entities {
                    world.destroy(e);
                }
            });
        });
    }

    group.finish();
}

fn bench_recycled_create(c: &mut Criterion) {
    c.bench_function("create_after_recycle_1k", |b| {
        b.iter_batched(
            || {
                let mut world = World::new();
                world.register_component::<Position>("Position");
                let entities: Vec<_> = (0..1_000)
                    .map(|i| {
                        let e = world.create();
                        world.add(e, Position { x: i as f32, y: 0.0 });
                        e
                    })
                    .collect();
                for e in &entities {
                    world.destroy(*e);
                }
                world
            },
            |mut world| {
                for i in 0..1_000 {
                    let e = world.create();
                    world.add(e, Position { x: i as f32, y: 0.0 });
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_create_destroy_cycle, bench_recycled_create);
criterion_main!(benches);
