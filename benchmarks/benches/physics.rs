//! Physics benchmarks (criterion - wall-clock time).
//!
//! Run all:    cargo bench --manifest-path benchmarks/Cargo.toml --bench physics
//! Filter:     cargo bench --manifest-path benchmarks/Cargo.toml --bench physics -- narrowphase

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec2;
use rein2d::collision::{
    collide_circles, collide_polygon_and_circle, collide_polygons, distance, time_of_impact,
    BroadPhase, DistanceInput, DistanceProxy, SimplexCache, ToiInput,
};
use rein2d::{Aabb, CircleShape, PolygonShape, Shape, Sweep, Transform};
use rein2d_bench::*;

// ---------------------------------------------------------------------------
// Broadphase
// ---------------------------------------------------------------------------

fn bench_broadphase(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadphase/update_pairs");
    for &n in &[100, 500, 1000, 2000] {
        let columns = (n as f32).sqrt() as usize;
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let mut bp = BroadPhase::new();
                    for i in 0..n {
                        let p = Vec2::new((i % columns) as f32 * 1.5, (i / columns) as f32 * 1.5);
                        let aabb = Aabb::new(p - Vec2::splat(1.0), p + Vec2::splat(1.0));
                        bp.create_proxy(&aabb, i);
                    }
                    bp
                },
                |mut bp| bp.update_pairs(),
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Narrowphase
// ---------------------------------------------------------------------------

fn bench_narrowphase(c: &mut Criterion) {
    let circle = CircleShape::new(0.5).expect("valid radius");
    let block = PolygonShape::new_box(0.5, 0.5).expect("valid box");
    let xf_a = Transform::IDENTITY;

    {
        let mut group = c.benchmark_group("narrowphase/circles");
        let hit = Transform::new(Vec2::new(0.8, 0.0), 0.0);
        group.bench_function("intersecting", |b| {
            b.iter(|| collide_circles(&circle, &xf_a, &circle, &hit));
        });
        let miss = Transform::new(Vec2::new(5.0, 0.0), 0.0);
        group.bench_function("separated", |b| {
            b.iter(|| collide_circles(&circle, &xf_a, &circle, &miss));
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("narrowphase/polygons");
        let hit = Transform::new(Vec2::new(0.9, 0.1), 0.0);
        group.bench_function("intersecting", |b| {
            b.iter(|| collide_polygons(&block, &xf_a, &block, &hit));
        });
        let rotated = Transform::new(Vec2::new(0.9, 0.1), 0.785);
        group.bench_function("rotated", |b| {
            b.iter(|| collide_polygons(&block, &xf_a, &block, &rotated));
        });
        let miss = Transform::new(Vec2::new(5.0, 0.0), 0.0);
        group.bench_function("separated", |b| {
            b.iter(|| collide_polygons(&block, &xf_a, &block, &miss));
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("narrowphase/polygon_circle");
        let hit = Transform::new(Vec2::new(0.9, 0.2), 0.0);
        group.bench_function("intersecting", |b| {
            b.iter(|| collide_polygon_and_circle(&block, &xf_a, &circle, &hit));
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("narrowphase/distance");
        let a = Shape::Polygon(block.clone());
        let input = DistanceInput {
            proxy_a: DistanceProxy::new(&a, 0),
            proxy_b: DistanceProxy::new(&a, 0),
            transform_a: xf_a,
            transform_b: Transform::new(Vec2::new(3.0, 0.5), 0.3),
            use_radii: true,
        };
        group.bench_function("cold_cache", |b| {
            b.iter(|| distance(&mut SimplexCache::default(), &input));
        });
        group.finish();
    }
}

// ---------------------------------------------------------------------------
// Time of impact
// ---------------------------------------------------------------------------

fn bench_toi(c: &mut Criterion) {
    let mut group = c.benchmark_group("toi");
    let shape = Shape::Polygon(PolygonShape::new_box(0.5, 0.5).expect("valid box"));
    let sweep = |c0: Vec2, c: Vec2, a: f32| Sweep {
        local_center: Vec2::ZERO,
        c0,
        c,
        a0: 0.0,
        a,
        alpha0: 0.0,
    };

    let input = ToiInput {
        proxy_a: DistanceProxy::new(&shape, 0),
        proxy_b: DistanceProxy::new(&shape, 0),
        sweep_a: sweep(Vec2::ZERO, Vec2::ZERO, 0.0),
        sweep_b: sweep(Vec2::new(-20.0, 0.1), Vec2::new(20.0, 0.1), 3.0),
        t_max: 1.0,
    };
    group.bench_function("spinning_box", |b| b.iter(|| time_of_impact(&input)));

    let miss = ToiInput {
        sweep_b: sweep(Vec2::new(-20.0, 5.0), Vec2::new(20.0, 5.0), 0.0),
        ..input
    };
    group.bench_function("miss", |b| b.iter(|| time_of_impact(&miss)));
    group.finish();
}

// ---------------------------------------------------------------------------
// Full pipeline
// ---------------------------------------------------------------------------

fn bench_pipeline(c: &mut Criterion) {
    {
        let mut group = c.benchmark_group("pipeline/stacks_step");
        group.sample_size(30);
        for &n in &[25, 100, 400] {
            group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
                b.iter_batched(
                    || setup_stacks(n).expect("scene setup"),
                    |mut world| world.step(1.0 / 60.0),
                    criterion::BatchSize::LargeInput,
                );
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("pipeline/pile_sustained_60steps");
        group.sample_size(10);
        for &n in &[100, 500] {
            group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
                b.iter_batched(
                    || setup_pile(n).expect("scene setup"),
                    |mut world| run_steps(&mut world, 60),
                    criterion::BatchSize::LargeInput,
                );
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("pipeline/chain_60steps");
        group.sample_size(10);
        for &links in &[10, 30] {
            group.bench_with_input(BenchmarkId::from_parameter(links), &links, |b, &links| {
                b.iter_batched(
                    || setup_chain(links).expect("scene setup"),
                    |mut world| run_steps(&mut world, 60),
                    criterion::BatchSize::LargeInput,
                );
            });
        }
        group.finish();
    }

    {
        let mut group = c.benchmark_group("pipeline/bullets_10steps");
        group.sample_size(10);
        for &n in &[10, 50] {
            group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
                b.iter_batched(
                    || setup_bullets(n).expect("scene setup"),
                    |mut world| run_steps(&mut world, 10),
                    criterion::BatchSize::LargeInput,
                );
            });
        }
        group.finish();
    }
}

criterion_group!(
    benches,
    bench_broadphase,
    bench_narrowphase,
    bench_toi,
    bench_pipeline
);
criterion_main!(benches);
