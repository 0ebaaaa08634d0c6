//! Forwarding engine performance benchmarks
//!
//! Benchmarks for the hot paths of the engine:
//! - Face selection from a probability table
//! - The full decision loop including admission control
//! - Periodic table updates across many prefixes
//! - Limiter refills
//!
//! Run with: cargo bench -p saf-engine

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::sync::Arc;

use saf_core::{Delivery, FaceId, Name, NextHop, StaticRouter};
use saf_engine::{
    EngineConfig, ForwardingEngine, ForwardingMatrix, MatrixParams, ReliabilityStatistics,
};

// ============================================================================
// Helpers
// ============================================================================

fn faces(count: u32) -> Vec<FaceId> {
    (1..=count).filter_map(FaceId::new).collect()
}

fn router_with_faces(count: u32, link_rate: Option<u64>) -> Arc<StaticRouter> {
    let router = Arc::new(StaticRouter::new());
    let mut hops = Vec::new();
    for id in 1..=count {
        let face = router.add_face(id, link_rate);
        hops.push(NextHop::new(face, id));
    }
    router.set_route("/", hops).unwrap();
    router
}

fn seeded_config() -> EngineConfig {
    EngineConfig {
        rng_seed: Some(99),
        ..EngineConfig::default()
    }
}

// ============================================================================
// Matrix
// ============================================================================

fn bench_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("matrix");

    for count in [4u32, 16, 64] {
        let matrix = ForwardingMatrix::new(&faces(count), 1, &BTreeMap::new(), MatrixParams::default());
        let tried: Vec<FaceId> = faces(count / 2);
        let mut rng = StdRng::seed_from_u64(1);

        group.bench_function(format!("select_face_{count}_faces"), |b| {
            b.iter(|| matrix.select_face(0, black_box(&tried), &mut rng))
        });
    }

    let roster = faces(16);
    let mut stats = ReliabilityStatistics::new(&roster, 1, 6, 0.2);
    for (i, &face) in roster.iter().enumerate() {
        for n in 0..50 {
            let _ = stats.record_outcome(face, 0, n % (i + 2) != 0);
        }
    }
    let _ = stats.snapshot_and_roll(0);

    group.bench_function("update_16_faces", |b| {
        b.iter_batched(
            || ForwardingMatrix::new(&roster, 1, &BTreeMap::new(), MatrixParams::default()),
            |mut matrix| matrix.update(black_box(&stats)),
            criterion::BatchSize::SmallInput,
        )
    });

    group.finish();
}

// ============================================================================
// Engine
// ============================================================================

fn bench_decide(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_decide");

    let engine = ForwardingEngine::new(router_with_faces(8, None), seeded_config()).unwrap();
    let names: Vec<Name> = (0..64)
        .filter_map(|i| Name::parse(&format!("/prefix{}/item", i % 8)).ok())
        .collect();

    group.bench_function("decide_unlimited_8_faces", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % names.len();
            engine.decide(black_box(&names[i]), &[], &[])
        })
    });

    let limited = ForwardingEngine::new(router_with_faces(8, Some(1_000_000)), seeded_config()).unwrap();
    group.bench_function("decide_limited_8_faces", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % names.len();
            limited.refill_limiters();
            limited.decide(black_box(&names[i]), &[], &[])
        })
    });

    group.finish();
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_tick");

    let engine = ForwardingEngine::new(router_with_faces(8, None), seeded_config()).unwrap();
    let faces = engine.faces();
    for p in 0..100 {
        let name = Name::parse(&format!("/prefix{p}/item")).unwrap_or_default();
        engine.decide(&name, &[], &[]);
        for (i, &face) in faces.iter().enumerate().skip(1) {
            if i % 3 == 0 {
                engine.on_expired(&name, &[face]);
            } else {
                engine.on_satisfied(&name, face, &[face], &Delivery::default());
            }
        }
    }

    group.bench_function("tick_100_prefixes", |b| b.iter(|| engine.tick()));

    group.bench_function("refill_8_limiters", |b| {
        let limited = ForwardingEngine::new(router_with_faces(8, Some(10_000_000)), seeded_config()).unwrap();
        b.iter(|| limited.refill_limiters())
    });

    group.finish();
}

criterion_group!(benches, bench_matrix, bench_decide, bench_tick);

criterion_main!(benches);
