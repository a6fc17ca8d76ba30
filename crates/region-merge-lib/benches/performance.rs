//! Performance benchmarks for region-merge-lib
//!
//! Run with: cargo bench --package region-merge-lib
//!
//! Synthetic input: a tiled grid of WGS84 cells whose sizes vary by row and column,
//! so every merge step has real neighbors and a non-trivial smallest region.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use geo::{Geometry, MultiPolygon, polygon};
use region_merge_lib::{Feature, MergeConfig, MergeEngine, Properties, RegionSet, SpatialIndex};

/// Generate a `side x side` grid of adjacent cells starting at (base_lon, base_lat)
fn generate_grid(side: usize, base_lon: f64, base_lat: f64) -> Vec<Feature> {
    // Cell sizes cycle so areas differ between neighbors
    let size = |i: usize| 0.05 + (i % 5) as f64 * 0.02;

    let mut features = Vec::with_capacity(side * side);
    let mut lat = base_lat;
    for row in 0..side {
        let mut lon = base_lon;
        for col in 0..side {
            let (w, h) = (size(col), size(row + 2));
            let cell = polygon![
                (x: lon, y: lat),
                (x: lon + w, y: lat),
                (x: lon + w, y: lat + h),
                (x: lon, y: lat + h),
            ];
            let mut properties = Properties::new();
            properties.insert("name".to_string(), format!("cell-{row}-{col}").into());
            features.push(Feature::new(
                Geometry::MultiPolygon(MultiPolygon::new(vec![cell])),
                properties,
            ));
            lon += w;
        }
        lat += size(row + 2);
    }
    features
}

fn config(threshold_km2: f64) -> MergeConfig {
    MergeConfig {
        threshold_km2,
        ..MergeConfig::default()
    }
}

// ============================================================================
// Core Benchmarks - Key performance indicators
// ============================================================================

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");
    group.sample_size(20);

    for side in [10, 30] {
        let features = generate_grid(side, 2.0, 45.0);
        group.throughput(Throughput::Elements((side * side) as u64));
        group.bench_with_input(BenchmarkId::new("parallel", side * side), &features, |b, f| {
            b.iter(|| MergeEngine::load(config(1.0), f.clone()).unwrap());
        });
    }

    group.finish();
}

fn bench_index_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");

    let (engine, _) = MergeEngine::load(config(1.0), generate_grid(30, 2.0, 45.0)).unwrap();
    let regions: &RegionSet = engine.regions();

    group.throughput(Throughput::Elements(regions.len() as u64));
    group.bench_function("rebuild_900", |b| {
        b.iter(|| SpatialIndex::build(regions));
    });

    group.finish();
}

fn bench_merge_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    group.sample_size(10);

    for side in [5, 10] {
        let features = generate_grid(side, 2.0, 45.0);
        // High enough that most of the grid collapses
        let threshold_km2 = 500.0;
        group.bench_with_input(BenchmarkId::new("run", side * side), &features, |b, f| {
            b.iter(|| {
                let (mut engine, _) = MergeEngine::load(config(threshold_km2), f.clone()).unwrap();
                engine.run().unwrap()
            });
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(benches, bench_load, bench_index_rebuild, bench_merge_loop);

criterion_main!(benches);
