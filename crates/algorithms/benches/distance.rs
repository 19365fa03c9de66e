//! Benchmarks for per-pixel distance scoring

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ecosdm_algorithms::bioclim::bioclim;
use ecosdm_algorithms::distance::{DistanceMetric, DistanceParams, DistanceScorer};
use ecosdm_algorithms::matrix::SpatialFeatureGrid;
use ecosdm_core::{GeoTransform, SdmContext};
use ndarray::{Array1, Array2, Array3};

const LAYERS: usize = 8;

fn create_grid(size: usize) -> SpatialFeatureGrid {
    let data = Array3::from_shape_fn((size, size, LAYERS), |(row, col, layer)| {
        let base = (row + col) as f64;
        let variation = ((row * 7 + col * 13 + layer * 31) % 100) as f64 / 10.0;
        base + variation
    });
    let names = (0..LAYERS).map(|i| format!("bio{}", i + 1)).collect();
    SpatialFeatureGrid::from_parts(
        data,
        names,
        GeoTransform::new(0.0, size as f64, 1.0, -1.0),
        None,
    )
    .unwrap()
}

fn occurrences() -> Array2<f64> {
    Array2::from_shape_fn((50, LAYERS), |(i, j)| ((i * 17 + j * 5) % 23) as f64 + i as f64)
}

fn bench_distance(c: &mut Criterion) {
    let ctx = SdmContext::new("bench");
    let occ = occurrences();
    let center = Array1::from_elem(LAYERS, 20.0);

    for metric in [DistanceMetric::Euclidean, DistanceMetric::Mahalanobis] {
        let params = DistanceParams {
            metric,
            ..Default::default()
        };
        let scorer = DistanceScorer::new(&params, center.clone(), occ.view(), &ctx).unwrap();
        let mut group = c.benchmark_group(format!("distance_{}", metric));

        for size in [256, 512, 1024].iter() {
            let grid = create_grid(*size);
            group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
                b.iter(|| scorer.score_grid(black_box(&grid)).unwrap())
            });
        }
        group.finish();
    }
}

fn bench_bioclim(c: &mut Criterion) {
    let ctx = SdmContext::new("bench");
    let occ = occurrences();
    let mut group = c.benchmark_group("bioclim");

    for size in [256, 512, 1024].iter() {
        let grid = create_grid(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| bioclim(black_box(&grid), occ.view(), &ctx).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_distance, bench_bioclim);
criterion_main!(benches);
