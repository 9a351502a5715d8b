//! Benchmarks for NFP computation and placement passes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sheetnest_core::progress::NullProgress;
use sheetnest_d2::nfp::{compute_inner_nfp, compute_outer_nfp};
use sheetnest_d2::{
    MinkowskiSumPick, NestConfig, NfpCache, NfpHelper, OverlayEngine, PlacementWorker, Polygon,
    Sheet, SheetInstance, WindowCache,
};

fn l_shape(w: f64, h: f64, notch: f64) -> Polygon {
    Polygon::from_xy(&[
        (0.0, 0.0),
        (w, 0.0),
        (w, notch),
        (notch, notch),
        (notch, h),
        (0.0, h),
    ])
}

fn bench_outer_nfp(c: &mut Criterion) {
    let engine = OverlayEngine::new();
    let mut group = c.benchmark_group("outer_nfp");

    for &segments in &[8usize, 32, 64] {
        let a = Polygon::circle(50.0, segments);
        let b = l_shape(40.0, 30.0, 10.0);
        group.bench_with_input(BenchmarkId::new("circle_vs_l", segments), &(a, b), |bench, (a, b)| {
            bench.iter(|| {
                compute_outer_nfp(
                    &engine,
                    black_box(a),
                    black_box(b),
                    MinkowskiSumPick::Largest,
                    10_000_000.0,
                )
            })
        });
    }
    group.finish();
}

fn bench_inner_nfp(c: &mut Criterion) {
    let engine = OverlayEngine::new();
    let sheet = Polygon::rectangle(1000.0, 500.0).with_hole(Polygon::from_xy(&[
        (400.0, 200.0),
        (600.0, 200.0),
        (600.0, 300.0),
        (400.0, 300.0),
    ]));
    let part = l_shape(80.0, 60.0, 20.0);

    c.bench_function("inner_nfp_sheet_with_hole", |b| {
        b.iter(|| compute_inner_nfp(&engine, black_box(&sheet), black_box(&part), 10_000_000.0))
    });
}

fn bench_placement_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("placement_pass");
    group.sample_size(10);

    let engine = OverlayEngine::new();
    let config = NestConfig::default();
    let sheets = vec![SheetInstance::from(Sheet::rectangle(300.0, 200.0))];

    for &n in &[5usize, 10, 20] {
        let parts: Vec<Polygon> = (0..n)
            .map(|i| {
                let w = 20.0 + (i as f64 * 3.0) % 30.0;
                let h = 15.0 + (i as f64 * 7.0) % 25.0;
                Polygon::rectangle(w, h).with_id(i).with_source(i)
            })
            .collect();
        // Shared across iterations, so later passes time placement alone.
        let cache = NfpCache::new();

        group.bench_with_input(BenchmarkId::new("rectangles", n), &parts, |b, parts| {
            b.iter(|| {
                let window = WindowCache::new();
                let helper = NfpHelper::new(&engine, &cache, &window, &config);
                let mut worker = PlacementWorker::new(&config, &helper, &sheets, &NullProgress);
                black_box(worker.place_parts(parts.clone()))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_outer_nfp, bench_inner_nfp, bench_placement_pass);
criterion_main!(benches);
