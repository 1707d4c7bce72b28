use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use paged_ddsketch::DDSketch;
use rand::SeedableRng;
use rand_distr::{Distribution, Pareto};

fn make_points(size: usize) -> Vec<f64> {
    // Latency-like samples in microseconds, between 15 milliseconds and 10 seconds.
    let distribution = Pareto::new(1.0, 1.0).expect("pareto distribution should be valid");
    let mut rng = rand::rngs::SmallRng::seed_from_u64(0xC0FFEE);
    distribution
        .sample_iter(&mut rng)
        .map(|n| n * 10_000.0)
        .filter(|n| *n > 15_000.0 && *n < 10_000_000.0)
        .take(size)
        .collect()
}

fn bench_record(c: &mut Criterion) {
    let sizes = [1, 10, 100, 1_000, 10_000];

    let mut group = c.benchmark_group("DDSketch/record-single");
    for size in sizes {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let vals = make_points(size);
            b.iter(|| {
                let mut sketch: DDSketch = DDSketch::default();
                for val in &vals {
                    sketch.add(*val).unwrap();
                }
                sketch
            });
        });
    }
    group.finish();

    let mut group = c.benchmark_group("DDSketch/record-weighted");
    for size in sizes {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let vals = make_points(size);
            b.iter(|| {
                let mut sketch: DDSketch = DDSketch::default();
                for val in &vals {
                    sketch.record(*val, 3.0).unwrap();
                }
                sketch
            });
        });
    }
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("DDSketch/merge");
    for size in [10usize, 100, 500, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let vals = make_points(size);

            let mut s1: DDSketch = DDSketch::default();
            let mut s2: DDSketch = DDSketch::default();
            s1.record_batch(&vals[..size / 2]).unwrap();
            s2.record_batch(&vals[size / 2..]).unwrap();

            b.iter(|| {
                let mut target = s1.clone();
                target.merge(s2.clone()).unwrap();
                target
            });
        });
    }
    group.finish();
}

fn bench_quantile(c: &mut Criterion) {
    let mut group = c.benchmark_group("DDSketch/quantile");
    for size in [10usize, 100, 500, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut sketch: DDSketch = DDSketch::default();
            sketch.record_batch(&make_points(size)).unwrap();

            b.iter(|| sketch.quantile_value(0.5));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_record, bench_merge, bench_quantile);
criterion_main!(benches);
