use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use skinner::aggregation::{
    aggregate, create_aggregator, make_linear_bucketizer, AggregatorConfig, BucketizerMap,
};
use skinner::types::Datapoint;

fn create_cpu_points(count: usize) -> Vec<Datapoint> {
    (0..count)
        .map(|i| {
            Datapoint::new(1.0)
                .with_field("host", format!("host{}", i % 64))
                .with_field("cpu", format!("cpu{}", i % 8))
                .with_field("util", ((i * 37) % 100) as f64)
        })
        .collect()
}

fn util_bucketizers() -> BucketizerMap {
    let mut bucketizers = BucketizerMap::new();
    bucketizers.insert("util".to_string(), make_linear_bucketizer(10).unwrap());
    bucketizers
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    let bucketizers = util_bucketizers();

    for size in [1000, 10000, 100000].iter() {
        let points = create_cpu_points(*size);

        group.bench_with_input(BenchmarkId::new("host", size), size, |b, _| {
            b.iter(|| black_box(aggregate(&points, &["host"], &bucketizers).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("host_cpu_util", size), size, |b, _| {
            b.iter(|| {
                black_box(aggregate(&points, &["host", "cpu", "util"], &bucketizers).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream");
    let bucketizers = util_bucketizers();

    for size in [1000, 10000, 100000].iter() {
        let points = create_cpu_points(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let config = AggregatorConfig::new(&["host", "util"])
                    .with_bucketizers(bucketizers.clone())
                    .results_as_points(true);
                let mut stream = create_aggregator(config).unwrap();
                stream.write_all(&points).unwrap();
                black_box(stream.end().unwrap().len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_aggregate, bench_stream);
criterion_main!(benches);
