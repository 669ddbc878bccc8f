use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use adaas_charts::{ChartBuilder, ChartDescriptor, ChartKind, recommend};
use adaas_core::{Dataset, Row};

/// Synthetic claims table: 8 regions, a numeric amount and a date column.
fn claims(n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| {
            Row::new()
                .with("region", format!("R{}", i % 8))
                .with("amount", ((i * 37) % 1000) as f64)
                .with("age", (18 + i % 60) as f64)
                .with("claim_date", format!("2024-{:02}-{:02}", 1 + i % 12, 1 + i % 28))
        })
        .collect()
}

fn bench_build_by_kind(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_by_kind");
    let builder = ChartBuilder::default();

    let descriptors = [
        ChartDescriptor::new(ChartKind::Bar, ["region"]),
        ChartDescriptor::new(ChartKind::Bar, ["region", "amount"]),
        ChartDescriptor::new(ChartKind::Scatter, ["age", "amount"]),
        ChartDescriptor::new(ChartKind::Line, ["claim_date", "amount"]),
        ChartDescriptor::new(ChartKind::Boxplot, ["amount", "age"]),
        ChartDescriptor::new(ChartKind::Heatmap, ["region", "age", "amount"]),
    ];

    for size in [100usize, 10_000] {
        let rows = claims(size);
        group.throughput(Throughput::Elements(size as u64));
        for d in &descriptors {
            group.bench_with_input(BenchmarkId::new(d.title(), size), &rows, |b, rows| {
                b.iter(|| builder.build(black_box(d), black_box(rows)));
            });
        }
    }

    group.finish();
}

fn bench_recommend(c: &mut Criterion) {
    let dataset = Dataset::from_rows(claims(10_000));
    c.bench_function("recommend_10k_rows", |b| {
        b.iter(|| recommend(black_box(&dataset)));
    });
}

criterion_group!(benches, bench_build_by_kind, bench_recommend);
criterion_main!(benches);
