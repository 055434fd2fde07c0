//! Overhead of the measurement harness itself.
//!
//! Strategies stop and restart the clock around unmeasured work, so the
//! cost of a toggle bounds how fine-grained those pauses can be.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use bookbench::fixtures::generate_books;
use bookbench::pagination::KeysetCursor;
use bookbench::strategy::sql::bulk_insert;
use bookbench::{alloc, benchmark, BenchTime};

fn bench_alloc_snapshot(c: &mut Criterion) {
    c.bench_function("harness/alloc_snapshot", |b| {
        b.iter(|| black_box(alloc::snapshot()));
    });
}

fn bench_timer_toggle(c: &mut Criterion) {
    let mut group = c.benchmark_group("harness/timer_toggle");

    for toggles in [1u64, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(toggles), &toggles, |b, &toggles| {
            b.iter(|| {
                let result = benchmark(BenchTime::Iterations(toggles), |bencher| {
                    for _ in 0..bencher.iterations() {
                        bencher.stop_timer();
                        bencher.start_timer();
                    }
                    Ok(())
                });
                black_box(result)
            });
        });
    }

    group.finish();
}

fn bench_fixtures(c: &mut Criterion) {
    let mut group = c.benchmark_group("harness/fixtures");

    for count in [1usize, 200, 2000] {
        group.bench_with_input(BenchmarkId::new("generate_books", count), &count, |b, &count| {
            b.iter(|| black_box(generate_books(count)));
        });
    }

    group.bench_function("bulk_insert_sql/2000", |b| {
        b.iter(|| black_box(bulk_insert(2000, false)));
    });

    group.bench_function("keyset_advance", |b| {
        let mut cursor = KeysetCursor::new(10);
        let page: Vec<i64> = (1..=10).collect();
        b.iter(|| {
            cursor.advance(page.iter().copied());
            black_box(cursor.after())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_alloc_snapshot, bench_timer_toggle, bench_fixtures);
criterion_main!(benches);
