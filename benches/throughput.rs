//! Throughput Benchmark for BlockKV
//!
//! Measures `set` and `get` on a table, with and without memory pressure.

use blockkv::{Settings, Table};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tempfile::TempDir;

fn open(dir: &TempDir, memory_ceiling: u64) -> Table {
    Table::open(
        Settings::new(dir.path())
            .with_arena_size(1024 * 1024)
            .with_memory_ceiling(memory_ceiling),
    )
    .unwrap()
}

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut table = open(&dir, u64::MAX);

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_new_keys", |b| {
        let mut i = 0u64;
        let value = [7u8; 48];
        b.iter(|| {
            table.set(&i.to_le_bytes(), &value).unwrap();
            i += 1;
        });
    });

    group.bench_function("set_overwrite", |b| {
        let mut i = 0u64;
        let value = [9u8; 16];
        b.iter(|| {
            table.set(&(i % 10_000).to_le_bytes(), &value).unwrap();
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut table = open(&dir, u64::MAX);

    // Pre-populate with data
    for i in 0..100_000u32 {
        table.set(&i.to_le_bytes(), format!("value:{}", i).as_bytes()).unwrap();
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u32;
        b.iter(|| {
            black_box(table.get(&(i % 100_000).to_le_bytes()).unwrap());
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(table.get(&(u64::MAX - i).to_le_bytes()).unwrap());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark writes under a memory ceiling, maintenance included
fn bench_pressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("pressure");
    group.throughput(Throughput::Elements(40_000));
    group.sample_size(20);

    group.bench_function("40k_sets_2mb_ceiling", |b| {
        b.iter_batched(
            || {
                let dir = tempfile::tempdir().unwrap();
                let table = open(&dir, 2 * 1024 * 1024);
                (dir, table)
            },
            |(dir, mut table)| {
                for i in 0..40_000u32 {
                    table.set(&i.to_le_bytes(), &[i as u8; 64]).unwrap();
                }
                black_box(table.size());
                drop(table);
                drop(dir);
            },
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_set, bench_get, bench_pressure);
criterion_main!(benches);
