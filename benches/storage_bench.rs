//! Benchmarks for EmberKV storage operations

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::TempDir;

use emberkv::{Config, Engine};

fn engine_with_dir() -> (TempDir, Engine) {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .memtable_size_limit(16 * 1024 * 1024)
        .build();
    (temp, Engine::open(config).unwrap())
}

fn storage_benchmarks(c: &mut Criterion) {
    c.bench_function("set_1k_value", |b| {
        let (_temp, engine) = engine_with_dir();
        let value = vec![0xABu8; 1024];
        let mut i = 0u64;
        b.iter(|| {
            engine
                .set(format!("key{}", i).as_bytes(), &value)
                .unwrap();
            i += 1;
        });
    });

    c.bench_function("get_memtable_hit", |b| {
        let (_temp, engine) = engine_with_dir();
        for i in 0..1000 {
            engine
                .set(format!("key{:04}", i).as_bytes(), b"value")
                .unwrap();
        }
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key{:04}", i % 1000);
            assert!(engine.get(key.as_bytes()).is_some());
            i += 1;
        });
    });

    c.bench_function("get_sstable_hit", |b| {
        let (_temp, engine) = engine_with_dir();
        for i in 0..1000 {
            engine
                .set(format!("key{:04}", i).as_bytes(), b"value")
                .unwrap();
        }
        engine.flush().unwrap();
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key{:04}", i % 1000);
            assert!(engine.get(key.as_bytes()).is_some());
            i += 1;
        });
    });

    c.bench_function("flush_1000_entries", |b| {
        b.iter_batched(
            || {
                let (temp, engine) = engine_with_dir();
                for i in 0..1000 {
                    engine
                        .set(format!("key{:04}", i).as_bytes(), b"value")
                        .unwrap();
                }
                (temp, engine)
            },
            |(_temp, engine)| engine.flush().unwrap(),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, storage_benchmarks);
criterion_main!(benches);
