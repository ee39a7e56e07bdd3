use carrot_cache::{Cache, CacheConfig, StorageKind, NO_EXPIRY};
use criterion::{criterion_group, criterion_main, Criterion};
use rand::RngCore;

fn offheap(name: &str) -> CacheConfig {
    let mut cfg = CacheConfig::new(name, StorageKind::OffHeap);
    cfg.storage_pool_size = 8;
    cfg.segment_size_bytes = 4 * 1024 * 1024;
    cfg
}

fn get_by_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("get by value size");

    let sizes = [128, 512, 1_024, 4_096, 16_000, 64_000, 256_000];

    let cache = Cache::new(offheap("get-by-size")).unwrap();
    let mut rng = rand::thread_rng();

    for size in sizes {
        let key = size.to_string();
        let mut data = vec![0u8; size];
        rng.fill_bytes(&mut data);
        cache.put(key.as_bytes(), &data, NO_EXPIRY).unwrap();
    }

    let mut buf = vec![0u8; *sizes.iter().max().unwrap()];
    for size in sizes {
        let key = size.to_string();
        group.bench_function(format!("{size} bytes"), |b| {
            b.iter(|| {
                cache.get(key.as_bytes(), &mut buf).unwrap();
            });
        });
    }
}

fn embedded_vs_segment(c: &mut Criterion) {
    let mut group = c.benchmark_group("embedded index value vs segment-backed value");

    let mut embedded_cfg = offheap("embedded");
    embedded_cfg.index_data_embedded = true;
    embedded_cfg.index_data_embedded_size = 256;
    let embedded = Cache::new(embedded_cfg).unwrap();
    embedded.put(b"small", &[0u8; 32], NO_EXPIRY).unwrap();

    let segment_backed = Cache::new(offheap("segment-backed")).unwrap();
    segment_backed.put(b"small", &[0u8; 32], NO_EXPIRY).unwrap();

    let mut buf = [0u8; 32];
    group.bench_function("embedded", |b| {
        b.iter(|| {
            embedded.get(b"small", &mut buf).unwrap();
        });
    });
    group.bench_function("segment-backed", |b| {
        b.iter(|| {
            segment_backed.get(b"small", &mut buf).unwrap();
        });
    });
}

fn put_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("put throughput");
    let cache = Cache::new(offheap("put-throughput")).unwrap();
    let value = vec![0u8; 1024];

    let mut i = 0u64;
    group.bench_function("1 KiB value", |b| {
        b.iter(|| {
            cache.put(&i.to_be_bytes(), &value, NO_EXPIRY).unwrap();
            i += 1;
        });
    });
}

criterion_group!(benches, get_by_size, embedded_vs_segment, put_throughput);
criterion_main!(benches);
