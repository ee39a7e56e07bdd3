// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use carrot_cache::{Cache, CacheConfig, GetOutcome, PutOutcome, StorageKind, NO_EXPIRY};

fn offheap(name: &str) -> CacheConfig {
    let mut cfg = CacheConfig::new(name, StorageKind::OffHeap);
    cfg.storage_pool_size = 2;
    cfg.segment_size_bytes = 8192;
    cfg
}

#[test]
fn put_get_delete_round_trip() {
    let cache = Cache::new(offheap("main")).unwrap();

    assert_eq!(cache.put(b"alpha", b"one", NO_EXPIRY).unwrap(), PutOutcome::Inserted);
    assert_eq!(cache.put(b"beta", b"two", NO_EXPIRY).unwrap(), PutOutcome::Inserted);
    assert_eq!(cache.put(b"alpha", b"uno", NO_EXPIRY).unwrap(), PutOutcome::Updated);

    assert_eq!(cache.get_owned(b"alpha").unwrap().as_deref(), Some(b"uno".as_slice()));
    assert_eq!(cache.get_owned(b"beta").unwrap().as_deref(), Some(b"two".as_slice()));
    assert_eq!(cache.get_owned(b"gamma").unwrap(), None);

    assert!(cache.delete(b"alpha"));
    assert_eq!(cache.get_owned(b"alpha").unwrap(), None);
    assert!(!cache.delete(b"alpha"));
}

#[test]
fn many_keys_survive_segment_rollover() {
    let cache = Cache::new(offheap("rollover")).unwrap();

    for i in 0..500u32 {
        let key = i.to_be_bytes();
        cache.put(&key, &[i as u8; 24], NO_EXPIRY).unwrap();
    }

    for i in 0..500u32 {
        let key = i.to_be_bytes();
        let value = cache.get_owned(&key).unwrap();
        assert_eq!(value.as_deref(), Some([i as u8; 24].as_slice()));
    }
}

#[test]
fn expired_entries_are_treated_as_misses() {
    let cache = Cache::new(offheap("expiry")).unwrap();
    cache.put(b"short-lived", b"v", 10).unwrap();

    let mut buf = [0u8; 8];
    // `get` uses wall-clock `now`, so explicitly drive expiry through `expire`
    // with a deterministic timestamp instead.
    assert!(cache.expire(b"short-lived", 11));
    assert!(matches!(cache.get(b"short-lived", &mut buf).unwrap(), GetOutcome::NotFound));
}

#[test]
fn buffer_too_small_reports_required_length() {
    let cache = Cache::new(offheap("small-buf")).unwrap();
    cache.put(b"k", b"a much longer value than four bytes", NO_EXPIRY).unwrap();

    let mut buf = [0u8; 4];
    match cache.get(b"k", &mut buf).unwrap() {
        GetOutcome::BufferTooSmall(needed) => assert_eq!(needed, 36),
        other => panic!("expected BufferTooSmall, got {other:?}"),
    }
}

#[test]
fn stats_track_hits_and_misses() {
    let cache = Cache::new(offheap("stats")).unwrap();
    cache.put(b"k", b"v", NO_EXPIRY).unwrap();

    cache.get_owned(b"k").unwrap();
    cache.get_owned(b"k").unwrap();
    cache.get_owned(b"missing").unwrap();

    let snapshot = cache.stats();
    assert_eq!(snapshot.gets, 3);
    assert_eq!(snapshot.hits, 2);
    assert!((snapshot.hit_ratio() - (2.0 / 3.0)).abs() < 1e-6);
}
