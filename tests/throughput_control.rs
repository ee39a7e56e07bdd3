// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use carrot_cache::{AdmissionKind, Cache, CacheConfig, StorageKind, NO_EXPIRY};

#[test]
fn random_ratio_admission_eventually_rejects_some_new_keys() {
    let mut cfg = CacheConfig::new("throttled", StorageKind::OffHeap);
    cfg.storage_pool_size = 1;
    cfg.admission = AdmissionKind::RandomRatio;
    cfg.random_admission_ratio_start = 0.5;
    let cache = Cache::new(cfg).unwrap();

    let mut accepted = 0;
    let mut rejected = 0;
    for i in 0..200u32 {
        match cache.put(&i.to_be_bytes(), b"v", NO_EXPIRY).unwrap() {
            carrot_cache::PutOutcome::Inserted => accepted += 1,
            carrot_cache::PutOutcome::Rejected => rejected += 1,
            carrot_cache::PutOutcome::Updated => {}
        }
    }

    assert!(accepted > 0, "ratio 0.5 admitted nothing out of 200 keys");
    assert!(rejected > 0, "ratio 0.5 admitted everything out of 200 keys");
}

#[test]
fn random_ratio_at_one_admits_every_new_key() {
    let mut cfg = CacheConfig::new("wide-open", StorageKind::OffHeap);
    cfg.storage_pool_size = 1;
    cfg.admission = AdmissionKind::RandomRatio;
    cfg.random_admission_ratio_start = 1.0;
    let cache = Cache::new(cfg).unwrap();

    for i in 0..100u32 {
        assert_eq!(
            cache.put(&i.to_be_bytes(), b"v", NO_EXPIRY).unwrap(),
            carrot_cache::PutOutcome::Inserted
        );
    }
}
