//! End-to-end handle lifecycle against the blob URL registry.

use std::collections::HashMap;

use frameflow_cache::{
    BlobUrlRegistry, ByteRange, CacheError, ContentId, ContentType, HandleCacheConfig, Payload,
    ResourceHandleCache, StreamError,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn clip(n: usize) -> (ContentId, Payload) {
    (
        ContentId::from(format!("clip-{:03}", n)),
        Payload::new(format!("frames of clip {}", n).into_bytes(), ContentType::Mp4),
    )
}

#[test]
fn evicted_url_reads_fail_deterministically() {
    let registry = BlobUrlRegistry::new();
    let cache = ResourceHandleCache::with_capacity(registry.clone(), 10).unwrap();

    let (first_id, first_payload) = clip(0);
    let stale_url = cache.get(&first_id, &first_payload).unwrap();

    // A consumer starts a read, then the cache churns past capacity
    let in_flight = registry.read_range(&stale_url, ByteRange::full()).unwrap();
    for n in 1..=10 {
        let (id, payload) = clip(n);
        cache.get(&id, &payload).unwrap();
    }
    assert!(!cache.contains(&first_id));

    // The read already in progress keeps its bytes
    assert_eq!(in_flight.bytes(), first_payload.data());

    // Reusing the stale URL fails the same way every time
    for _ in 0..3 {
        assert_eq!(
            registry.read_range(&stale_url, ByteRange::full()).unwrap_err(),
            StreamError::Revoked(stale_url.to_string())
        );
    }

    // Re-requesting through the cache yields a new, working URL
    let fresh_url = cache.get(&first_id, &first_payload).unwrap();
    assert_ne!(fresh_url, stale_url);
    let read = registry
        .read_range(&fresh_url, ByteRange::parse("bytes=0-5").unwrap())
        .unwrap();
    assert_eq!(read.bytes(), b"frames");
}

#[test]
fn registry_ceiling_surfaces_as_allocation_failure() {
    let registry = BlobUrlRegistry::with_max_live(3);
    let cache = ResourceHandleCache::with_capacity(registry.clone(), 10).unwrap();

    for n in 0..3 {
        let (id, payload) = clip(n);
        cache.get(&id, &payload).unwrap();
    }

    let (id, payload) = clip(3);
    let err = cache.get(&id, &payload).unwrap_err();
    assert!(matches!(err, CacheError::Allocation { .. }));
    assert!(!cache.contains(&id));
    assert_eq!(cache.len(), 3);
    assert_eq!(registry.live_count(), 3);

    // Freeing one slot lets the next allocation through
    cache.remove(&clip(0).0);
    assert!(cache.get(&id, &payload).is_ok());
}

#[test]
fn empty_payload_is_refused() {
    let cache = ResourceHandleCache::with_capacity(BlobUrlRegistry::new(), 4).unwrap();
    let id = ContentId::from("empty");

    let err = cache.get(&id, &Payload::from_bytes(Vec::new())).unwrap_err();
    assert!(matches!(err, CacheError::Allocation { .. }));
    assert!(cache.is_empty());
}

#[test]
fn clear_and_drop_revoke_every_url() {
    let registry = BlobUrlRegistry::new();
    let cache = ResourceHandleCache::with_capacity(registry.clone(), 20).unwrap();

    let urls: Vec<_> = (0..8)
        .map(|n| {
            let (id, payload) = clip(n);
            cache.get(&id, &payload).unwrap()
        })
        .collect();

    cache.clear();
    cache.clear();
    assert!(urls.iter().all(|url| !registry.is_live(url)));
    assert_eq!(registry.revoked_total(), 8);

    for n in 0..5 {
        let (id, payload) = clip(n);
        cache.get(&id, &payload).unwrap();
    }
    drop(cache);
    assert_eq!(registry.live_count(), 0);
    assert_eq!(registry.revoked_total(), 13);
}

#[test]
fn configured_cache_uses_batch_size_from_config() {
    let registry = BlobUrlRegistry::new();
    let config = HandleCacheConfig::default()
        .with_max_capacity(8)
        .with_eviction_percent(50);
    let cache = ResourceHandleCache::new(registry.clone(), config).unwrap();

    for n in 0..8 {
        let (id, payload) = clip(n);
        cache.get(&id, &payload).unwrap();
    }
    let (id, payload) = clip(8);
    cache.get(&id, &payload).unwrap();

    // 50% of 8: four oldest go in one batch
    assert_eq!(cache.len(), 5);
    assert_eq!(registry.live_count(), 5);
    for n in 0..4 {
        assert!(!cache.contains(&clip(n).0));
    }
}

#[test]
fn random_churn_matches_platform_state() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let registry = BlobUrlRegistry::new();
    let cache = ResourceHandleCache::with_capacity(registry.clone(), 25).unwrap();
    let mut last_url = HashMap::new();

    for _ in 0..5_000 {
        let n = rng.gen_range(0..100);
        let (id, payload) = clip(n);

        if rng.gen_bool(0.05) {
            cache.remove(&id);
            continue;
        }

        let url = cache.get(&id, &payload).unwrap();
        assert!(registry.is_live(&url));
        last_url.insert(n, url);

        assert!(cache.len() <= 25);
        assert_eq!(registry.live_count(), cache.len());
    }

    // Every URL the cache still holds is live; every other one is revoked
    for (n, url) in &last_url {
        assert_eq!(cache.peek(&clip(*n).0).as_ref() == Some(url), registry.is_live(url));
    }

    let stats = cache.stats();
    assert_eq!(stats.release_failures, 0);
    assert_eq!(
        stats.allocations,
        stats.releases + cache.len() as u64
    );
}
