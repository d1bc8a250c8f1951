//! Property tests for the handle cache invariants.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use frameflow_cache::{
    AllocationError, ContentId, HandleAllocator, Payload, ReleaseError, ResourceHandleCache,
};
use proptest::prelude::*;

/// Allocator that records how many times each handle was released.
#[derive(Default)]
struct CountingAllocator {
    inner: Mutex<Counts>,
}

#[derive(Default)]
struct Counts {
    next: u64,
    releases: HashMap<u64, u32>,
}

impl CountingAllocator {
    fn release_count(&self, handle: u64) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .releases
            .get(&handle)
            .copied()
            .unwrap_or(0)
    }

    fn allocated(&self) -> u64 {
        self.inner.lock().unwrap().next
    }

    fn released_handles(&self) -> HashSet<u64> {
        self.inner.lock().unwrap().releases.keys().copied().collect()
    }

    fn max_release_count(&self) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .releases
            .values()
            .copied()
            .max()
            .unwrap_or(0)
    }
}

impl HandleAllocator for CountingAllocator {
    type Handle = u64;

    fn allocate(&self, _id: &ContentId, _payload: &Payload) -> Result<u64, AllocationError> {
        let mut counts = self.inner.lock().unwrap();
        counts.next += 1;
        Ok(counts.next)
    }

    fn release(&self, handle: &u64) -> Result<(), ReleaseError> {
        *self.inner.lock().unwrap().releases.entry(*handle).or_default() += 1;
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Op {
    Get(u8),
    Remove(u8),
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => (0u8..40).prop_map(Op::Get),
        2 => (0u8..40).prop_map(Op::Remove),
        1 => Just(Op::Clear),
    ]
}

fn id(n: u8) -> ContentId {
    ContentId::from(format!("asset-{}", n))
}

fn payload() -> Payload {
    Payload::from_bytes(vec![7u8; 4])
}

proptest! {
    #[test]
    fn distinct_gets_never_exceed_capacity(capacity in 1usize..60, count in 0usize..200) {
        let cache =
            ResourceHandleCache::with_capacity(CountingAllocator::default(), capacity).unwrap();
        for n in 0..count {
            cache.get(&ContentId::from(format!("distinct-{}", n)), &payload()).unwrap();
            prop_assert!(cache.len() <= capacity);
        }
    }

    #[test]
    fn every_handle_released_at_most_once_and_live_ones_never(
        capacity in 1usize..20,
        ops in prop::collection::vec(op(), 0..300),
    ) {
        let allocator = Arc::new(CountingAllocator::default());
        let cache = ResourceHandleCache::with_capacity(Arc::clone(&allocator), capacity).unwrap();

        for op in ops {
            match op {
                Op::Get(n) => {
                    let handle = cache.get(&id(n), &payload()).unwrap();
                    // A handle handed out is never one already released
                    prop_assert_eq!(allocator.release_count(handle), 0);
                }
                Op::Remove(n) => {
                    let before = cache.peek(&id(n));
                    cache.remove(&id(n));
                    prop_assert!(!cache.contains(&id(n)));
                    if let Some(handle) = before {
                        prop_assert_eq!(allocator.release_count(handle), 1);
                    }
                }
                Op::Clear => {
                    cache.clear();
                    prop_assert!(cache.is_empty());
                }
            }
            prop_assert!(cache.len() <= capacity);
            prop_assert!(allocator.max_release_count() <= 1);
        }

        // Live plus released accounts for every allocation
        let released = allocator.released_handles().len() as u64;
        prop_assert_eq!(released + cache.len() as u64, allocator.allocated());

        drop(cache);
        prop_assert_eq!(allocator.released_handles().len() as u64, allocator.allocated());
        prop_assert!(allocator.max_release_count() <= 1);
    }

    #[test]
    fn repeated_get_is_stable_and_advances_recency(repeats in 1usize..20) {
        let cache = ResourceHandleCache::with_capacity(CountingAllocator::default(), 4).unwrap();
        let key = id(1);

        let first = cache.get(&key, &payload()).unwrap();
        let mut stamp = cache.entry_info(&key).unwrap().last_accessed;
        for _ in 0..repeats {
            prop_assert_eq!(cache.get(&key, &payload()).unwrap(), first);
            let next = cache.entry_info(&key).unwrap().last_accessed;
            prop_assert!(next > stamp);
            stamp = next;
        }
        prop_assert_eq!(cache.allocator().allocated(), 1);
    }
}
