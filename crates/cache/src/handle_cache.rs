//! Resource handle cache with batch LRU eviction
//!
//! Maps content identifiers to platform handles created lazily from the
//! asset's payload. The platform caps how many handles may be live, so the
//! cache reuses one handle per identifier and, when full, releases the least
//! recently granted handles in batches of roughly a tenth of capacity.
//!
//! The cache is the sole owner of every handle it allocates. Each handle is
//! released exactly once, in the same operation that removes its entry from
//! the table. Consumers get clones of the handle for one render pass; a handle
//! evicted while a consumer still holds it is simply dead, and the consumer's
//! next `get` allocates a fresh one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::allocator::HandleAllocator;
use crate::config::HandleCacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::payload::{ContentId, ContentType, Payload};

/// Logical access time. Strictly increases with every grant from one cache.
pub type AccessStamp = u64;

struct CacheEntry<H> {
    handle: H,
    payload: Payload,
    last_accessed: AccessStamp,
    created_at: Instant,
    last_accessed_at: Instant,
}

/// Snapshot of one live entry
#[derive(Debug, Clone)]
pub struct EntryInfo {
    /// Logical time of the most recent grant
    pub last_accessed: AccessStamp,
    /// Size of the retained payload in bytes
    pub payload_len: usize,
    pub content_type: ContentType,
    /// When the handle was allocated
    pub created_at: Instant,
    /// Wall-clock time of the most recent grant
    pub last_accessed_at: Instant,
}

/// Statistics about handle cache usage
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of live entries
    pub entry_count: usize,

    /// Maximum number of live entries
    pub max_capacity: usize,

    /// Bytes held by retained payloads
    pub payload_bytes: usize,

    /// Soft payload budget (bytes), informational
    pub size_budget: usize,

    /// Lookups served by an existing handle
    pub hits: u64,

    /// Lookups that needed a new handle
    pub misses: u64,

    /// Handles successfully allocated
    pub allocations: u64,

    /// Allocations refused by the platform
    pub allocation_failures: u64,

    /// Entries removed by capacity pressure
    pub evictions: u64,

    /// Eviction scans performed
    pub eviction_batches: u64,

    /// Entries removed explicitly via `remove`
    pub removals: u64,

    /// Successful release calls
    pub releases: u64,

    /// Release calls the platform reported as failed
    pub release_failures: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Live handles relative to capacity (0.0 to 1.0)
    pub fn capacity_utilization(&self) -> f64 {
        if self.max_capacity == 0 {
            0.0
        } else {
            self.entry_count as f64 / self.max_capacity as f64
        }
    }

    /// Retained payload bytes relative to the soft budget; may exceed 1.0
    pub fn budget_utilization(&self) -> f64 {
        if self.size_budget == 0 {
            0.0
        } else {
            self.payload_bytes as f64 / self.size_budget as f64
        }
    }

    /// Total handles released or attempted, i.e. entries that left the table
    pub fn released_entries(&self) -> u64 {
        self.releases + self.release_failures
    }
}

/// Internal cache state
struct CacheState<H> {
    entries: HashMap<ContentId, CacheEntry<H>>,

    /// Source of access stamps
    clock: AccessStamp,

    payload_bytes: usize,

    config: HandleCacheConfig,

    stats: CacheStats,
}

impl<H: Clone> CacheState<H> {
    fn new(config: HandleCacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            clock: 0,
            payload_bytes: 0,
            stats: CacheStats {
                max_capacity: config.max_capacity,
                size_budget: config.size_budget,
                ..Default::default()
            },
            config,
        }
    }

    fn next_stamp(&mut self) -> AccessStamp {
        self.clock += 1;
        self.clock
    }

    /// Refresh recency of a live entry and return its handle
    fn touch(&mut self, id: &ContentId) -> Option<H> {
        let stamp = self.clock + 1;
        let entry = self.entries.get_mut(id)?;
        entry.last_accessed = stamp;
        entry.last_accessed_at = Instant::now();
        self.clock = stamp;
        Some(entry.handle.clone())
    }

    fn insert(&mut self, id: ContentId, handle: H, payload: Payload) {
        let stamp = self.next_stamp();
        let now = Instant::now();
        self.payload_bytes += payload.len();
        self.entries.insert(
            id,
            CacheEntry {
                handle,
                payload,
                last_accessed: stamp,
                created_at: now,
                last_accessed_at: now,
            },
        );
        self.sync_stats();
    }

    fn take(&mut self, id: &ContentId) -> Option<CacheEntry<H>> {
        let entry = self.entries.remove(id)?;
        self.payload_bytes = self.payload_bytes.saturating_sub(entry.payload.len());
        self.sync_stats();
        Some(entry)
    }

    /// Identifiers of up to `count` entries with the oldest stamps.
    ///
    /// Ties on the stamp fall back to identifier order.
    fn lru_victims(&self, count: usize) -> Vec<ContentId> {
        let mut order: Vec<(AccessStamp, &ContentId)> = self
            .entries
            .iter()
            .map(|(id, entry)| (entry.last_accessed, id))
            .collect();
        order.sort_unstable();

        order
            .into_iter()
            .take(count)
            .map(|(_, id)| id.clone())
            .collect()
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.payload_bytes = self.payload_bytes;
    }
}

/// Cache of platform handles keyed by content identifier.
///
/// Thread-safe: every public operation, including any eviction it triggers,
/// runs under one lock, so a lookup never observes a half-evicted table.
///
/// # Preconditions
///
/// Identifiers are content-stable. A `get` for a live identifier returns the
/// existing handle and ignores the payload passed in; callers that replace an
/// asset's bytes must `remove` the identifier first.
///
/// Handles are only valid until the cache releases them. Consumers must not
/// keep a handle beyond one render pass and should call `get` again instead.
///
/// # Example
///
/// ```
/// use frameflow_cache::{BlobUrlRegistry, ContentId, ContentType, Payload, ResourceHandleCache};
///
/// let registry = BlobUrlRegistry::new();
/// let cache = ResourceHandleCache::with_capacity(registry.clone(), 10).unwrap();
///
/// let id = ContentId::from("poster.png");
/// let payload = Payload::new(vec![0u8; 1024], ContentType::Png);
///
/// let url = cache.get(&id, &payload).unwrap();
/// assert_eq!(cache.get(&id, &payload).unwrap(), url);
/// assert!(registry.is_live(&url));
///
/// cache.remove(&id);
/// assert!(!registry.is_live(&url));
/// ```
pub struct ResourceHandleCache<A: HandleAllocator> {
    allocator: A,
    state: Mutex<CacheState<A::Handle>>,
}

impl<A: HandleAllocator> ResourceHandleCache<A> {
    /// Create a cache that allocates through `allocator`
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if the configuration is invalid.
    pub fn new(allocator: A, config: HandleCacheConfig) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self {
            allocator,
            state: Mutex::new(CacheState::new(config)),
        })
    }

    /// Create a cache with default settings and the given live handle ceiling
    pub fn with_capacity(allocator: A, max_capacity: usize) -> CacheResult<Self> {
        Self::new(
            allocator,
            HandleCacheConfig::default().with_max_capacity(max_capacity),
        )
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<A::Handle>> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("handle cache lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Get the handle for `id`, allocating one from `payload` if needed.
    ///
    /// A live entry is refreshed and its handle returned; `payload` is not
    /// looked at. Otherwise the oldest batch of entries is evicted if the
    /// table is full, a handle is allocated and a new entry inserted.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Allocation`] if the platform refuses the handle.
    /// No entry is created in that case.
    pub fn get(&self, id: &ContentId, payload: &Payload) -> CacheResult<A::Handle> {
        let mut state = self.lock();

        if let Some(handle) = state.touch(id) {
            state.stats.hits += 1;
            trace!(%id, "handle cache hit");
            return Ok(handle);
        }

        state.stats.misses += 1;

        while state.entries.len() >= state.config.max_capacity {
            let batch = state.config.eviction_batch();
            if self.evict_batch(&mut state, batch) == 0 {
                break;
            }
        }

        let handle = match self.allocator.allocate(id, payload) {
            Ok(handle) => handle,
            Err(source) => {
                state.stats.allocation_failures += 1;
                warn!(%id, error = %source, "handle allocation failed");
                return Err(CacheError::Allocation {
                    id: id.clone(),
                    source,
                });
            }
        };

        state.stats.allocations += 1;
        state.insert(id.clone(), handle.clone(), payload.clone());
        debug!(
            %id,
            bytes = payload.len(),
            live = state.entries.len(),
            "allocated handle"
        );

        Ok(handle)
    }

    /// Release the handle for `id` and forget it.
    ///
    /// Returns `false` without doing anything if `id` is not cached.
    pub fn remove(&self, id: &ContentId) -> bool {
        let mut state = self.lock();
        match state.take(id) {
            Some(entry) => {
                state.stats.removals += 1;
                self.release(&mut state, id, entry);
                debug!(%id, "removed handle");
                true
            }
            None => false,
        }
    }

    /// Release every handle and empty the table
    pub fn clear(&self) {
        let mut state = self.lock();
        let ids: Vec<ContentId> = state.entries.keys().cloned().collect();
        if ids.is_empty() {
            return;
        }

        // One entry leaves the table per release, so a panicking release
        // strands only its own handle.
        let count = ids.len();
        for id in ids {
            if let Some(entry) = state.take(&id) {
                self.release(&mut state, &id, entry);
            }
        }
        debug!(released = count, "cleared handle cache");
    }

    /// Change the live handle ceiling.
    ///
    /// Shrinking below the current size evicts oldest entries in batches
    /// (sized from the new capacity) until the table fits.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if `max_capacity` is zero.
    pub fn set_max_capacity(&self, max_capacity: usize) -> CacheResult<()> {
        let mut state = self.lock();
        let config = state.config.clone().with_max_capacity(max_capacity);
        config.validate()?;

        state.config = config;
        state.stats.max_capacity = max_capacity;

        while state.entries.len() > max_capacity {
            let batch = state.config.eviction_batch();
            if self.evict_batch(&mut state, batch) == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Evict up to `count` least recently used entries, returning how many left
    fn evict_batch(&self, state: &mut CacheState<A::Handle>, count: usize) -> usize {
        let victims = state.lru_victims(count);
        if victims.is_empty() {
            return 0;
        }

        state.stats.eviction_batches += 1;
        let mut evicted = 0;
        for id in victims {
            let Some(entry) = state.take(&id) else {
                continue;
            };
            evicted += 1;
            state.stats.evictions += 1;
            trace!(%id, last_accessed = entry.last_accessed, "evicting handle");
            self.release(state, &id, entry);
        }
        debug!(evicted, remaining = state.entries.len(), "evicted handle batch");
        evicted
    }

    /// Release an entry that has already left the table.
    ///
    /// Release failures are recorded and otherwise ignored.
    fn release(
        &self,
        state: &mut CacheState<A::Handle>,
        id: &ContentId,
        entry: CacheEntry<A::Handle>,
    ) {
        match self.allocator.release(&entry.handle) {
            Ok(()) => state.stats.releases += 1,
            Err(error) => {
                state.stats.release_failures += 1;
                warn!(%id, %error, "failed to release handle, dropping entry anyway");
            }
        }
    }

    /// Check if `id` has a live handle without refreshing its recency
    pub fn contains(&self, id: &ContentId) -> bool {
        self.lock().entries.contains_key(id)
    }

    /// The live handle for `id`, without refreshing its recency
    pub fn peek(&self, id: &ContentId) -> Option<A::Handle> {
        self.lock().entries.get(id).map(|entry| entry.handle.clone())
    }

    /// Snapshot of the entry for `id`
    pub fn entry_info(&self, id: &ContentId) -> Option<EntryInfo> {
        self.lock().entries.get(id).map(|entry| EntryInfo {
            last_accessed: entry.last_accessed,
            payload_len: entry.payload.len(),
            content_type: entry.payload.content_type(),
            created_at: entry.created_at,
            last_accessed_at: entry.last_accessed_at,
        })
    }

    /// The payload retained for `id`
    pub fn payload(&self, id: &ContentId) -> Option<Payload> {
        self.lock().entries.get(id).map(|entry| entry.payload.clone())
    }

    /// Identifiers ordered from least to most recently granted
    pub fn lru_order(&self) -> Vec<ContentId> {
        let state = self.lock();
        let mut order: Vec<(AccessStamp, &ContentId)> = state
            .entries
            .iter()
            .map(|(id, entry)| (entry.last_accessed, id))
            .collect();
        order.sort_unstable();
        order.into_iter().map(|(_, id)| id.clone()).collect()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn max_capacity(&self) -> usize {
        self.lock().config.max_capacity
    }

    /// Current configuration
    pub fn config(&self) -> HandleCacheConfig {
        self.lock().config.clone()
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// The platform allocator backing this cache
    pub fn allocator(&self) -> &A {
        &self.allocator
    }
}

impl<A: HandleAllocator> Drop for ResourceHandleCache<A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<A: HandleAllocator> fmt::Debug for ResourceHandleCache<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ResourceHandleCache")
            .field("len", &state.entries.len())
            .field("max_capacity", &state.config.max_capacity)
            .field("payload_bytes", &state.payload_bytes)
            .finish()
    }
}
