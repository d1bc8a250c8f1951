//! FrameFlow Cache Library
//!
//! Resource handle cache: maps asset content identifiers to platform stream
//! handles (object URLs) with batch LRU eviction and exactly-once release.

pub mod allocator;
pub mod config;
pub mod error;
pub mod handle_cache;
pub mod monitor;
pub mod payload;

pub use allocator::{BlobUrl, BlobUrlRegistry, ByteRange, HandleAllocator, RangeRead};
pub use config::HandleCacheConfig;
pub use error::{AllocationError, CacheError, CacheResult, ConfigError, ReleaseError, StreamError};
pub use handle_cache::{AccessStamp, CacheStats, EntryInfo, ResourceHandleCache};
pub use monitor::{CacheMonitor, CachePressure, PressureReport};
pub use payload::{ContentId, ContentType, Payload};
