//! Platform handle allocation
//!
//! [`HandleAllocator`] is the seam between the cache and whatever platform
//! hands out stream handles (object URLs, GPU buffers, file mappings). The
//! cache only ever calls `allocate` for a fresh entry and `release` exactly
//! once when that entry leaves the table.
//!
//! [`BlobUrlRegistry`] is the in-process implementation used by the editor: it
//! mints `blob:` URLs that renderers resolve and stream from by byte range.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::error::{AllocationError, ReleaseError, StreamError};
use crate::payload::{ContentId, ContentType, Payload};

/// URL scheme prefix for handles minted by [`BlobUrlRegistry`]
pub const BLOB_URL_PREFIX: &str = "blob:frameflow/";

/// Default ceiling on simultaneously live blob URLs
pub const DEFAULT_MAX_LIVE_URLS: usize = 4096;

/// Platform that creates and releases stream handles.
///
/// Both calls are synchronous and bounded. Implementations must not call back
/// into the cache that owns them: the cache holds its table lock while they run.
pub trait HandleAllocator {
    /// Opaque handle given to consumers
    type Handle: Clone + PartialEq + fmt::Debug;

    /// Create a handle that streams `payload`
    fn allocate(&self, id: &ContentId, payload: &Payload) -> Result<Self::Handle, AllocationError>;

    /// Invalidate a handle and reclaim its platform resources
    ///
    /// Report failure through `Err` rather than panicking. If this does
    /// panic, the entry being released is already out of the cache and its
    /// handle is lost; entries not yet reached stay cached.
    fn release(&self, handle: &Self::Handle) -> Result<(), ReleaseError>;
}

impl<A: HandleAllocator + ?Sized> HandleAllocator for &A {
    type Handle = A::Handle;

    fn allocate(&self, id: &ContentId, payload: &Payload) -> Result<Self::Handle, AllocationError> {
        (**self).allocate(id, payload)
    }

    fn release(&self, handle: &Self::Handle) -> Result<(), ReleaseError> {
        (**self).release(handle)
    }
}

impl<A: HandleAllocator + ?Sized> HandleAllocator for Arc<A> {
    type Handle = A::Handle;

    fn allocate(&self, id: &ContentId, payload: &Payload) -> Result<Self::Handle, AllocationError> {
        (**self).allocate(id, payload)
    }

    fn release(&self, handle: &Self::Handle) -> Result<(), ReleaseError> {
        (**self).release(handle)
    }
}

/// Object URL naming one live payload in a [`BlobUrlRegistry`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobUrl(String);

impl BlobUrl {
    fn mint() -> Self {
        Self(format!("{}{}", BLOB_URL_PREFIX, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed `Range` request header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte requested
    pub start: u64,
    /// Last byte requested (inclusive), `None` for "to the end"
    pub end: Option<u64>,
}

impl ByteRange {
    /// The whole resource
    pub fn full() -> Self {
        Self { start: 0, end: None }
    }

    /// Parse `bytes=start-end` or `bytes=start-`.
    ///
    /// An unparseable start reads from 0 and an unparseable end reads to the
    /// last byte, matching how the media protocol handler treats sloppy clients.
    pub fn parse(header: &str) -> Result<Self, StreamError> {
        let spec = header
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(|| StreamError::InvalidRange(header.to_string()))?;

        let (start, end) = spec
            .split_once('-')
            .ok_or_else(|| StreamError::InvalidRange(header.to_string()))?;

        let start = start.trim().parse::<u64>().unwrap_or(0);
        let end = match end.trim() {
            "" => None,
            end => end.parse::<u64>().ok(),
        };

        Ok(Self { start, end })
    }
}

/// Bytes served for one range request.
///
/// Holds a shared reference to the payload, so the bytes stay readable for the
/// duration of the read even if the URL is revoked meanwhile.
#[derive(Debug, Clone)]
pub struct RangeRead {
    payload: Payload,
    /// First byte served
    pub start: u64,
    /// Last byte served (inclusive)
    pub end: u64,
}

impl RangeRead {
    pub fn bytes(&self) -> &[u8] {
        &self.payload.data()[self.start as usize..=self.end as usize]
    }

    /// Total size of the underlying resource
    pub fn total_len(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn content_type(&self) -> ContentType {
        self.payload.content_type()
    }

    /// `Content-Range` header value for this read
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total_len())
    }

    /// True when the read covers the whole resource
    pub fn is_complete(&self) -> bool {
        self.start == 0 && self.end + 1 == self.total_len()
    }
}

struct RegistryState {
    live: HashMap<BlobUrl, Payload>,
    max_live: usize,
    allocated: u64,
    revoked: u64,
}

/// In-process object URL table.
///
/// Cloning shares the table, so the cache can own allocation while renderers
/// resolve URLs through their own clone.
///
/// # Example
///
/// ```
/// use frameflow_cache::{BlobUrlRegistry, ByteRange, ContentType, HandleAllocator, Payload};
///
/// let registry = BlobUrlRegistry::new();
/// let payload = Payload::new(b"frame data".to_vec(), ContentType::Png);
///
/// let url = registry.allocate(&"still-01".into(), &payload).unwrap();
/// let read = registry.read_range(&url, ByteRange::parse("bytes=0-4").unwrap()).unwrap();
/// assert_eq!(read.bytes(), b"frame");
///
/// registry.release(&url).unwrap();
/// assert!(registry.resolve(&url).is_err());
/// ```
#[derive(Clone)]
pub struct BlobUrlRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl BlobUrlRegistry {
    /// Create a registry with the default live URL ceiling
    pub fn new() -> Self {
        Self::with_max_live(DEFAULT_MAX_LIVE_URLS)
    }

    /// Create a registry that refuses to mint more than `max_live` URLs at once
    pub fn with_max_live(max_live: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                live: HashMap::new(),
                max_live,
                allocated: 0,
                revoked: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Payload behind a live URL
    pub fn resolve(&self, url: &BlobUrl) -> Result<Payload, StreamError> {
        self.lock()
            .live
            .get(url)
            .cloned()
            .ok_or_else(|| StreamError::Revoked(url.to_string()))
    }

    /// Serve a byte range of a live URL.
    ///
    /// Start and end are clamped to the last byte; a start past the end is
    /// not satisfiable.
    pub fn read_range(&self, url: &BlobUrl, range: ByteRange) -> Result<RangeRead, StreamError> {
        let payload = self.resolve(url)?;
        let len = payload.len() as u64;
        if len == 0 {
            return Err(StreamError::RangeNotSatisfiable {
                start: range.start,
                end: range.end.unwrap_or(0),
                len,
            });
        }

        let last = len - 1;
        let start = range.start.min(last);
        let end = range.end.unwrap_or(last).min(last);
        if start > end {
            return Err(StreamError::RangeNotSatisfiable { start, end, len });
        }

        Ok(RangeRead {
            payload,
            start,
            end,
        })
    }

    /// Whether `url` is currently live
    pub fn is_live(&self, url: &BlobUrl) -> bool {
        self.lock().live.contains_key(url)
    }

    /// Number of live URLs
    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Total URLs minted over the registry's lifetime
    pub fn allocated_total(&self) -> u64 {
        self.lock().allocated
    }

    /// Total URLs revoked over the registry's lifetime
    pub fn revoked_total(&self) -> u64 {
        self.lock().revoked
    }

    pub fn max_live(&self) -> usize {
        self.lock().max_live
    }
}

impl Default for BlobUrlRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BlobUrlRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("BlobUrlRegistry")
            .field("live", &state.live.len())
            .field("max_live", &state.max_live)
            .finish()
    }
}

impl HandleAllocator for BlobUrlRegistry {
    type Handle = BlobUrl;

    fn allocate(&self, _id: &ContentId, payload: &Payload) -> Result<BlobUrl, AllocationError> {
        if payload.is_empty() {
            return Err(AllocationError::EmptyPayload);
        }

        let mut state = self.lock();
        if state.live.len() >= state.max_live {
            return Err(AllocationError::Exhausted {
                limit: state.max_live,
            });
        }

        let url = BlobUrl::mint();
        state.live.insert(url.clone(), payload.clone());
        state.allocated += 1;
        Ok(url)
    }

    fn release(&self, url: &BlobUrl) -> Result<(), ReleaseError> {
        let mut state = self.lock();
        match state.live.remove(url) {
            Some(_) => {
                state.revoked += 1;
                Ok(())
            }
            None => Err(ReleaseError::UnknownHandle(url.to_string())),
        }
    }
}
