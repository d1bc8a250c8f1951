//! Error types for the handle cache and its platform boundary

use crate::payload::ContentId;

/// The platform refused to create a handle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error("handle limit reached ({limit} live handles)")]
    Exhausted { limit: usize },
    #[error("payload is empty")]
    EmptyPayload,
    #[error("platform allocation failed: {0}")]
    Platform(String),
}

/// The platform could not release a handle.
///
/// The cache never surfaces this to callers; it is logged and counted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReleaseError {
    #[error("handle is not live: {0}")]
    UnknownHandle(String),
    #[error("platform release failed: {0}")]
    Platform(String),
}

/// Reading through a handle failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("handle has been revoked: {0}")]
    Revoked(String),
    #[error("range {start}-{end} not satisfiable for {len} bytes")]
    RangeNotSatisfiable { start: u64, end: u64, len: u64 },
    #[error("invalid range header: {0}")]
    InvalidRange(String),
}

/// Errors loading or validating cache configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors surfaced by [`crate::ResourceHandleCache`]
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to allocate handle for {id}: {source}")]
    Allocation {
        id: ContentId,
        #[source]
        source: AllocationError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type CacheResult<T> = Result<T, CacheError>;
