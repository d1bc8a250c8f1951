//! Asset identifiers and payloads
//!
//! The asset store hands the cache `(ContentId, Payload)` pairs. A payload is
//! the raw bytes of one asset plus the content type the renderer needs to
//! interpret them.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Stable identifier of one asset's content.
///
/// Identifiers must be content-stable: the same bytes always map to the same
/// identifier, and an identifier is never reused for different bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId(String);

impl ContentId {
    /// Create an identifier from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ContentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Media type of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    Png,
    Jpeg,
    Mp4,
    Mp3,
    Wav,
    #[default]
    OctetStream,
}

impl ContentType {
    /// Detect the content type from a file extension (case-insensitive).
    ///
    /// Unknown extensions map to [`ContentType::OctetStream`].
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "png" => ContentType::Png,
            "jpg" | "jpeg" => ContentType::Jpeg,
            "mp4" => ContentType::Mp4,
            "mp3" => ContentType::Mp3,
            "wav" => ContentType::Wav,
            _ => ContentType::OctetStream,
        }
    }

    /// Detect the content type from a path's extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or_default()
    }

    /// MIME string for this content type
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Png => "image/png",
            ContentType::Jpeg => "image/jpeg",
            ContentType::Mp4 => "video/mp4",
            ContentType::Mp3 => "audio/mpeg",
            ContentType::Wav => "audio/wav",
            ContentType::OctetStream => "application/octet-stream",
        }
    }
}

/// Binary content backing a handle.
///
/// Cloning is cheap: the bytes are shared, never copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    data: Arc<[u8]>,
    content_type: ContentType,
}

impl Payload {
    /// Wrap raw bytes with their content type
    pub fn new(data: impl Into<Arc<[u8]>>, content_type: ContentType) -> Self {
        Self {
            data: data.into(),
            content_type,
        }
    }

    /// Untyped bytes (`application/octet-stream`)
    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Self {
        Self::new(data, ContentType::OctetStream)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared reference to the underlying bytes
    pub fn shared_data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Size of the payload in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True when both payloads share the same backing allocation
    pub fn shares_bytes_with(&self, other: &Payload) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(ContentType::from_extension("png"), ContentType::Png);
        assert_eq!(ContentType::from_extension("JPG"), ContentType::Jpeg);
        assert_eq!(ContentType::from_extension("jpeg"), ContentType::Jpeg);
        assert_eq!(ContentType::from_extension("Mp4"), ContentType::Mp4);
        assert_eq!(ContentType::from_extension("mp3"), ContentType::Mp3);
        assert_eq!(ContentType::from_extension("wav"), ContentType::Wav);
        assert_eq!(ContentType::from_extension("mkv"), ContentType::OctetStream);
    }

    #[test]
    fn test_content_type_from_path() {
        assert_eq!(ContentType::from_path("/media/clip.MP4"), ContentType::Mp4);
        assert_eq!(ContentType::from_path("/media/noext"), ContentType::OctetStream);
        assert_eq!(ContentType::Mp3.mime(), "audio/mpeg");
    }

    #[test]
    fn test_payload_clone_shares_bytes() {
        let payload = Payload::new(vec![1u8, 2, 3], ContentType::Png);
        let clone = payload.clone();

        assert!(payload.shares_bytes_with(&clone));
        assert_eq!(clone.len(), 3);
        assert_eq!(clone.content_type(), ContentType::Png);

        let other = Payload::from_bytes(vec![1u8, 2, 3]);
        assert_eq!(payload.data(), other.data());
        assert!(!payload.shares_bytes_with(&other));
    }

    #[test]
    fn test_content_id_ordering() {
        let a = ContentId::from("a");
        let b = ContentId::new(String::from("b"));
        assert!(a < b);
        assert_eq!(a.to_string(), "a");
        assert_eq!(b.as_str(), "b");
    }
}
