use bytes::Bytes;

use crate::{cache_key::CacheKey, wav::AudioFormat};

/// Synthesized audio for one cache key.
///
/// Bytes are reference counted, so clones handed to concurrent readers share
/// one immutable buffer and outlive eviction of the cache mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub key: CacheKey,
    pub format: AudioFormat,
    pub bytes: Bytes,
}

impl AudioArtifact {
    pub fn new(key: CacheKey, format: AudioFormat, bytes: impl Into<Bytes>) -> Self {
        Self {
            key,
            format,
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
