//! Stream-mode delivery.
//!
//! Audio is synthesized as a whole and then handed to the transport in
//! fixed-size slices, so a slow client only holds a reference to the shared
//! artifact instead of a copy.

use async_stream::stream;
use bytes::Bytes;
use futures_core::Stream;

use crate::artifact::AudioArtifact;

/// Chunk size used by the HTTP stream endpoint.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Yield the artifact's bytes in `chunk_size` slices (the last may be shorter).
pub fn audio_chunks(
    artifact: &AudioArtifact,
    chunk_size: usize,
) -> impl Stream<Item = Bytes> + Send + 'static {
    let bytes = artifact.bytes.clone();
    let chunk_size = chunk_size.max(1);
    stream! {
        let mut offset = 0usize;
        while offset < bytes.len() {
            let end = (offset + chunk_size).min(bytes.len());
            yield bytes.slice(offset..end);
            offset = end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache_key::CacheKey, speed::Speed, wav::AudioFormat};
    use futures_util::StreamExt;

    fn artifact(len: usize) -> AudioArtifact {
        let bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        AudioArtifact::new(
            CacheKey::build("chunks", Speed::Normal, 0.5, 0.6),
            AudioFormat::default(),
            bytes,
        )
    }

    #[tokio::test]
    async fn test_chunks_reassemble_to_original() {
        let artifact = artifact(20_000);
        let chunks: Vec<Bytes> = audio_chunks(&artifact, DEFAULT_CHUNK_SIZE).collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 8192);
        assert_eq!(chunks[2].len(), 20_000 - 2 * 8192);
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(&joined[..], &artifact.bytes[..]);
    }

    #[tokio::test]
    async fn test_empty_artifact_yields_nothing() {
        let chunks: Vec<Bytes> = audio_chunks(&artifact(0), 16).collect().await;
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_zero_chunk_size_is_clamped() {
        let chunks: Vec<Bytes> = audio_chunks(&artifact(3), 0).collect().await;
        assert_eq!(chunks.len(), 3);
    }
}
