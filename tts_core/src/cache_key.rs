use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::speed::Speed;

// Bumped whenever the digest layout below changes.
const KEY_VERSION: &[u8] = b"tts-cache-key/v1";

/// Deterministic fingerprint of a synthesis request: 64 lowercase hex chars
/// of a SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub const HEX_LEN: usize = 64;

    /// Digest of `(text, speed, noise_scale, noise_w)`.
    ///
    /// Text is hashed as its exact UTF-8 bytes. Every variable-length field
    /// is length-prefixed and floats are hashed by bit pattern, so no two
    /// distinct tuples share an input byte sequence.
    pub fn build(text: &str, speed: Speed, noise_scale: f32, noise_w: f32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(KEY_VERSION);
        update_prefixed(&mut hasher, text.as_bytes());
        update_prefixed(&mut hasher, speed.as_str().as_bytes());
        hasher.update(noise_scale.to_bits().to_le_bytes());
        hasher.update(noise_w.to_bits().to_le_bytes());
        CacheKey(hex::encode(hasher.finalize()))
    }

    /// Accepts a previously rendered key, e.g. from a file name.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = raw.len() == Self::HEX_LEN
            && raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        valid.then(|| CacheKey(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<key>.wav`
    pub fn file_name(&self) -> String {
        format!("{}.wav", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn update_prefixed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
