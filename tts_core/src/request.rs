use serde::{Deserialize, Serialize};

use crate::{error::TtsError, speed::Speed};

/// Default upper bound on request text, in characters.
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 10_000;

/// Text plus the per-request knobs of a synthesis call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub speed: Speed,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, speed: Speed) -> Self {
        Self {
            text: text.into(),
            speed,
        }
    }

    /// Rejects blank text and text longer than `max_text_length` characters.
    ///
    /// The text itself is never rewritten: the exact string is what gets
    /// hashed and synthesized.
    pub fn validate(&self, max_text_length: usize) -> Result<(), TtsError> {
        if self.text.trim().is_empty() {
            return Err(TtsError::InvalidRequest(
                "Text parameter cannot be empty".to_string(),
            ));
        }
        let length = self.text.chars().count();
        if length > max_text_length {
            return Err(TtsError::InvalidRequest(format!(
                "Text too long ({} characters). Maximum length is {} characters",
                length, max_text_length
            )));
        }
        Ok(())
    }
}
