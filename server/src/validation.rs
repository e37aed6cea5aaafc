use serde::Deserialize;
use tts_core::{Speed, SynthesisRequest};

use crate::error::ApiError;

/// Query string of `/tts` and `/tts/stream`.
///
/// Both fields are optional at the extractor level so a missing value
/// produces a JSON error body instead of axum's plain-text rejection.
#[derive(Debug, Default, Deserialize)]
pub struct TtsQuery {
    pub text: Option<String>,
    pub speed: Option<String>,
}

impl TtsQuery {
    /// Convert into a core request. Text content checks (blank, length)
    /// happen in the orchestrator.
    pub fn into_request(self, default_speed: Speed) -> Result<SynthesisRequest, ApiError> {
        let text = self
            .text
            .ok_or_else(|| ApiError::InvalidInput("Missing required parameter: text".to_string()))?;

        let speed = match self.speed.as_deref().map(str::trim) {
            None | Some("") => default_speed,
            Some(raw) => raw.parse::<Speed>()?,
        };

        Ok(SynthesisRequest::new(text, speed))
    }
}
