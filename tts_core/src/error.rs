use thiserror::Error;

/// Failures surfaced by the synthesis pipeline.
///
/// The type is `Clone` so a single failed computation can be reported to
/// every caller that was waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TtsError {
    /// Empty text, unknown speed or text over the configured length.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The engine raised an error (phonemization, model runtime).
    #[error("synthesis failed: {0}")]
    SynthesisFailure(String),

    /// Materialized audio could not be written or read back.
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl TtsError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, TtsError::InvalidRequest(_))
    }
}

pub type TtsResult<T> = Result<T, TtsError>;
