//! Cached text-to-speech core: request validation, cache keys, a
//! single-flight result cache and the orchestrator that ties them to a
//! synthesis engine.

pub mod artifact;
pub mod cache;
pub mod cache_key;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod request;
pub mod speed;
pub mod storage;
pub mod stream;
pub mod wav;

pub use artifact::AudioArtifact;
pub use cache::{CacheStats, ResultCache};
pub use cache_key::CacheKey;
pub use engine::{read_inference_defaults, InferenceDefaults, PiperEngine, SynthesisEngine, SynthesisParams};
pub use error::{TtsError, TtsResult};
pub use orchestrator::{
    MaterializedAudio, SynthesisSettings, TtsOrchestrator, DEFAULT_NOISE_SCALE, DEFAULT_NOISE_W,
};
pub use request::{SynthesisRequest, DEFAULT_MAX_TEXT_LENGTH};
pub use speed::Speed;
pub use storage::AudioStore;
pub use stream::{audio_chunks, DEFAULT_CHUNK_SIZE};
pub use wav::{encode_wav, AudioFormat};
