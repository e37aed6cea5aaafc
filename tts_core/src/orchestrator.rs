use std::{path::PathBuf, sync::Arc, time::Instant};

use bytes::Bytes;
use futures_core::Stream;
use tracing::{info, warn};

use crate::{
    artifact::AudioArtifact,
    cache::ResultCache,
    cache_key::CacheKey,
    engine::{SynthesisEngine, SynthesisParams},
    error::{TtsError, TtsResult},
    request::{SynthesisRequest, DEFAULT_MAX_TEXT_LENGTH},
    speed::Speed,
    storage::AudioStore,
    stream::{audio_chunks, DEFAULT_CHUNK_SIZE},
    wav::AudioFormat,
};

pub const DEFAULT_NOISE_SCALE: f32 = 0.5;
pub const DEFAULT_NOISE_W: f32 = 0.6;

/// Deployment-wide synthesis tunables, already resolved from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisSettings {
    pub noise_scale: f32,
    pub noise_w: f32,
    pub max_text_length: usize,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            noise_scale: DEFAULT_NOISE_SCALE,
            noise_w: DEFAULT_NOISE_W,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
        }
    }
}

/// Result of materialize mode.
#[derive(Debug, Clone)]
pub struct MaterializedAudio {
    pub artifact: Arc<AudioArtifact>,
    pub path: PathBuf,
}

impl MaterializedAudio {
    pub fn file_name(&self) -> String {
        self.artifact.key.file_name()
    }
}

/// Single entry point from request to audio: validation, key derivation,
/// cache lookup and engine invocation, plus the two delivery shapes.
pub struct TtsOrchestrator {
    engine: Arc<dyn SynthesisEngine>,
    cache: ResultCache,
    store: AudioStore,
    settings: SynthesisSettings,
}

impl std::fmt::Debug for TtsOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtsOrchestrator")
            .field("engine", &"<SynthesisEngine>")
            .field("cache", &self.cache)
            .field("store", &self.store)
            .field("settings", &self.settings)
            .finish()
    }
}

impl TtsOrchestrator {
    pub fn new(
        engine: Arc<dyn SynthesisEngine>,
        cache: ResultCache,
        store: AudioStore,
        settings: SynthesisSettings,
    ) -> Self {
        Self {
            engine,
            cache,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &SynthesisSettings {
        &self.settings
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn store(&self) -> &AudioStore {
        &self.store
    }

    pub fn audio_format(&self) -> AudioFormat {
        self.engine.audio_format()
    }

    pub fn cache_key(&self, request: &SynthesisRequest) -> CacheKey {
        CacheKey::build(
            &request.text,
            request.speed,
            self.settings.noise_scale,
            self.settings.noise_w,
        )
    }

    pub fn params_for(&self, speed: Speed) -> SynthesisParams {
        SynthesisParams {
            length_scale: speed.length_scale(),
            noise_scale: self.settings.noise_scale,
            noise_w: self.settings.noise_w,
        }
    }

    /// Validate, then return cached audio or synthesize it once per key.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> TtsResult<Arc<AudioArtifact>> {
        request.validate(self.settings.max_text_length)?;

        let key = self.cache_key(request);
        let engine = Arc::clone(&self.engine);
        let text = request.text.clone();
        let params = self.params_for(request.speed);
        let job_key = key.clone();

        self.cache
            .get_or_compute(key, move || run_engine(engine, job_key, text, params))
            .await
    }

    /// Materialize mode: synthesize and make sure `<key>.wav` exists on disk.
    ///
    /// A write failure leaves the cached artifact untouched, so a later
    /// attempt (or stream mode) is served from memory.
    pub async fn materialize(&self, request: &SynthesisRequest) -> TtsResult<MaterializedAudio> {
        let artifact = self.synthesize(request).await?;
        let path = self.store.persist(&artifact).await?;
        Ok(MaterializedAudio { artifact, path })
    }

    /// Stream mode: synthesize and return the bytes as transport-sized chunks.
    /// Nothing is written to disk.
    pub async fn stream(
        &self,
        request: &SynthesisRequest,
    ) -> TtsResult<impl Stream<Item = Bytes> + Send + 'static> {
        let artifact = self.synthesize(request).await?;
        Ok(audio_chunks(&artifact, DEFAULT_CHUNK_SIZE))
    }

    /// Bytes of a file written by an earlier materialize call.
    pub async fn load_materialized(&self, file_name: &str) -> TtsResult<Option<Vec<u8>>> {
        self.store.load(file_name).await
    }
}

async fn run_engine(
    engine: Arc<dyn SynthesisEngine>,
    key: CacheKey,
    text: String,
    params: SynthesisParams,
) -> TtsResult<AudioArtifact> {
    let started = Instant::now();
    let text_length = text.chars().count();
    info!(
        key = %key,
        text_length,
        length_scale = params.length_scale,
        "synthesizing audio"
    );

    let format = engine.audio_format();
    let bytes = tokio::task::spawn_blocking(move || engine.synthesize(&text, &params))
        .await
        .map_err(|e| TtsError::SynthesisFailure(format!("synthesis task join error: {e}")))?
        .map_err(|e| {
            warn!(key = %key, error = %format!("{e:#}"), "engine failed");
            TtsError::SynthesisFailure(format!("{e:#}"))
        })?;

    info!(
        key = %key,
        bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "synthesis complete"
    );
    Ok(AudioArtifact::new(key, format, bytes))
}
