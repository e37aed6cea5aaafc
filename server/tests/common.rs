//! Shared fixtures for the HTTP tests
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body, Bytes},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use tts_core::{
    encode_wav, AudioFormat, AudioStore, ResultCache, SynthesisEngine, SynthesisParams,
    SynthesisSettings, TtsOrchestrator,
};
use tts_server::{config::ServerConfig, create_app, AppState};

pub const SAMPLE_RATE: u32 = 16_000;

/// Deterministic engine double: output depends only on text and parameters.
pub struct MockEngine {
    calls: AtomicUsize,
    failures: AtomicUsize,
    delay: Duration,
}

impl MockEngine {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            delay,
        }
    }

    /// Make the next `n` calls fail.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SynthesisEngine for MockEngine {
    fn synthesize(&self, text: &str, params: &SynthesisParams) -> anyhow::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("phonemizer crashed");
        }
        // long enough to span several stream chunks
        let samples: Vec<f32> = text
            .chars()
            .cycle()
            .take(text.chars().count() * 2_000)
            .enumerate()
            .map(|(i, c)| ((c as u32 + i as u32) % 200) as f32 / 200.0 * params.length_scale - 0.5)
            .collect();
        encode_wav(&samples, SAMPLE_RATE)
    }

    fn audio_format(&self) -> AudioFormat {
        AudioFormat::mono_16bit(SAMPLE_RATE)
    }
}

pub struct TestApp {
    pub router: Router,
    pub engine: Arc<MockEngine>,
}

pub fn test_app(audio_dir: &Path) -> TestApp {
    test_app_with(audio_dir, Duration::ZERO)
}

pub fn test_app_with(audio_dir: &Path, delay: Duration) -> TestApp {
    let config = ServerConfig {
        audio_output_dir: audio_dir.to_path_buf(),
        cache_size: 8,
        ..ServerConfig::default()
    };
    test_app_from_config(config, delay)
}

pub fn test_app_from_config(config: ServerConfig, delay: Duration) -> TestApp {
    let engine = Arc::new(MockEngine::new(delay));
    let tts = TtsOrchestrator::new(
        Arc::clone(&engine) as Arc<dyn SynthesisEngine>,
        ResultCache::new(config.cache_size),
        AudioStore::new(&config.audio_output_dir),
        SynthesisSettings::default(),
    );
    let router = create_app(AppState::new(tts, config)).expect("router");
    TestApp { router, engine }
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body)
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}
