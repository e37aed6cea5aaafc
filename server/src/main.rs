use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tts_core::{read_inference_defaults, AudioStore, PiperEngine, ResultCache, TtsOrchestrator};
use tts_server::{config::ServerConfig, create_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    // RUST_LOG wins, then LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .and_then(|level| EnvFilter::try_new(level.to_lowercase()).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting TTS server...");
    let config = ServerConfig::from_env();

    info!(config = %config.model_config_path.display(), "Loading voice model...");
    let model_path = config.model_config_path.clone();
    let engine = tokio::task::spawn_blocking(move || PiperEngine::from_config_path(&model_path))
        .await
        .context("model loading task failed")?
        .with_context(|| format!("cannot load voice from {}", config.model_config_path.display()))?;

    let model_defaults = read_inference_defaults(&config.model_config_path).unwrap_or_else(|e| {
        warn!(error = %e, "could not read inference defaults, using built-in values");
        Default::default()
    });
    let settings = config.synthesis_settings(&model_defaults);
    info!(
        noise_scale = settings.noise_scale,
        noise_w = settings.noise_w,
        max_text_length = settings.max_text_length,
        cache_size = config.cache_size,
        audio_dir = %config.audio_output_dir.display(),
        default_speed = %config.default_speed,
        "Synthesis settings resolved"
    );

    let tts = TtsOrchestrator::new(
        Arc::new(engine),
        ResultCache::new(config.cache_size),
        AudioStore::new(&config.audio_output_dir),
        settings,
    );
    let state = AppState::new(tts, config.clone());
    let app = create_app(state)?;

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different SERVER_PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
