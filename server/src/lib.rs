pub mod config;
pub mod error;
pub mod metrics;
pub mod validation;

use std::{
    convert::Infallible,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Path, Query, Request, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA},
        HeaderValue, Method,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::StreamExt;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tts_core::{Speed, TtsOrchestrator};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::{AppMetrics, MetricsResponse, SystemMetrics};
use crate::validation::TtsQuery;

#[derive(Clone)]
pub struct AppState {
    pub tts: Arc<TtsOrchestrator>,
    pub metrics: Arc<AppMetrics>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(tts: TtsOrchestrator, config: ServerConfig) -> Self {
        Self {
            tts: Arc::new(tts),
            metrics: Arc::new(AppMetrics::new()),
            config,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TtsResponse {
    pub hash: String,
    pub text: String,
    pub speed: Speed,
    pub audio_url: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

fn build_cors(config: &ServerConfig) -> CorsLayer {
    let methods = [Method::GET, Method::OPTIONS];
    let permissive = || {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods.clone())
            .allow_headers(Any)
    };

    let Some(allowed_origins) = config.cors_allowed_origins.as_ref() else {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins");
        return permissive();
    };
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS has no usable origin, falling back to permissive CORS");
        return permissive();
    }

    info!("CORS configured for {} origin(s)", origins.len());
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(methods.clone())
        .allow_headers(Any)
}

async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = header.clone() {
        request.headers_mut().insert("x-request-id", value);
    }
    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Assemble the router with its middleware stack. Every route is served at
/// the root and again under `/api`.
pub fn create_app(state: AppState) -> anyhow::Result<Router> {
    let config = &state.config;
    let per_minute = config.rate_limit_per_minute.max(1);
    // one token per period, never a zero period
    let period = (Duration::from_secs(60) / per_minute).max(Duration::from_nanos(1));
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .period(period)
            .burst_size(per_minute)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );
    info!(
        rate_limit_per_minute = per_minute,
        timeout_secs = config.request_timeout_secs,
        "HTTP middleware configured"
    );

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(build_cors(config))
        .into_inner();

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/tts", get(tts_endpoint))
        .route("/tts/stream", get(tts_stream_endpoint))
        .route("/audio/{file_name}", get(audio_endpoint))
        .route("/metrics", get(metrics_endpoint));

    Ok(Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state))
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Materialize mode: synthesize (or reuse) the audio, make sure the file
/// exists and answer with its URL.
pub async fn tts_endpoint(
    State(state): State<AppState>,
    query: Result<Query<TtsQuery>, QueryRejection>,
) -> Result<Json<TtsResponse>, ApiError> {
    let started = Instant::now();
    let result = materialize(&state, query).await;
    state.metrics.tts.record(started.elapsed(), result.is_ok());
    result.map(Json)
}

/// Unparsable query strings get the same JSON error body as invalid values.
fn parse_query(query: Result<Query<TtsQuery>, QueryRejection>) -> Result<TtsQuery, ApiError> {
    query
        .map(|Query(query)| query)
        .map_err(|rejection| ApiError::InvalidInput(rejection.body_text()))
}

async fn materialize(
    state: &AppState,
    query: Result<Query<TtsQuery>, QueryRejection>,
) -> Result<TtsResponse, ApiError> {
    let request = parse_query(query)?.into_request(state.config.default_speed)?;
    info!(
        text_length = request.text.chars().count(),
        speed = %request.speed,
        "tts request"
    );
    let materialized = state.tts.materialize(&request).await?;
    let hash = materialized.artifact.key.to_string();

    Ok(TtsResponse {
        audio_url: format!("/audio/{}", materialized.file_name()),
        hash,
        text: request.text,
        speed: request.speed,
    })
}

/// Stream mode: the WAV bytes go straight into the response body.
pub async fn tts_stream_endpoint(
    State(state): State<AppState>,
    query: Result<Query<TtsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let result = stream_audio(&state, query).await;
    state.metrics.tts_stream.record(started.elapsed(), result.is_ok());
    result
}

async fn stream_audio(
    state: &AppState,
    query: Result<Query<TtsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let request = parse_query(query)?.into_request(state.config.default_speed)?;
    info!(
        text_length = request.text.chars().count(),
        speed = %request.speed,
        "tts stream request"
    );
    let chunks = state.tts.stream(&request).await?;
    let body = Body::from_stream(chunks.map(Ok::<_, Infallible>));

    Ok((
        [
            (CONTENT_TYPE, "audio/wav"),
            (CACHE_CONTROL, "no-cache"),
            (PRAGMA, "no-cache"),
        ],
        body,
    )
        .into_response())
}

/// Serve a file written by an earlier `/tts` call.
pub async fn audio_endpoint(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let result = match state.tts.load_materialized(&file_name).await {
        Ok(Some(bytes)) => Ok(([(CONTENT_TYPE, "audio/x-wav")], bytes).into_response()),
        Ok(None) => Err(ApiError::NotFound("Audio file not found".to_string())),
        Err(e) => Err(ApiError::from(e)),
    };
    state.metrics.audio.record(started.elapsed(), result.is_ok());
    result
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let metrics = &state.metrics;
    Json(MetricsResponse {
        timestamp: chrono::Utc::now(),
        system: SystemMetrics::collect(metrics.total_requests(), metrics.uptime()),
        endpoints: metrics.endpoints(),
        cache: state.tts.cache().stats(),
    })
}
