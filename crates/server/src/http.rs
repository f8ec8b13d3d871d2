//! HTTP control surface (§6): health/readiness/metrics, the model and TTS
//! catalogs, the GPU hub's snapshot and SSE stream, the service orchestrator
//! and the STT model catalog/download proxy.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use voice_agent_core::{Error, SynthesizeOpts};

use crate::orchestrator::ServiceStatus;
use crate::state::AppState;

const OLLAMA_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the HTTP control-surface router. Takes `state` only to decide the
/// CORS layer; the returned router still expects `.with_state(state)` from
/// the caller so it can be merged with the WebSocket route before that.
pub fn routes(state: &AppState) -> AxumRouter<AppState> {
    AxumRouter::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/api/models", get(list_models))
        .route("/api/models/preload", post(preload_model))
        .route("/api/models/unload", post(unload_model))
        .route("/api/tts/warmup", post(tts_warmup))
        .route("/api/tts/health", get(tts_health))
        .route("/api/gpu", get(gpu_snapshot))
        .route("/api/gpu/stream", get(gpu_stream))
        .route("/api/gpu/unload-all", post(gpu_unload_all))
        .route("/api/services", get(list_services))
        .route("/api/services/:name/status", get(service_status))
        .route("/api/services/:name/start", post(service_start))
        .route("/api/services/:name/stop", post(service_stop))
        .route("/api/stt/models", get(list_stt_models))
        .route("/api/stt/models/download", post(download_stt_model))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(state))
}

/// Builds the CORS layer from configured origins; permissive with a warning
/// when origins aren't configured but CORS is enabled (§6).
fn cors_layer(state: &AppState) -> CorsLayer {
    let settings = state.settings.read();
    if !settings.server.cors_enabled {
        return CorsLayer::new();
    }
    if settings.server.cors_origins.is_empty() {
        tracing::warn!("CORS enabled with no origins configured, allowing any origin");
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }
    let origins: Vec<_> = settings
        .server
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    if origins.is_empty() {
        tracing::error!("all configured CORS origins are invalid, falling back to permissive");
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }
    CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
}

async fn health() -> impl IntoResponse {
    "ok"
}

/// Readiness is distinct from liveness: a process that's up but still has
/// zero routed backends isn't ready to serve calls.
async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let settings = state.settings.read();
    let ready = !settings.backends.asr.is_empty()
        && !settings.backends.llm.is_empty()
        && !settings.backends.tts.is_empty();
    if ready {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ready" })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "status": "not_ready" })))
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}

#[derive(Serialize)]
struct ModelCatalog {
    asr_engines: Vec<String>,
    llm_engines: Vec<String>,
    llm_installed: Vec<String>,
    llm_loaded: Vec<String>,
    tts_engines: Vec<String>,
    audio_bandwidth_modes: Vec<AudioBandwidthMode>,
}

#[derive(Serialize)]
struct AudioBandwidthMode {
    codec: voice_agent_core::AudioCodec,
    /// `None` for codecs where the caller supplies the rate (e.g. PCM).
    sample_rate_hz: Option<u32>,
}

fn audio_bandwidth_modes() -> Vec<AudioBandwidthMode> {
    use voice_agent_core::AudioCodec;
    [AudioCodec::Pcm, AudioCodec::Mulaw, AudioCodec::Alaw]
        .into_iter()
        .map(|codec| AudioBandwidthMode { codec, sample_rate_hz: codec.fixed_rate_hz() })
        .collect()
}

async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let (llm_installed, llm_loaded) = fetch_ollama_catalog(&state).await;
    Json(ModelCatalog {
        asr_engines: state.asr_router.engines().map(str::to_string).collect(),
        llm_engines: state.llm_router.engines().map(str::to_string).collect(),
        llm_installed,
        llm_loaded,
        tts_engines: state.tts_router.engines().map(str::to_string).collect(),
        audio_bandwidth_modes: audio_bandwidth_modes(),
    })
}

#[derive(Deserialize)]
struct OllamaModelRef {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelListResponse {
    #[serde(default)]
    models: Vec<OllamaModelRef>,
}

/// Queries every local LLM backend's `/api/tags` (installed models) and
/// `/api/ps` (currently loaded models) for the catalog (§6). Best-effort:
/// a slow or failing backend is logged and simply contributes nothing.
async fn fetch_ollama_catalog(state: &AppState) -> (Vec<String>, Vec<String>) {
    use std::collections::BTreeSet;

    let mut installed = BTreeSet::new();
    let mut loaded = BTreeSet::new();

    for (name, base_url) in state.local_llm_base_urls() {
        let base_url = base_url.trim_end_matches('/');

        match fetch_ollama_model_list(state, &format!("{base_url}/api/tags")).await {
            Ok(models) => installed.extend(models),
            Err(err) => tracing::warn!(backend = %name, error = %err, "failed to query /api/tags"),
        }

        match fetch_ollama_model_list(state, &format!("{base_url}/api/ps")).await {
            Ok(models) => loaded.extend(models),
            Err(err) => tracing::warn!(backend = %name, error = %err, "failed to query /api/ps"),
        }
    }

    (installed.into_iter().collect(), loaded.into_iter().collect())
}

async fn fetch_ollama_model_list(state: &AppState, url: &str) -> Result<Vec<String>, String> {
    let response = tokio::time::timeout(OLLAMA_TIMEOUT, state.http_client.get(url).send())
        .await
        .map_err(|_| "request timed out".to_string())?
        .map_err(|err| err.to_string())?;
    let body: OllamaModelListResponse = response.json().await.map_err(|err| err.to_string())?;
    Ok(body.models.into_iter().map(|m| m.name).collect())
}

#[derive(Deserialize)]
struct ModelRef {
    model: String,
}

/// Forces a local LLM to load by asking every configured Ollama-protocol
/// backend's `/api/generate` with `keep_alive` set, then re-broadcasts the
/// GPU snapshot so subscribers see the newly resident model promptly.
async fn preload_model(State(state): State<AppState>, Json(req): Json<ModelRef>) -> impl IntoResponse {
    set_keep_alive(&state, &req.model, "5m").await;
    state.gpu_hub.broadcast().await;
    StatusCode::ACCEPTED
}

#[derive(Deserialize)]
struct UnloadRequest {
    #[serde(rename = "type")]
    _kind: Option<String>,
    model: String,
}

async fn unload_model(State(state): State<AppState>, Json(req): Json<UnloadRequest>) -> impl IntoResponse {
    set_keep_alive(&state, &req.model, "0").await;
    state.gpu_hub.broadcast().await;
    StatusCode::ACCEPTED
}

async fn set_keep_alive(state: &AppState, model: &str, keep_alive: &str) {
    for (name, base_url) in state.local_llm_base_urls() {
        let url = format!("{}/api/generate", base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "model": model, "keep_alive": keep_alive });
        let result = tokio::time::timeout(OLLAMA_TIMEOUT, state.http_client.post(&url).json(&body).send()).await;
        if let Err(err) = result {
            tracing::warn!(backend = %name, error = %err, "keep-alive request timed out");
        }
    }
}

#[derive(Deserialize)]
struct TtsWarmupRequest {
    engine: String,
}

async fn tts_warmup(State(state): State<AppState>, Json(req): Json<TtsWarmupRequest>) -> Response {
    match state.tts_router.route(&req.engine) {
        Ok(tts) => match tts.synthesize("Hello.", SynthesizeOpts::default()).await {
            Ok(result) => {
                (StatusCode::OK, Json(serde_json::json!({ "latency_ms": result.latency_ms }))).into_response()
            }
            Err(err) => error_response(&err),
        },
        Err(err) => error_response(&err),
    }
}

#[derive(Deserialize)]
struct EngineQuery {
    engine: Option<String>,
}

async fn tts_health(State(state): State<AppState>, Query(q): Query<EngineQuery>) -> Response {
    let engine = match q.engine.as_deref().or_else(|| state.tts_router.fallback_name()) {
        Some(engine) => engine,
        None => return error_response(&Error::NoBackend("(no engine specified)".to_string())),
    };
    match state.tts_router.route(engine) {
        Ok(_) => Json(serde_json::json!({ "engine": engine, "status": "ok" })).into_response(),
        Err(err) => error_response(&err),
    }
}

/// Returns the current GPU snapshot (§6): fetches and re-canonicalizes
/// upstream when a poll URL is configured, falling back to the last
/// published snapshot (e.g. one forwarded from an orchestrator response)
/// when the fetch is unavailable or fails.
async fn gpu_snapshot(State(state): State<AppState>) -> Response {
    let snapshot = match state.gpu_hub.broadcast().await {
        Some(snapshot) => Some(snapshot),
        None => state.gpu_hub.current().await,
    };
    match snapshot {
        Some(snapshot) => Json(snapshot).into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// Initial snapshot then push on every change (§6): `subscribe` seeds the
/// channel with the last published snapshot before this stream is built, so
/// the first item a client receives is the current state, not just the next
/// external broadcast.
async fn gpu_stream(
    State(state): State<AppState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    let rx = state.gpu_hub.subscribe().await;
    let stream = tokio_stream::wrappers::ReceiverStream::new(rx)
        .map(|snapshot| Ok(SseEvent::default().json_data(snapshot).unwrap_or_else(|_| SseEvent::default())));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Unloads every configured local LLM, stops every registered service and
/// re-broadcasts the resulting (now empty) GPU snapshot.
async fn gpu_unload_all(State(state): State<AppState>) -> impl IntoResponse {
    let models: Vec<String> = state.local_llm_base_urls().into_keys().collect();
    for model in models {
        set_keep_alive(&state, &model, "0").await;
    }
    for name in state.orchestrator.names().map(str::to_string).collect::<Vec<_>>() {
        if let Err(err) = state.orchestrator.stop(&name).await {
            tracing::warn!(service = %name, error = %err, "failed to stop service during unload-all");
        }
    }
    state.gpu_hub.broadcast().await;
    StatusCode::ACCEPTED
}

async fn list_services(State(state): State<AppState>) -> impl IntoResponse {
    let statuses = state.orchestrator.status_all().await;
    let body: Vec<_> = statuses
        .into_iter()
        .map(|(name, status)| {
            serde_json::json!({
                "name": name,
                "status": status.map(service_status_label).unwrap_or("unknown"),
            })
        })
        .collect();
    Json(body)
}

fn service_status_label(status: ServiceStatus) -> &'static str {
    match status {
        ServiceStatus::Stopped => "stopped",
        ServiceStatus::Healthy => "healthy",
        ServiceStatus::Running => "running",
    }
}

async fn service_status(
    State(state): State<AppState>,
    axum::extract::Path(name): axum::extract::Path<String>,
) -> Response {
    match state.orchestrator.status(&name).await {
        Ok(status) => {
            Json(serde_json::json!({ "name": name, "status": service_status_label(status) })).into_response()
        }
        Err(err) => error_response(&err),
    }
}

async fn service_start(
    State(state): State<AppState>,
    axum::extract::Path(name): axum::extract::Path<String>,
) -> Response {
    match state.orchestrator.start(&name, None).await {
        Ok(body) => Json(body).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn service_stop(
    State(state): State<AppState>,
    axum::extract::Path(name): axum::extract::Path<String>,
) -> Response {
    match state.orchestrator.stop(&name).await {
        Ok(body) => Json(body).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn list_stt_models(State(state): State<AppState>) -> impl IntoResponse {
    let engines: Vec<String> = state.asr_router.engines().map(str::to_string).collect();
    Json(serde_json::json!({ "engines": engines }))
}

#[derive(Deserialize)]
struct SttDownloadRequest {
    engine: String,
    model: String,
}

/// Proxies a model download as a streamed body: each upstream chunk is
/// forwarded to the caller as soon as it arrives rather than buffered until
/// completion (§6).
async fn download_stt_model(State(state): State<AppState>, Json(req): Json<SttDownloadRequest>) -> Response {
    let base_url = match state.settings.read().backends.asr.get(&req.engine) {
        Some(cfg) => cfg.base_url.clone(),
        None => return error_response(&Error::NoBackend(req.engine)),
    };

    let url = format!("{}/models/download", base_url.trim_end_matches('/'));
    let upstream = state
        .http_client
        .post(&url)
        .json(&serde_json::json!({ "model": req.model }))
        .send()
        .await;

    match upstream {
        Ok(response) if response.status().is_success() => {
            let stream = response.bytes_stream().map(|chunk| chunk.map_err(std::io::Error::other));
            axum::body::Body::from_stream(stream).into_response()
        }
        Ok(response) => {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error_response(&Error::RemoteStatus { status, body: body.chars().take(512).collect() })
        }
        Err(err) => error_response(&Error::Transport(err.to_string())),
    }
}

fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::BadRequest(_) | Error::NoBackend(_) => StatusCode::BAD_REQUEST,
        Error::AtCapacity => StatusCode::SERVICE_UNAVAILABLE,
        Error::RemoteStatus { status, .. } => StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
        Error::Cancelled => StatusCode::REQUEST_TIMEOUT,
        Error::Transport(_) | Error::Decode(_) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}
