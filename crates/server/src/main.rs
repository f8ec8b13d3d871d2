//! Voice agent gateway entry point: loads configuration, assembles the
//! process-wide state and serves the WebSocket ingress plus the HTTP control
//! surface until a shutdown signal is received (§6, §10.6).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router as AxumRouter;
use metrics_exporter_prometheus::PrometheusBuilder;
use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_agent_config::{load_settings, Settings};
use voice_agent_llm::factory::{build_asr_router, build_llm_router, build_tts_router};
use voice_agent_llm::build_http_client;
use voice_agent_persistence::{AsyncTracer, ScyllaClient, ScyllaConfig};
use voice_agent_rag::{CallHistoryStore, EmbeddingClient, RagRetriever, VectorStore};

use voice_agent_server::orchestrator::ServiceEntry;
use voice_agent_server::{websocket, AppState, GpuHub, Orchestrator};

/// Drain budget for graceful shutdown: in-flight sessions and the async
/// tracer both get this long to finish before the process exits (§6).
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let env = std::env::var("VOICE_AGENT_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("failed to load configuration: {err}. Exiting.");
            std::process::exit(1);
        }
    };

    init_tracing(&settings);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), environment = ?settings.environment, "starting voice agent gateway");

    let metrics_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("failed to install metrics recorder: {err}. Exiting.");
            std::process::exit(1);
        }
    };
    if !settings.tracing.metrics_enabled {
        tracing::info!("metrics collection disabled in config; /metrics still serves an empty registry");
    }

    let http_client = build_http_client();

    let asr_router = build_asr_router(&http_client, &settings.backends);
    let llm_router = build_llm_router(&http_client, &settings.backends);
    let tts_router = build_tts_router(&http_client, &settings.backends);

    let (tracer, async_tracer) = init_tracer(&settings).await;
    let (retriever, call_history) = init_rag(&settings, &http_client).await;

    let gpu_hub = Arc::new(GpuHub::new(http_client.clone(), settings.services.gpu_snapshot_url.clone()));
    let registry: HashMap<String, ServiceEntry> = settings
        .services
        .registry
        .iter()
        .map(|(name, entry)| {
            (
                name.clone(),
                ServiceEntry {
                    category: entry.category.clone(),
                    health_url: entry.health_url.clone(),
                    control_url: entry.control_url.clone(),
                },
            )
        })
        .collect();
    let orchestrator = Arc::new(Orchestrator::new(registry, http_client.clone(), gpu_hub.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    let ws_path = settings.server.ws_path.clone();
    let max_concurrent = settings.server.max_concurrent;

    let state = AppState {
        settings: Arc::new(RwLock::new(settings)),
        http_client,
        asr_router,
        llm_router,
        tts_router,
        retriever,
        call_history,
        tracer,
        async_tracer,
        gpu_hub,
        orchestrator,
        admission: Arc::new(Semaphore::new(max_concurrent)),
        metrics_handle: Arc::new(metrics_handle),
        shutdown: CancellationToken::new(),
    };

    let app = AxumRouter::new()
        .route(&ws_path, axum::routing::get(websocket::ws_handler))
        .merge(voice_agent_server::http::routes(&state))
        .with_state(state.clone());

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, error = %err, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, ws_path = %ws_path, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .expect("server exited unexpectedly");

    if let Some(async_tracer) = state.async_tracer {
        match Arc::try_unwrap(async_tracer) {
            Ok(tracer) => {
                tracing::info!("draining async tracer");
                tokio::time::timeout(SHUTDOWN_DRAIN, tracer.close()).await.ok();
            }
            Err(_) => {
                tracing::warn!("async tracer still has outstanding references, skipping drain");
            }
        }
    }

    tracing::info!("shutdown complete");
}

/// On SIGINT/SIGTERM: within the 30s drain budget, unload every local LLM
/// and stop every orchestrated service, *then* cancel the session token so
/// in-flight calls wind down and the ingress stops accepting new ones (§6).
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, starting graceful shutdown"),
        _ = terminate => tracing::info!("received sigterm, starting graceful shutdown"),
    }

    tokio::time::timeout(SHUTDOWN_DRAIN, drain_auxiliary_processes(&state)).await.ok();

    state.shutdown.cancel();
}

async fn drain_auxiliary_processes(state: &AppState) {
    for (name, base_url) in state.local_llm_base_urls() {
        let url = format!("{}/api/generate", base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "model": name, "keep_alive": "0" });
        if let Err(err) = state.http_client.post(&url).json(&body).send().await {
            tracing::warn!(backend = %name, error = %err, "failed to unload model during shutdown");
        }
    }
    for name in state.orchestrator.names().map(str::to_string).collect::<Vec<_>>() {
        if let Err(err) = state.orchestrator.stop(&name).await {
            tracing::warn!(service = %name, error = %err, "failed to stop service during shutdown");
        }
    }
    state.gpu_hub.broadcast().await;
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("voice_agent={},tower_http=info", settings.tracing.log_level).into());

    let registry = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.tracing.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    registry.with(fmt_layer).init();
}

async fn init_tracer(settings: &Settings) -> (Arc<dyn voice_agent_core::Tracer>, Option<Arc<AsyncTracer>>) {
    if !settings.tracing.tracer_enabled {
        return (Arc::new(voice_agent_core::NoopTracer), None);
    }

    let scylla_config = ScyllaConfig {
        hosts: settings.tracing.scylla_hosts.clone(),
        keyspace: settings.tracing.scylla_keyspace.clone(),
        replication_factor: settings.tracing.scylla_replication_factor,
    };

    match ScyllaClient::connect(scylla_config).await {
        Ok(client) => {
            if let Err(err) = client.ensure_schema().await {
                tracing::error!(error = %err, "failed to ensure tracer schema, tracing disabled");
                return (Arc::new(voice_agent_core::NoopTracer), None);
            }
            let tracer = Arc::new(AsyncTracer::new(client, settings.tracing.tracer_channel_capacity));
            let as_trait: Arc<dyn voice_agent_core::Tracer> = tracer.clone();
            (as_trait, Some(tracer))
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to scylla, tracing disabled");
            (Arc::new(voice_agent_core::NoopTracer), None)
        }
    }
}

async fn init_rag(
    settings: &Settings,
    http_client: &reqwest::Client,
) -> (Option<Arc<dyn voice_agent_core::Retriever>>, Option<Arc<CallHistoryStore>>) {
    if !settings.rag.enabled {
        return (None, None);
    }

    let store = match VectorStore::new(&settings.rag.qdrant_endpoint, settings.rag.qdrant_api_key.as_deref()) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!(error = %err, "failed to construct vector store client, rag disabled");
            return (None, None);
        }
    };

    if let Err(err) = store.ensure_collection(&settings.rag.collection, settings.rag.vector_dim).await {
        tracing::error!(error = %err, "failed to ensure qdrant collection, rag disabled");
        return (None, None);
    }

    let embedder = Arc::new(EmbeddingClient::new(
        http_client.clone(),
        settings.rag.embedding_base_url.clone(),
        settings.rag.embedding_model.clone(),
    ));

    let retriever: Arc<dyn voice_agent_core::Retriever> = Arc::new(RagRetriever::new(
        store.clone(),
        embedder.clone(),
        settings.rag.collection.clone(),
        settings.rag.top_k,
        settings.rag.score_threshold,
    ));

    let call_history = Arc::new(CallHistoryStore::new(store, embedder, settings.rag.collection.clone()));

    (Some(retriever), Some(call_history))
}
