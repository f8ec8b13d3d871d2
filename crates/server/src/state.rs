//! Process-wide shared state (§4.11, §5 shared-resource policy): backend
//! routers, the GPU hub, the orchestrator and the tracer handle, all built
//! once at startup and otherwise immutable or guarded only where they must
//! track mutable subscriber/counter sets.

use std::collections::HashMap;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use voice_agent_config::Settings;
use voice_agent_core::{LanguageModel, Retriever, Router, SpeechToText, TextToSpeech, Tracer};
use voice_agent_persistence::AsyncTracer;
use voice_agent_rag::CallHistoryStore;

use crate::gpu_hub::GpuHub;
use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<RwLock<Settings>>,
    pub http_client: reqwest::Client,

    pub asr_router: Router<Arc<dyn SpeechToText>>,
    pub llm_router: Router<Arc<dyn LanguageModel>>,
    pub tts_router: Router<Arc<dyn TextToSpeech>>,

    pub retriever: Option<Arc<dyn Retriever>>,
    pub call_history: Option<Arc<CallHistoryStore>>,

    /// Shared via the trait object for pipeline use; `async_tracer` aliases
    /// the same allocation (when present) so shutdown can attempt to reclaim
    /// unique ownership and drain it (§10.6).
    pub tracer: Arc<dyn Tracer>,
    pub async_tracer: Option<Arc<AsyncTracer>>,

    pub gpu_hub: Arc<GpuHub>,
    pub orchestrator: Arc<Orchestrator>,

    /// Admission-control semaphore, capacity `server.max_concurrent` (§4.11).
    pub admission: Arc<Semaphore>,

    pub metrics_handle: Arc<PrometheusHandle>,

    /// Cancelled once on SIGINT/SIGTERM; every session's pipeline inherits
    /// this as its cancellation scope (§10.6).
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Resolves the model name to use for `engine` when the session's
    /// metadata frame didn't specify one explicitly (§4.11).
    pub fn default_llm_model(&self, engine: &str) -> String {
        let settings = self.settings.read();
        settings
            .backends
            .llm
            .get(engine)
            .or_else(|| {
                settings
                    .backends
                    .llm_fallback
                    .as_deref()
                    .and_then(|fallback| settings.backends.llm.get(fallback))
            })
            .map(|backend| backend.default_model.clone())
            .unwrap_or_default()
    }

    /// Every configured Ollama-protocol LLM base URL. The model catalog
    /// handler (§6) queries each one's `/api/tags` (installed) and
    /// `/api/ps` (loaded); the preload/unload handlers use `/api/generate`.
    pub fn local_llm_base_urls(&self) -> HashMap<String, String> {
        let settings = self.settings.read();
        settings
            .backends
            .llm
            .iter()
            .filter(|(_, cfg)| matches!(cfg.protocol, voice_agent_config::LlmProtocol::Local))
            .map(|(name, cfg)| (name.clone(), cfg.base_url.clone()))
            .collect()
    }
}
