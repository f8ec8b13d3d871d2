//! Main settings module.

use std::collections::HashMap;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Runtime environment; affects how strictly `Settings::validate` treats
/// missing/placeholder values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Top-level application settings, loaded once at startup and shared behind
/// a `parking_lot::RwLock` for the lifetime of the process (§10.4).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub backends: BackendsConfig,

    #[serde(default)]
    pub tracing: TracingConfig,

    #[serde(default)]
    pub services: ServicesConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_pipeline()?;
        self.validate_rag()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "port cannot be 0".to_string(),
            });
        }
        if self.server.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_concurrent".to_string(),
                message: "must allow at least 1 concurrent session".to_string(),
            });
        }
        if self.environment.is_production()
            && self.server.cors_enabled
            && self.server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured; \
                 this may block legitimate clients"
            );
        }
        Ok(())
    }

    fn validate_pipeline(&self) -> Result<(), ConfigError> {
        let vad = &self.pipeline.vad;
        if vad.min_speech_duration_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.vad.min_speech_duration_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.pipeline.sentence_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.sentence_channel_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.pipeline.no_speech_prob_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.no_speech_prob_threshold".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        if self.rag.enabled {
            if self.rag.vector_dim == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "rag.vector_dim".to_string(),
                    message: "must be positive when RAG is enabled".to_string(),
                });
            }
            if !(0.0..=1.0).contains(&self.rag.score_threshold) {
                return Err(ConfigError::InvalidValue {
                    field: "rag.score_threshold".to_string(),
                    message: "must be between 0.0 and 1.0".to_string(),
                });
            }
            if self.rag.top_k == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "rag.top_k".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// HTTP/WebSocket ingress configuration (§6, §4.9 admission control).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Capacity of the admission-control semaphore (§4.9).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_ws_path() -> String {
    "/ws/call".to_string()
}
fn default_max_concurrent() -> usize {
    100
}
fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            max_concurrent: default_max_concurrent(),
            request_timeout_secs: default_timeout(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

/// Voice activity detector thresholds (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    #[serde(default = "default_speech_threshold_db")]
    pub speech_threshold_db: f32,

    #[serde(default = "default_silence_timeout_ms")]
    pub silence_timeout_ms: u64,

    #[serde(default = "default_min_speech_duration_ms")]
    pub min_speech_duration_ms: u64,

    #[serde(default = "default_pre_speech_buffer_ms")]
    pub pre_speech_buffer_ms: u64,

    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
}

fn default_speech_threshold_db() -> f32 {
    -40.0
}
fn default_silence_timeout_ms() -> u64 {
    700
}
fn default_min_speech_duration_ms() -> u64 {
    250
}
fn default_pre_speech_buffer_ms() -> u64 {
    300
}
fn default_sample_rate_hz() -> u32 {
    16_000
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            speech_threshold_db: default_speech_threshold_db(),
            silence_timeout_ms: default_silence_timeout_ms(),
            min_speech_duration_ms: default_min_speech_duration_ms(),
            pre_speech_buffer_ms: default_pre_speech_buffer_ms(),
            sample_rate_hz: default_sample_rate_hz(),
        }
    }
}

/// Sentence-pipelined pipeline engine tunables (§4.2, §4.9, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub vad: VadConfig,

    /// Transcripts with `no_speech_prob` above this are filtered (§3).
    #[serde(default = "default_no_speech_prob_threshold")]
    pub no_speech_prob_threshold: f32,

    /// Capacity of the bounded channel between the LLM token producer and
    /// the TTS consumer (§4.9).
    #[serde(default = "default_sentence_channel_capacity")]
    pub sentence_channel_capacity: usize,

    /// Optional pause inserted between synthesized sentences, in
    /// milliseconds. `None` disables the pause.
    #[serde(default)]
    pub inter_sentence_pause_ms: Option<u64>,
}

fn default_no_speech_prob_threshold() -> f32 {
    0.6
}
fn default_sentence_channel_capacity() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vad: VadConfig::default(),
            no_speech_prob_threshold: default_no_speech_prob_threshold(),
            sentence_channel_capacity: default_sentence_channel_capacity(),
            inter_sentence_pause_ms: None,
        }
    }
}

/// Embedding + vector store retrieval configuration (§4.7, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,

    #[serde(default)]
    pub qdrant_api_key: Option<String>,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_vector_dim")]
    pub vector_dim: u64,

    #[serde(default = "default_top_k")]
    pub top_k: u64,

    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_embedding_base_url")]
    pub embedding_base_url: String,
}

fn default_qdrant_endpoint() -> String {
    "http://localhost:6334".to_string()
}
fn default_collection() -> String {
    "call_context".to_string()
}
fn default_vector_dim() -> u64 {
    1024
}
fn default_top_k() -> u64 {
    5
}
fn default_score_threshold() -> f32 {
    0.5
}
fn default_embedding_model() -> String {
    "qwen3-embedding:0.6b".to_string()
}
fn default_embedding_base_url() -> String {
    "http://localhost:11434".to_string()
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_api_key: None,
            collection: default_collection(),
            vector_dim: default_vector_dim(),
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
            embedding_model: default_embedding_model(),
            embedding_base_url: default_embedding_base_url(),
        }
    }
}

/// Wire protocol a named LLM backend speaks (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProtocol {
    /// Ollama-style `/api/chat`, newline-delimited JSON chunks.
    Local,
    /// `/v1/chat/completions`, SSE `data: ` lines.
    OpenAiCompatible,
    /// `/v1/messages`, SSE `event:`/`data:` pairs.
    Anthropic,
}

/// Wire protocol a named TTS backend speaks (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsProtocol {
    LocalNeural,
    OpenAiCompatible,
    CloudSaas,
    MultilingualSelfHost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrBackendConfig {
    pub base_url: String,
    #[serde(default = "default_asr_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_asr_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmBackendConfig {
    pub protocol: LlmProtocol,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub default_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsBackendConfig {
    pub protocol: TtsProtocol,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_voice")]
    pub voice: String,
}

fn default_voice() -> String {
    "default".to_string()
}

/// Named backend pools the `Router<T>` registries are built from at startup
/// (§4.3, §10.4).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendsConfig {
    #[serde(default)]
    pub asr: HashMap<String, AsrBackendConfig>,
    #[serde(default)]
    pub asr_fallback: Option<String>,

    #[serde(default)]
    pub llm: HashMap<String, LlmBackendConfig>,
    #[serde(default)]
    pub llm_fallback: Option<String>,

    #[serde(default)]
    pub tts: HashMap<String, TtsBackendConfig>,
    #[serde(default)]
    pub tts_fallback: Option<String>,
}

/// Logging, metrics and async-tracer configuration (§10.2, §4.14).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Enable the ScyllaDB-backed async tracer (§4.14). Disabled by default;
    /// all `Tracer` calls become no-ops when this is false.
    #[serde(default)]
    pub tracer_enabled: bool,

    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    #[serde(default = "default_scylla_keyspace")]
    pub scylla_keyspace: String,

    #[serde(default = "default_replication_factor")]
    pub scylla_replication_factor: u8,

    /// Capacity of the bounded channel the tracer's background writer
    /// drains (§4.14).
    #[serde(default = "default_tracer_channel_capacity")]
    pub tracer_channel_capacity: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_scylla_hosts() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}
fn default_scylla_keyspace() -> String {
    "voice_agent".to_string()
}
fn default_replication_factor() -> u8 {
    1
}
fn default_tracer_channel_capacity() -> usize {
    64
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: default_true(),
            metrics_port: default_metrics_port(),
            tracer_enabled: false,
            scylla_hosts: default_scylla_hosts(),
            scylla_keyspace: default_scylla_keyspace(),
            scylla_replication_factor: default_replication_factor(),
            tracer_channel_capacity: default_tracer_channel_capacity(),
        }
    }
}

/// One entry in the service orchestrator's registry (§4.13).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRegistryEntry {
    pub category: String,
    pub health_url: String,
    pub control_url: String,
}

/// GPU broadcast hub + service orchestrator configuration (§4.12, §4.13).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServicesConfig {
    /// Upstream URL the GPU hub polls for a raw snapshot. `None` disables
    /// the periodic poll; the hub still fans out snapshots forwarded from
    /// orchestrator control responses.
    #[serde(default)]
    pub gpu_snapshot_url: Option<String>,

    #[serde(default)]
    pub registry: HashMap<String, ServiceRegistryEntry>,
}

/// Loads settings from files and environment (§6, §10.4).
///
/// Priority (highest to lowest): `VOICE_AGENT__` environment variables,
/// `config/{env}.json` (if `env` is given), `config/default.json`.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICE_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.max_concurrent, 100);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_zero_max_concurrent() {
        let mut settings = Settings::default();
        settings.server.max_concurrent = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_rag_threshold() {
        let mut settings = Settings::default();
        settings.rag.score_threshold = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_zero_sentence_channel_capacity() {
        let mut settings = Settings::default();
        settings.pipeline.sentence_channel_capacity = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn production_with_empty_cors_origins_still_validates() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.server.cors_enabled = true;
        assert!(settings.validate().is_ok());
    }
}
