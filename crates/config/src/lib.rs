//! Configuration management for the voice agent gateway.
//!
//! Supports loading configuration from:
//! - a JSON file (`config/default.json`, optionally overlaid by
//!   `config/{env}.json`)
//! - environment variables (`VOICE_AGENT__` prefix, `__` separator)
//!
//! Environment variables win over the environment-specific file, which wins
//! over the default file, which wins over the struct's built-in defaults
//! (§6 Configuration surface).

pub mod settings;

pub use settings::{
    load_settings, AsrBackendConfig, BackendsConfig, LlmBackendConfig, LlmProtocol,
    PipelineConfig, RagConfig, RuntimeEnvironment, ServerConfig, ServiceRegistryEntry,
    ServicesConfig, Settings, TracingConfig, TtsBackendConfig, TtsProtocol, VadConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for voice_agent_core::Error {
    fn from(err: ConfigError) -> Self {
        voice_agent_core::Error::BadRequest(err.to_string())
    }
}
