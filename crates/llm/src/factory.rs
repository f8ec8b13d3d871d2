//! Builds the ASR/LLM/TTS `Router<T>` registries from `BackendsConfig`
//! (§4.3, §10.4): one entry per configured named backend, wired to the
//! protocol-specific client it declares.

use std::sync::Arc;

use voice_agent_config::{BackendsConfig, LlmProtocol, TtsProtocol};
use voice_agent_core::{LanguageModel, Router, RouterBuilder, SpeechToText, TextToSpeech};

use crate::asr::AsrClient;
use crate::llm_anthropic::AnthropicLlmClient;
use crate::llm_local::LocalLlmClient;
use crate::llm_openai::OpenAiLlmClient;
use crate::tts_cloud::CloudSaasTts;
use crate::tts_local::LocalNeuralTts;
use crate::tts_multilingual::MultilingualTts;
use crate::tts_openai::OpenAiTts;
use crate::tts_timed::TimedTts;

/// Builds the ASR router. Every `AsrBackendConfig` gets its own client, all
/// sharing the process-wide tuned `reqwest::Client`.
pub fn build_asr_router(
    client: &reqwest::Client,
    config: &BackendsConfig,
) -> Router<Arc<dyn SpeechToText>> {
    let mut builder = RouterBuilder::new();
    for (name, backend) in &config.asr {
        let asr: Arc<dyn SpeechToText> = Arc::new(AsrClient::new(client.clone(), backend.base_url.clone()));
        builder = builder.register(name.clone(), asr);
    }
    if let Some(fallback) = &config.asr_fallback {
        builder = builder.fallback(fallback.clone());
    }
    builder.build()
}

pub fn build_llm_router(
    client: &reqwest::Client,
    config: &BackendsConfig,
) -> Router<Arc<dyn LanguageModel>> {
    let mut builder = RouterBuilder::new();
    for (name, backend) in &config.llm {
        let llm: Arc<dyn LanguageModel> = match backend.protocol {
            LlmProtocol::Local => Arc::new(LocalLlmClient::new(
                client.clone(),
                backend.base_url.clone(),
                backend.max_tokens,
            )),
            LlmProtocol::OpenAiCompatible => Arc::new(OpenAiLlmClient::new(
                client.clone(),
                backend.base_url.clone(),
                backend.api_key.clone(),
                backend.max_tokens,
            )),
            LlmProtocol::Anthropic => Arc::new(AnthropicLlmClient::new(
                client.clone(),
                backend.base_url.clone(),
                backend.api_key.clone(),
                backend.max_tokens,
            )),
        };
        builder = builder.register(name.clone(), llm);
    }
    if let Some(fallback) = &config.llm_fallback {
        builder = builder.fallback(fallback.clone());
    }
    builder.build()
}

pub fn build_tts_router(
    client: &reqwest::Client,
    config: &BackendsConfig,
) -> Router<Arc<dyn TextToSpeech>> {
    let mut builder = RouterBuilder::new();
    for (name, backend) in &config.tts {
        let tts: Arc<dyn TextToSpeech> = match backend.protocol {
            TtsProtocol::LocalNeural => Arc::new(TimedTts::new(LocalNeuralTts::new(
                client.clone(),
                backend.base_url.clone(),
                backend.voice.clone(),
            ))),
            TtsProtocol::OpenAiCompatible => Arc::new(TimedTts::new(OpenAiTts::new(
                client.clone(),
                backend.base_url.clone(),
                backend.api_key.clone(),
                backend.voice.clone(),
            ))),
            TtsProtocol::CloudSaas => Arc::new(TimedTts::new(CloudSaasTts::new(
                client.clone(),
                backend.base_url.clone(),
                backend.api_key.clone(),
                backend.voice.clone(),
            ))),
            TtsProtocol::MultilingualSelfHost => Arc::new(TimedTts::new(MultilingualTts::new(
                client.clone(),
                backend.base_url.clone(),
                backend.voice.clone(),
            ))),
        };
        builder = builder.register(name.clone(), tts);
    }
    if let Some(fallback) = &config.tts_fallback {
        builder = builder.fallback(fallback.clone());
    }
    builder.build()
}
