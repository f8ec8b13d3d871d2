//! ASR, streaming LLM and TTS backend clients (C4-C6, §4.4-§4.6).
//!
//! Each family has one client per wire protocol; `factory` assembles the
//! `Router<T>` registries the server wires into `AppState` at startup.

pub mod asr;
pub mod factory;
pub mod http;
pub mod llm_anthropic;
pub mod llm_local;
pub mod llm_openai;
mod streaming;
pub mod tts_cloud;
pub mod tts_local;
pub mod tts_multilingual;
pub mod tts_openai;
pub mod tts_timed;

pub use asr::AsrClient;
pub use factory::{build_asr_router, build_llm_router, build_tts_router};
pub use http::build_http_client;
pub use llm_anthropic::AnthropicLlmClient;
pub use llm_local::LocalLlmClient;
pub use llm_openai::OpenAiLlmClient;
pub use tts_cloud::CloudSaasTts;
pub use tts_local::LocalNeuralTts;
pub use tts_multilingual::MultilingualTts;
pub use tts_openai::OpenAiTts;
pub use tts_timed::{RawTts, TimedTts};
