//! Capability traits implemented by the ASR, LLM and TTS backend families
//! (§4.4–§4.6, §9 "polymorphism" design note).
//!
//! Backends are modeled as a small capability set rather than a deep
//! inheritance hierarchy: `SpeechToText::transcribe`,
//! `LanguageModel::chat`, `TextToSpeech::{synthesize, supports_ssml}`. A
//! single generic `Router<T>` (see `router.rs`) covers all three.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::PcmSegment;
use crate::error::Result;
use crate::llm_types::{ChatMessage, Delta, LlmResult, SynthesizeOpts, TtsResult};
use crate::transcript::Transcript;

/// Transcribes one already-segmented speech buffer (§4.4). The gateway never
/// streams partial transcripts — VAD has already decided the segment is
/// complete by the time this is called.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, segment: &PcmSegment, initial_prompt: Option<&str>) -> Result<Transcript>;
}

/// Streaming chat completion against one provider protocol (§4.5). Each
/// content delta is pushed onto `tx` as it arrives; the call resolves once
/// the provider's stream ends (EOF or its own sentinel).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        tx: mpsc::Sender<Delta>,
    ) -> Result<LlmResult>;
}

/// Text-to-speech synthesis against one synthesizer protocol (§4.6).
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str, opts: SynthesizeOpts) -> Result<TtsResult>;

    /// Whether this backend accepts SSML-wrapped input. The router wraps
    /// `text` in `<speak><prosody .../></speak>` when true.
    fn supports_ssml(&self) -> bool;
}

/// Query-time context retrieval for RAG (§4.8). Implementations must be
/// non-fatal: any internal failure is logged and surfaced as an empty
/// string, never propagated as an error.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve_context(&self, query: &str) -> String;
}
