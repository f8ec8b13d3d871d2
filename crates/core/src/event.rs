//! Events emitted to the client over the session connection (§3, §4.10, §4.11).

use serde::{Deserialize, Serialize};

/// A tagged event. Each variant carries only the fields relevant to its tag;
/// `TtsReady` deliberately omits the audio bytes — those travel as a
/// separate binary frame written immediately before this JSON envelope
/// (§4.11 event serialization).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Transcript {
        text: String,
        latency_ms: u64,
    },
    LlmToken {
        text: String,
    },
    LlmDone {
        text: String,
        latency_ms: u64,
        time_to_first_token_ms: u64,
    },
    ThinkingDone {
        thinking: String,
    },
    TtsReady {
        latency_ms: u64,
    },
    Metrics {
        asr_ms: u64,
        llm_ms: u64,
        tts_ms: u64,
        total_ms: u64,
    },
    Error {
        message: String,
    },
    Classification {
        label: String,
        score: f32,
    },
}

/// What the pipeline engine actually hands back to the session handler: the
/// JSON event plus whatever raw audio bytes go with it (only `TtsReady`
/// carries audio). The handler is responsible for writing the binary frame
/// before the text frame.
#[derive(Debug, Clone)]
pub struct PipelineEvent {
    pub event: Event,
    pub audio: Option<Vec<u8>>,
}

impl PipelineEvent {
    pub fn new(event: Event) -> Self {
        Self { event, audio: None }
    }

    pub fn with_audio(event: Event, audio: Vec<u8>) -> Self {
        Self { event, audio: Some(audio) }
    }
}
