//! Shapes shared by the LLM and TTS client families (§3).

/// A message role in the chat-style request body every LLM provider expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in the prompt sent to the LLM. The RAG context, when present,
/// is injected as a second system message literally prefixed
/// `"Relevant context from knowledge base:\n"` (§4.5).
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// One streamed content delta from an LLM, or its thinking-channel sibling.
#[derive(Debug, Clone)]
pub enum Delta {
    Content(String),
    Thinking(String),
}

/// Final result of one `Chat` call (§3).
#[derive(Debug, Clone, Default)]
pub struct LlmResult {
    pub text: String,
    pub thinking: Option<String>,
    pub latency_ms: u64,
    pub time_to_first_token_ms: u64,
}

/// Final result of one `Synthesize` call (§3).
#[derive(Debug, Clone)]
pub struct TtsResult {
    pub audio: Vec<u8>,
    pub latency_ms: u64,
}

/// Voice/prosody knobs a TTS caller may request (§4.6).
#[derive(Debug, Clone, Copy)]
pub struct SynthesizeOpts {
    /// Relative speaking rate, 1.0 = normal.
    pub speed: f32,
    /// Relative pitch, 1.0 = normal; buckets at 0.9/1.1 into low/medium/high
    /// for SSML-capable backends.
    pub pitch: f32,
}

impl Default for SynthesizeOpts {
    fn default() -> Self {
        Self { speed: 1.0, pitch: 1.0 }
    }
}
