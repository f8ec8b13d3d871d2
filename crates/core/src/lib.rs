//! Core data model, traits and error types for the voice agent gateway.
//!
//! Every other crate in the workspace depends on this one and only this
//! one: audio/transcript/event shapes, the crate-wide `Error`, the
//! `Router<T>` used by the ASR/LLM/TTS backend families, and the small
//! capability traits (`SpeechToText`, `LanguageModel`, `TextToSpeech`,
//! `Retriever`) those families implement.

pub mod audio;
pub mod conversation;
pub mod error;
pub mod event;
pub mod gpu;
pub mod llm_types;
pub mod router;
pub mod trace;
pub mod traits;
pub mod transcript;

pub use audio::{AudioCodec, AudioFrame, PcmSegment};
pub use conversation::{render_history, ConversationTurn};
pub use error::{Error, Result};
pub use event::{Event, PipelineEvent};
pub use gpu::{canonicalize as canonicalize_gpu_snapshot, GpuProcess, GpuSnapshot};
pub use llm_types::{ChatMessage, Delta, LlmResult, Role, SynthesizeOpts, TtsResult};
pub use router::{Router, RouterBuilder};
pub use trace::{truncate_field, NoopTracer, RunStatus, TraceRun, TraceSpan, Tracer, MAX_FIELD_BYTES};
pub use traits::{LanguageModel, Retriever, SpeechToText, TextToSpeech};
pub use transcript::{filter_reason, Transcript};
