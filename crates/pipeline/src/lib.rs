//! Audio codec/resampler, energy VAD and the sentence-pipelined concurrency
//! core (§4.1, §4.2, §4.10).

pub mod audio;
pub mod engine;
pub mod vad;

pub use audio::{decode, resample, samples_to_wav};
pub use engine::PipelineEngine;
pub use vad::EnergyVad;
