//! Audio frame and codec data model (§3, §4.1).

use serde::{Deserialize, Serialize};

/// A codec a caller may declare in the session metadata frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    /// 16-bit little-endian linear PCM at a caller-supplied rate.
    Pcm,
    /// G.711 µ-law, fixed 8 kHz.
    Mulaw,
    /// G.711 A-law, fixed 8 kHz.
    Alaw,
}

impl Default for AudioCodec {
    fn default() -> Self {
        AudioCodec::Pcm
    }
}

impl AudioCodec {
    /// The sample rate mandated by the codec itself, if any. `Pcm` has none —
    /// the caller must supply one.
    pub fn fixed_rate_hz(&self) -> Option<u32> {
        match self {
            AudioCodec::Pcm => None,
            AudioCodec::Mulaw | AudioCodec::Alaw => Some(8_000),
        }
    }
}

/// Opaque bytes plus the codec/rate the caller declared for them. Transient —
/// owned by the decoder for the duration of one `decode` call.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub bytes: Vec<u8>,
    pub codec: AudioCodec,
    pub sample_rate_hz: u32,
}

/// An ordered sequence of normalized float samples in `[-1, 1]` at a known
/// rate. Invariant: contiguous time, no gaps — segments are only ever
/// produced by concatenating adjacent chunks, never by splicing.
#[derive(Debug, Clone, Default)]
pub struct PcmSegment {
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
}

impl PcmSegment {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate_hz,
        }
    }

    pub fn with_samples(samples: Vec<f32>, sample_rate_hz: u32) -> Self {
        Self {
            samples,
            sample_rate_hz,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate_hz as f32
    }

    pub fn extend(&mut self, other: &PcmSegment) {
        debug_assert_eq!(self.sample_rate_hz, other.sample_rate_hz);
        self.samples.extend_from_slice(&other.samples);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
