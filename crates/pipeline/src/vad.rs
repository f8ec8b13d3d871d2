//! Energy-based voice activity detector (§4.2).
//!
//! Timing (`speech_duration`, `silence_duration`) is tracked from the
//! number of samples processed rather than wall-clock time, since chunks
//! are assumed to represent contiguous audio at the declared sample rate —
//! this keeps the detector deterministic and trivially testable without a
//! clock.

use std::collections::VecDeque;

use voice_agent_config::VadConfig;
use voice_agent_core::PcmSegment;

/// Silence floor applied when a chunk is empty or has negligible energy
/// (§4.2 step 1).
const SILENCE_FLOOR_DB: f32 = -100.0;

fn rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return SILENCE_FLOOR_DB;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum_sq / samples.len() as f32).sqrt();
    if rms < 1e-10 {
        return SILENCE_FLOOR_DB;
    }
    20.0 * rms.log10()
}

pub struct EnergyVad {
    config: VadConfig,
    in_speech: bool,
    speech_duration_ms: f64,
    silence_duration_ms: f64,
    active_buffer: PcmSegment,
    pre_roll: VecDeque<f32>,
    pre_roll_capacity: usize,
}

impl EnergyVad {
    pub fn new(config: VadConfig) -> Self {
        let pre_roll_capacity =
            ((config.pre_speech_buffer_ms as f64 / 1000.0) * config.sample_rate_hz as f64) as usize;
        let sample_rate_hz = config.sample_rate_hz;
        Self {
            config,
            in_speech: false,
            speech_duration_ms: 0.0,
            silence_duration_ms: 0.0,
            active_buffer: PcmSegment::new(sample_rate_hz),
            pre_roll: VecDeque::with_capacity(pre_roll_capacity),
            pre_roll_capacity,
        }
    }

    fn chunk_duration_ms(&self, len: usize) -> f64 {
        (len as f64 / self.config.sample_rate_hz as f64) * 1000.0
    }

    fn push_pre_roll(&mut self, chunk: &[f32]) {
        for &sample in chunk {
            if self.pre_roll.len() >= self.pre_roll_capacity {
                self.pre_roll.pop_front();
            }
            self.pre_roll.push_back(sample);
        }
    }

    fn reset(&mut self) {
        self.in_speech = false;
        self.speech_duration_ms = 0.0;
        self.silence_duration_ms = 0.0;
        self.active_buffer = PcmSegment::new(self.config.sample_rate_hz);
    }

    /// Processes one chunk, returning a completed speech segment when
    /// silence following speech exceeds `SilenceTimeout` and the speech
    /// itself met `MinSpeechDuration` (§4.2).
    pub fn process_chunk(&mut self, chunk: &[f32]) -> Option<PcmSegment> {
        let energy_db = rms_db(chunk);
        let duration_ms = self.chunk_duration_ms(chunk.len());

        if energy_db >= self.config.speech_threshold_db {
            if !self.in_speech {
                self.in_speech = true;
                self.speech_duration_ms = 0.0;
                let pre_roll: Vec<f32> = self.pre_roll.drain(..).collect();
                self.active_buffer = PcmSegment::with_samples(pre_roll, self.config.sample_rate_hz);
            }
            self.active_buffer
                .samples
                .extend_from_slice(chunk);
            self.speech_duration_ms += duration_ms;
            self.silence_duration_ms = 0.0;
            return None;
        }

        self.push_pre_roll(chunk);

        if !self.in_speech {
            return None;
        }

        self.active_buffer.samples.extend_from_slice(chunk);
        self.silence_duration_ms += duration_ms;

        if self.silence_duration_ms < self.config.silence_timeout_ms as f64 {
            return None;
        }

        let emit = self.speech_duration_ms >= self.config.min_speech_duration_ms as f64;
        let segment = std::mem::replace(
            &mut self.active_buffer,
            PcmSegment::new(self.config.sample_rate_hz),
        );
        self.reset();

        if emit {
            Some(segment)
        } else {
            None
        }
    }

    /// Returns any buffered-but-not-yet-emitted speech and resets state
    /// (§4.2 Flush), used on connection close.
    pub fn flush(&mut self) -> Option<PcmSegment> {
        if !self.in_speech || self.active_buffer.is_empty() {
            self.reset();
            return None;
        }
        let segment = std::mem::replace(
            &mut self.active_buffer,
            PcmSegment::new(self.config.sample_rate_hz),
        );
        self.reset();
        Some(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (i as f32 * 0.3).sin())
            .collect()
    }

    fn silence(len: usize) -> Vec<f32> {
        vec![0.0; len]
    }

    fn test_config() -> VadConfig {
        VadConfig {
            speech_threshold_db: -40.0,
            silence_timeout_ms: 200,
            min_speech_duration_ms: 100,
            pre_speech_buffer_ms: 100,
            sample_rate_hz: 1000,
        }
    }

    #[test]
    fn empty_chunk_is_treated_as_silence() {
        assert_eq!(rms_db(&[]), SILENCE_FLOOR_DB);
    }

    #[test]
    fn emits_segment_after_sufficient_speech_then_silence() {
        let mut vad = EnergyVad::new(test_config());
        assert!(vad.process_chunk(&tone(200, 0.5)).is_none());
        assert!(vad.process_chunk(&silence(100)).is_none());
        let segment = vad.process_chunk(&silence(150)).unwrap();
        assert!(segment.samples.len() >= 200);
    }

    #[test]
    fn discards_speech_shorter_than_min_duration() {
        let mut vad = EnergyVad::new(test_config());
        assert!(vad.process_chunk(&tone(20, 0.5)).is_none());
        assert!(vad.process_chunk(&silence(100)).is_none());
        assert!(vad.process_chunk(&silence(150)).is_none());
    }

    #[test]
    fn flush_returns_buffered_speech_without_duration_check() {
        let mut vad = EnergyVad::new(test_config());
        assert!(vad.process_chunk(&tone(20, 0.5)).is_none());
        let segment = vad.flush().unwrap();
        assert!(!segment.is_empty());
    }

    #[test]
    fn pre_roll_capacity_is_bounded() {
        let mut vad = EnergyVad::new(test_config());
        vad.process_chunk(&silence(500));
        assert!(vad.pre_roll.len() <= vad.pre_roll_capacity);
    }
}
