//! Shared SSML-wrapping and latency-timing decorator for the TTS backend
//! family (§4.6): "Router wraps every backend call with latency timing. If
//! `SupportsSSML()`, text is wrapped...".

use std::time::Instant;

use async_trait::async_trait;

use voice_agent_core::{Result, SynthesizeOpts, TextToSpeech, TtsResult};

/// What an individual TTS backend actually knows how to do: turn text (and
/// possibly SSML-wrapped text) into audio bytes. Timing and SSML wrapping
/// are handled once, here, rather than duplicated in every backend.
#[async_trait]
pub trait RawTts: Send + Sync {
    async fn raw_synthesize(&self, text: &str, opts: SynthesizeOpts) -> Result<Vec<u8>>;
    fn supports_ssml(&self) -> bool;
}

pub struct TimedTts<B> {
    inner: B,
}

impl<B> TimedTts<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

fn pitch_bucket(pitch: f32) -> &'static str {
    if pitch <= 0.9 {
        "low"
    } else if pitch >= 1.1 {
        "high"
    } else {
        "medium"
    }
}

fn wrap_ssml(text: &str, opts: SynthesizeOpts) -> String {
    let rate = (opts.speed * 100.0).round() as i32;
    format!(
        "<speak><prosody rate=\"{rate}%\" pitch=\"{pitch}\">{text}</prosody></speak>",
        rate = rate,
        pitch = pitch_bucket(opts.pitch),
        text = text,
    )
}

#[async_trait]
impl<B: RawTts> TextToSpeech for TimedTts<B> {
    async fn synthesize(&self, text: &str, opts: SynthesizeOpts) -> Result<TtsResult> {
        let payload = if self.inner.supports_ssml() {
            wrap_ssml(text, opts)
        } else {
            text.to_string()
        };

        let start = Instant::now();
        let audio = self.inner.raw_synthesize(&payload, opts).await?;
        Ok(TtsResult { audio, latency_ms: start.elapsed().as_millis() as u64 })
    }

    fn supports_ssml(&self) -> bool {
        self.inner.supports_ssml()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_buckets_at_0_9_and_1_1() {
        assert_eq!(pitch_bucket(0.8), "low");
        assert_eq!(pitch_bucket(1.0), "medium");
        assert_eq!(pitch_bucket(1.2), "high");
    }

    #[test]
    fn ssml_wraps_rate_and_pitch() {
        let wrapped = wrap_ssml("hello", SynthesizeOpts { speed: 1.2, pitch: 1.2 });
        assert_eq!(wrapped, "<speak><prosody rate=\"120%\" pitch=\"high\">hello</prosody></speak>");
    }

    struct RecordingBackend {
        ssml: bool,
        seen: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl RawTts for RecordingBackend {
        async fn raw_synthesize(&self, text: &str, _opts: SynthesizeOpts) -> Result<Vec<u8>> {
            *self.seen.lock().unwrap() = Some(text.to_string());
            Ok(vec![42])
        }

        fn supports_ssml(&self) -> bool {
            self.ssml
        }
    }

    #[tokio::test]
    async fn wraps_ssml_only_when_backend_supports_it() {
        let backend = RecordingBackend { ssml: true, seen: std::sync::Mutex::new(None) };
        let timed = TimedTts::new(backend);
        let result = timed.synthesize("hello", SynthesizeOpts { speed: 1.0, pitch: 1.0 }).await.unwrap();
        assert_eq!(result.audio, vec![42]);
        assert!(timed.inner.seen.lock().unwrap().as_deref().unwrap().starts_with("<speak>"));
    }

    #[tokio::test]
    async fn passes_text_through_unwrapped_when_ssml_unsupported() {
        let backend = RecordingBackend { ssml: false, seen: std::sync::Mutex::new(None) };
        let timed = TimedTts::new(backend);
        timed.synthesize("hello", SynthesizeOpts { speed: 1.0, pitch: 1.0 }).await.unwrap();
        assert_eq!(timed.inner.seen.lock().unwrap().as_deref(), Some("hello"));
    }
}
