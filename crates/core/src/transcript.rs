//! ASR transcript result and the noise/confidence filter (§3, §4.10 step 1).

use serde::{Deserialize, Serialize};

/// Result of one ASR call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub latency_ms: u64,
    /// Probability the segment contained no speech at all, in `[0, 1]`.
    pub no_speech_prob: f32,
}

/// Closed list of filler/noise words the ASR emits for non-speech audio.
/// Matched case-insensitively against the whole trimmed transcript.
const NOISE_WORDS: &[&str] = &[
    "you", "um", "uh", "hmm", "mhm", "huh", "cough", "coughing", "laughter",
    "laughing", "silence", "noise", "music", "applause", "sigh", "breathing",
];

/// True if `text` is bracketed, parenthesized, or asterisked the way
/// non-speech ASR annotations are (`[noise]`, `(inaudible)`, `*crunching*`).
fn is_annotation_wrapped(trimmed: &str) -> bool {
    if trimmed.len() < 2 {
        return false;
    }
    let first = trimmed.as_bytes()[0];
    let last = trimmed.as_bytes()[trimmed.len() - 1];
    matches!(
        (first, last),
        (b'[', b']') | (b'(', b')') | (b'*', b'*')
    )
}

/// True if `text` matches the closed list of filler words, ignoring case,
/// surrounding punctuation and whitespace.
fn is_noise_word(trimmed: &str) -> bool {
    let normalized = trimmed.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
    NOISE_WORDS.contains(&normalized.as_str())
}

/// Decides whether a transcript should be dropped before it ever reaches the
/// LLM. Returns `Some(reason)` if filtered, `None` if the transcript should
/// proceed through the pipeline.
pub fn filter_reason(transcript: &Transcript, no_speech_threshold: f32) -> Option<&'static str> {
    let trimmed = transcript.text.trim();
    if trimmed.is_empty() {
        return Some("empty");
    }
    if transcript.no_speech_prob > no_speech_threshold {
        return Some("no_speech_confidence");
    }
    if is_annotation_wrapped(trimmed) {
        return Some("annotation");
    }
    if is_noise_word(trimmed) {
        return Some("noise_word");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(text: &str, no_speech_prob: f32) -> Transcript {
        Transcript {
            text: text.to_string(),
            latency_ms: 10,
            no_speech_prob,
        }
    }

    #[test]
    fn empty_is_filtered() {
        assert_eq!(filter_reason(&t("   ", 0.0), 0.6), Some("empty"));
    }

    #[test]
    fn bracketed_annotation_is_filtered() {
        assert_eq!(filter_reason(&t("[noise]", 0.0), 0.6), Some("annotation"));
        assert_eq!(filter_reason(&t("(inaudible)", 0.0), 0.6), Some("annotation"));
        assert_eq!(filter_reason(&t("*crunching*", 0.0), 0.6), Some("annotation"));
    }

    #[test]
    fn filler_words_are_filtered() {
        assert_eq!(filter_reason(&t("um", 0.0), 0.6), Some("noise_word"));
        assert_eq!(filter_reason(&t("Uh.", 0.0), 0.6), Some("noise_word"));
    }

    #[test]
    fn low_confidence_is_filtered() {
        assert_eq!(
            filter_reason(&t("hello there", 0.8), 0.6),
            Some("no_speech_confidence")
        );
    }

    #[test]
    fn real_speech_passes() {
        assert_eq!(filter_reason(&t("hello, how are you today", 0.1), 0.6), None);
    }
}
