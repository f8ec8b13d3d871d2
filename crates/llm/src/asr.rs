//! ASR client (C4, §4.4): posts a speech segment as a multipart WAV to a
//! whisper-compatible endpoint and parses back a transcript.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use voice_agent_core::{Error, PcmSegment, Result, SpeechToText, Transcript};
use voice_agent_pipeline::audio::samples_to_wav;

const ASR_TIMEOUT: Duration = Duration::from_secs(30);
const ASR_TARGET_SAMPLE_RATE_HZ: u32 = 16_000;

#[derive(Debug, Deserialize)]
struct AsrResponse {
    text: String,
    #[serde(default)]
    no_speech_prob: f32,
}

/// Speaks the whisper-server-style contract: multipart `file` (mono 16 kHz
/// WAV) plus an optional `initial_prompt` text field, JSON
/// `{text, no_speech_prob}` back.
pub struct AsrClient {
    client: Client,
    base_url: String,
}

impl AsrClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }

    fn endpoint(&self) -> String {
        format!("{}/inference", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SpeechToText for AsrClient {
    async fn transcribe(&self, segment: &PcmSegment, initial_prompt: Option<&str>) -> Result<Transcript> {
        let resampled = voice_agent_pipeline::audio::resample(segment, ASR_TARGET_SAMPLE_RATE_HZ);
        let wav_bytes = samples_to_wav(&resampled)?;

        let start = Instant::now();
        let mut form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(wav_bytes).file_name("segment.wav"),
        );
        if let Some(prompt) = initial_prompt {
            form = form.text("initial_prompt", prompt.to_string());
        }

        let response = self
            .client
            .post(self.endpoint())
            .timeout(ASR_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(512).collect();
            return Err(Error::RemoteStatus { status: status.as_u16(), body: truncated });
        }

        let parsed: AsrResponse = response
            .json()
            .await
            .map_err(|e| Error::Decode(e.to_string()))?;

        Ok(Transcript {
            text: parsed.text,
            latency_ms: start.elapsed().as_millis() as u64,
            no_speech_prob: parsed.no_speech_prob,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_multipart_wav_and_parses_transcript() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inference"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "hello there",
                "no_speech_prob": 0.02,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AsrClient::new(Client::new(), server.uri());
        let segment = PcmSegment::with_samples(vec![0.0; 16_000], 16_000);

        let transcript = client.transcribe(&segment, None).await.unwrap();
        assert_eq!(transcript.text, "hello there");
        assert!((transcript.no_speech_prob - 0.02).abs() < 1e-6);
    }

    #[tokio::test]
    async fn non_success_status_becomes_remote_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inference"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
            .mount(&server)
            .await;

        let client = AsrClient::new(Client::new(), server.uri());
        let segment = PcmSegment::with_samples(vec![0.0; 1600], 16_000);

        let err = client.transcribe(&segment, None).await.unwrap_err();
        match err {
            Error::RemoteStatus { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "backend exploded");
            }
            other => panic!("expected RemoteStatus, got {other:?}"),
        }
    }
}
