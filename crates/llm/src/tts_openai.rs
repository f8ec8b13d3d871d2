//! OpenAI-compatible TTS backend (§4.6): `POST {base_url}/v1/audio/speech`,
//! `{input, model, voice, speed, response_format:"wav"}` in, WAV bytes out.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use voice_agent_core::{Error, Result, SynthesizeOpts};

use crate::tts_timed::RawTts;

const TTS_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MODEL: &str = "tts-1";

pub struct OpenAiTts {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    voice: String,
}

impl OpenAiTts {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self { client, base_url: base_url.into(), api_key, voice: voice.into() }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/audio/speech", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct OpenAiTtsRequest<'a> {
    input: &'a str,
    model: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'a str,
}

#[async_trait]
impl RawTts for OpenAiTts {
    async fn raw_synthesize(&self, text: &str, opts: SynthesizeOpts) -> Result<Vec<u8>> {
        let body = OpenAiTtsRequest {
            input: text,
            model: DEFAULT_MODEL,
            voice: &self.voice,
            speed: opts.speed,
            response_format: "wav",
        };

        let mut request = self.client.post(self.endpoint()).timeout(TTS_TIMEOUT).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(512).collect();
            return Err(Error::RemoteStatus { status: status.as_u16(), body: truncated });
        }

        response.bytes().await.map(|b| b.to_vec()).map_err(|e| Error::Decode(e.to_string()))
    }

    fn supports_ssml(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_core::SynthesizeOpts;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_bearer_auth_and_returns_audio_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9, 9, 9]))
            .mount(&server)
            .await;

        let tts = OpenAiTts::new(Client::new(), server.uri(), Some("sk-test".into()), "alloy");
        let audio = tts
            .raw_synthesize("hello", SynthesizeOpts { speed: 1.1, pitch: 1.0 })
            .await
            .unwrap();
        assert_eq!(audio, vec![9, 9, 9]);
        assert!(!tts.supports_ssml());
    }
}
