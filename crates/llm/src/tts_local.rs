//! Local neural TTS backend (§4.6): `POST {base_url}/synthesize`,
//! `{text, voice}` in, raw WAV bytes out. No SSML support.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use voice_agent_core::{Error, Result, SynthesizeOpts};

use crate::tts_timed::RawTts;

const TTS_TIMEOUT: Duration = Duration::from_secs(30);

pub struct LocalNeuralTts {
    client: Client,
    base_url: String,
    voice: String,
}

impl LocalNeuralTts {
    pub fn new(client: Client, base_url: impl Into<String>, voice: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into(), voice: voice.into() }
    }

    fn endpoint(&self) -> String {
        format!("{}/synthesize", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct LocalTtsRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

#[async_trait]
impl RawTts for LocalNeuralTts {
    async fn raw_synthesize(&self, text: &str, _opts: SynthesizeOpts) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(self.endpoint())
            .timeout(TTS_TIMEOUT)
            .json(&LocalTtsRequest { text, voice: &self.voice })
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

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
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_text_and_voice_returns_wav_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/synthesize"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3, 4]))
            .mount(&server)
            .await;

        let tts = LocalNeuralTts::new(Client::new(), server.uri(), "default");
        let audio = tts
            .raw_synthesize("hello", SynthesizeOpts { speed: 1.0, pitch: 1.0 })
            .await
            .unwrap();
        assert_eq!(audio, vec![1, 2, 3, 4]);
        assert!(!tts.supports_ssml());
    }

    #[tokio::test]
    async fn non_success_status_becomes_remote_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/synthesize"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model unloaded"))
            .mount(&server)
            .await;

        let tts = LocalNeuralTts::new(Client::new(), server.uri(), "default");
        let err = tts
            .raw_synthesize("hello", SynthesizeOpts { speed: 1.0, pitch: 1.0 })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteStatus { status: 503, .. }));
    }
}
