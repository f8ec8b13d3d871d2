//! Multilingual self-host TTS backend (§4.6): `POST {base_url}/convert/tts`,
//! `{text, speed, language, speaker_id}` in, WAV bytes out. Supports SSML.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use voice_agent_core::{Error, Result, SynthesizeOpts};

use crate::tts_timed::RawTts;

const TTS_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LANGUAGE: &str = "en";

pub struct MultilingualTts {
    client: Client,
    base_url: String,
    speaker_id: String,
}

impl MultilingualTts {
    pub fn new(client: Client, base_url: impl Into<String>, speaker_id: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into(), speaker_id: speaker_id.into() }
    }

    fn endpoint(&self) -> String {
        format!("{}/convert/tts", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct MultilingualTtsRequest<'a> {
    text: &'a str,
    speed: f32,
    language: &'a str,
    speaker_id: &'a str,
}

#[async_trait]
impl RawTts for MultilingualTts {
    async fn raw_synthesize(&self, text: &str, opts: SynthesizeOpts) -> Result<Vec<u8>> {
        let body = MultilingualTtsRequest {
            text,
            speed: opts.speed,
            language: DEFAULT_LANGUAGE,
            speaker_id: &self.speaker_id,
        };

        let response = self
            .client
            .post(self.endpoint())
            .timeout(TTS_TIMEOUT)
            .json(&body)
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
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_core::SynthesizeOpts;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_speaker_and_language_and_returns_wav_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/convert/tts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![5, 6, 7]))
            .mount(&server)
            .await;

        let tts = MultilingualTts::new(Client::new(), server.uri(), "speaker-1");
        let audio = tts
            .raw_synthesize("<speak>hello</speak>", SynthesizeOpts { speed: 1.0, pitch: 1.0 })
            .await
            .unwrap();
        assert_eq!(audio, vec![5, 6, 7]);
        assert!(tts.supports_ssml());
    }
}
