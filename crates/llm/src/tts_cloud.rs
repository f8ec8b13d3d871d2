//! Cloud SaaS TTS backend (§4.6), ElevenLabs-shaped:
//! `POST {base_url}/v1/text-to-speech/{voiceId}`,
//! `{text, model_id, voice_settings{stability, similarity_boost}}` in, MP3
//! bytes out. `stability = clamp(1 - pitch * 0.5, 0.1, 0.9)`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use voice_agent_core::{Error, Result, SynthesizeOpts};

use crate::tts_timed::RawTts;

const TTS_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MODEL_ID: &str = "eleven_turbo_v2";
const SIMILARITY_BOOST: f32 = 0.75;

pub struct CloudSaasTts {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    voice_id: String,
}

impl CloudSaasTts {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        voice_id: impl Into<String>,
    ) -> Self {
        Self { client, base_url: base_url.into(), api_key, voice_id: voice_id.into() }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.base_url.trim_end_matches('/'),
            self.voice_id
        )
    }
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Serialize)]
struct CloudTtsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

fn stability_from_pitch(pitch: f32) -> f32 {
    (1.0 - pitch * 0.5).clamp(0.1, 0.9)
}

#[async_trait]
impl RawTts for CloudSaasTts {
    async fn raw_synthesize(&self, text: &str, opts: SynthesizeOpts) -> Result<Vec<u8>> {
        let body = CloudTtsRequest {
            text,
            model_id: DEFAULT_MODEL_ID,
            voice_settings: VoiceSettings {
                stability: stability_from_pitch(opts.pitch),
                similarity_boost: SIMILARITY_BOOST,
            },
        };

        let mut request = self.client.post(self.endpoint()).timeout(TTS_TIMEOUT).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("xi-api-key", key);
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

    #[test]
    fn stability_clamps_to_0_1_and_0_9() {
        assert_eq!(stability_from_pitch(3.0), 0.1);
        assert_eq!(stability_from_pitch(-3.0), 0.9);
        assert!((stability_from_pitch(1.0) - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn sends_voice_id_in_path_and_api_key_header() {
        use voice_agent_core::SynthesizeOpts;
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-123"))
            .and(header("xi-api-key", "key-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xFB]))
            .mount(&server)
            .await;

        let tts = CloudSaasTts::new(Client::new(), server.uri(), Some("key-abc".into()), "voice-123");
        let audio = tts
            .raw_synthesize("hello", SynthesizeOpts { speed: 1.0, pitch: 1.0 })
            .await
            .unwrap();
        assert_eq!(audio, vec![0xFF, 0xFB]);
    }
}
