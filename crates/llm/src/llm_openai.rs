//! OpenAI-compatible streaming chat client (§4.5).
//!
//! `POST {base_url}/v1/chat/completions` with `stream: true`; SSE lines
//! `data: <json>`, terminated by the sentinel line `data: [DONE]`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

use voice_agent_core::{ChatMessage, Delta, Error, LanguageModel, LlmResult, Result, Role};

use crate::streaming::LineReader;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiLlmClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_tokens: u32,
}

impl OpenAiLlmClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        max_tokens: u32,
    ) -> Self {
        Self { client, base_url: base_url.into(), api_key, max_tokens }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    delta: OpenAiDelta,
}

#[derive(Deserialize, Default)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiLlmClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        tx: mpsc::Sender<Delta>,
    ) -> Result<LlmResult> {
        let body = json!({
            "model": model,
            "stream": true,
            "max_tokens": self.max_tokens,
            "messages": messages
                .iter()
                .map(|m| OpenAiMessage { role: role_str(m.role), content: &m.content })
                .collect::<Vec<_>>(),
        });

        let start = Instant::now();
        let mut request = self.client.post(self.endpoint()).timeout(DEFAULT_TIMEOUT).json(&body);
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

        let mut reader = LineReader::new(response);
        let mut text = String::new();
        let mut ttft_ms = 0u64;
        let mut first_content = true;

        while let Some(line) = reader.next_line().await? {
            let line = line.trim();
            let Some(payload) = line.strip_prefix("data:") else { continue };
            let payload = payload.trim();
            if payload.is_empty() {
                continue;
            }
            if payload == "[DONE]" {
                break;
            }
            let chunk: OpenAiChunk = match serde_json::from_str(payload) {
                Ok(c) => c,
                Err(_) => continue,
            };
            for choice in chunk.choices {
                if let Some(content) = choice.delta.content {
                    if content.is_empty() {
                        continue;
                    }
                    if first_content {
                        ttft_ms = start.elapsed().as_millis() as u64;
                        first_content = false;
                    }
                    text.push_str(&content);
                    let _ = tx.send(Delta::Content(content)).await;
                }
            }
        }

        Ok(LlmResult {
            text,
            thinking: None,
            latency_ms: start.elapsed().as_millis() as u64,
            time_to_first_token_ms: ttft_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn streams_sse_chunks_until_done_sentinel() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = OpenAiLlmClient::new(Client::new(), server.uri(), Some("sk-test".into()), 256);
        let (tx, mut rx) = mpsc::channel(8);
        let messages = vec![ChatMessage { role: Role::User, content: "hi".into() }];

        let result = client.chat(&messages, "gpt-4o", tx).await.unwrap();
        assert_eq!(result.text, "Hi there");

        let mut received = Vec::new();
        while let Ok(delta) = rx.try_recv() {
            received.push(delta);
        }
        assert_eq!(received.len(), 2);
    }

    #[tokio::test]
    async fn non_success_status_truncates_body_to_512_chars() {
        let server = MockServer::start().await;
        let long_body = "e".repeat(1000);
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string(long_body))
            .mount(&server)
            .await;

        let client = OpenAiLlmClient::new(Client::new(), server.uri(), None, 256);
        let (tx, _rx) = mpsc::channel(8);
        let messages = vec![ChatMessage { role: Role::User, content: "hi".into() }];

        let err = client.chat(&messages, "gpt-4o", tx).await.unwrap_err();
        match err {
            Error::RemoteStatus { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body.len(), 512);
            }
            other => panic!("expected RemoteStatus, got {other:?}"),
        }
    }
}
