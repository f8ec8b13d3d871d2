//! Anthropic-style streaming chat client (§4.5).
//!
//! `POST {base_url}/v1/messages` with `stream: true`; SSE `event:`/`data:`
//! pairs, where `content_block_delta` events carry either a `text_delta` or
//! a `thinking_delta`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

use voice_agent_core::{ChatMessage, Delta, Error, LanguageModel, LlmResult, Result, Role};

use crate::streaming::LineReader;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicLlmClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_tokens: u32,
}

impl AnthropicLlmClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        max_tokens: u32,
    ) -> Self {
        Self { client, base_url: base_url.into(), api_key, max_tokens }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

fn role_str(role: Role) -> &'static str {
    match role {
        // Anthropic has no "system" message role; system content is lifted
        // into the top-level `system` field by the caller below.
        Role::System => "user",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum AnthropicEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: AnthropicDelta },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum AnthropicDelta {
    #[serde(rename = "text_delta")]
    Text { text: String },
    #[serde(rename = "thinking_delta")]
    Thinking { thinking: String },
    #[serde(other)]
    Other,
}

#[async_trait]
impl LanguageModel for AnthropicLlmClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        tx: mpsc::Sender<Delta>,
    ) -> Result<LlmResult> {
        let system: String = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let turns: Vec<AnthropicMessage> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| AnthropicMessage { role: role_str(m.role), content: &m.content })
            .collect();

        let mut body = json!({
            "model": model,
            "stream": true,
            "max_tokens": self.max_tokens,
            "messages": turns,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }

        let start = Instant::now();
        let mut request = self
            .client
            .post(self.endpoint())
            .timeout(DEFAULT_TIMEOUT)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
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
        let mut thinking = String::new();
        let mut ttft_ms = 0u64;
        let mut first_content = true;

        while let Some(line) = reader.next_line().await? {
            let line = line.trim();
            let Some(payload) = line.strip_prefix("data:") else { continue };
            let payload = payload.trim();
            if payload.is_empty() {
                continue;
            }
            let event: AnthropicEvent = match serde_json::from_str(payload) {
                Ok(e) => e,
                Err(_) => continue,
            };
            if let AnthropicEvent::ContentBlockDelta { delta } = event {
                match delta {
                    AnthropicDelta::Text { text: content } => {
                        if !content.is_empty() {
                            if first_content {
                                ttft_ms = start.elapsed().as_millis() as u64;
                                first_content = false;
                            }
                            text.push_str(&content);
                            let _ = tx.send(Delta::Content(content)).await;
                        }
                    }
                    AnthropicDelta::Thinking { thinking: think } => {
                        if !think.is_empty() {
                            thinking.push_str(&think);
                            let _ = tx.send(Delta::Thinking(think)).await;
                        }
                    }
                    AnthropicDelta::Other => {}
                }
            }
        }

        Ok(LlmResult {
            text,
            thinking: if thinking.is_empty() { None } else { Some(thinking) },
            latency_ms: start.elapsed().as_millis() as u64,
            time_to_first_token_ms: ttft_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn streams_text_and_thinking_deltas_from_content_block_events() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"hmm\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"answer\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = AnthropicLlmClient::new(Client::new(), server.uri(), Some("sk-ant-test".into()), 256);
        let (tx, mut rx) = mpsc::channel(8);
        let messages = vec![
            ChatMessage { role: Role::System, content: "be terse".into() },
            ChatMessage { role: Role::User, content: "hi".into() },
        ];

        let result = client.chat(&messages, "claude-3-5-sonnet", tx).await.unwrap();
        assert_eq!(result.text, "answer");
        assert_eq!(result.thinking.as_deref(), Some("hmm"));

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, Delta::Thinking(t) if t == "hmm"));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, Delta::Content(t) if t == "answer"));
    }

    #[tokio::test]
    async fn system_messages_are_lifted_out_of_the_turn_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let client = AnthropicLlmClient::new(Client::new(), server.uri(), None, 256);
        let (tx, _rx) = mpsc::channel(8);
        let messages = vec![
            ChatMessage { role: Role::System, content: "be terse".into() },
            ChatMessage { role: Role::User, content: "hi".into() },
        ];

        let result = client.chat(&messages, "claude-3-5-sonnet", tx).await.unwrap();
        assert_eq!(result.text, "");
    }
}
