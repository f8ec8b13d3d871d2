//! Local (Ollama-style) streaming chat client (§4.5).
//!
//! `POST {base_url}/api/chat` with `stream: true`; the body is
//! newline-delimited JSON chunks, terminated by a chunk with `done: true`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

use voice_agent_core::{ChatMessage, Delta, Error, LanguageModel, LlmResult, Result, Role};

use crate::streaming::LineReader;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct LocalLlmClient {
    client: Client,
    base_url: String,
    max_tokens: u32,
}

impl LocalLlmClient {
    pub fn new(client: Client, base_url: impl Into<String>, max_tokens: u32) -> Self {
        Self { client, base_url: base_url.into(), max_tokens }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
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
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct OllamaChunkMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
}

#[async_trait]
impl LanguageModel for LocalLlmClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        tx: mpsc::Sender<Delta>,
    ) -> Result<LlmResult> {
        let body = json!({
            "model": model,
            "stream": true,
            "options": { "num_predict": self.max_tokens },
            "messages": messages
                .iter()
                .map(|m| OllamaMessage { role: role_str(m.role), content: &m.content })
                .collect::<Vec<_>>(),
        });

        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint())
            .timeout(DEFAULT_TIMEOUT)
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

        let mut reader = LineReader::new(response);
        let mut text = String::new();
        let mut thinking = String::new();
        let mut ttft_ms = 0u64;
        let mut first_content = true;

        while let Some(line) = reader.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let chunk: OllamaChunk = match serde_json::from_str(&line) {
                Ok(c) => c,
                Err(_) => continue,
            };
            if let Some(message) = chunk.message {
                if !message.content.is_empty() {
                    if first_content {
                        ttft_ms = start.elapsed().as_millis() as u64;
                        first_content = false;
                    }
                    text.push_str(&message.content);
                    let _ = tx.send(Delta::Content(message.content)).await;
                }
                if let Some(think) = message.thinking {
                    if !think.is_empty() {
                        thinking.push_str(&think);
                        let _ = tx.send(Delta::Thinking(think)).await;
                    }
                }
            }
            if chunk.done {
                break;
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
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn streams_ndjson_chunks_until_done() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"lo\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"\"},\"done\":true}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let client = LocalLlmClient::new(Client::new(), server.uri(), 256);
        let (tx, mut rx) = mpsc::channel(8);
        let messages = vec![ChatMessage { role: Role::User, content: "hi".into() }];

        let result = client.chat(&messages, "llama3", tx).await.unwrap();
        assert_eq!(result.text, "Hello");
        assert!(result.thinking.is_none());

        let mut received = Vec::new();
        while let Ok(delta) = rx.try_recv() {
            received.push(delta);
        }
        assert_eq!(received.len(), 2);
    }

    #[tokio::test]
    async fn forwards_thinking_deltas_separately_from_content() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"message\":{\"content\":\"\",\"thinking\":\"pondering\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"answer\"},\"done\":true}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let client = LocalLlmClient::new(Client::new(), server.uri(), 256);
        let (tx, mut rx) = mpsc::channel(8);
        let messages = vec![ChatMessage { role: Role::User, content: "hi".into() }];

        let result = client.chat(&messages, "llama3", tx).await.unwrap();
        assert_eq!(result.text, "answer");
        assert_eq!(result.thinking.as_deref(), Some("pondering"));

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, Delta::Thinking(t) if t == "pondering"));
    }
}
