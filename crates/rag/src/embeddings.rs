//! Embedding client (§4.7): `POST {base_url}/api/embed`, `{model, input}` in,
//! the first row of an `embeddings: float[][]` array out.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use voice_agent_core::{Error, Result};

const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
}

impl EmbeddingClient {
    pub fn new(client: Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into(), model: model.into() }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(self.endpoint())
            .timeout(EMBED_TIMEOUT)
            .json(&EmbedRequest { model: &self.model, input: text })
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(512).collect();
            return Err(Error::RemoteStatus { status: status.as_u16(), body: truncated });
        }

        let parsed: EmbedResponse =
            response.json().await.map_err(|e| Error::Decode(e.to_string()))?;

        parsed
            .embeddings
            .into_iter()
            .next()
            .filter(|row| !row.is_empty())
            .ok_or_else(|| Error::Decode("empty embedding response".to_string()))
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_first_embedding_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[0.1, 0.2, 0.3]],
            })))
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(Client::new(), server.uri(), "nomic-embed-text");
        let embedding = client.embed("hello world").await.unwrap();
        assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn empty_embeddings_array_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [],
            })))
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(Client::new(), server.uri(), "nomic-embed-text");
        let err = client.embed("hello world").await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn empty_row_is_treated_as_no_embedding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[]],
            })))
            .mount(&server)
            .await;

        let client = EmbeddingClient::new(Client::new(), server.uri(), "nomic-embed-text");
        let err = client.embed("hello world").await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
