//! Query-time RAG context retrieval (§4.8): embed the query, search the
//! configured collection, join the hits' `text` payload field. Never fails
//! the calling request — any internal error is logged and surfaced as an
//! empty string.

use std::sync::Arc;

use async_trait::async_trait;

use voice_agent_core::Retriever;

use crate::embeddings::EmbeddingClient;
use crate::vector_store::VectorStore;

pub struct RagRetriever {
    store: Arc<VectorStore>,
    embedder: Arc<EmbeddingClient>,
    collection: String,
    top_k: u64,
    score_threshold: f32,
}

impl RagRetriever {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<EmbeddingClient>,
        collection: impl Into<String>,
        top_k: u64,
        score_threshold: f32,
    ) -> Self {
        Self { store, embedder, collection: collection.into(), top_k, score_threshold }
    }
}

#[async_trait]
impl Retriever for RagRetriever {
    async fn retrieve_context(&self, query: &str) -> String {
        let embedding = match self.embedder.embed(query).await {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(error = %err, "rag: embedding query failed, returning empty context");
                return String::new();
            }
        };

        let hits = match self
            .store
            .search(&self.collection, embedding, self.top_k, self.score_threshold)
            .await
        {
            Ok(h) => h,
            Err(err) => {
                tracing::warn!(error = %err, "rag: vector search failed, returning empty context");
                return String::new();
            }
        };

        if hits.is_empty() {
            return String::new();
        }

        hits.iter()
            .filter_map(|hit| hit.payload.get("text").cloned())
            .collect::<Vec<_>>()
            .join("\n---\n")
    }
}
