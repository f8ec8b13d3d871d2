//! Fire-and-forget call-history persistence (§4.8): embeds one conversation
//! turn and upserts it as a point so future calls can retrieve it as RAG
//! context. Must never add latency to the request path — failures are
//! logged, never surfaced.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::embeddings::EmbeddingClient;
use crate::vector_store::{VectorPoint, VectorStore};

#[derive(Clone)]
pub struct CallHistoryStore {
    store: Arc<VectorStore>,
    embedder: Arc<EmbeddingClient>,
    collection: String,
}

impl CallHistoryStore {
    pub fn new(store: Arc<VectorStore>, embedder: Arc<EmbeddingClient>, collection: impl Into<String>) -> Self {
        Self { store, embedder, collection: collection.into() }
    }

    /// Spawns the embed-then-upsert as a detached task; the caller never
    /// awaits it.
    pub fn store_async(&self, session_id: String, user_text: String, agent_text: String) {
        let store = self.store.clone();
        let embedder = self.embedder.clone();
        let collection = self.collection.clone();

        tokio::spawn(async move {
            let combined = format!("User: {user_text}\nAgent: {agent_text}");
            let embedding = match embedder.embed(&combined).await {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(error = %err, %session_id, "call history: embedding failed, dropping turn");
                    return;
                }
            };

            let mut payload = HashMap::new();
            payload.insert("session_id".to_string(), session_id.clone());
            payload.insert("user".to_string(), user_text);
            payload.insert("agent".to_string(), agent_text);
            payload.insert("timestamp".to_string(), Utc::now().to_rfc3339());
            payload.insert("text".to_string(), combined);

            let point = VectorPoint { id: Uuid::new_v4().to_string(), vector: embedding, payload };

            if let Err(err) = store.upsert(&collection, vec![point]).await {
                tracing::warn!(error = %err, %session_id, "call history: upsert failed, dropping turn");
            }
        });
    }
}
