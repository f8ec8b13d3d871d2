//! Embedding + vector-store client, query-time RAG retrieval and
//! fire-and-forget call-history persistence (C7/C8, §4.7-§4.8).

pub mod call_history;
pub mod embeddings;
pub mod retriever;
pub mod vector_store;

pub use call_history::CallHistoryStore;
pub use embeddings::EmbeddingClient;
pub use retriever::RagRetriever;
pub use vector_store::{SearchHit, VectorPoint, VectorStore};
