//! Qdrant-backed vector store client (§4.7): collection lifecycle, point
//! upsert and threshold-filtered nearest-neighbor search.

use std::collections::HashMap;

use qdrant_client::qdrant::{
    value::Kind, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;

use voice_agent_core::{Error, Result};

pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, String>,
}

pub struct VectorStore {
    client: Qdrant,
}

impl VectorStore {
    pub fn new(endpoint: &str, api_key: Option<&str>) -> Result<Self> {
        let mut builder = Qdrant::from_url(endpoint);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
        }
        let client = builder.build().map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Idempotent: an already-existing collection is treated as success
    /// (§4.7 — "200 and 409-conflict both treated as success").
    pub async fn ensure_collection(&self, name: &str, dim: u64) -> Result<()> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        if exists {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dim, Distance::Cosine)),
            )
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(())
    }

    pub async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let payload: HashMap<String, qdrant_client::qdrant::Value> = p
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, v.into()))
                    .collect();
                PointStruct::new(p.id, p.vector, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points))
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(())
    }

    pub async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        top_k: u64,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, vector, top_k)
                    .with_payload(true)
                    .score_threshold(score_threshold),
            )
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .filter(|point| point.score >= score_threshold)
            .map(|point| {
                let mut payload = HashMap::new();
                for (k, v) in point.payload {
                    if let Some(Kind::StringValue(s)) = v.kind {
                        payload.insert(k, s);
                    }
                }
                let id = point
                    .id
                    .map(|pid| match pid.point_id_options {
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
                        None => String::new(),
                    })
                    .unwrap_or_default();
                SearchHit { id, score: point.score, payload }
            })
            .collect())
    }
}
