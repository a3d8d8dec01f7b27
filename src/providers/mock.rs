//! Deterministic mock providers for tests, grounded on `wg-ragsmith`'s
//! `MockEmbeddingProvider` — same text always embeds to the same vector, so
//! fixture-based tests are reproducible without a live model.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{IngestionError, RetrievalError, SynthesisError};

use super::{
    ChatCompletionProvider, CompletionRequest, EmbeddingProvider, EqualityFilter, ExtractedBlock,
    PdfExtractor, VectorStore, VectorStoreHit,
};

const MOCK_DIMENSIONS: usize = 16;

/// Embeds text into a deterministic pseudo-random vector derived from a hash
/// of its content. Never calls out to a network.
#[derive(Debug, Default)]
pub struct MockEmbeddingProvider;

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self
    }

    fn hash_to_vector(text: &str) -> Vec<f32> {
        let mut vector = Vec::with_capacity(MOCK_DIMENSIONS);
        for i in 0..MOCK_DIMENSIONS {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let bits = hasher.finish();
            // Map to [-1, 1].
            let normalized = (bits % 2_000) as f32 / 1_000.0 - 1.0;
            vector.push(normalized);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(Self::hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        MOCK_DIMENSIONS
    }
}

/// Returns a fixed or scripted response without contacting a model.
pub struct MockCompletionProvider {
    responses: Mutex<Vec<String>>,
    default_response: String,
}

impl MockCompletionProvider {
    pub fn with_default(default_response: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            default_response: default_response.into(),
        }
    }

    /// Queues responses to return in order, one per call; once exhausted
    /// falls back to the default response.
    pub fn with_scripted_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
            default_response: String::new(),
        }
    }
}

#[async_trait]
impl ChatCompletionProvider for MockCompletionProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, SynthesisError> {
        let mut queue = self.responses.lock().expect("mock provider mutex poisoned");
        if queue.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(queue.remove(0))
        }
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<String, SynthesisError>>, SynthesisError> {
        let text = self.complete(request).await?;
        let tokens: Vec<Result<String, SynthesisError>> = text
            .split_inclusive(' ')
            .map(|tok| Ok(tok.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(tokens)))
    }
}

/// A fallible completion provider, for exercising degrade-on-failure paths
/// in tests.
pub struct FailingCompletionProvider;

#[async_trait]
impl ChatCompletionProvider for FailingCompletionProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, SynthesisError> {
        Err(SynthesisError::Completion("mock transport failure".into()))
    }
}

/// In-memory vector store backed by brute-force cosine distance. Suitable
/// for unit/integration tests; not for production use.
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: Mutex<HashMap<String, (Vec<f32>, serde_json::Value, String)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 1.0;
        }
        1.0 - (dot / (norm_a * norm_b))
    }

    fn matches_filter(metadata: &serde_json::Value, filter: &EqualityFilter) -> bool {
        metadata
            .get(&filter.key)
            .map(|value| match value {
                serde_json::Value::String(s) => s == &filter.value,
                other => other.to_string().trim_matches('"') == filter.value,
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        metadata: serde_json::Value,
        text: &str,
    ) -> Result<(), IngestionError> {
        self.records
            .lock()
            .expect("mock store mutex poisoned")
            .insert(id.to_string(), (vector, metadata, text.to_string()));
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: Option<EqualityFilter>,
        top_k: usize,
    ) -> Result<Vec<VectorStoreHit>, RetrievalError> {
        let records = self.records.lock().expect("mock store mutex poisoned");
        let mut scored: Vec<VectorStoreHit> = records
            .iter()
            .filter(|(_, (_, metadata, _))| match &filter {
                Some(f) => Self::matches_filter(metadata, f),
                None => true,
            })
            .map(|(id, (v, metadata, text))| VectorStoreHit {
                id: id.clone(),
                distance: Self::cosine_distance(vector, v),
                metadata: metadata.clone(),
                text: text.clone(),
            })
            .collect();
        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap());
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, id: &str) -> Result<(), IngestionError> {
        self.records
            .lock()
            .expect("mock store mutex poisoned")
            .remove(id);
        Ok(())
    }

    async fn count(&self) -> Result<usize, IngestionError> {
        Ok(self.records.lock().expect("mock store mutex poisoned").len())
    }
}

/// Returns canned extracted blocks without touching the filesystem.
pub struct MockPdfExtractor {
    blocks: Vec<ExtractedBlock>,
}

impl MockPdfExtractor {
    pub fn new(blocks: Vec<ExtractedBlock>) -> Self {
        Self { blocks }
    }
}

#[async_trait]
impl PdfExtractor for MockPdfExtractor {
    async fn extract(
        &self,
        _path: &std::path::Path,
    ) -> Result<Vec<ExtractedBlock>, IngestionError> {
        Ok(self.blocks.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeddings_are_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let a = provider.embed("Tražim hotel u Rimu").await.unwrap();
        let b = provider.embed("Tražim hotel u Rimu").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_text_embeds_differently() {
        let provider = MockEmbeddingProvider::new();
        let a = provider.embed("Rim").await.unwrap();
        let b = provider.embed("Amsterdam").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn in_memory_store_filters_by_equality() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(
                "1",
                vec![1.0, 0.0],
                serde_json::json!({"destination": "Rim"}),
                "hotel in rim",
            )
            .await
            .unwrap();
        store
            .upsert(
                "2",
                vec![0.0, 1.0],
                serde_json::json!({"destination": "Pariz"}),
                "hotel in paris",
            )
            .await
            .unwrap();

        let hits = store
            .query(
                &[1.0, 0.0],
                Some(EqualityFilter {
                    key: "destination".into(),
                    value: "Pariz".into(),
                }),
                10,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "2");
    }
}
