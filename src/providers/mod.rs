//! External collaborator contracts: embedding, chat completion, vector
//! storage, and PDF extraction. The core pipeline depends only on these
//! traits, never on a concrete provider, mirroring `wg-ragsmith::stores::Backend`'s
//! backend-agnostic design.

pub mod mock;
pub mod vector_store;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{IngestionError, RetrievalError, SynthesisError};

/// Maps text to a fixed-dimensionality embedding vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;

    /// Batched form; providers that support native batching should override
    /// this. The default sequentially calls [`Self::embed`].
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Embedding dimensionality, fixed across all calls.
    fn dimensions(&self) -> usize;
}

/// A single token emitted while streaming a completion.
pub type CompletionToken = String;

/// Request shape for a chat-completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    /// When set, the provider is asked to constrain output to this JSON
    /// schema (best-effort; callers must still validate the result).
    pub json_schema: Option<serde_json::Value>,
}

/// Performs instruction-following generation, optionally streaming.
#[async_trait]
pub trait ChatCompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, SynthesisError>;

    /// Streaming variant; default implementation synthesizes a one-shot
    /// stream from [`Self::complete`] so providers without native streaming
    /// still satisfy the trait.
    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<CompletionToken, SynthesisError>>, SynthesisError> {
        let text = self.complete(request).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }
}

/// An equality filter applied at the vector store: at most one field may be
/// used as a hard filter per query.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualityFilter {
    pub key: String,
    pub value: String,
}

/// A single vector-store search hit.
#[derive(Debug, Clone)]
pub struct VectorStoreHit {
    pub id: String,
    pub distance: f32,
    pub metadata: serde_json::Value,
    pub text: String,
}

/// Persists `{id, vector, metadata, text}` and supports similarity search
/// with a single equality metadata filter.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        metadata: serde_json::Value,
        text: &str,
    ) -> Result<(), IngestionError>;

    async fn query(
        &self,
        vector: &[f32],
        filter: Option<EqualityFilter>,
        top_k: usize,
    ) -> Result<Vec<VectorStoreHit>, RetrievalError>;

    async fn delete(&self, id: &str) -> Result<(), IngestionError>;

    async fn count(&self) -> Result<usize, IngestionError>;
}

/// One extracted block of text from a source document, with optional table
/// data preserved as rows of cells.
#[derive(Debug, Clone)]
pub struct ExtractedBlock {
    pub page: usize,
    pub text: String,
    pub tables: Vec<Vec<Vec<String>>>,
}

/// Yields text blocks and tables from a document.
#[async_trait]
pub trait PdfExtractor: Send + Sync {
    async fn extract(&self, path: &std::path::Path) -> Result<Vec<ExtractedBlock>, IngestionError>;
}
