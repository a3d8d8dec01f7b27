//! What the pipeline hands back to the caller.

use serde::{Deserialize, Serialize};

use super::chunk::Chunk;
use super::filters::StructuredFilters;

/// One cited source document in an [`Answer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub document_name: String,
    pub similarity: f32,
    pub snippet: String,
}

/// A single penalty that fired against a candidate during post-scoring,
/// kept for test introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyEntry {
    pub reason: String,
    pub multiplier: f32,
}

/// A retrieval candidate after hybrid search and weighted post-scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Raw similarity from the vector store, `1/(1+distance)`.
    pub raw_similarity: f32,
    /// Similarity after all soft-penalty multipliers are applied.
    pub adjusted_score: f32,
    pub penalty_trace: Vec<PenaltyEntry>,
}

/// The final response of a `query` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<SourceCitation>,
    pub suggested_followups: Vec<String>,
    pub applied_filters: StructuredFilters,
    /// Average similarity of cited chunks, clipped to `[0, 1]`.
    pub confidence: f32,
}

impl Answer {
    /// The graceful, truthful degradation used whenever a stage fails in a
    /// way the user must be told about rather than silently masked: a
    /// truthful "I don't have that information" answer, or a plain apology.
    pub fn apology(message: impl Into<String>, applied_filters: StructuredFilters) -> Self {
        Self {
            text: message.into(),
            citations: Vec::new(),
            suggested_followups: Vec::new(),
            applied_filters,
            confidence: 0.0,
        }
    }
}
